//! Instance monitoring - Liveness polling and heartbeat checks per running game

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::engine::ProfileEngine;
use super::instance::ProfileInstance;
use super::settings::HandshakeResend;

/// Why a monitor loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum MonitorOutcome {
    /// Stop requested or the process was replaced
    Cancelled,
    /// Exit code 0
    Exited,
    Crashed(String),
    /// Too many missed heartbeats
    Unresponsive(u32),
}

impl ProfileEngine {
    /// Watch a freshly running instance until it stops, exits or crashes.
    ///
    /// The loop runs in its own task; a panic inside it is caught by the
    /// outer task and settles only this instance.
    pub(super) fn spawn_monitor(self: &Arc<Self>, instance: Arc<ProfileInstance>) {
        let engine = Arc::clone(self);
        let token = instance.cancel_token();

        tokio::spawn(async move {
            let watcher = {
                let engine = Arc::clone(&engine);
                let instance = Arc::clone(&instance);
                async move {
                    let outcome = engine.watch(&instance, &token).await;
                    engine.settle(&instance, &token, outcome).await;
                }
            };
            engine.run_isolated(&instance, "monitor", watcher).await;
        });
    }

    async fn watch(&self, instance: &ProfileInstance, token: &CancellationToken) -> MonitorOutcome {
        let Some(process) = instance.process() else {
            return MonitorOutcome::Cancelled;
        };
        let pid = process.pid();
        let timings = self.config.timings;
        let mut last_check = Instant::now();
        let run_started = Instant::now();
        let mut stable = false;
        debug!("Monitoring '{}' (PID {})", instance.name(), pid);

        loop {
            tokio::select! {
                _ = token.cancelled() => return MonitorOutcome::Cancelled,
                _ = tokio::time::sleep(timings.poll_interval) => {}
            }

            if instance.pid() != Some(pid) {
                return MonitorOutcome::Cancelled;
            }

            match process.exit_code() {
                Ok(Some(0)) => return MonitorOutcome::Exited,
                Ok(Some(code)) => return MonitorOutcome::Crashed(format!("exit code {}", code)),
                Ok(None) => trace!("PID {} alive", pid),
                Err(e) => return MonitorOutcome::Crashed(format!("lost track of process: {}", e)),
            }

            if !stable && run_started.elapsed() >= timings.crash_reset_after {
                stable = true;
                if instance.crash_count() > 0 {
                    info!(
                        "'{}' ran stable for {:?}, crash count cleared",
                        instance.name(),
                        timings.crash_reset_after
                    );
                    instance.reset_crash_count();
                }
            }

            if timings.handshake_resend == HandshakeResend::EveryPoll && !instance.has_heartbeat() {
                self.send_handshake(pid);
            }

            if last_check.elapsed() < timings.heartbeat_check_interval {
                continue;
            }
            last_check = Instant::now();

            let stale = instance
                .heartbeat_age()
                .map(|age| age > timings.heartbeat_timeout)
                .unwrap_or(false);
            if stale {
                let missed = instance.miss_heartbeat();
                warn!(
                    "'{}' missed heartbeat {}/{}",
                    instance.name(),
                    missed,
                    timings.max_missed_heartbeats
                );
                if missed >= timings.max_missed_heartbeats {
                    return MonitorOutcome::Unresponsive(missed);
                }
                self.send_handshake(pid);
            }
        }
    }

    async fn settle(
        self: &Arc<Self>,
        instance: &Arc<ProfileInstance>,
        token: &CancellationToken,
        outcome: MonitorOutcome,
    ) {
        match outcome {
            MonitorOutcome::Cancelled => {}
            MonitorOutcome::Exited => self.handle_exit(instance, token).await,
            MonitorOutcome::Crashed(reason) => self.handle_failure(instance, token, reason).await,
            MonitorOutcome::Unresponsive(missed) => {
                if let Some(process) = instance.process() {
                    if let Err(e) = self.supervisor.kill(process).await {
                        warn!("Killing unresponsive '{}' failed: {}", instance.name(), e);
                    }
                }
                let reason = format!("no heartbeat for {} checks", missed);
                self.handle_failure(instance, token, reason).await;
            }
        }
    }
}
