//! Event sink and script channel seams

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::instance::InstanceState;
use super::profile::Profile;

/// Sent after every state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub profile: String,
    pub state: InstanceState,
    pub status: String,
}

/// A profile together with its runtime status
#[derive(Debug, Clone, Serialize)]
pub struct ProfileSnapshot {
    pub profile: Profile,
    pub state: InstanceState,
    pub status: String,
    pub current_key: Option<String>,
    pub pid: Option<u32>,
    pub last_error: Option<String>,
}

/// Receives status notifications from the engine
pub trait EventSink: Send + Sync {
    fn status_changed(&self, event: StatusEvent);
    /// Full state of every profile, e.g. after stats were reset
    fn snapshot(&self, profiles: Vec<ProfileSnapshot>);
}

/// What a broadcast subscriber receives
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Status(StatusEvent),
    Snapshot(Vec<ProfileSnapshot>),
}

/// Fans events out to any number of subscribers
pub struct BroadcastSink {
    tx: broadcast::Sender<EngineEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for BroadcastSink {
    fn status_changed(&self, event: StatusEvent) {
        debug!("[{}] {} {}", event.profile, event.state, event.status);
        // No subscribers is fine
        let _ = self.tx.send(EngineEvent::Status(event));
    }

    fn snapshot(&self, profiles: Vec<ProfileSnapshot>) {
        let _ = self.tx.send(EngineEvent::Snapshot(profiles));
    }
}

/// Message types understood by the companion script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageKind {
    /// Handshake: hands the script the engine handle and asks for heartbeats
    Handle,
    /// Ad hoc command, e.g. a mule trigger
    Command,
    /// New key pair after a rotation
    SetKey,
}

/// Delivers typed messages to a running game
pub trait MessageChannel: Send + Sync {
    fn send_message(&self, pid: u32, kind: MessageKind, payload: &str) -> anyhow::Result<()>;
}

/// Channel that only logs; used when no transport is attached
#[derive(Debug, Default)]
pub struct LoggingChannel;

impl MessageChannel for LoggingChannel {
    fn send_message(&self, pid: u32, kind: MessageKind, payload: &str) -> anyhow::Result<()> {
        info!("-> PID {} {:?} {}", pid, kind, payload);
        Ok(())
    }
}

/// Messages the companion script sends back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptMessage {
    Heartbeat,
    Status(String),
    Run,
    Chicken,
    Death,
    /// The realm rejected the key because it is in use elsewhere
    KeyInUse,
    /// The realm disabled the key
    KeyDisabled,
    /// The realm is unreachable with this key
    RealmDown,
    Restart,
    Stop,
}
