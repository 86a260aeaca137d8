//! Fakes shared by the engine tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use herdsman::core::{
    ChildProcess, EngineConfig, EngineParts, EngineTimings, EventSink, KeyList, KeyPool, KeyStore, LaunchRequest,
    MessageChannel, MessageKind, PatchCatalog, ProcessBackend, ProcessSupervisor, Profile,
    ProfileEngine, ProfileSnapshot, ProfileStore, StatusEvent, SupervisorOptions, WindowPlacement,
};
use herdsman::persistence::Database;

pub struct FakeProcess {
    pid: u32,
    exit: Mutex<Option<i32>>,
    pub killed: AtomicBool,
    pub close_requested: AtomicBool,
    /// Polling the exit code panics
    pub poisoned: AtomicBool,
}

impl FakeProcess {
    pub fn exit_with(&self, code: i32) {
        *self.exit.lock().unwrap() = Some(code);
    }
}

impl ChildProcess for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn exit_code(&self) -> anyhow::Result<Option<i32>> {
        if self.poisoned.load(Ordering::SeqCst) {
            panic!("exit code of PID {} unreadable", self.pid);
        }
        Ok(*self.exit.lock().unwrap())
    }

    fn request_close(&self) -> anyhow::Result<()> {
        self.close_requested.store(true, Ordering::SeqCst);
        self.exit.lock().unwrap().get_or_insert(0);
        Ok(())
    }

    fn kill(&self) -> anyhow::Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        self.exit.lock().unwrap().get_or_insert(-9);
        Ok(())
    }
}

/// Backend whose processes only do what the test tells them
#[derive(Default)]
pub struct FakeBackend {
    next_pid: AtomicU32,
    /// Every spawned process exits with this code right away
    pub exit_on_spawn: Mutex<Option<i32>>,
    pub fail_spawn: AtomicBool,
    /// Spawning panics
    pub panic_spawn: AtomicBool,
    /// The next spawn blocks its thread until the sender side signals
    pub spawn_gate: Mutex<Option<Receiver<()>>>,
    pub spawn_entered: Notify,
    pub launched: Mutex<Vec<(LaunchRequest, Arc<FakeProcess>)>>,
    pub shown: Mutex<Vec<(u32, bool)>>,
}

impl FakeBackend {
    pub fn launches(&self) -> usize {
        self.launched.lock().unwrap().len()
    }

    pub fn process(&self, index: usize) -> Arc<FakeProcess> {
        Arc::clone(&self.launched.lock().unwrap()[index].1)
    }

    pub fn request(&self, index: usize) -> LaunchRequest {
        self.launched.lock().unwrap()[index].0.clone()
    }
}

impl ProcessBackend for FakeBackend {
    fn spawn(&self, request: &LaunchRequest) -> anyhow::Result<Arc<dyn ChildProcess>> {
        if self.panic_spawn.load(Ordering::SeqCst) {
            panic!("loader crashed while spawning '{}'", request.profile);
        }
        if self.fail_spawn.load(Ordering::SeqCst) {
            anyhow::bail!("executable not found");
        }
        let gate = self.spawn_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            self.spawn_entered.notify_one();
            let _ = gate.recv();
        }
        let process = Arc::new(FakeProcess {
            pid: 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst),
            exit: Mutex::new(*self.exit_on_spawn.lock().unwrap()),
            killed: AtomicBool::new(false),
            close_requested: AtomicBool::new(false),
            poisoned: AtomicBool::new(false),
        });
        self.launched
            .lock()
            .unwrap()
            .push((request.clone(), Arc::clone(&process)));
        Ok(process)
    }

    fn resume(&self, _pid: u32) -> anyhow::Result<()> {
        Ok(())
    }

    fn apply_patch(&self, _pid: u32, _module: &Path, _offset: usize, _bytes: &[u8]) -> bool {
        true
    }

    fn load_module(&self, _pid: u32, _module: &Path) -> bool {
        true
    }

    fn show_window(&self, pid: u32, visible: bool) -> anyhow::Result<()> {
        self.shown.lock().unwrap().push((pid, visible));
        Ok(())
    }

    fn move_window(&self, _pid: u32, _placement: WindowPlacement) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<(u32, MessageKind, String)>>,
}

impl RecordingChannel {
    pub fn count(&self, pid: u32, kind: MessageKind) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, k, _)| *p == pid && *k == kind)
            .count()
    }
}

impl MessageChannel for RecordingChannel {
    fn send_message(&self, pid: u32, kind: MessageKind, payload: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((pid, kind, payload.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<StatusEvent>>,
    pub snapshots: Mutex<Vec<Vec<ProfileSnapshot>>>,
}

impl RecordingSink {
    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl EventSink for RecordingSink {
    fn status_changed(&self, event: StatusEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn snapshot(&self, profiles: Vec<ProfileSnapshot>) {
        self.snapshots.lock().unwrap().push(profiles);
    }
}

pub struct Harness {
    pub engine: Arc<ProfileEngine>,
    pub db: Arc<Database>,
    pub backend: Arc<FakeBackend>,
    pub channel: Arc<RecordingChannel>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new(profiles: Vec<Profile>, lists: Vec<KeyList>) -> Self {
        Self::with_timings(profiles, lists, EngineTimings::default())
    }

    pub fn with_timings(profiles: Vec<Profile>, lists: Vec<KeyList>, timings: EngineTimings) -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        for profile in &profiles {
            db.save_profile(profile).unwrap();
        }
        for list in &lists {
            db.save_key_list(list).unwrap();
        }

        let backend = Arc::new(FakeBackend::default());
        let channel = Arc::new(RecordingChannel::default());
        let sink = Arc::new(RecordingSink::default());
        let keys = Arc::new(KeyPool::load(db.clone()).unwrap());
        let supervisor = ProcessSupervisor::new(
            backend.clone(),
            PatchCatalog::default(),
            SupervisorOptions {
                channel_handle: "hub".to_string(),
                termination_grace: std::time::Duration::from_secs(5),
                ..Default::default()
            },
        );
        let config = EngineConfig { timings };

        let engine = ProfileEngine::new(EngineParts {
            profiles: db.clone(),
            keys,
            supervisor,
            channel: channel.clone(),
            sink: sink.clone(),
            config,
        })
        .unwrap();

        Self {
            engine,
            db,
            backend,
            channel,
            sink,
        }
    }

    pub fn stored(&self, name: &str) -> Profile {
        self.db.load_profile(name).unwrap().unwrap()
    }
}

pub fn profile(name: &str) -> Profile {
    Profile::new(name, "/games/d2/Game.exe").with_game_version("1.14d")
}

pub fn keyed_profile(name: &str, list: &str) -> Profile {
    profile(name).with_key_list(list)
}

pub async fn advance_secs(secs: u64) {
    for _ in 0..secs {
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
}
