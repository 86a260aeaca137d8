//! Core module - Profiles, key pool, process supervision and the engine

mod engine;
pub mod error;
pub mod events;
pub mod injector;
mod instance;
pub mod keys;
mod monitor;
pub mod patches;
pub mod profile;
mod registry;
pub mod settings;
pub mod store;
pub mod supervisor;

pub use engine::{EngineConfig, EngineParts, ProfileEngine};
pub use error::{EngineError, EngineResult};
pub use events::{
    BroadcastSink, EngineEvent, EventSink, LoggingChannel, MessageChannel, MessageKind,
    ProfileSnapshot, ScriptMessage, StatusEvent,
};
pub use injector::{ProcessInjector, ProcessOpener, RemoteProcess};
pub use instance::{InstanceSnapshot, InstanceState, ProfileInstance};
pub use keys::{CdKey, KeyList, KeyPool, KeyStatus};
pub use patches::{PatchCatalog, PatchEntry};
pub use profile::{Account, Profile, ProfileStats, StatKind, WindowPlacement};
pub use registry::InstanceRegistry;
pub use settings::{EngineTimings, HandshakeResend, Settings};
pub use store::{KeyStore, PatchStore, ProfileStore};
pub use supervisor::{ChildProcess, LaunchRequest, ProcessBackend, ProcessSupervisor, SupervisorOptions};
