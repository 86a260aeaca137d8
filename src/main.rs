//! Herdsman daemon - Starts the scheduled profiles and supervises them until Ctrl-C

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use single_instance::SingleInstance;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use herdsman::core::{
    BroadcastSink, EngineConfig, EngineEvent, EngineParts, KeyPool, LoggingChannel, PatchCatalog,
    PatchStore, ProcessSupervisor, ProfileEngine, Settings, SupervisorOptions,
};
use herdsman::persistence::Database;
use herdsman::platform::NativeBackend;
use herdsman::{APP_NAME, APP_VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    let (db, settings) = open_database()?;

    init_logging(settings.debug_logging);
    info!("{} v{} starting...", APP_NAME, APP_VERSION);
    info!("Data directory: {:?}", settings.get_data_directory());

    // Ensure only one daemon is running
    let instance = SingleInstance::new(APP_NAME).context("Failed to create single instance lock")?;
    if !instance.is_single() {
        error!("Another instance of {} is already running!", APP_NAME);
        return Ok(());
    }

    match db.cleanup_history(settings.history_retention_days) {
        Ok(0) => {}
        Ok(removed) => info!("Removed {} old history entries", removed),
        Err(e) => warn!("History cleanup failed: {}", e),
    }

    let keys = Arc::new(KeyPool::load(db.clone())?);
    let catalog = PatchCatalog::new(db.load_patches()?);
    info!("Loaded {} patch(es)", catalog.len());

    let supervisor = ProcessSupervisor::new(
        Arc::new(NativeBackend::new()),
        catalog,
        SupervisorOptions::from(&settings),
    );

    let sink = Arc::new(BroadcastSink::default());
    spawn_event_log(&sink);

    let engine = ProfileEngine::new(EngineParts {
        profiles: db.clone(),
        keys,
        supervisor,
        channel: Arc::new(LoggingChannel),
        sink,
        config: EngineConfig::from(&settings),
    })?;

    let requested: Vec<String> = std::env::args().skip(1).collect();
    let to_start = if requested.is_empty() {
        engine
            .snapshot()?
            .into_iter()
            .filter(|s| s.profile.schedule_enabled)
            .map(|s| s.profile.name)
            .collect()
    } else {
        requested
    };

    if to_start.is_empty() {
        warn!("No profiles to start");
    }
    for name in &to_start {
        if let Err(e) = engine.start_profile(name).await {
            error!("Failed to start '{}': {} ({})", name, e, e.code());
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");

    for (name, result) in engine.stop_all().await {
        if let Err(e) = result {
            warn!("Failed to stop '{}': {}", name, e);
        }
    }

    info!("{} shut down", APP_NAME);
    Ok(())
}

/// Open the database in the default location, then follow a custom data
/// directory if the stored settings name one
fn open_database() -> Result<(Arc<Database>, Settings)> {
    let default_path = Settings::default().get_database_path();
    let mut db = Database::open(&default_path)?;
    let mut settings = load_settings(&db)?;

    let custom_path = settings.get_database_path();
    if custom_path != default_path {
        db = Database::open(&custom_path)
            .with_context(|| format!("Failed to open database at {:?}", custom_path))?;
        settings = load_settings(&db)?;
        // The custom database must keep pointing at itself
        if settings.get_database_path() != custom_path {
            settings.data_directory = custom_path.parent().map(Path::to_path_buf);
            db.save_settings(&settings)?;
        }
    }
    Ok((Arc::new(db), settings))
}

fn load_settings(db: &Database) -> Result<Settings> {
    let mut settings = db.load_settings()?.unwrap_or_default();
    settings.validate();
    db.save_settings(&settings)?;
    Ok(settings)
}

/// Initialize the logging system
fn init_logging(debug: bool) {
    let default = if debug { "herdsman=debug" } else { "herdsman=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Log status changes as they happen
fn spawn_event_log(sink: &BroadcastSink) {
    let mut rx = sink.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(EngineEvent::Status(event)) => {
                    info!("[{}] {} {}", event.profile, event.state, event.status)
                }
                Ok(EngineEvent::Snapshot(profiles)) => {
                    info!("Snapshot of {} profile(s)", profiles.len())
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event log skipped {} event(s)", n)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
