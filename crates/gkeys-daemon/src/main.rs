//! GKeys daemon entry point.
//!
//! Wires the device-control services onto the dispatch core and starts the
//! Tokio runtime:
//!
//! ```text
//! main()
//!  └─ load_config()           -- TOML config with defaults
//!  └─ SimulatedKeyboard       -- device collaborator (no USB stack here)
//!  └─ register services       -- Macros, Mapping, Profiles (fatal on duplicate)
//!  └─ spawn tasks
//!       ├─ connection pump    -- dispatches inbound bus messages in order
//!       ├─ completion pump    -- resolves open StartRecording replies
//!       └─ bus-side drain     -- logs outbound traffic on the loopback peer
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use gkeys_core::{introspect, CallRegistry, Dispatcher, SerialCounter};
use gkeys_daemon::application::device::KeyboardDevice;
use gkeys_daemon::application::macro_service::MacroService;
use gkeys_daemon::application::mapping_service::MappingService;
use gkeys_daemon::application::profile_service::ProfileService;
use gkeys_daemon::infrastructure::config::load_config;
use gkeys_daemon::infrastructure::device::SimulatedKeyboard;
use gkeys_daemon::infrastructure::loopback::{loopback, run_pump};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("loading configuration")?;

    // Level from RUST_LOG when set, otherwise from the config file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.daemon.log_level)),
        )
        .init();

    info!("GKeys daemon starting");

    let selector = config.bus.selector();
    let object_path = config.bus.object_path.clone();

    // ── Device collaborator ───────────────────────────────────────────────────
    let (completion_tx, mut completion_rx) = mpsc::unbounded_channel();
    let device: Arc<dyn KeyboardDevice> = Arc::new(SimulatedKeyboard::new(
        config.profiles.available.clone(),
        config.profiles.active.clone(),
        completion_tx,
        config.daemon.auto_complete_recordings,
    ));

    // ── Bus connection and services ───────────────────────────────────────────
    let (mut bus_peer, server) = loopback();
    let serials = Arc::new(SerialCounter::new());

    let mut registry = CallRegistry::new();
    let macro_service = Arc::new(MacroService::new(
        Arc::clone(&device),
        selector,
        object_path.clone(),
        Arc::clone(&server.sink),
        Arc::clone(&serials),
    ));
    macro_service
        .register(&mut registry)
        .context("registering macro service")?;
    MappingService::new(Arc::clone(&device), selector, object_path.clone())
        .register(&mut registry)
        .context("registering mapping service")?;
    ProfileService::new(
        Arc::clone(&device),
        selector,
        object_path.clone(),
        Arc::clone(&server.sink),
        Arc::clone(&serials),
    )
    .register(&mut registry)
    .context("registering profile service")?;

    info!(
        "{} handlers registered on {selector} bus at {object_path}",
        registry.len()
    );
    debug!(
        "discovery document:\n{}",
        introspect::build_document(&registry, &object_path)
    );

    let registry = Arc::new(registry);
    let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&server.sink));

    // ── Background tasks ──────────────────────────────────────────────────────
    let pump = tokio::spawn(run_pump(dispatcher, server.inbound, Arc::clone(&server.sink)));

    let completion_service = Arc::clone(&macro_service);
    let completions = tokio::spawn(async move {
        while let Some(finished) = completion_rx.recv().await {
            completion_service.finish_recording(finished);
        }
    });

    // Keeps the peer half of the loopback alive and logs what the daemon
    // puts on the bus.  A real deployment attaches the host bus here.
    let drain = tokio::spawn(async move {
        while let Some(message) = bus_peer.next_message().await {
            debug!(
                "bus traffic: {:?} serial {}",
                message.kind(),
                message.serial()
            );
        }
    });

    info!("GKeys daemon ready.  Press Ctrl-C to exit.");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received");

    pump.abort();
    completions.abort();
    drain.abort();
    let _ = pump.await;
    let _ = completions.await;
    let _ = drain.await;

    match Arc::try_unwrap(registry) {
        Ok(mut registry) => registry.unregister_all(),
        Err(_) => warn!("registry still shared at shutdown; handlers not released"),
    }

    info!("GKeys daemon stopped");
    Ok(())
}
