//! senscord-server: binds the configured listeners and dispatches client
//! traffic against one in-process `SensorCore`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use senscord_config::ConfigFacade;
use senscord_sdk::mock::MockSensorCore;
use senscord_sdk::{SensorCore, StreamCatalogEntry, VersionRecord};
use senscord_server_core::{ClientAdapterManager, Listener, ListenerRole};
use senscord_transport::tcp::TcpTransport;
use senscord_transport::Transport;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "senscord-server", version)]
struct Cli {
    /// Path to senscord_server.toml. Falls back to SENSCORD_FILE_PATH search
    /// directories, then ./senscord_server.toml.
    #[arg(short = 'f', long = "config")]
    config: Option<PathBuf>,

    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Overrides every configured listener's primary bind address.
    #[arg(long = "bind-override")]
    bind_override: Option<String>,

    /// Directory backing shared-memory allocator regions opened for
    /// incoming frames. Defaults to the system temp directory.
    #[arg(long = "shmem-dir")]
    shmem_dir: Option<PathBuf>,
}

fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if let Ok(search_path) = std::env::var("SENSCORD_FILE_PATH") {
        for dir in search_path.split(':') {
            if dir.is_empty() {
                continue;
            }
            let candidate = PathBuf::from(dir).join("senscord_server.toml");
            if candidate.is_file() {
                return candidate;
            }
        }
    }
    PathBuf::from("senscord_server.toml")
}

fn demo_sensor_core() -> Arc<dyn SensorCore> {
    Arc::new(MockSensorCore::new(
        VersionRecord {
            name: "senscord-server".into(),
            major: 1,
            minor: 0,
            patch: 0,
            description: "in-process demo core".into(),
            stream_versions: vec![],
        },
        vec![StreamCatalogEntry {
            key: "camera_0".into(),
            r#type: "image".into(),
        }],
    ))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(cli.log_level.as_deref().unwrap_or("info"))
            }),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "senscord-server starting");

    let config_path = resolve_config_path(cli.config.clone());
    let server_config = match senscord_config::load_from_path(&config_path) {
        Ok(c) => {
            info!(path = %config_path.display(), listeners = c.listeners.len(), "config loaded");
            c
        }
        Err(e) => {
            eprintln!("FATAL: failed to load config from '{}': {}", config_path.display(), e);
            std::process::exit(1);
        }
    };

    if !server_config.client_enabled {
        info!("server.client_enabled is false; no listeners will be started");
    }

    let core = demo_sensor_core();
    let catalog: Vec<String> = core.stream_list().await.into_iter().map(|e| e.key).collect();
    let config = Arc::new(ConfigFacade::new(server_config.clone()));
    config.verify_supported_streams(&catalog);

    let shmem_dir = cli.shmem_dir.clone().unwrap_or_else(std::env::temp_dir);

    let manager = ClientAdapterManager::new();
    let mut listeners: Vec<Arc<Listener>> = Vec::new();

    if server_config.client_enabled {
        for setting in config.listener_list() {
            let primary_address = cli
                .bind_override
                .clone()
                .unwrap_or_else(|| setting.primary_address.clone());

            let primary = Listener::new(
                ListenerRole::Primary,
                setting.connection_key.clone(),
                primary_address.clone(),
                Box::new(|| Box::new(TcpTransport::new()) as Box<dyn Transport>),
                manager.clone(),
                core.clone(),
                config.clone(),
                shmem_dir.clone(),
            );
            if let Err(e) = primary.start().await {
                eprintln!("FATAL: failed to bind listener '{}' on {}: {}", setting.connection_key, primary_address, e);
                std::process::exit(1);
            }
            info!(connection_key = %setting.connection_key, address = %primary_address, "primary listener bound");
            listeners.push(primary);

            if let Some(secondary_address) = &setting.secondary_address {
                let secondary = Listener::new(
                    ListenerRole::Secondary,
                    setting.connection_key.clone(),
                    secondary_address.clone(),
                    Box::new(|| Box::new(TcpTransport::new()) as Box<dyn Transport>),
                    manager.clone(),
                    core.clone(),
                    config.clone(),
                    shmem_dir.clone(),
                );
                if let Err(e) = secondary.start().await {
                    eprintln!(
                        "FATAL: failed to bind secondary listener '{}' on {}: {}",
                        setting.connection_key, secondary_address, e
                    );
                    std::process::exit(1);
                }
                info!(connection_key = %setting.connection_key, address = %secondary_address, "secondary listener bound");
                listeners.push(secondary);
            }
        }
    }

    if let Err(e) = wait_for_shutdown_signal().await {
        eprintln!("FATAL: failed to register signal handler: {}", e);
        std::process::exit(1);
    }

    info!("shutdown signal received, stopping listeners");
    for listener in &listeners {
        listener.stop().await;
    }
    manager.stop_all().await;
    info!("senscord-server stopped cleanly");
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
