use credential::store::{MemoryStore, RedisStore, Store};
use credential::CredentialManager;
use domain::attendance::InMemoryAttendance;
use domain::ScanCoordinator;
use events::{BusSettings, EventBus, LocalMedium, Medium, Pattern, RedisMedium};
use log::*;
use secrecy::SecretString;
use service::config::{Config, StoreBackend};
use service::logging::Logger;
use sse::{Manager, SessionEventHandler};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logger: {e}");
    }

    info!(
        "Starting instance {} ({:?}, {} backend)",
        config.instance_id(),
        config.runtime_env(),
        config.store_backend
    );

    let (store, medium, purge_task) = connect_backend(&config).await;

    let master_secret = match config.credential_master_secret() {
        Some(secret) => SecretString::new(secret),
        None => {
            error!("CREDENTIAL_MASTER_SECRET must be set outside development");
            std::process::exit(1);
        }
    };
    let credentials = match CredentialManager::new(store, &master_secret, credential_settings(&config))
    {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!("Failed to initialize credential manager: {e}");
            std::process::exit(1);
        }
    };

    let bus = Arc::new(EventBus::new(
        medium,
        BusSettings {
            instance_id: config.instance_id().to_string(),
            resubscribe_backoff: config.bus_resubscribe_backoff(),
            health_check_interval: config.bus_health_check_interval(),
        },
    ));
    let sessions = Arc::new(Manager::new(session_settings(&config)));

    // Every instance hears every event and routes it to its own sessions.
    if let Err(e) = bus
        .subscribe(
            Pattern::all(),
            Arc::new(SessionEventHandler::new(Arc::clone(&sessions))),
        )
        .await
    {
        error!("Failed to subscribe to the event bus: {e}");
        std::process::exit(1);
    }
    let health_task = bus.spawn_health_check();
    let cleanup_task = sessions.spawn_cleanup();

    // Attendance records are owned by the CRUD layer; the in-process
    // repository stands in until that layer is wired to this service.
    let attendance = Arc::new(InMemoryAttendance::new());
    let scans = Arc::new(ScanCoordinator::new(
        Arc::clone(&credentials),
        attendance,
        Arc::clone(&bus),
    ));

    let app_state = web::AppState {
        config,
        credentials,
        scans,
        bus: Arc::clone(&bus),
        sessions: Arc::clone(&sessions),
    };

    if let Err(e) = web::init_server(app_state, shutdown_signal()).await {
        error!("Server error: {e}");
    }

    // Sessions were drained when the signal arrived; stop background work.
    bus.shutdown();
    cleanup_task.abort();
    health_task.abort();
    if let Some(purge_task) = purge_task {
        purge_task.abort();
    }
    info!("Shutdown complete");
}

/// Connect the shared store and event medium. The in-memory backend also
/// returns its purge task.
async fn connect_backend(
    config: &Config,
) -> (Arc<dyn Store>, Arc<dyn Medium>, Option<JoinHandle<()>>) {
    match config.store_backend {
        StoreBackend::Redis => {
            let store = match RedisStore::connect(config.redis_url()).await {
                Ok(store) => store,
                Err(e) => {
                    error!("Failed to connect credential store at {}: {e}", config.redis_url());
                    std::process::exit(1);
                }
            };
            let medium = match RedisMedium::connect(config.redis_url()).await {
                Ok(medium) => medium,
                Err(e) => {
                    error!("Failed to connect event medium at {}: {e}", config.redis_url());
                    std::process::exit(1);
                }
            };
            let store: Arc<dyn Store> = Arc::new(store);
            let medium: Arc<dyn Medium> = Arc::new(medium);
            (store, medium, None)
        }
        StoreBackend::Memory => {
            warn!("Using in-process store and event medium; replay protection and fan-out cover this instance only");
            let memory = Arc::new(MemoryStore::new());
            let purge_task = memory.spawn_purge(config.session_cleanup_interval());
            let store: Arc<dyn Store> = memory;
            let medium: Arc<dyn Medium> = Arc::new(LocalMedium::new());
            (store, medium, Some(purge_task))
        }
    }
}

fn credential_settings(config: &Config) -> credential::Settings {
    credential::Settings {
        ttl: config.credential_ttl(),
        clock_skew: config.credential_clock_skew(),
        rate_limit_per_minute: config.credential_rate_limit_per_minute,
        secret_ttl: config.subject_secret_ttl(),
        blacklist_margin: config.blacklist_margin(),
    }
}

fn session_settings(config: &Config) -> sse::Settings {
    sse::Settings {
        max_sessions: config.max_sessions,
        max_sessions_per_owner: config.max_sessions_per_owner,
        queue_capacity: config.session_queue_capacity,
        idle_timeout: config.session_idle_timeout(),
        cleanup_interval: config.session_cleanup_interval(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received, starting graceful shutdown"),
        _ = terminate => info!("SIGTERM received, starting graceful shutdown"),
    }
}
