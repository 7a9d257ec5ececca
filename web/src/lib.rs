//! Thin HTTP transport over the `domain` layer.
//!
//! Caller identity arrives in the `x-user-id` and `x-user-role` headers, set
//! by the authentication layer in front of this service.

use axum::http::{header, HeaderName, HeaderValue, Method};
use domain::{CredentialManager, EventBus, ScanCoordinator, SessionManager};
use log::*;
use service::config::Config;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

pub(crate) mod controller;
pub mod error;
pub(crate) mod extractors;
pub mod router;
pub(crate) mod sse;

pub use error::{Error, Result};

// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub credentials: Arc<CredentialManager>,
    pub scans: Arc<ScanCoordinator>,
    pub bus: Arc<EventBus>,
    pub sessions: Arc<SessionManager>,
}

/// Bind the configured interface and port, then [`serve`] until `shutdown` resolves.
pub async fn init_server(
    app_state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let interface = app_state
        .config
        .interface
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let addr = format!("{}:{}", interface, app_state.config.port);

    let listener = TcpListener::bind(&addr).await?;
    info!("Server starting... listening for connections on http://{}", addr);

    serve(listener, app_state, shutdown).await
}

/// Serve the API on `listener` until `shutdown` resolves.
///
/// Graceful shutdown waits for every open response, and a live session
/// stream only ends once its session is closed. All sessions are therefore
/// drained as soon as `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    app_state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let sessions = Arc::clone(&app_state.sessions);
    let drain = async move {
        shutdown.await;
        sessions.shutdown();
    };

    let cors = cors_layer(&app_state.config);
    let app = router::define_routes(app_state).layer(cors);

    axum::serve(listener, app)
        .with_graceful_shutdown(drain)
        .await
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(extractors::caller::USER_ID_HEADER),
            HeaderName::from_static(extractors::caller::USER_ROLE_HEADER),
        ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use credential::store::MemoryStore;
    use domain::attendance::InMemoryAttendance;
    use events::{BusSettings, LocalMedium};
    use secrecy::SecretString;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn app_state() -> AppState {
        let credentials = Arc::new(
            CredentialManager::new(
                Arc::new(MemoryStore::new()),
                &SecretString::new("test-master-secret".to_string()),
                credential::Settings::default(),
            )
            .unwrap(),
        );
        let bus = Arc::new(EventBus::new(
            Arc::new(LocalMedium::new()),
            BusSettings::default(),
        ));
        AppState {
            config: Config::parse_from(["web-test"]),
            scans: Arc::new(ScanCoordinator::new(
                credentials.clone(),
                Arc::new(InMemoryAttendance::new()),
                bus.clone(),
            )),
            credentials,
            bus,
            sessions: Arc::new(SessionManager::default()),
        }
    }

    #[tokio::test]
    async fn test_shutdown_completes_while_a_stream_is_open() {
        let state = app_state();
        let sessions = Arc::clone(&state.sessions);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, state, async move {
            stopped.await.ok();
        }));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(
                b"GET /sessions/stream HTTP/1.1\r\nhost: localhost\r\nx-user-id: S1\r\n\r\n",
            )
            .await
            .unwrap();
        let mut buf = vec![0u8; 1024];
        let mut received = String::new();
        while !received.contains("session_opened") {
            let n = client.read(&mut buf).await.unwrap();
            assert!(n > 0, "stream closed before the session opened");
            received.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        assert_eq!(sessions.session_count(), 1);

        stop.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server did not shut down with a stream open");
        assert!(result.unwrap().is_ok());
        assert_eq!(sessions.session_count(), 0);
    }
}
