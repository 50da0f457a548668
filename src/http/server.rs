//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared `ShieldState` from configuration
//! - Wrap any router in the security middleware stack
//! - Wire up ambient middleware (tracing, timeout, request ID, metrics)
//! - Serve a small demo application with graceful shutdown

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware,
    routing::{any, delete, get, post},
    Form, Json, Router,
};
use cookie::Cookie;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::clock::{Clock, SystemClock};
use crate::config::ShieldConfig;
use crate::http::middleware::{
    cookie_middleware, csrf_middleware, rate_limit_middleware, request_metrics_middleware,
    session_middleware,
};
use crate::security::cookie::{CookieCodec, CookieJar};
use crate::security::crypto::{AeadEngine, CryptoEngine};
use crate::security::csrf::{CsrfValidator, SignedSession};
use crate::security::rate_limit::{
    build_rate_limiter, CounterStore, MemoryStore, RateLimitEvents, RateLimiter, TracingEvents,
};

/// Shared state for the security middleware.
#[derive(Clone)]
pub struct ShieldState {
    pub config: Arc<ShieldConfig>,
    pub engine: Arc<dyn CryptoEngine>,
    pub codec: Arc<CookieCodec>,
    pub csrf: Arc<CsrfValidator>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub clock: Arc<dyn Clock>,
}

impl ShieldState {
    /// Single-process wiring: in-memory counter store, system clock, tracing events.
    pub fn new(config: ShieldConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        Self::with_parts(config, store, clock, Arc::new(TracingEvents))
    }

    /// Wire the state around an external counter store, clock and event sink.
    pub fn with_parts(
        config: ShieldConfig,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn RateLimitEvents>,
    ) -> Self {
        let engine: Arc<dyn CryptoEngine> = Arc::new(AeadEngine::new(&config.app_key));
        let codec = CookieCodec::new(engine.clone(), config.cookies.ignore.iter().cloned());
        let csrf = CsrfValidator::from_config(&config.csrf);
        let rate_limiter = build_rate_limiter(&config.rate_limit, store, clock.clone(), events);

        Self {
            config: Arc::new(config),
            engine,
            codec: Arc::new(codec),
            csrf: Arc::new(csrf),
            rate_limiter,
            clock,
        }
    }

    /// Wrap `router` in the security stack.
    ///
    /// Outermost first: rate limit, cookies, session, CSRF.
    pub fn protect(&self, router: Router) -> Router {
        router
            .layer(middleware::from_fn_with_state(self.clone(), csrf_middleware))
            .layer(middleware::from_fn_with_state(self.clone(), session_middleware))
            .layer(middleware::from_fn_with_state(self.clone(), cookie_middleware))
            .layer(middleware::from_fn_with_state(self.clone(), rate_limit_middleware))
    }
}

/// HTTP server for the demo application.
pub struct HttpServer {
    router: Router,
    config: ShieldConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ShieldConfig) -> Self {
        Self::with_state(ShieldState::new(config))
    }

    pub fn with_state(state: ShieldState) -> Self {
        let config = state.config.as_ref().clone();
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ShieldConfig, state: ShieldState) -> Router {
        let app = Router::new()
            .route("/", get(echo_handler))
            .route("/echo", any(echo_handler))
            .route("/preferences", post(store_preferences))
            .route("/preferences/{name}", delete(forget_preference))
            .route("/health", get(health_handler))
            .with_state(state.clone());

        state
            .protect(app)
            .layer(middleware::from_fn(request_metrics_middleware))
            .layer(request_timeout(config))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until Ctrl+C.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        self.run_until(listener, shutdown_signal()).await
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }
}

/// Reflects the request as the security layers left it.
async fn echo_handler(jar: CookieJar, req: Request<Body>) -> Json<Value> {
    let session = req.extensions().get::<SignedSession>();
    let cookies: BTreeMap<String, String> = jar.inbound().into_iter().collect();

    Json(json!({
        "method": req.method().as_str(),
        "path": req.uri().path(),
        "session": session.map(|s| s.id()),
        "csrf_token": session.map(|s| s.token()),
        "cookies": cookies,
    }))
}

/// Store every submitted field except the CSRF token as an encrypted cookie.
async fn store_preferences(
    State(state): State<ShieldState>,
    jar: CookieJar,
    Form(fields): Form<BTreeMap<String, String>>,
) -> Json<Value> {
    let mut stored = Vec::new();
    for (name, value) in fields {
        if name == state.config.csrf.form_field {
            continue;
        }
        jar.add(
            Cookie::build((name.clone(), value))
                .path("/")
                .http_only(true)
                .build(),
        );
        stored.push(name);
    }
    Json(json!({ "stored": stored }))
}

async fn forget_preference(jar: CookieJar, Path(name): Path<String>) -> Json<Value> {
    jar.remove(&name);
    Json(json!({ "removed": name }))
}

/// Requests still running after the configured budget answer 408.
fn request_timeout(config: &ShieldConfig) -> TimeoutLayer {
    TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(config.timeouts.request_secs),
    )
}

async fn health_handler() -> &'static str {
    "OK"
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
