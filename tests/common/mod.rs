//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use cookie::Cookie;
use serde_json::Value;
use tower::ServiceExt;

use request_shield::clock::ManualClock;
use request_shield::config::ShieldConfig;
use request_shield::security::rate_limit::{CounterStore, MemoryStore, RecordingEvents};
use request_shield::{HttpServer, ShieldState};

pub const APP_KEY: &str = "integration-test-key-0123456789abcdef";
pub const START_SECS: u64 = 1_700_000_000;

/// Defaults with a fixed key and limits high enough not to interfere.
pub fn test_config() -> ShieldConfig {
    let mut config = ShieldConfig {
        app_key: APP_KEY.to_string(),
        ..ShieldConfig::default()
    };
    config.rate_limit.per_second = 1_000;
    config.rate_limit.per_minute = 10_000;
    config
}

pub struct TestApp {
    pub router: Router,
    pub state: ShieldState,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub events: Arc<RecordingEvents>,
}

impl TestApp {
    pub fn new(config: ShieldConfig) -> Self {
        let clock = Arc::new(ManualClock::at_secs(START_SECS));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        Self::with_store(config, clock, store.clone(), store)
    }

    pub fn with_store(
        config: ShieldConfig,
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
        counter_store: Arc<dyn CounterStore>,
    ) -> Self {
        let events = Arc::new(RecordingEvents::new());
        let state = ShieldState::with_parts(config, counter_store, clock.clone(), events.clone());
        let router = HttpServer::with_state(state.clone()).router();
        Self {
            router,
            state,
            clock,
            store,
            events,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Hit an exempt route to obtain a session and its XSRF cookie.
    pub async fn start_session(&self) -> Session {
        let response = self.send(get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookies = set_cookies(&response);
        let id = find_cookie(&cookies, "shield_session")
            .expect("session cookie issued")
            .value()
            .to_string();
        let xsrf = find_cookie(&cookies, "XSRF-TOKEN")
            .expect("xsrf cookie issued")
            .value()
            .to_string();

        // The echo handler reports the canonical token once the XSRF header is accepted.
        let response = self
            .send(
                Request::get("/echo")
                    .header(header::COOKIE, format!("shield_session={id}"))
                    .header("X-XSRF-TOKEN", &xsrf)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let token = body_json(response).await["csrf_token"]
            .as_str()
            .unwrap()
            .to_string();

        Session { id, xsrf, token }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub xsrf: String,
    pub token: String,
}

impl Session {
    pub fn cookie_header(&self) -> String {
        format!("shield_session={}", self.id)
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

/// Form POST carrying the session cookie and `extra` cookies.
pub fn form_post(uri: &str, session: &Session, extra_cookies: &str, body: String) -> Request<Body> {
    let mut cookie = session.cookie_header();
    if !extra_cookies.is_empty() {
        cookie = format!("{cookie}; {extra_cookies}");
    }
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, cookie)
        .body(Body::from(body))
        .unwrap()
}

pub fn set_cookies<B>(response: &Response<B>) -> Vec<Cookie<'static>> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| Cookie::parse(v.to_string()).ok())
        .collect()
}

pub fn find_cookie<'a>(cookies: &'a [Cookie<'static>], name: &str) -> Option<&'a Cookie<'static>> {
    cookies.iter().find(|c| c.name() == name)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
