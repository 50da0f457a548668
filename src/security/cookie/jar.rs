//! Per-request cookie jar.
//!
//! The cookie middleware fills the jar with the decrypted inbound cookies and
//! inserts it into the request extensions. Handlers read from it and queue
//! outbound cookies; the middleware drains the queue onto the response.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use cookie::Cookie;

/// An outbound cookie and whether it should be encrypted before sending.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedCookie {
    pub cookie: Cookie<'static>,
    pub encrypt: bool,
}

#[derive(Debug, Default)]
struct JarState {
    inbound: BTreeMap<String, String>,
    queued: Vec<QueuedCookie>,
}

/// Shared handle to the request's cookies.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    state: Arc<Mutex<JarState>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a jar from already decoded inbound `(name, value)` pairs.
    pub fn with_inbound<I, N, V>(cookies: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        let inbound = cookies
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        Self {
            state: Arc::new(Mutex::new(JarState {
                inbound,
                queued: Vec::new(),
            })),
        }
    }

    /// Current value of `name`: the latest queued cookie wins over the inbound one.
    pub fn get(&self, name: &str) -> Option<String> {
        let state = self.state.lock().expect("cookie jar mutex poisoned");
        if let Some(queued) = state.queued.iter().rev().find(|q| q.cookie.name() == name) {
            // Removal cookies carry a zero max-age.
            if queued.cookie.max_age().is_some_and(|age| age.is_zero()) {
                return None;
            }
            return Some(queued.cookie.value().to_string());
        }
        state.inbound.get(name).cloned()
    }

    /// All inbound cookies that survived decoding.
    pub fn inbound(&self) -> Vec<(String, String)> {
        let state = self.state.lock().expect("cookie jar mutex poisoned");
        state
            .inbound
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Queue a cookie to be encrypted and sent with the response.
    pub fn add(&self, cookie: Cookie<'static>) {
        self.queue(QueuedCookie {
            cookie,
            encrypt: true,
        });
    }

    /// Queue a cookie to be sent as-is.
    pub fn add_unencrypted(&self, cookie: Cookie<'static>) {
        self.queue(QueuedCookie {
            cookie,
            encrypt: false,
        });
    }

    /// Forget the inbound value and queue a cookie that expires it on the client.
    pub fn remove(&self, name: &str) {
        let mut removal = Cookie::build((name.to_string(), String::new()))
            .path("/")
            .build();
        removal.make_removal();

        let mut state = self.state.lock().expect("cookie jar mutex poisoned");
        state.inbound.remove(name);
        state.queued.retain(|q| q.cookie.name() != name);
        state.queued.push(QueuedCookie {
            cookie: removal,
            encrypt: false,
        });
    }

    /// Treat an inbound cookie as absent without touching the client.
    pub fn discard(&self, name: &str) {
        let mut state = self.state.lock().expect("cookie jar mutex poisoned");
        state.inbound.remove(name);
    }

    /// Take every queued cookie, leaving the queue empty.
    pub fn drain_queued(&self) -> Vec<QueuedCookie> {
        let mut state = self.state.lock().expect("cookie jar mutex poisoned");
        std::mem::take(&mut state.queued)
    }

    fn queue(&self, queued: QueuedCookie) {
        let mut state = self.state.lock().expect("cookie jar mutex poisoned");
        state.queued.retain(|q| q.cookie.name() != queued.cookie.name());
        state.queued.push(queued);
    }
}

impl<S> FromRequestParts<S> for CookieJar
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<CookieJar>().cloned().unwrap_or_default())
    }
}
