//! Encrypted cookie transport through the full middleware stack.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use cookie::Cookie;

use request_shield::security::cookie::CookieCodec;
use request_shield::security::crypto::AeadEngine;

mod common;
use common::{body_json, find_cookie, form_post, set_cookies, test_config, TestApp};

#[tokio::test]
async fn test_cookie_roundtrip_through_handler() {
    let app = TestApp::new(test_config());
    let session = app.start_session().await;

    // 1. Handler queues an encrypted cookie
    let response = app
        .send(form_post(
            "/preferences",
            &session,
            "",
            format!("_token={}&theme=dark", session.token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    let theme = find_cookie(&cookies, "theme").expect("theme cookie set").clone();
    assert_ne!(theme.value(), "dark");
    assert!(theme.value().len() >= 102);
    assert_eq!(theme.path(), Some("/"));
    assert_eq!(theme.http_only(), Some(true));

    let body = body_json(response).await;
    assert_eq!(body["stored"], serde_json::json!(["theme"]));

    // 2. Browser sends it back; handler sees plaintext
    let response = app
        .send(
            Request::get("/echo")
                .header(
                    header::COOKIE,
                    format!("{}; theme={}", session.cookie_header(), theme.value()),
                )
                .header("X-CSRF-TOKEN", &session.token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["cookies"]["theme"], "dark");
}

#[tokio::test]
async fn test_tampered_cookie_is_dropped() {
    let app = TestApp::new(test_config());
    let session = app.start_session().await;

    let codec = CookieCodec::new(
        Arc::new(AeadEngine::new(common::APP_KEY)),
        Vec::<String>::new(),
    );
    let encrypted = codec.encrypt(&Cookie::new("theme", "dark")).unwrap();
    let mut forged: Vec<char> = encrypted.value().chars().collect();
    let mid = forged.len() - 10;
    forged[mid] = if forged[mid] == 'A' { 'B' } else { 'A' };
    let forged: String = forged.into_iter().collect();

    let response = app
        .send(
            Request::get("/echo")
                .header(
                    header::COOKIE,
                    format!("{}; theme={forged}; lang=en", session.cookie_header()),
                )
                .header("X-CSRF-TOKEN", &session.token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["cookies"].get("theme").is_none());
    assert_eq!(body["cookies"]["lang"], "en");
}

#[tokio::test]
async fn test_foreign_cookies_pass_through() {
    let app = TestApp::new(test_config());
    let session = app.start_session().await;

    // Long enough and base64-looking, but sealed under another key.
    let foreign_codec = CookieCodec::new(
        Arc::new(AeadEngine::new("another-application-key-0123456789")),
        Vec::<String>::new(),
    );
    let foreign = foreign_codec
        .encrypt(&Cookie::new("analytics", "visitor-7"))
        .unwrap();

    let response = app
        .send(
            Request::get("/echo")
                .header(
                    header::COOKIE,
                    format!(
                        "{}; analytics={}; short=abc",
                        session.cookie_header(),
                        foreign.value()
                    ),
                )
                .header("X-CSRF-TOKEN", &session.token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["cookies"]["analytics"], foreign.value());
    assert_eq!(body["cookies"]["short"], "abc");
}

#[tokio::test]
async fn test_cookie_bound_to_its_name() {
    let app = TestApp::new(test_config());
    let session = app.start_session().await;

    let codec = CookieCodec::new(
        Arc::new(AeadEngine::new(common::APP_KEY)),
        Vec::<String>::new(),
    );
    let sealed = codec.encrypt(&Cookie::new("role", "admin")).unwrap();

    // Replayed under a different name, the prefix no longer matches.
    let response = app
        .send(
            Request::get("/echo")
                .header(
                    header::COOKIE,
                    format!("{}; theme={}", session.cookie_header(), sealed.value()),
                )
                .header("X-CSRF-TOKEN", &session.token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    let body = body_json(response).await;
    assert_ne!(body["cookies"]["theme"], "admin");
}

#[tokio::test]
async fn test_remove_cookie_expires_it() {
    let app = TestApp::new(test_config());
    let session = app.start_session().await;

    let response = app
        .send(
            Request::delete("/preferences/theme")
                .header(header::COOKIE, session.cookie_header())
                .header("X-CSRF-TOKEN", &session.token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    let removal = find_cookie(&cookies, "theme").expect("removal cookie");
    assert_eq!(removal.value(), "");
    assert_eq!(removal.max_age().map(|age| age.whole_seconds()), Some(0));
}

#[tokio::test]
async fn test_oversized_cookie_fails_response() {
    let app = TestApp::new(test_config());
    let session = app.start_session().await;

    let response = app
        .send(form_post(
            "/preferences",
            &session,
            "",
            format!("_token={}&blob={}", session.token, "x".repeat(4000)),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_ignored_names_are_never_encrypted() {
    let app = TestApp::new(test_config());
    let session = app.start_session().await;

    let response = app
        .send(form_post(
            "/preferences",
            &session,
            "",
            format!("_token={}&debugbar=on", session.token),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert_eq!(find_cookie(&cookies, "debugbar").unwrap().value(), "on");
}
