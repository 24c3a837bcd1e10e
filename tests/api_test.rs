mod common;

use std::{
    collections::HashMap,
    sync::{Arc, atomic::AtomicUsize},
    time::Duration,
};

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use common::{CountingCatalog, FakeMusic, FakePlanProvider, FakeTokenEndpoint, round_robin};
use http_body_util::BodyExt;
use moodmix::{
    api::AppState,
    config::PlanFallback,
    management::FixedWindowLimiter,
    planner::{PlanProvider, Planner},
    preview::{MemoryPreviewCache, PreviewCatalog, PreviewResolver},
    server::create_router,
};
use serde_json::Value;
use tower::ServiceExt;

fn app_with(music: Arc<FakeMusic>, limit: u32) -> Router {
    let settings = common::settings();
    let provider = FakePlanProvider::from_json(r#"{"includeGenres":["funk"],"targetCount":6}"#);
    let planner = Planner::new(
        vec![Box::new(provider) as Box<dyn PlanProvider>],
        PlanFallback::Heuristic,
    );
    let previews = PreviewResolver::new(
        Arc::new(MemoryPreviewCache::new()),
        vec![Box::new(CountingCatalog {
            calls: Arc::new(AtomicUsize::new(0)),
        }) as Box<dyn PreviewCatalog>],
        Duration::from_secs(60),
        2,
    );
    let state = AppState::new(
        &settings,
        Arc::new(FakeTokenEndpoint::default()),
        music,
        Arc::new(planner),
        Arc::new(previews),
        Arc::new(FixedWindowLimiter::per_minute(limit)),
    );
    create_router(state)
}

fn app() -> Router {
    app_with(Arc::new(FakeMusic::default()), 60)
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response<Body>) -> String {
    response.headers()[header::LOCATION].to_str().unwrap().to_string()
}

/// `name=value` pairs from every `Set-Cookie`, removals included.
fn set_cookies(response: &Response<Body>) -> HashMap<String, String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn cookie_header(cookies: &HashMap<String, String>) -> String {
    cookies
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

fn generate_request(cookies: Option<&str>, ip: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/playlist/generate")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", ip);
    if let Some(cookies) = cookies {
        builder = builder.header(header::COOKIE, cookies);
    }
    builder
        .body(Body::from(r#"{"prompt":"funk please","approxCount":6}"#))
        .unwrap()
}

/// Runs login and callback, returning the session cookies.
async fn log_in(app: &Router) -> HashMap<String, String> {
    let response = app
        .clone()
        .oneshot(Request::get("/api/auth/login").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let authorize = url::Url::parse(&location(&response)).unwrap();
    let state = authorize
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    let pending = cookie_header(&set_cookies(&response));

    let response = app
        .clone()
        .oneshot(
            Request::get(format!(
                "/api/auth/callback?code=good-code&state={}",
                urlencoding::encode(&state)
            ))
                .header(header::COOKIE, pending)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/app");
    set_cookies(&response)
}

#[tokio::test]
async fn test_health() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["planners"][0], "fake");
}

#[tokio::test]
async fn test_login_redirects_and_sets_pending_cookies() {
    let response = app()
        .oneshot(Request::get("/api/auth/login").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("https://accounts.example.com/authorize?"));

    let cookies = set_cookies(&response);
    assert!(cookies.contains_key("mm_state"));
    assert!(cookies.contains_key("mm_pkce"));
    let raw: Vec<&str> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    assert!(raw.iter().all(|c| c.contains("HttpOnly") && c.contains("Max-Age=600")));

    // the cookie is encrypted, so the state cannot be read back from it
    let authorize = url::Url::parse(&location(&response)).unwrap();
    let state = authorize
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    assert!(!raw.iter().any(|c| c.contains(&state)));
}

#[tokio::test]
async fn test_callback_without_pending_login_redirects_with_error() {
    let response = app()
        .oneshot(
            Request::get("/api/auth/callback?code=good-code&state=forged")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/?error=StateMismatch");
}

#[tokio::test]
async fn test_callback_with_wrong_state_redirects_with_error() {
    let app = app();
    let response = app
        .clone()
        .oneshot(Request::get("/api/auth/login").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let pending = cookie_header(&set_cookies(&response));

    let response = app
        .oneshot(
            Request::get("/api/auth/callback?code=good-code&state=forged")
                .header(header::COOKIE, pending)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(location(&response), "/?error=StateMismatch");
    let cookies = set_cookies(&response);
    assert_eq!(cookies.get("mm_state").map(String::as_str), Some(""));
    assert!(!cookies.contains_key("mm_at"));
}

#[tokio::test]
async fn test_generate_without_session_is_unauthenticated() {
    let response = app()
        .oneshot(generate_request(None, "198.51.100.1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["errorKind"], "Unauthenticated");
    assert_eq!(body["hint"], "login_again");
}

#[tokio::test]
async fn test_generate_is_rate_limited_per_ip() {
    let app = app_with(Arc::new(FakeMusic::default()), 1);

    let first = app
        .clone()
        .oneshot(generate_request(None, "198.51.100.2"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

    let second = app
        .clone()
        .oneshot(generate_request(None, "198.51.100.2"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(json_body(second).await["hint"], "retry_after_backoff");

    let other = app
        .oneshot(generate_request(None, "198.51.100.3"))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::UNAUTHORIZED);
}

fn publish_request(ip: &str) -> Request<Body> {
    Request::post("/api/playlist/publish")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(r#"{"name":"Mix","trackUris":["spotify:track:a"]}"#))
        .unwrap()
}

#[tokio::test]
async fn test_publish_and_me_are_rate_limited_per_endpoint() {
    let app = app_with(Arc::new(FakeMusic::default()), 1);

    let first = app.clone().oneshot(publish_request("198.51.100.5")).await.unwrap();
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

    let second = app.clone().oneshot(publish_request("198.51.100.5")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(json_body(second).await["errorKind"], "RateLimited");

    // the generate bucket of the same client is untouched
    let generate = app
        .clone()
        .oneshot(generate_request(None, "198.51.100.5"))
        .await
        .unwrap();
    assert_eq!(generate.status(), StatusCode::UNAUTHORIZED);

    let me = |ip: &str| {
        Request::get("/api/me")
            .header("x-real-ip", ip)
            .body(Body::empty())
            .unwrap()
    };
    let first = app.clone().oneshot(me("198.51.100.6")).await.unwrap();
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);
    let second = app.oneshot(me("198.51.100.6")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn test_login_then_generate_and_me() {
    let music = Arc::new(FakeMusic {
        recommendations: round_robin("t", &["Chromeo", "Parcels", "Chic", "Prince"], 12),
        ..Default::default()
    });
    let app = app_with(music, 60);
    let session = log_in(&app).await;
    assert!(session.contains_key("mm_at"));
    assert!(session.contains_key("mm_rt"));
    let cookies = cookie_header(&session);

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/me")
                .header(header::COOKIE, cookies.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me = json_body(response).await;
    assert_eq!(me["id"], "user-1");
    assert_eq!(me["displayName"], "Test User");

    let response = app
        .oneshot(generate_request(Some(&cookies), "198.51.100.4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["planSource"], "fake");
    assert_eq!(body["plan"]["targetCount"], 6);
    let tracks = body["tracks"].as_array().unwrap();
    assert_eq!(tracks.len(), 6);
    assert!(tracks.iter().all(|t| t["previewUrl"].is_string()));
    assert!(tracks[0].get("artistIds").is_none());
}

#[tokio::test]
async fn test_publish_empty_list_is_bad_request() {
    let music = Arc::new(FakeMusic::default());
    let app = app_with(music.clone(), 60);
    let cookies = cookie_header(&log_in(&app).await);

    let response = app
        .oneshot(
            Request::post("/api/playlist/publish")
                .header(header::COOKIE, cookies)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"name":"Nothing","trackUris":[]}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["errorKind"], "NoTracks");
    assert_eq!(music.total_calls(), 0);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = app();
    let cookies = cookie_header(&log_in(&app).await);

    let response = app
        .oneshot(
            Request::post("/api/playlist/publish")
                .header(header::COOKIE, cookies)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["errorKind"], "BadRequest");
}

#[tokio::test]
async fn test_logout_clears_every_cookie() {
    for method in ["GET", "POST"] {
        let app = app();
        let pending = app
            .clone()
            .oneshot(Request::get("/api/auth/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let mut cookies = set_cookies(&pending);
        cookies.extend(log_in(&app).await.into_iter().filter(|(_, v)| !v.is_empty()));
        assert_eq!(cookies.len(), 4);

        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri("/api/auth/logout")
                    .header(header::COOKIE, cookie_header(&cookies))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        let cleared = set_cookies(&response);
        for name in ["mm_state", "mm_pkce", "mm_at", "mm_rt"] {
            assert_eq!(cleared.get(name).map(String::as_str), Some(""), "{name}");
        }
    }
}

#[tokio::test]
async fn test_logout_without_session_is_harmless() {
    let response = app()
        .oneshot(Request::post("/api/auth/logout").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}
