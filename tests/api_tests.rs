use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use easel::config::Config;
use http_body_util::BodyExt;
use tower::ServiceExt;

const BOUNDARY: &str = "easel-test-boundary";

fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    // In-memory sqlite needs a single connection so every query sees the
    // migrated schema.
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;
    // Nothing listens here, so generation requests fail fast.
    config.webui.url = "http://127.0.0.1:9".to_string();
    // Cheap hashing parameters keep the tests quick.
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config
}

async fn spawn_app() -> Router {
    let state = easel::api::create_app_state_from_config(test_config(), None)
        .await
        .expect("Failed to create app state");
    easel::api::router(state).await
}

fn form_request(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", mime::APPLICATION_WWW_FORM_URLENCODED.as_ref())
        .body(Body::from(body))
        .unwrap()
}

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"test.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn register_and_login(app: &Router, username: &str) -> String {
    let response = app
        .clone()
        .oneshot(form_request(
            "/api/register",
            format!("username={username}&email={username}%40example.com&password=secret123"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(form_request(
            "/api/login",
            format!("username={username}&password=secret123"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    body["data"]["session_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_home_reports_status() {
    let app = spawn_app().await;

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["status"], "running");
    assert_eq!(body["data"]["backend"], "webui");
    assert_eq!(body["data"]["replicate_configured"], false);
}

#[tokio::test]
async fn test_register_login_verify_logout_flow() {
    let app = spawn_app().await;
    let token = register_and_login(&app, "alice").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/verify")
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["username"], "alice");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/logout")
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The token must be dead after logout.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/verify")
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_weak_input() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(form_request(
            "/api/register",
            "username=bob&email=bob%40example.com&password=secret123".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Same email, different username.
    let response = app
        .clone()
        .oneshot(form_request(
            "/api/register",
            "username=bobby&email=bob%40example.com&password=secret123".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Username or email already exists");

    let response = app
        .clone()
        .oneshot(form_request(
            "/api/register",
            "username=carol&email=carol%40example.com&password=short".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(form_request(
            "/api/register",
            "username=dave&email=not-an-email&password=secret123".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_accepts_email_and_rejects_bad_password() {
    let app = spawn_app().await;
    register_and_login(&app, "erin").await;

    let response = app
        .clone()
        .oneshot(form_request(
            "/api/login",
            "username=erin%40example.com&password=secret123".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(form_request(
            "/api/login",
            "username=erin&password=wrong-password".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_my_images_requires_auth() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/my-images")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = register_and_login(&app, "frank").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/my-images")
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_generate_img2img_requires_init_image() {
    let app = spawn_app().await;

    let body = multipart_body(&[("prompt", "a cat"), ("mode", "img2img")], None);
    let response = app
        .oneshot(multipart_request("/api/generate", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .contains("requires an init image")
    );
}

#[tokio::test]
async fn test_generate_rejects_unknown_mode() {
    let app = spawn_app().await;

    let body = multipart_body(&[("prompt", "a cat"), ("mode", "inpaint")], None);
    let response = app
        .oneshot(multipart_request("/api/generate", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generate_rejects_empty_prompt() {
    let app = spawn_app().await;

    let body = multipart_body(&[("mode", "txt2img")], None);
    let response = app
        .oneshot(multipart_request("/api/generate", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generate_reports_unreachable_backend() {
    let app = spawn_app().await;

    let body = multipart_body(&[("prompt", "a cat")], None);
    let response = app
        .oneshot(multipart_request("/api/generate", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_image_to_text_without_replicate_token() {
    let app = spawn_app().await;

    let body = multipart_body(&[], Some(("image", b"not-really-a-png")));
    let response = app
        .oneshot(multipart_request("/api/image-to-text", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_image_to_text_requires_image() {
    let app = spawn_app().await;

    let body = multipart_body(&[("question", "what is this?")], None);
    let response = app
        .oneshot(multipart_request("/api/image-to-text", body))
        .await
        .unwrap();

    // The missing image is rejected before the backend check.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_requires_auth() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
