use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use imgen::{
    AspectRatio, ClientConfig, ErrorKind, FetchFailure, GenerationEndpoint, GenerationError,
    HttpEndpoint, ImageGenClient, ImageGenerationRequest, ImageLocation, ModelId, NetworkFailure,
    RequestState,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

const STALL: Duration = Duration::from_secs(3);

#[derive(Clone, Default)]
struct StubState {
    base_url: Arc<Mutex<String>>,
    bodies: Arc<Mutex<Vec<Value>>>,
    auth_headers: Arc<Mutex<Vec<Option<String>>>>,
}

impl StubState {
    fn record(&self, headers: &HeaderMap, body: Value) {
        self.auth_headers.lock().expect("auth lock").push(
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
        self.bodies.lock().expect("bodies lock").push(body);
    }

    fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().expect("bodies lock").clone()
    }

    fn image_url(&self, name: &str) -> String {
        format!("{}/files/{}", self.base_url.lock().expect("base lock"), name)
    }
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image::DynamicImage::new_rgb8(4, 3)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}

async fn fox_png() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], png_bytes())
}

async fn stalled_png() -> impl IntoResponse {
    tokio::time::sleep(STALL).await;
    ([(header::CONTENT_TYPE, "image/png")], png_bytes())
}

async fn not_an_image() -> &'static str {
    "definitely not a png"
}

/// Succeeds with one image pointing back at this server.
async fn generate_ok(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record(&headers, body);
    Json(json!({ "data": [{ "url": state.image_url("fox.png") }] }))
}

/// Rejects any request carrying a size.
async fn generate_rejects_size(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let has_size = body.get("size").is_some();
    state.record(&headers, body);
    if has_size {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": "size is not supported" } })),
        )
    } else {
        (
            StatusCode::OK,
            Json(json!({ "data": [{ "url": state.image_url("fox.png") }] })),
        )
    }
}

async fn generate_server_error(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.record(&headers, body);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": { "message": "provider exploded" } })),
    )
}

async fn generate_reported_error(Json(_body): Json<Value>) -> Json<Value> {
    Json(json!({ "error": { "message": "quota exceeded" } }))
}

async fn generate_garbage(Json(_body): Json<Value>) -> &'static str {
    "<html>gateway</html>"
}

async fn generate_stalled(Json(_body): Json<Value>) -> Json<Value> {
    tokio::time::sleep(STALL).await;
    Json(json!({ "data": [] }))
}

async fn spawn_stub(generate: axum::routing::MethodRouter<StubState>) -> (String, StubState) {
    let state = StubState::default();
    let app = Router::new()
        .route("/v1/images/generations", generate)
        .route("/files/fox.png", get(fox_png))
        .route("/files/slow.png", get(stalled_png))
        .route("/files/text.png", get(not_an_image))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let address: SocketAddr = listener.local_addr().expect("stub local addr");
    let base_url = format!("http://{address}");
    *state.base_url.lock().expect("base lock") = base_url.clone();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("run stub server");
    });
    (base_url, state)
}

fn config_for(base_url: &str) -> ClientConfig {
    ClientConfig::new()
        .with_base_url(base_url)
        .with_request_timeout(Duration::from_secs(2))
        .with_fetch_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn end_to_end_generation_fetch_and_save() {
    let (base_url, state) = spawn_stub(post(generate_ok)).await;
    let client = ImageGenClient::new(config_for(&base_url)).expect("client");

    let request = ImageGenerationRequest::new("woman in dress")
        .with_model(ModelId::Flux)
        .with_style("photorealistic");
    let fetched = client.generate_image(request).await.expect("image");
    assert_eq!(fetched.dimensions(), (4, 3));
    assert_eq!(fetched.location.as_str(), state.image_url("fox.png"));

    let bodies = state.bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(
        bodies[0],
        json!({
            "prompt": "woman in dress",
            "model": "flux",
            "response_format": "url",
            "size": "1024x1024",
            "style": "photorealistic"
        })
    );

    let dir = tempfile::tempdir().expect("tempdir");
    let saved = imgen::save_image(&fetched.image, dir.path().join("dress.jpeg")).expect("save");
    assert!(saved.exists());
}

#[tokio::test]
async fn api_key_is_sent_as_bearer_token() {
    let (base_url, state) = spawn_stub(post(generate_ok)).await;
    let endpoint = HttpEndpoint::new(&config_for(&base_url).with_api_key("sk-test")).expect("endpoint");
    let prepared = ImageGenClient::new(config_for(&base_url).with_api_key("sk-test"))
        .expect("client")
        .orchestrator()
        .prepare(ImageGenerationRequest::new("a red fox").with_model(ModelId::DallE3))
        .expect("prepare");

    endpoint.generate(prepared.params()).await.expect("generate");

    let auth = state.auth_headers.lock().expect("auth lock").clone();
    assert_eq!(auth, vec![Some("Bearer sk-test".to_string())]);
}

#[tokio::test]
async fn size_rejection_falls_back_over_http() {
    let (base_url, state) = spawn_stub(post(generate_rejects_size)).await;
    let client = ImageGenClient::new(config_for(&base_url)).expect("client");

    let request = ImageGenerationRequest::new("a red fox").with_ratio(AspectRatio::Landscape16x9);
    let location = client
        .orchestrator()
        .submit(request)
        .expect("submit")
        .wait()
        .await
        .expect("fallback succeeds");

    assert_eq!(location.as_str(), state.image_url("fox.png"));
    let bodies = state.bodies();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["size"], json!("1024x576"));
    assert!(bodies[1].get("size").is_none());
}

#[tokio::test]
async fn http_error_status_is_remote_error_with_message() {
    let (base_url, _state) = spawn_stub(post(generate_server_error)).await;
    let endpoint = HttpEndpoint::new(&config_for(&base_url)).expect("endpoint");
    let params = imgen::build_params(&ImageGenerationRequest::new("a red fox"));

    let err = endpoint.generate(&params).await.expect_err("500 fails");
    match err {
        GenerationError::Remote { status, message } => {
            assert_eq!(status, Some(500));
            assert_eq!(message, "provider exploded");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn reported_error_in_ok_body_is_remote_error() {
    let (base_url, _state) = spawn_stub(post(generate_reported_error)).await;
    let endpoint = HttpEndpoint::new(&config_for(&base_url)).expect("endpoint");
    let params = imgen::build_params(&ImageGenerationRequest::new("a red fox"));

    let err = endpoint.generate(&params).await.expect_err("reported error");
    assert!(matches!(err, GenerationError::Remote { status: None, ref message } if message == "quota exceeded"));
}

#[tokio::test]
async fn non_json_body_is_malformed_response() {
    let (base_url, _state) = spawn_stub(post(generate_garbage)).await;
    let endpoint = HttpEndpoint::new(&config_for(&base_url)).expect("endpoint");
    let params = imgen::build_params(&ImageGenerationRequest::new("a red fox"));

    let err = endpoint.generate(&params).await.expect_err("garbage body");
    assert_eq!(err.kind(), ErrorKind::MalformedResponse);
}

#[tokio::test]
async fn stalled_endpoint_is_network_timeout() {
    let (base_url, _state) = spawn_stub(post(generate_stalled)).await;
    let config = config_for(&base_url).with_request_timeout(Duration::from_millis(200));
    let endpoint = HttpEndpoint::new(&config).expect("endpoint");
    let params = imgen::build_params(&ImageGenerationRequest::new("a red fox"));

    let err = endpoint.generate(&params).await.expect_err("timeout");
    assert_eq!(err.kind(), ErrorKind::Network(NetworkFailure::Timeout));
    assert!(err.is_timeout());
}

#[tokio::test]
async fn refused_connection_is_network_connect_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("addr");
    drop(listener);

    let endpoint = HttpEndpoint::new(&config_for(&format!("http://{address}"))).expect("endpoint");
    let params = imgen::build_params(&ImageGenerationRequest::new("a red fox"));

    let err = endpoint.generate(&params).await.expect_err("refused");
    assert_eq!(err.kind(), ErrorKind::Network(NetworkFailure::Connect));
}

#[tokio::test]
async fn stalled_fetch_times_out_without_touching_generation_result() {
    let (base_url, state) = spawn_stub(post(generate_ok)).await;
    let config = config_for(&base_url).with_fetch_timeout(Duration::from_millis(200));
    let client = ImageGenClient::new(config).expect("client");

    let mut session = client.session();
    session.trigger(ImageGenerationRequest::new("a red fox"), |_| true);
    let location = session
        .wait()
        .await
        .expect("result delivered")
        .clone()
        .expect("generation succeeded");
    assert_eq!(session.state(), RequestState::Succeeded);

    let slow = ImageLocation::parse(&state.image_url("slow.png")).expect("location");
    let err = client.fetcher().fetch(&slow).await.expect_err("stalled fetch");
    assert_eq!(err.kind(), ErrorKind::Fetch(FetchFailure::Timeout));

    assert_eq!(session.state(), RequestState::Succeeded);
    assert_eq!(
        session.last_result().and_then(|r| r.as_ref().ok()),
        Some(&location)
    );

    // same location, fetched again, still works
    let fetched = client.fetcher().fetch(&location).await.expect("fetch");
    assert_eq!(fetched.dimensions(), (4, 3));
}

#[tokio::test]
async fn missing_image_is_fetch_http_status() {
    let (base_url, _state) = spawn_stub(post(generate_ok)).await;
    let client = ImageGenClient::new(config_for(&base_url)).expect("client");

    let missing = ImageLocation::parse(&format!("{base_url}/files/missing.png")).expect("location");
    let err = client.fetcher().fetch(&missing).await.expect_err("404");
    assert_eq!(err.kind(), ErrorKind::Fetch(FetchFailure::HttpStatus(404)));
}

#[tokio::test]
async fn non_image_bytes_are_decode_error() {
    let (base_url, state) = spawn_stub(post(generate_ok)).await;
    let client = ImageGenClient::new(config_for(&base_url)).expect("client");

    let text = ImageLocation::parse(&state.image_url("text.png")).expect("location");
    let err = client.fetcher().fetch(&text).await.expect_err("not an image");
    assert_eq!(err.kind(), ErrorKind::Decode);
}

#[tokio::test]
async fn base_url_without_scheme_is_config_error() {
    let config = ClientConfig::new().with_base_url("localhost:1337");

    let err = HttpEndpoint::new(&config).err().expect("endpoint rejected");
    assert_eq!(err.kind(), ErrorKind::Config);

    let err = ImageGenClient::new(config).err().expect("client rejected");
    assert_eq!(err.kind(), ErrorKind::Config);
}
