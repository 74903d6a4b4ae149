//! Fetch cycles against in-process Molnus and InfluxDB stand-ins
//!
//! Both mocks are axum servers bound to a random local port, so the real
//! reqwest client, auth session and Influx writer are exercised end to end.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use molnus::config::Config;
use molnus::detection::Label;
use molnus::error::{AuthError, FetchError};
use molnus::observability::Metrics;
use molnus::registry::{EntryRegistry, FetchTrigger};

#[derive(Clone, Copy, PartialEq)]
enum ImagesMode {
    Ok,
    RateLimited,
}

/// Molnus stand-in: tokens are `tok-<n>`, and `tok-1` is always rejected
struct MockMolnus {
    logins: Mutex<u32>,
    reject_login: Mutex<bool>,
    mode: Mutex<ImagesMode>,
    images: Mutex<Vec<Value>>,
    image_queries: Mutex<Vec<HashMap<String, String>>>,
}

impl MockMolnus {
    fn new(images: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            logins: Mutex::new(0),
            reject_login: Mutex::new(false),
            mode: Mutex::new(ImagesMode::Ok),
            images: Mutex::new(images),
            image_queries: Mutex::new(Vec::new()),
        })
    }

    fn logins(&self) -> u32 {
        *self.logins.lock().unwrap()
    }
}

async fn login(State(mock): State<Arc<MockMolnus>>, Json(body): Json<Value>) -> Response {
    if *mock.reject_login.lock().unwrap() || body["password"] != "secret" {
        return (StatusCode::UNAUTHORIZED, "invalid credentials").into_response();
    }

    let mut logins = mock.logins.lock().unwrap();
    *logins += 1;
    Json(json!({"token": format!("tok-{}", *logins), "expires_in": 3600})).into_response()
}

async fn images(
    State(mock): State<Arc<MockMolnus>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !auth.starts_with("Bearer tok-") || auth == "Bearer tok-1" {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    mock.image_queries.lock().unwrap().push(query);

    if *mock.mode.lock().unwrap() == ImagesMode::RateLimited {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "30")],
            "slow down",
        )
            .into_response();
    }

    let images = mock.images.lock().unwrap().clone();
    Json(json!({"success": true, "images": images, "hasMore": false})).into_response()
}

/// InfluxDB v2 stand-in recording every write
#[derive(Default)]
struct MockInflux {
    writes: Mutex<Vec<(HashMap<String, String>, String, String)>>,
}

async fn influx_write(
    State(mock): State<Arc<MockInflux>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> StatusCode {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    // a badger write fails to prove isolation
    if body.contains("species=MELES") {
        return StatusCode::BAD_REQUEST;
    }

    mock.writes.lock().unwrap().push((query, auth, body));
    StatusCode::NO_CONTENT
}

async fn serve(app: Router) -> String {
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let bound_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", bound_addr)
}

async fn start_molnus(mock: Arc<MockMolnus>) -> String {
    let app = Router::new()
        .route("/auth/token", post(login))
        .route("/images/get", get(images))
        .with_state(mock);
    serve(app).await
}

async fn start_influx(mock: Arc<MockInflux>) -> String {
    let app = Router::new()
        .route("/api/v2/write", post(influx_write))
        .with_state(mock);
    serve(app).await
}

fn config(molnus_url: &str, influx_url: Option<&str>) -> Config {
    let mut toml = format!(
        r#"
[service]
base_url = "{molnus_url}"
request_timeout = "5s"
cycle_timeout = "10s"

[entries.home]
email = "me@example.com"
password = "secret"
camera_id = "cam-1"
"#
    );

    if let Some(url) = influx_url {
        toml.push_str(&format!(
            r#"
[entries.home.sink]
version = "2"
url = "{url}"
org = "family"
bucket = "wildlife"
token = "influx-tok"
"#
        ));
    }

    let config: Config = toml::from_str(&toml).expect("Failed to parse test config");
    config.validate().expect("test config invalid");
    config
}

fn record(capture_date: &str, label: &str, accuracy: f64, url: &str) -> Value {
    json!({
        "captureDate": capture_date,
        "url": url,
        "ImagePredictions": [{"label": label, "accuracy": accuracy}]
    })
}

#[tokio::test]
async fn test_cycle_refreshes_token_and_writes_sink() {
    let molnus = MockMolnus::new(vec![
        json!({"captureDate": "yesterday-ish", "ImagePredictions": []}),
        record("2025-03-01T06:30:00Z", "CAPREOLUS", 0.75, "https://img/1.jpg"),
        record("2025-03-01T07:00:00Z", "MELES", 0.6, "https://img/2.jpg"),
    ]);
    let influx = Arc::new(MockInflux::default());
    let molnus_url = start_molnus(molnus.clone()).await;
    let influx_url = start_influx(influx.clone()).await;

    let metrics = Arc::new(Metrics::new());
    let registry =
        EntryRegistry::from_config(&config(&molnus_url, Some(&influx_url)), metrics.clone())
            .unwrap();
    let (entry, request) = registry.resolve_trigger(&FetchTrigger::default()).unwrap();

    let result = entry.coordinator().run_cycle(request).await.unwrap();

    // tok-1 was rejected once, tok-2 accepted
    assert_eq!(molnus.logins(), 2);
    assert_eq!(
        result.labels_present.iter().map(Label::as_str).collect::<Vec<_>>(),
        vec!["CAPREOLUS", "MELES"]
    );
    assert_eq!(result.records_fetched, 3);
    assert_eq!(result.records_skipped, 1);
    assert_eq!(result.sink_writes, 1);
    assert_eq!(result.sink_failures, 1);

    let query = molnus.image_queries.lock().unwrap()[0].clone();
    assert_eq!(query["CameraId"], "cam-1");
    assert_eq!(query["offset"], "0");
    assert_eq!(query["limit"], "50");
    assert_eq!(query["wildlifeRequired"], "false");

    let writes = influx.writes.lock().unwrap().clone();
    assert_eq!(writes.len(), 1);
    let (query, auth, body) = &writes[0];
    assert_eq!(query["org"], "family");
    assert_eq!(query["bucket"], "wildlife");
    assert_eq!(query["precision"], "ns");
    assert_eq!(auth, "Token influx-tok");
    assert_eq!(
        body,
        "molnus_image,camera_id=cam-1,species=CAPREOLUS accuracy=0.75 1740810600000000000"
    );

    // second cycle reuses the cached token and adds nothing new
    let (_, request) = registry.resolve_trigger(&FetchTrigger::default()).unwrap();
    let again = entry.coordinator().run_cycle(request).await.unwrap();
    assert_eq!(molnus.logins(), 2);
    assert_eq!(again.new_detections, 0);
    assert_eq!(entry.coordinator().snapshot().total_detections(), 2);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.cycles_completed, 2);
    assert_eq!(snapshot.records_skipped, 2);
}

#[tokio::test]
async fn test_rate_limit_keeps_history() {
    let molnus = MockMolnus::new(vec![record(
        "2025-03-01T06:30:00Z",
        "ALCES",
        0.9,
        "https://img/1.jpg",
    )]);
    let molnus_url = start_molnus(molnus.clone()).await;

    let registry =
        EntryRegistry::from_config(&config(&molnus_url, None), Arc::new(Metrics::new())).unwrap();
    let entry = registry.get("home").unwrap();
    let request = entry.scheduled_request().unwrap();

    entry.coordinator().run_cycle(request.clone()).await.unwrap();
    let before = entry.coordinator().snapshot();

    *molnus.mode.lock().unwrap() = ImagesMode::RateLimited;
    let err = entry.coordinator().run_cycle(request).await.unwrap_err();

    assert!(matches!(
        err,
        FetchError::RateLimited {
            retry_after: Some(after)
        } if after == Duration::from_secs(30)
    ));
    assert_eq!(*entry.coordinator().snapshot(), *before);
    assert!(!entry.coordinator().is_running());
}

#[tokio::test]
async fn test_bad_credentials_stop_before_images() {
    let molnus = MockMolnus::new(vec![]);
    *molnus.reject_login.lock().unwrap() = true;
    let molnus_url = start_molnus(molnus.clone()).await;

    let registry =
        EntryRegistry::from_config(&config(&molnus_url, None), Arc::new(Metrics::new())).unwrap();
    let entry = registry.get("home").unwrap();

    let err = entry
        .coordinator()
        .run_cycle(entry.scheduled_request().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FetchError::Auth(AuthError::InvalidCredentials { status: 401, .. })
    ));
    assert!(molnus.image_queries.lock().unwrap().is_empty());
    assert!(!entry.session().has_cached().await);
}

#[tokio::test]
async fn test_unreachable_service_is_network_error() {
    // nothing listens on the discard port
    let registry = EntryRegistry::from_config(
        &config("http://127.0.0.1:9", None),
        Arc::new(Metrics::new()),
    )
    .unwrap();
    let entry = registry.get("home").unwrap();

    let err = entry
        .coordinator()
        .run_cycle(entry.scheduled_request().unwrap())
        .await
        .unwrap_err();

    // login transport failure surfaces through the auth path
    assert!(matches!(
        err,
        FetchError::Auth(AuthError::Unavailable(_))
    ));
    assert_eq!(entry.coordinator().snapshot().total_detections(), 0);
}
