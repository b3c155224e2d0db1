//! Test doubles: a mock Immich server and a recording panel driver.

use crate::error::Error;
use crate::panel::{LcdDevice, PanelDriver};
use axum::Router;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use image::{Rgb, RgbImage};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// A small gradient JPEG of the given size.
pub fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
    });
    crate::render::encode_jpeg(&img).unwrap()
}

// ── Mock Immich ──────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct SearchCall {
    pub body: Value,
    pub api_key: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct MockState {
    default_search: Value,
    person_searches: HashMap<String, Value>,
    searches: Vec<SearchCall>,
    thumbnails: HashMap<String, Vec<u8>>,
    thumbnail_requests: Vec<String>,
}

type Shared = Arc<Mutex<MockState>>;

/// Immich stand-in serving `/api/search/metadata` and
/// `/api/assets/{id}/thumbnail` on an ephemeral port.
pub struct MockImmich {
    addr: SocketAddr,
    state: Shared,
}

impl MockImmich {
    /// Start the server; `default_search` answers every search without a
    /// person-specific response.
    pub async fn start(default_search: Value) -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState {
            default_search,
            ..MockState::default()
        }));

        let app = Router::new()
            .route("/api/search/metadata", post(search))
            .route("/api/assets/{id}/thumbnail", get(thumbnail))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn set_person_search(&self, person_id: &str, response: Value) {
        self.state
            .lock()
            .unwrap()
            .person_searches
            .insert(person_id.to_string(), response);
    }

    pub fn add_thumbnail(&self, asset_id: &str, bytes: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .thumbnails
            .insert(asset_id.to_string(), bytes);
    }

    pub fn searches(&self) -> Vec<SearchCall> {
        self.state.lock().unwrap().searches.clone()
    }

    /// `"<id>?<query>"` for every thumbnail request, in order.
    pub fn thumbnail_requests(&self) -> Vec<String> {
        self.state.lock().unwrap().thumbnail_requests.clone()
    }
}

async fn search(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let mut s = state.lock().unwrap();
    s.searches.push(SearchCall {
        body: body.clone(),
        api_key: header("x-api-key"),
        authorization: header("authorization"),
    });

    let person = body
        .get("personIds")
        .and_then(|ids| ids.get(0))
        .and_then(Value::as_str);
    let response = person
        .and_then(|p| s.person_searches.get(p))
        .cloned()
        .unwrap_or_else(|| s.default_search.clone());
    Json(response)
}

async fn thumbnail(
    State(state): State<Shared>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Vec<u8>, StatusCode> {
    let mut s = state.lock().unwrap();
    s.thumbnail_requests
        .push(format!("{}?{}", id, query.unwrap_or_default()));
    s.thumbnails.get(&id).cloned().ok_or(StatusCode::NOT_FOUND)
}

// ── Recording panel driver ──────────────────────────────────────────

#[derive(Default)]
struct DriverLog {
    list_calls: usize,
    events: Vec<String>,
    sent: Vec<(String, Vec<u8>)>,
}

/// Records every call; selected serials can be made to fail.
#[derive(Default)]
pub struct FakeDriver {
    devices: Vec<LcdDevice>,
    failing_send: HashSet<String>,
    failing_brightness: HashSet<String>,
    log: Mutex<DriverLog>,
}

impl FakeDriver {
    pub fn with_devices(devices: Vec<LcdDevice>) -> Self {
        Self {
            devices,
            ..Self::default()
        }
    }

    pub fn fail_send(mut self, serial: &str) -> Self {
        self.failing_send.insert(serial.to_string());
        self
    }

    pub fn fail_brightness(mut self, serial: &str) -> Self {
        self.failing_brightness.insert(serial.to_string());
        self
    }

    pub fn list_calls(&self) -> usize {
        self.log.lock().unwrap().list_calls
    }

    /// `"send <serial>"` / `"brightness <serial> <level>"`, in call order.
    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().events.clone()
    }

    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.log.lock().unwrap().sent.clone()
    }
}

impl PanelDriver for FakeDriver {
    async fn list_devices(&self) -> Result<Vec<LcdDevice>, Error> {
        self.log.lock().unwrap().list_calls += 1;
        Ok(self.devices.clone())
    }

    async fn send_jpeg(&self, serial: &str, jpeg: &[u8]) -> Result<(), Error> {
        let mut log = self.log.lock().unwrap();
        log.events.push(format!("send {serial}"));
        if self.failing_send.contains(serial) {
            return Err(Error::Device {
                serial: serial.to_string(),
                message: "USB interface is busy".to_string(),
            });
        }
        log.sent.push((serial.to_string(), jpeg.to_vec()));
        Ok(())
    }

    async fn set_brightness(&self, serial: &str, level: u8) -> Result<(), Error> {
        self.log
            .lock()
            .unwrap()
            .events
            .push(format!("brightness {serial} {level}"));
        if self.failing_brightness.contains(serial) {
            return Err(Error::Device {
                serial: serial.to_string(),
                message: "brightness command failed".to_string(),
            });
        }
        Ok(())
    }
}
