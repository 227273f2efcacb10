//! End-to-end tests: a raybot over a real WebSocket, REST over HTTP,
//! in-memory stores behind both.

#![allow(clippy::panic)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use raybot_gateway::api;
use raybot_gateway::app_state::AppState;
use raybot_gateway::config::SessionConfig;
use raybot_gateway::domain::{DeviceId, DeviceStatus, EventBus};
use raybot_gateway::persistence::{MemoryCommandStore, MemoryDeviceStore};
use raybot_gateway::service::{CommandService, DeviceService};
use raybot_gateway::ws::{Hub, HubHandle, bridge};

type Raybot = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Gateway {
    addr: SocketAddr,
    http: reqwest::Client,
    devices: DeviceService,
    hub: HubHandle,
}

async fn start(session: SessionConfig) -> Gateway {
    let devices: Arc<dyn raybot_gateway::persistence::DeviceStore> =
        Arc::new(MemoryDeviceStore::new());
    let event_bus = EventBus::new(64);
    let device_service = DeviceService::new(Arc::clone(&devices));
    let command_service = CommandService::new(
        Arc::new(MemoryCommandStore::new()),
        devices,
        Arc::new(event_bus.clone()),
    );
    let (hub, _hub_task) = Hub::spawn(32);
    let _bridge = bridge::spawn(&event_bus, hub.clone());

    let app = api::build_app(AppState {
        command_service,
        device_service: device_service.clone(),
        hub: hub.clone(),
        event_bus,
        session_config: session,
    });

    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Gateway {
        addr,
        http: reqwest::Client::new(),
        devices: device_service,
        hub,
    }
}

impl Gateway {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let Ok(resp) = self.http.post(self.url(path)).json(&body).send().await else {
            panic!("POST {path} failed");
        };
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let Ok(resp) = self.http.get(self.url(path)).send().await else {
            panic!("GET {path} failed");
        };
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn register_raybot(&self, name: &str) -> DeviceId {
        let (status, body) = self.post("/api/v1/raybots", json!({"name": name})).await;
        assert_eq!(status, 201, "{body}");
        let Some(Ok(id)) = body["id"].as_str().map(str::parse::<DeviceId>) else {
            panic!("no id in {body}");
        };
        id
    }

    async fn create_command(&self, id: DeviceId, kind: &str, inputs: Value) -> Value {
        let (status, body) = self
            .post(
                "/api/v1/commands",
                json!({"raybot_id": id.to_string(), "type": kind, "inputs": inputs}),
            )
            .await;
        assert_eq!(status, 201, "{body}");
        body
    }

    async fn connect(&self, id: &str) -> Result<Raybot, u16> {
        let url = format!("ws://{}/ws/raybots?id={id}", self.addr);
        match tokio_tungstenite::connect_async(url).await {
            Ok((ws, _)) => Ok(ws),
            Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => Err(resp.status().as_u16()),
            Err(e) => panic!("unexpected connect error: {e}"),
        }
    }

    async fn connect_live(&self, id: DeviceId) -> Raybot {
        let Ok(ws) = self.connect(&id.to_string()).await else {
            panic!("connect refused");
        };
        wait_until(|| self.is_connected(id)).await;
        wait_until(|| self.has_status(id, DeviceStatus::Idle)).await;
        ws
    }

    async fn is_connected(&self, id: DeviceId) -> bool {
        matches!(self.hub.is_connected(id).await, Ok(true))
    }

    async fn has_status(&self, id: DeviceId, status: DeviceStatus) -> bool {
        matches!(self.devices.get(id).await, Ok(d) if d.status == status)
    }
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..150 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met in time");
}

/// Next data or close frame, skipping keepalive traffic.
async fn next_frame(ws: &mut Raybot) -> Message {
    loop {
        let Ok(next) = tokio::time::timeout(Duration::from_secs(3), ws.next()).await else {
            panic!("timed out waiting for a frame");
        };
        match next {
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(message)) => return message,
            other => panic!("stream ended: {other:?}"),
        }
    }
}

async fn next_json(ws: &mut Raybot) -> Value {
    let Message::Text(text) = next_frame(ws).await else {
        panic!("expected a text frame");
    };
    let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
        panic!("invalid json: {text}");
    };
    value
}

async fn expect_close(ws: &mut Raybot, code: u16) {
    let Message::Close(Some(frame)) = next_frame(ws).await else {
        panic!("expected a close frame");
    };
    assert_eq!(frame.code, CloseCode::from(code), "reason: {}", frame.reason.as_str());
}

async fn send_json(ws: &mut Raybot, value: Value) {
    let Ok(()) = ws.send(Message::text(value.to_string())).await else {
        panic!("send failed");
    };
}

#[tokio::test]
async fn connect_deliver_disconnect_then_offline_command_stays_pending() {
    let gw = start(SessionConfig::default()).await;
    let id = gw.register_raybot("d1").await;
    assert!(gw.has_status(id, DeviceStatus::Offline).await);

    let mut ws = gw.connect_live(id).await;
    assert!(gw.has_status(id, DeviceStatus::Idle).await);

    let c1 = gw
        .create_command(id, "MOVE_FORWARD", json!({"distance": 10}))
        .await;
    let frame = next_json(&mut ws).await;
    assert_eq!(
        frame,
        json!({"id": c1["id"], "type": "MOVE_FORWARD", "data": {"distance": 10}})
    );

    let Ok(()) = ws.close(None).await else {
        panic!("close failed");
    };
    wait_until(|| gw.has_status(id, DeviceStatus::Offline)).await;
    assert!(!gw.is_connected(id).await);

    let c2 = gw.create_command(id, "MOVE_BACKWARD", Value::Null).await;
    assert_eq!(c2["status"], "PENDING");

    let (status, history) = gw.get(&format!("/api/v1/raybots/{id}/commands")).await;
    assert_eq!(status, 200);
    let Some(history) = history.as_array() else {
        panic!("expected an array");
    };
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|c| c["status"] == "PENDING"));
    assert!(history.iter().all(|c| c["completed_at"].is_null()));
}

#[tokio::test]
async fn commands_arrive_in_creation_order() {
    let gw = start(SessionConfig::default()).await;
    let id = gw.register_raybot("ordered").await;
    let mut ws = gw.connect_live(id).await;

    let mut created = Vec::new();
    for kind in ["MOVE_FORWARD", "STOP", "MOVE_BACKWARD"] {
        created.push(gw.create_command(id, kind, json!({})).await["id"].clone());
    }
    for expected in created {
        assert_eq!(next_json(&mut ws).await["id"], expected);
    }
}

#[tokio::test]
async fn duplicate_connect_is_rejected_and_original_survives() {
    let gw = start(SessionConfig::default()).await;
    let id = gw.register_raybot("dup").await;
    let mut first = gw.connect_live(id).await;

    assert_eq!(gw.connect(&id.to_string()).await.err(), Some(409));

    let cmd = gw.create_command(id, "STOP", json!({})).await;
    assert_eq!(next_json(&mut first).await["id"], cmd["id"]);
    assert!(gw.has_status(id, DeviceStatus::Idle).await);
}

#[tokio::test]
async fn connect_rejects_bad_or_unknown_ids_before_upgrade() {
    let gw = start(SessionConfig::default()).await;
    assert_eq!(gw.connect("not-a-uuid").await.err(), Some(400));
    assert_eq!(gw.connect(&DeviceId::new().to_string()).await.err(), Some(404));
}

#[tokio::test]
async fn replies_advance_command_and_device_status() {
    let gw = start(SessionConfig::default()).await;
    let id = gw.register_raybot("worker").await;
    let mut ws = gw.connect_live(id).await;

    let cmd = gw.create_command(id, "MOVE_TO_LOCATION", json!({"location": "A3"})).await;
    let cmd_id = cmd["id"].clone();
    assert_eq!(next_json(&mut ws).await["id"], cmd_id);

    send_json(&mut ws, json!({"op": "response", "id": cmd_id, "data": {"status": "IN_PROGRESS"}})).await;
    wait_until(|| gw.has_status(id, DeviceStatus::Busy)).await;

    send_json(&mut ws, json!({"op": "response", "id": cmd_id, "data": {"status": "SUCCESS"}})).await;
    wait_until(|| gw.has_status(id, DeviceStatus::Idle)).await;

    let Some(cmd_id) = cmd_id.as_str() else {
        panic!("id is not a string");
    };
    let (status, stored) = gw.get(&format!("/api/v1/commands/{cmd_id}")).await;
    assert_eq!(status, 200);
    assert_eq!(stored["status"], "SUCCESS");
    assert!(!stored["completed_at"].is_null());
}

#[tokio::test]
async fn unknown_response_id_closes_with_invalid_payload() {
    let gw = start(SessionConfig::default()).await;
    let id = gw.register_raybot("liar").await;
    let mut ws = gw.connect_live(id).await;

    let pending = gw.create_command(id, "MOVE_FORWARD", json!({})).await;
    assert_eq!(next_json(&mut ws).await["id"], pending["id"]);

    send_json(
        &mut ws,
        json!({"op": "response", "id": DeviceId::new().to_string(), "data": {"status": "SUCCESS"}}),
    )
    .await;
    expect_close(&mut ws, 1007).await;
    wait_until(|| gw.has_status(id, DeviceStatus::Offline)).await;

    let Some(pending_id) = pending["id"].as_str() else {
        panic!("id is not a string");
    };
    let (_, stored) = gw.get(&format!("/api/v1/commands/{pending_id}")).await;
    assert_eq!(stored["status"], "PENDING");
}

#[tokio::test]
async fn unknown_topic_closes_with_unsupported_data() {
    let gw = start(SessionConfig::default()).await;
    let id = gw.register_raybot("chatty").await;
    let mut ws = gw.connect_live(id).await;

    send_json(&mut ws, json!({"op": "publish", "topic": "ram_cpu", "data": {"ram_usage": 40.0, "cpu_usage": 12.5}})).await;
    send_json(&mut ws, json!({"op": "publish", "topic": "camera", "data": {}})).await;
    expect_close(&mut ws, 1003).await;
    wait_until(|| gw.has_status(id, DeviceStatus::Offline)).await;
}

#[tokio::test]
async fn silent_raybot_is_dropped_after_pong_wait() {
    let gw = start(SessionConfig::with_pong_wait(Duration::from_millis(200))).await;
    let id = gw.register_raybot("mute").await;
    // Never polled, so pings are never answered.
    let _ws = gw.connect_live(id).await;

    wait_until(|| gw.has_status(id, DeviceStatus::Offline)).await;
    assert!(!gw.is_connected(id).await);
}

#[tokio::test]
async fn hub_sessions_lists_connected_raybots() {
    let gw = start(SessionConfig::default()).await;
    let id = gw.register_raybot("visible").await;
    let _ws = gw.connect_live(id).await;

    let (status, body) = gw.get("/api/v1/hub/sessions").await;
    assert_eq!(status, 200);
    assert_eq!(body["count"], 1);
    assert_eq!(body["raybot_ids"], json!([id.to_string()]));
}

#[tokio::test]
async fn rest_errors_use_the_error_envelope() {
    let gw = start(SessionConfig::default()).await;

    let (status, body) = gw.get(&format!("/api/v1/raybots/{}", DeviceId::new())).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], 2002);

    let (status, body) = gw
        .post(
            "/api/v1/commands",
            json!({"raybot_id": DeviceId::new().to_string(), "type": "STOP"}),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], 2002);

    let (status, body) = gw.post("/api/v1/raybots", json!({"name": "  "})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], 1001);

    let (status, _) = gw.get("/health").await;
    assert_eq!(status, 200);
}
