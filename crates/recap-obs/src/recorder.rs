//! OBS process supervision and the obs-websocket v5 client.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};
use tracing::{debug, info, warn};

/// Maximum number of connection retries after the initial attempt.
const RETRY_LIMIT: u32 = 6;
/// Delay between connection retries.
const RETRY_DELAY: Duration = Duration::from_secs(2);

const OBS_LAUNCH_ARGS: [&str; 3] = [
    "--disable-shutdown-check",
    "--startrecording",
    "--minimize-to-tray",
];

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum ObsError {
    #[error("could not connect to obs-websocket after {retries} retries")]
    ConnectFailed { retries: u32 },
    #[error("failed to launch OBS process: {0}")]
    ProcessLaunchFailed(#[source] std::io::Error),
    #[error("obs-websocket handshake failed: {0}")]
    Handshake(String),
    #[error("obs-websocket request {request_type} rejected: {comment}")]
    Request {
        request_type: String,
        comment: String,
    },
    #[error("not connected to obs-websocket")]
    NotConnected,
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("malformed obs-websocket message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Connection and launch settings for one OBS instance.
#[derive(Debug, Clone)]
pub struct RecorderProp {
    pub websocket_address: String,
    pub websocket_port: String,
    pub websocket_password: String,
    pub obs_path: String,
}

impl Default for RecorderProp {
    fn default() -> Self {
        Self {
            websocket_address: "ws://localhost".to_string(),
            websocket_port: "4455".to_string(),
            websocket_password: String::new(),
            obs_path: "C:\\Program Files\\obs-studio\\bin\\64bit\\obs64.exe".to_string(),
        }
    }
}

struct RecorderState {
    socket: Option<WsStream>,
    process: Option<Child>,
}

/// One OBS instance: an optional owned child process plus an optional
/// obs-websocket session. Both handles are exclusively owned by this
/// recorder; a `Mutex` serializes overlapping calls.
pub struct ObsRecorder {
    prop: RecorderProp,
    state: Mutex<RecorderState>,
}

impl ObsRecorder {
    pub fn new(prop: RecorderProp) -> Self {
        Self {
            prop,
            state: Mutex::new(RecorderState {
                socket: None,
                process: None,
            }),
        }
    }

    pub fn prop(&self) -> &RecorderProp {
        &self.prop
    }

    /// Establish the obs-websocket session, retrying up to [`RETRY_LIMIT`]
    /// times with a fixed [`RETRY_DELAY`] between attempts. No-op when
    /// already connected.
    pub async fn connect(&self) -> Result<(), ObsError> {
        let mut state = self.state.lock().await;
        self.ensure_connected(&mut state).await
    }

    async fn ensure_connected(&self, state: &mut RecorderState) -> Result<(), ObsError> {
        if state.socket.is_some() {
            debug!("obs-websocket is already connected");
            return Ok(());
        }

        let url = format!("{}:{}", self.prop.websocket_address, self.prop.websocket_port);
        debug!(
            %url,
            password = if self.prop.websocket_password.is_empty() { "none" } else { "******" },
            "Connecting to obs-websocket"
        );

        let mut retries = 0;
        loop {
            match open_session(&url, &self.prop.websocket_password).await {
                Ok(socket) => {
                    info!(%url, "Connected to obs-websocket");
                    state.socket = Some(socket);
                    return Ok(());
                }
                Err(e) => {
                    warn!(%url, "Could not connect to obs-websocket: {e}");
                    if retries >= RETRY_LIMIT {
                        return Err(ObsError::ConnectFailed { retries });
                    }
                    retries += 1;
                    debug!("Retrying connection ({retries}/{RETRY_LIMIT})");
                    sleep(RETRY_DELAY).await;
                }
            }
        }
    }

    /// Close the obs-websocket session if one is open.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        if let Some(mut socket) = state.socket.take() {
            let _ = socket.close(None).await;
        }
    }

    /// Begin recording. Connects first if needed.
    pub async fn start_recording(&self) -> Result<(), ObsError> {
        let mut state = self.state.lock().await;
        self.ensure_connected(&mut state).await?;
        let socket = state.socket.as_mut().ok_or(ObsError::NotConnected)?;

        request(socket, "StartRecord", json!({})).await?;
        info!("Recording started");
        Ok(())
    }

    /// Stop recording if one is active, then drop the session.
    pub async fn stop_recording(&self) -> Result<(), ObsError> {
        let mut state = self.state.lock().await;
        self.ensure_connected(&mut state).await?;
        let socket = state.socket.as_mut().ok_or(ObsError::NotConnected)?;

        let status = request(socket, "GetRecordStatus", json!({})).await?;
        if status["outputActive"].as_bool().unwrap_or(false) {
            request(socket, "StopRecord", json!({})).await?;
            info!("Recording stopped");
        } else {
            debug!("No active recording to stop");
        }

        if let Some(mut socket) = state.socket.take() {
            let _ = socket.close(None).await;
        }
        Ok(())
    }

    /// Launch the OBS process unless the owned child is still alive.
    ///
    /// A spawn failure is fatal for the enclosing call; everything after a
    /// successful spawn is the websocket session's problem.
    pub async fn start_process(&self) -> Result<(), ObsError> {
        let mut state = self.state.lock().await;
        if let Some(child) = state.process.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                debug!("OBS process is already running");
                return Ok(());
            }
            state.process = None;
        }

        let path = Path::new(&self.prop.obs_path);
        let mut command = Command::new(path);
        // OBS expects to be launched from its binary directory.
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                command.current_dir(dir);
            }
        }
        command
            .args(OBS_LAUNCH_ARGS)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = command.spawn().map_err(ObsError::ProcessLaunchFailed)?;
        info!(pid = child.id().unwrap_or_default(), "OBS process started");
        state.process = Some(child);
        Ok(())
    }

    /// Kill the owned OBS process if any. Failures are logged, not fatal.
    pub async fn stop_process(&self) {
        let mut state = self.state.lock().await;
        let Some(mut child) = state.process.take() else {
            debug!("OBS process is not running, or someone else started it");
            return;
        };
        match child.kill().await {
            Ok(()) => info!("OBS process stopped"),
            Err(e) => warn!("Failed to stop OBS process: {e}"),
        }
    }

    /// Connection self-test: launch OBS, connect, give it a moment to
    /// settle, reconnect, then tear the process down again.
    pub async fn check_connection(&self) -> Result<(), ObsError> {
        info!("Starting OBS connection check");
        self.start_process().await?;
        self.connect().await?;
        sleep(Duration::from_secs(1)).await;
        self.connect().await?;
        self.disconnect().await;
        self.stop_process().await;
        info!("OBS connection checked");
        Ok(())
    }
}

/// Open a websocket to OBS and run the v5 identification handshake:
/// read `Hello` (op 0), answer `Identify` (op 1) with the challenge
/// response when authentication is required, await `Identified` (op 2).
async fn open_session(url: &str, password: &str) -> Result<WsStream, ObsError> {
    let (mut socket, _response) = connect_async(url).await?;

    let hello = read_payload(&mut socket).await?;
    if hello["op"] != 0 {
        return Err(ObsError::Handshake(format!(
            "expected Hello, got op {}",
            hello["op"]
        )));
    }

    let mut identify = json!({ "op": 1, "d": { "rpcVersion": 1 } });
    if let Some(auth) = hello["d"]["authentication"].as_object() {
        let salt = auth.get("salt").and_then(|v| v.as_str()).unwrap_or_default();
        let challenge = auth
            .get("challenge")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        identify["d"]["authentication"] = json!(auth_token(password, salt, challenge));
    }
    socket
        .send(Message::Text(identify.to_string().into()))
        .await?;

    let identified = read_payload(&mut socket).await?;
    if identified["op"] != 2 {
        return Err(ObsError::Handshake(format!(
            "expected Identified, got op {}",
            identified["op"]
        )));
    }

    Ok(socket)
}

/// Send one request (op 6) and await its matching response (op 7),
/// skipping events and unrelated traffic in between.
async fn request(
    socket: &mut WsStream,
    request_type: &str,
    request_data: Value,
) -> Result<Value, ObsError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let payload = json!({
        "op": 6,
        "d": {
            "requestType": request_type,
            "requestId": request_id,
            "requestData": request_data,
        }
    });
    socket.send(Message::Text(payload.to_string().into())).await?;

    loop {
        let msg = read_payload(socket).await?;
        if msg["op"] != 7 || msg["d"]["requestId"] != request_id.as_str() {
            continue;
        }
        let status = &msg["d"]["requestStatus"];
        if status["result"].as_bool().unwrap_or(false) {
            return Ok(msg["d"]["responseData"].clone());
        }
        return Err(ObsError::Request {
            request_type: request_type.to_string(),
            comment: status["comment"]
                .as_str()
                .unwrap_or("request rejected")
                .to_string(),
        });
    }
}

/// Read the next text payload, skipping pings and binary frames.
async fn read_payload(socket: &mut WsStream) -> Result<Value, ObsError> {
    loop {
        let msg = match socket.next().await {
            Some(msg) => msg?,
            None => {
                return Err(ObsError::Handshake(
                    "connection closed by obs-websocket".to_string(),
                ));
            }
        };
        match msg {
            Message::Text(text) => return Ok(serde_json::from_str(&text)?),
            Message::Close(_) => {
                return Err(ObsError::Handshake(
                    "connection closed by obs-websocket".to_string(),
                ));
            }
            _ => {}
        }
    }
}

/// The obs-websocket v5 challenge response:
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`.
fn auth_token(password: &str, salt: &str, challenge: &str) -> String {
    let engine = base64::engine::general_purpose::STANDARD;
    let secret = engine.encode(Sha256::digest(format!("{password}{salt}")));
    engine.encode(Sha256::digest(format!("{secret}{challenge}")))
}
