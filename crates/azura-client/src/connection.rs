//! WebSocket connection to the Azuracast now-playing feed.
//!
//! One spawned task owns the socket end to end: it dials, sends the
//! subscription frame, then loops over inbound frames until the socket
//! dies, the liveness deadline passes without a fresh `connect`
//! acknowledgment, or the connection is torn down. A liveness expiry dials
//! again inside the same task; a transport error only marks the connection
//! `Disconnected` — recovery then needs either a later liveness expiry of a
//! still-running session or an explicit `connect()` call from outside.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use azura_proto::frame::parse_frame;
use azura_proto::stations::StationDescriptor;
use azura_proto::status::{ConnectionState, FrameKind, StreamStatus};

/// Heartbeat interval assumed when a `connect` frame doesn't declare one.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(25);

/// Multiplier applied to the server-declared heartbeat interval before the
/// link is declared dead. Inherited policy; override with
/// [`MetadataConnection::with_liveness_factor`].
pub const DEFAULT_LIVENESS_FACTOR: u32 = 2;

const UPDATE_CHANNEL_CAPACITY: usize = 32;

/// Owns the socket lifecycle for one station subscription.
///
/// All operations take `&self`; connect/disconnect are serialized through
/// an internal control lock, and a generation counter keeps a torn-down
/// session from clobbering the state of its successor.
pub struct MetadataConnection {
    shared: Arc<Shared>,
    control: Mutex<Control>,
}

struct Shared {
    state: RwLock<ConnectionState>,
    descriptor: RwLock<Option<StationDescriptor>>,
    last_status: Mutex<StreamStatus>,
    updates: broadcast::Sender<StreamStatus>,
    generation: AtomicU64,
    liveness_factor: u32,
}

#[derive(Default)]
struct Control {
    task: Option<JoinHandle<()>>,
}

/// Why a socket session ended.
enum SocketEnd {
    /// No qualifying frame within the liveness window; dial again.
    LivenessExpired,
    /// Socket-level failure or server close; do not dial again.
    Transport,
    /// The subscription frame could not be sent.
    SubscribeFailed,
}

impl MetadataConnection {
    pub fn new() -> Self {
        Self::with_liveness_factor(DEFAULT_LIVENESS_FACTOR)
    }

    /// `liveness_factor` scales the server-declared heartbeat interval into
    /// the watchdog deadline.
    pub fn with_liveness_factor(liveness_factor: u32) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(ConnectionState::Disconnected),
                descriptor: RwLock::new(None),
                last_status: Mutex::new(StreamStatus::default()),
                updates,
                generation: AtomicU64::new(0),
                liveness_factor: liveness_factor.max(1),
            }),
            control: Mutex::new(Control::default()),
        }
    }

    /// Set the station this connection subscribes to. Does not connect.
    /// Clears the dedup state so the first frame from the new station is
    /// always delivered.
    pub fn configure(&self, descriptor: StationDescriptor) {
        *self
            .shared
            .descriptor
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(descriptor);
        *self
            .shared
            .last_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = StreamStatus::default();
    }

    pub fn state(&self) -> ConnectionState {
        *self
            .shared
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to status updates. Only snapshots with `changed == true`
    /// that differ from the previously delivered one arrive here; drop the
    /// receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamStatus> {
        self.shared.updates.subscribe()
    }

    /// Open the socket and start the receive loop, tearing down any session
    /// already running. Without a configured server and shortcode this only
    /// marks the connection `FailedSubscribe`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut control = self
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = control.task.take() {
            task.abort();
        }

        let descriptor = self
            .shared
            .descriptor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(descriptor) = descriptor else {
            self.shared.set_state(generation, ConnectionState::FailedSubscribe);
            return;
        };
        if descriptor.server_host.is_empty() || descriptor.short_code.is_empty() {
            self.shared.set_state(generation, ConnectionState::FailedSubscribe);
            return;
        }

        let shared = Arc::clone(&self.shared);
        control.task = Some(tokio::spawn(run_session(shared, descriptor, generation)));
    }

    /// Tear down the socket and the pending liveness timer. Safe to call
    /// when already disconnected.
    pub fn disconnect(&self) {
        let mut control = self
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = control.task.take() {
            task.abort();
        }
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.set_state(generation, ConnectionState::Disconnected);
    }
}

impl Default for MetadataConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MetadataConnection {
    fn drop(&mut self) {
        if let Ok(mut control) = self.control.lock() {
            if let Some(task) = control.task.take() {
                task.abort();
            }
        }
    }
}

impl Shared {
    /// State writes from a superseded session are discarded.
    fn set_state(&self, generation: u64, state: ConnectionState) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Session driver: liveness expiries loop back to a fresh socket; anything
/// else ends the session.
async fn run_session(shared: Arc<Shared>, descriptor: StationDescriptor, generation: u64) {
    let url = websocket_url(&descriptor.server_host);
    loop {
        match run_socket(&shared, &descriptor, &url, generation).await {
            SocketEnd::LivenessExpired => {
                info!(station = %descriptor.short_code, "liveness deadline passed, reconnecting");
            }
            SocketEnd::Transport => {
                shared.set_state(generation, ConnectionState::Disconnected);
                return;
            }
            SocketEnd::SubscribeFailed => {
                shared.set_state(generation, ConnectionState::FailedSubscribe);
                return;
            }
        }
    }
}

async fn run_socket(
    shared: &Shared,
    descriptor: &StationDescriptor,
    url: &str,
    generation: u64,
) -> SocketEnd {
    shared.set_state(generation, ConnectionState::Connecting);

    let (mut socket, _response) = match connect_async(url).await {
        Ok(pair) => pair,
        Err(err) => {
            warn!(%url, "websocket connect failed: {err}");
            return SocketEnd::Transport;
        }
    };

    // Connected is optimistic: the socket is open, data arrival is async.
    shared.set_state(generation, ConnectionState::Connected);
    info!(station = %descriptor.short_code, "websocket open");

    let subscription = json!({
        "subs": { (format!("station:{}", descriptor.short_code)): { "recover": true } }
    });
    if let Err(err) = socket.send(Message::Text(subscription.to_string().into())).await {
        warn!("failed to send subscription frame: {err}");
        return SocketEnd::SubscribeFailed;
    }

    // The watchdog is armed only once the server has declared its heartbeat
    // interval in a connect acknowledgment.
    let mut deadline = Box::pin(sleep(Duration::from_secs(0)));
    let mut armed = false;

    loop {
        tokio::select! {
            _ = deadline.as_mut(), if armed => {
                return SocketEnd::LivenessExpired;
            }
            frame = socket.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(interval) =
                            handle_text(shared, descriptor, generation, text.as_bytes())
                        {
                            let slack = interval * shared.liveness_factor;
                            deadline.as_mut().reset(Instant::now() + slack);
                            armed = true;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!(len = data.len(), "ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        info!("websocket closed by server");
                        return SocketEnd::Transport;
                    }
                    Some(Err(err)) => {
                        warn!("websocket receive error: {err}");
                        return SocketEnd::Transport;
                    }
                }
            }
        }
    }
}

/// Parse one text frame, publish it if it is a fresh update, and return the
/// liveness interval to arm when the frame was a connect acknowledgment.
fn handle_text(
    shared: &Shared,
    descriptor: &StationDescriptor,
    generation: u64,
    raw: &[u8],
) -> Option<Duration> {
    let status = match parse_frame(raw, &descriptor.short_code, &descriptor.default_dj) {
        Ok(status) => status,
        Err(err) => {
            // One bad frame never tears the connection down, and it leaves
            // the liveness watchdog untouched.
            warn!("dropping unparsable frame: {err}");
            return None;
        }
    };

    let rearm = (status.kind == FrameKind::Connect)
        .then(|| status.ping_interval.unwrap_or(DEFAULT_PING_INTERVAL));

    if status.connection == ConnectionState::StationNotFound {
        warn!(station = %descriptor.short_code, "station has no publications on this server");
        shared.set_state(generation, ConnectionState::StationNotFound);
    }

    if status.changed && shared.generation.load(Ordering::SeqCst) == generation {
        let mut last = shared
            .last_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *last != status {
            *last = status.clone();
            drop(last);
            // Send only fails when nobody is subscribed, which is fine.
            let _ = shared.updates.send(status);
        }
    }

    rearm
}

/// Bare hostnames get the standard `wss://` endpoint; a value with an
/// explicit scheme is used as the base verbatim (local test servers).
fn websocket_url(server_host: &str) -> String {
    if server_host.contains("://") {
        format!(
            "{}/api/live/nowplaying/websocket",
            server_host.trim_end_matches('/')
        )
    } else {
        format!("wss://{server_host}/api/live/nowplaying/websocket")
    }
}
