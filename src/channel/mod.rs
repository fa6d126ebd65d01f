//! Live notification channel
//!
//! One WebSocket connection carrying JSON objects both ways, kept alive by a
//! background task that reconnects after every close until [`LiveChannel::close`]
//! is called (or the channel is dropped).
//!
//! ```text
//!   Connecting ──ok──▶ Open ──close/error──▶ Retrying ──delay──▶ Connecting
//!       │                                       ▲
//!       └────────────────fail───────────────────┘
//!   any state ──close()──▶ Closed
//! ```
//!
//! Messages are never buffered: `send` outside `Open` is dropped with a
//! warning. Incoming text frames are parsed as JSON and handed to every
//! listener in registration order; a panicking listener is logged and the
//! next one still runs.

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_MAX_RECONNECT_INTERVAL: Duration = Duration::from_millis(60_000);

/// Callback receiving every parsed message. Identity is the `Arc` allocation.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    /// Closed by the peer or an error; a reconnect is scheduled
    Retrying,
    /// Closed by the owner; terminal
    Closed,
}

/// Delay between a close and the next connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    Fixed(Duration),
    /// Doubles per consecutive failure, reset once a connection opens
    Exponential { initial: Duration, max: Duration },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_RECONNECT_INTERVAL)
    }
}

impl ReconnectPolicy {
    /// Delay before attempt number `failures` (1-based) since the last open
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { initial, max } => {
                let shift = failures.saturating_sub(1).min(16);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    pub policy: ReconnectPolicy,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            policy: ReconnectPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Socket-level failures. Always recovered by reconnecting, only ever logged.
#[derive(Debug)]
pub enum ChannelError {
    Connect(String),
    Socket(String),
    Decode(String),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Connect(msg) => write!(f, "Connect failed: {}", msg),
            ChannelError::Socket(msg) => write!(f, "Socket error: {}", msg),
            ChannelError::Decode(msg) => write!(f, "Dropping malformed message: {}", msg),
        }
    }
}

impl std::error::Error for ChannelError {}

// ─────────────────────────────────────────────────────────────────────────────
// Shared state between the handle and the connection task
// ─────────────────────────────────────────────────────────────────────────────

struct Shared {
    url: String,
    state: RwLock<ChannelState>,
    listeners: RwLock<Vec<Listener>>,
    /// Present only while a connection is open
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    reconnects: AtomicU64,
    shutdown: Notify,
    shutdown_flag: AtomicBool,
}

impl Shared {
    fn state(&self) -> ChannelState {
        *self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: ChannelState) {
        *self.state.write().unwrap_or_else(|p| p.into_inner()) = state;
    }

    fn set_outbound(&self, tx: Option<mpsc::UnboundedSender<Message>>) {
        *self.outbound.lock().unwrap_or_else(|p| p.into_inner()) = tx;
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    fn dispatch(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!(url = %self.url, "{}", ChannelError::Decode(e.to_string()));
                return;
            }
        };

        // Snapshot so a listener may add or remove listeners
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();

        for (index, listener) in listeners.iter().enumerate() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(&value))) {
                error!(index, "Listener panicked: {}", panic_message(panic.as_ref()));
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    // Data pointer only; vtable pointers may differ between codegen units
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to a self-reconnecting channel. Dropping it stops the background task.
pub struct LiveChannel {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LiveChannel {
    /// Start connecting immediately. Must be called inside a tokio runtime.
    pub fn connect(config: ChannelConfig) -> Self {
        let shared = Arc::new(Shared {
            url: config.url.clone(),
            state: RwLock::new(ChannelState::Connecting),
            listeners: RwLock::new(Vec::new()),
            outbound: Mutex::new(None),
            reconnects: AtomicU64::new(0),
            shutdown: Notify::new(),
            shutdown_flag: AtomicBool::new(false),
        });

        let task = tokio::spawn(run(shared.clone(), config));

        Self {
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Number of reconnects scheduled so far (one per close)
    pub fn reconnects_scheduled(&self) -> u64 {
        self.shared.reconnects.load(Ordering::SeqCst)
    }

    /// Fire-and-forget. Returns false (and logs) when the message was dropped.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize outgoing message: {}", e);
                return false;
            }
        };

        let outbound = self.shared.outbound.lock().unwrap_or_else(|p| p.into_inner());
        match outbound.as_ref() {
            Some(tx) if self.shared.state() == ChannelState::Open => {
                if tx.send(Message::Text(json.into())).is_err() {
                    warn!("Channel closed while sending, message dropped");
                    return false;
                }
                true
            }
            _ => {
                warn!(state = ?self.shared.state(), "Channel not open, message dropped");
                false
            }
        }
    }

    /// Register a listener. Adding the same listener twice has no effect.
    pub fn add_listener(&self, listener: Listener) {
        let mut listeners = self
            .shared
            .listeners
            .write()
            .unwrap_or_else(|p| p.into_inner());
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Unregister a listener. Returns whether it was registered.
    pub fn remove_listener(&self, listener: &Listener) -> bool {
        let mut listeners = self
            .shared
            .listeners
            .write()
            .unwrap_or_else(|p| p.into_inner());
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.shared
            .listeners
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    /// Stop reconnecting, close the socket and wait for the task to finish
    pub async fn close(&self) {
        self.shared.request_shutdown();
        let task = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Channel task ended abnormally: {}", e);
            }
        }
        self.shared.set_state(ChannelState::Closed);
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.shared.request_shutdown();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection task
// ─────────────────────────────────────────────────────────────────────────────

enum SessionEnd {
    Shutdown,
    Dropped(Option<ChannelError>),
}

async fn run(shared: Arc<Shared>, config: ChannelConfig) {
    let mut failures: u32 = 0;

    loop {
        if shared.is_shutdown() {
            break;
        }

        shared.set_state(ChannelState::Connecting);
        debug!(url = %config.url, "Connecting");

        let connected = tokio::select! {
            result = tokio_tungstenite::connect_async(config.url.as_str()) => result,
            _ = shared.shutdown.notified() => break,
        };

        match connected {
            Ok((stream, _)) => {
                failures = 0;
                info!(url = %config.url, "Channel open");
                match run_session(&shared, stream).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Dropped(Some(e)) => warn!(url = %config.url, "{}", e),
                    SessionEnd::Dropped(None) => info!(url = %config.url, "Channel closed by peer"),
                }
            }
            Err(e) => {
                warn!(url = %config.url, "{}", ChannelError::Connect(e.to_string()));
            }
        }

        if shared.is_shutdown() {
            break;
        }

        failures = failures.saturating_add(1);
        let delay = config.policy.delay(failures);
        shared.reconnects.fetch_add(1, Ordering::SeqCst);
        shared.set_state(ChannelState::Retrying);
        info!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {},
            _ = shared.shutdown.notified() => break,
        }
    }

    shared.set_outbound(None);
    shared.set_state(ChannelState::Closed);
    debug!(url = %config.url, "Channel task finished");
}

async fn run_session(
    shared: &Shared,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    shared.set_outbound(Some(tx));
    shared.set_state(ChannelState::Open);

    let end = loop {
        tokio::select! {
            _ = shared.shutdown.notified() => {
                let _ = write.send(Message::Close(None)).await;
                break SessionEnd::Shutdown;
            }
            outgoing = rx.recv() => {
                let Some(message) = outgoing else {
                    break SessionEnd::Dropped(None);
                };
                if let Err(e) = write.send(message).await {
                    break SessionEnd::Dropped(Some(ChannelError::Socket(e.to_string())));
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let text: &str = &text;
                    shared.dispatch(text);
                }
                Some(Ok(Message::Binary(_))) => debug!("Ignoring binary frame"),
                Some(Ok(Message::Close(_))) | None => break SessionEnd::Dropped(None),
                Some(Ok(_)) => {}
                Some(Err(e)) => break SessionEnd::Dropped(Some(ChannelError::Socket(e.to_string()))),
            },
        }
    };

    shared.set_outbound(None);
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::UnboundedReceiver;

    const WAIT: Duration = Duration::from_secs(5);

    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (tcp, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(tcp).await.unwrap()
    }

    /// Keep the server side open until the client goes away
    async fn hold(mut ws: WebSocketStream<TcpStream>) {
        while let Some(Ok(_)) = ws.next().await {}
    }

    fn recorder() -> (Listener, UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener: Listener = Arc::new(move |v: &Value| {
            let _ = tx.send(v.clone());
        });
        (listener, rx)
    }

    fn fast(url: &str) -> ChannelConfig {
        ChannelConfig::new(url).with_policy(ReconnectPolicy::Fixed(Duration::from_millis(50)))
    }

    async fn wait_for(channel: &LiveChannel, state: ChannelState) {
        tokio::time::timeout(WAIT, async {
            while channel.state() != state {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("channel never reached {:?}", state));
    }

    #[test]
    fn test_fixed_policy_never_grows() {
        let policy = ReconnectPolicy::Fixed(Duration::from_secs(5));
        assert_eq!(policy.delay(1), Duration::from_secs(5));
        assert_eq!(policy.delay(500), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_policy_doubles_and_caps() {
        let policy = ReconnectPolicy::Exponential {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(3),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
        assert_eq!(policy.delay(3), Duration::from_millis(2000));
        assert_eq!(policy.delay(4), Duration::from_secs(3));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_malformed_message_does_not_stop_delivery() {
        let (server, url) = bind().await;
        tokio::spawn(async move {
            let mut ws = accept(&server).await;
            ws.send(Message::Text("not json {".into())).await.unwrap();
            ws.send(Message::Text(r#"{"event":"called","number":4}"#.into()))
                .await
                .unwrap();
            hold(ws).await;
        });

        let channel = LiveChannel::connect(fast(&url));
        let (listener, mut rx) = recorder();
        channel.add_listener(listener);

        let received = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(received["event"], "called");
        assert_eq!(channel.state(), ChannelState::Open);
        assert_eq!(channel.reconnects_scheduled(), 0);

        channel.close().await;
    }

    #[tokio::test]
    async fn test_one_reconnect_per_close() {
        let (server, url) = bind().await;
        tokio::spawn(async move {
            let mut first = accept(&server).await;
            first.close(None).await.unwrap();
            drop(first);

            let mut second = accept(&server).await;
            second
                .send(Message::Text(r#"{"event":"hello"}"#.into()))
                .await
                .unwrap();
            hold(second).await;
        });

        let channel = LiveChannel::connect(fast(&url));
        let (listener, mut rx) = recorder();
        channel.add_listener(listener);

        let received = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(received["event"], "hello");
        assert_eq!(channel.reconnects_scheduled(), 1);

        channel.close().await;
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_send_before_open_is_dropped() {
        // Nothing listens on this port
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let channel = LiveChannel::connect(
            ChannelConfig::new(format!("ws://{}", addr))
                .with_policy(ReconnectPolicy::Fixed(Duration::from_secs(3600))),
        );

        assert!(!channel.send(&serde_json::json!({"event": "ping"})));

        // Close cancels the pending reconnect delay
        tokio::time::timeout(WAIT, channel.close()).await.unwrap();
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(!channel.send(&serde_json::json!({"event": "ping"})));
    }

    #[tokio::test]
    async fn test_send_when_open_reaches_server() {
        let (server, url) = bind().await;
        let (echo_tx, mut echo_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            let mut ws = accept(&server).await;
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Text(text) = message {
                    let _ = echo_tx.send(text.as_str().to_string());
                }
            }
        });

        let channel = LiveChannel::connect(fast(&url));
        wait_for(&channel, ChannelState::Open).await;

        assert!(channel.send(&serde_json::json!({"event": "join", "desk": 2})));
        let echoed = tokio::time::timeout(WAIT, echo_rx.recv()).await.unwrap().unwrap();
        let value: Value = serde_json::from_str(&echoed).unwrap();
        assert_eq!(value["desk"], 2);

        channel.close().await;
    }

    #[tokio::test]
    async fn test_panicking_listener_is_isolated() {
        let (server, url) = bind().await;
        tokio::spawn(async move {
            let mut ws = accept(&server).await;
            ws.send(Message::Text(r#"{"n":1}"#.into())).await.unwrap();
            ws.send(Message::Text(r#"{"n":2}"#.into())).await.unwrap();
            hold(ws).await;
        });

        let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        let first_order = order.clone();
        let first: Listener = Arc::new(move |_: &Value| first_order.lock().unwrap().push("first"));
        let faulty: Listener = Arc::new(|_: &Value| panic!("listener bug"));
        let (last, mut rx) = recorder();

        let channel = LiveChannel::connect(fast(&url));
        channel.add_listener(first);
        channel.add_listener(faulty);
        channel.add_listener(last);

        let one = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        let two = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!((one["n"].as_i64(), two["n"].as_i64()), (Some(1), Some(2)));
        assert_eq!(*order.lock().unwrap(), vec!["first", "first"]);
        assert_eq!(channel.state(), ChannelState::Open);

        channel.close().await;
    }

    #[tokio::test]
    async fn test_listener_registration_is_idempotent() {
        let (server, url) = bind().await;
        tokio::spawn(async move {
            let ws = accept(&server).await;
            hold(ws).await;
        });
        let channel = LiveChannel::connect(fast(&url));
        let (listener, _rx) = recorder();

        channel.add_listener(listener.clone());
        channel.add_listener(listener.clone());
        assert_eq!(channel.listener_count(), 1);

        assert!(channel.remove_listener(&listener));
        assert!(!channel.remove_listener(&listener));
        assert_eq!(channel.listener_count(), 0);

        channel.close().await;
    }
}
