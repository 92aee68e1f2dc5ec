//! JSONP transport.
//!
//! The feed API has no CORS support and only answers with a script that
//! calls a global function: `res({...});`. Here a `ScriptLoader` fetches that
//! script and "running" it means parsing the call and handing its argument to
//! whichever callback is registered under that name in the
//! `CallbackRegistry`.
//!
//! When the API ignores the callback parameter and always calls the same
//! name, concurrent requests cannot be told apart, so `CallbackMode::Fixed`
//! pushes every request through a single FIFO worker: the next script is not
//! loaded until the current request has resolved, failed or timed out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::ApiError;

/// Query parameter carrying the callback name.
pub const DEFAULT_CALLBACK_PARAM: &str = "callback";

/// Callback name the production feed always invokes.
pub const DEFAULT_FIXED_CALLBACK: &str = "res";

/// How callback names are chosen for outgoing requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackMode {
    /// The API always calls `name`; requests are serialized.
    Fixed { name: String },
    /// The API honours the callback parameter; every request gets
    /// `<prefix><n>` and requests run concurrently.
    PerRequest { prefix: String },
}

impl Default for CallbackMode {
    fn default() -> Self {
        CallbackMode::Fixed {
            name: DEFAULT_FIXED_CALLBACK.to_string(),
        }
    }
}

impl CallbackMode {
    fn is_serialized(&self) -> bool {
        matches!(self, CallbackMode::Fixed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonpOptions {
    pub callback_param: String,
    pub mode: CallbackMode,
}

impl Default for JsonpOptions {
    fn default() -> Self {
        Self {
            callback_param: DEFAULT_CALLBACK_PARAM.to_string(),
            mode: CallbackMode::default(),
        }
    }
}

// ============================================================================
// Script loading
// ============================================================================

/// Loads the script body behind a JSONP URL.
#[async_trait]
pub trait ScriptLoader: Send + Sync {
    async fn load(&self, url: &Url) -> Result<String, ApiError>;
}

/// Loads scripts over HTTP.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpScriptLoader {
    client: reqwest::Client,
}

impl HttpScriptLoader {
    pub fn new() -> Result<Self, ApiError> {
        // No client-level timeout: the transport's own timer owns the deadline
        let client = reqwest::Client::builder()
            .user_agent(concat!("nogisched/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ScriptLoader for HttpScriptLoader {
    async fn load(&self, url: &Url) -> Result<String, ApiError> {
        // Any failure to fetch the script is the script's `error` event
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }

        response.text().await.map_err(|e| ApiError::Network(e.to_string()))
    }
}

// ============================================================================
// Callback registry
// ============================================================================

struct Slot {
    id: u64,
    sender: oneshot::Sender<Value>,
}

/// The table of "global functions" scripts may call.
///
/// Each registration resolves at most once: the first invocation takes the
/// sender out of the table, so any later call with the same name is a no-op.
#[derive(Default)]
pub struct CallbackRegistry {
    slots: Mutex<HashMap<String, Slot>>,
    next_id: AtomicU64,
}

impl CallbackRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a callback for one request. The registration is removed when
    /// the returned handle is dropped.
    pub fn open(self: &Arc<Self>, mode: &CallbackMode) -> Result<CallbackHandle, ApiError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = match mode {
            CallbackMode::Fixed { name } => name.clone(),
            CallbackMode::PerRequest { prefix } => format!("{}{}", prefix, id),
        };

        let (sender, receiver) = oneshot::channel();
        let mut slots = self.lock();
        if slots.contains_key(&name) {
            return Err(ApiError::CallbackBusy(name));
        }
        slots.insert(name.clone(), Slot { id, sender });

        Ok(CallbackHandle {
            registry: Arc::clone(self),
            name,
            id,
            receiver,
        })
    }

    /// Deliver `payload` to the callback registered as `name`.
    /// Returns false when nobody is waiting under that name.
    pub fn invoke(&self, name: &str, payload: Value) -> bool {
        let slot = self.lock().remove(name);
        match slot {
            Some(slot) => slot.sender.send(payload).is_ok(),
            None => false,
        }
    }

    fn close(&self, name: &str, id: u64) {
        let mut slots = self.lock();
        // Only remove our own registration, never a newer one under the same name
        if slots.get(name).map(|slot| slot.id == id).unwrap_or(false) {
            slots.remove(name);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One open callback registration.
pub struct CallbackHandle {
    registry: Arc<CallbackRegistry>,
    name: String,
    id: u64,
    receiver: oneshot::Receiver<Value>,
}

impl CallbackHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the callback to be invoked.
    pub async fn await_result(&mut self) -> Option<Value> {
        (&mut self.receiver).await.ok()
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        self.registry.close(&self.name, self.id);
    }
}

// ============================================================================
// Script parsing
// ============================================================================

/// Split a JSONP script of the form `name(<json>);` into the callee and its
/// argument. Leading `/**/` guard comments are skipped.
pub fn parse_jsonp(script: &str) -> Result<(String, Value), ApiError> {
    let not_a_call = || ApiError::Parse("script is not a callback invocation".to_string());

    let mut rest = script.trim_start();
    while let Some(stripped) = rest.strip_prefix("/**/") {
        rest = stripped.trim_start();
    }

    let name_len = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$' || c == '.'))
        .unwrap_or(rest.len());
    let name = &rest[..name_len];
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(not_a_call());
    }

    let args = rest[name_len..].trim_start().strip_prefix('(').ok_or_else(not_a_call)?;
    let mut args = args.trim_end();
    while let Some(stripped) = args.strip_suffix(';') {
        args = stripped.trim_end();
    }
    let args = args.strip_suffix(')').ok_or_else(not_a_call)?;

    let payload = serde_json::from_str(args)
        .map_err(|e| ApiError::Parse(format!("callback argument is not JSON: {}", e)))?;
    Ok((name.to_string(), payload))
}

/// Append `<param>=<callback>` to `url`, keeping existing query pairs.
pub fn with_callback_param(url: &str, param: &str, callback: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(url).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", url, e)))?;
    url.query_pairs_mut().append_pair(param, callback);
    Ok(url)
}

// ============================================================================
// Client
// ============================================================================

struct Transport {
    loader: Arc<dyn ScriptLoader>,
    registry: Arc<CallbackRegistry>,
    options: JsonpOptions,
}

impl Transport {
    /// Run one request to completion: resolved, failed or timed out.
    async fn execute(&self, url: &str, timeout: Duration) -> Result<Value, ApiError> {
        let mut handle = self.registry.open(&self.options.mode)?;
        let script_url = with_callback_param(url, &self.options.callback_param, handle.name())?;
        debug!(url = %script_url, callback = handle.name(), "Loading JSONP script");

        let exchange = async {
            let script = self.loader.load(&script_url).await?;
            let (callee, payload) = parse_jsonp(&script)?;
            if !self.registry.invoke(&callee, payload) {
                warn!(
                    callee = %callee,
                    expected = handle.name(),
                    "Script invoked a callback nobody is waiting for"
                );
            }
            handle
                .await_result()
                .await
                .ok_or_else(|| ApiError::Network("callback channel closed".to_string()))
        };

        let result = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout {
                after_ms: timeout.as_millis() as u64,
            }),
        };

        match &result {
            Ok(_) => debug!(url = %script_url, "JSONP request resolved"),
            Err(e) if e.is_timeout() => warn!(url = %script_url, "JSONP request timed out"),
            Err(e) => warn!(url = %script_url, error = %e, "JSONP request failed"),
        }
        // `handle` is dropped here, unregistering the callback on every path
        result
    }
}

struct QueuedRequest {
    url: String,
    timeout: Duration,
    response: oneshot::Sender<Result<Value, ApiError>>,
}

/// JSONP client. Clones share the same callback registry and request queue.
#[derive(Clone)]
pub struct JsonpClient {
    transport: Arc<Transport>,
    queue: Option<mpsc::UnboundedSender<QueuedRequest>>,
}

impl JsonpClient {
    /// Create a client. Must be called within a Tokio runtime: in
    /// `CallbackMode::Fixed` this spawns the queue worker.
    pub fn new(loader: Arc<dyn ScriptLoader>, options: JsonpOptions) -> Self {
        let serialized = options.mode.is_serialized();
        let transport = Arc::new(Transport {
            loader,
            registry: CallbackRegistry::new(),
            options,
        });

        let queue = if serialized {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_queue(Arc::clone(&transport), rx));
            Some(tx)
        } else {
            None
        };

        Self { transport, queue }
    }

    pub fn options(&self) -> &JsonpOptions {
        &self.transport.options
    }

    /// Enqueue a request immediately and return a handle to its response.
    ///
    /// Submission order is queue order, so callers that need FIFO behaviour
    /// can rely on the order of `submit` calls.
    pub fn submit(&self, url: &str, timeout: Duration) -> PendingRequest {
        let (response, rx) = oneshot::channel();
        let request = QueuedRequest {
            url: url.to_string(),
            timeout,
            response,
        };

        match &self.queue {
            Some(queue) => {
                if let Err(mpsc::error::SendError(request)) = queue.send(request) {
                    let _ = request.response.send(Err(ApiError::QueueClosed));
                }
            }
            None => {
                let transport = Arc::clone(&self.transport);
                tokio::spawn(async move {
                    let result = transport.execute(&request.url, request.timeout).await;
                    let _ = request.response.send(result);
                });
            }
        }

        PendingRequest { rx }
    }

    /// Issue a request and wait for its payload.
    pub async fn request(&self, url: &str, timeout: Duration) -> Result<Value, ApiError> {
        self.submit(url, timeout).response().await
    }

    /// Number of callbacks currently registered.
    pub fn pending_callbacks(&self) -> usize {
        self.transport.registry.len()
    }
}

/// A submitted request.
pub struct PendingRequest {
    rx: oneshot::Receiver<Result<Value, ApiError>>,
}

impl PendingRequest {
    pub async fn response(self) -> Result<Value, ApiError> {
        self.rx.await.unwrap_or_else(|_| Err(ApiError::QueueClosed))
    }
}

async fn run_queue(transport: Arc<Transport>, mut rx: mpsc::UnboundedReceiver<QueuedRequest>) {
    while let Some(request) = rx.recv().await {
        let result = transport.execute(&request.url, request.timeout).await;
        if request.response.send(result).is_err() {
            debug!(url = %request.url, "Requester went away before the response arrived");
        }
    }
    debug!("JSONP request queue closed");
}

// ============================================================================
// Tests
// ============================================================================
