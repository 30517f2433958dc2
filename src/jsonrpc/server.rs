//! JSON-RPC server implementation with method dispatch
//!
//! Each connection gets a reader loop and a writer task. Responses and server-initiated
//! notifications share the writer through a bounded channel, so a peer that stops reading
//! stalls its own connection and never grows server memory.

use crate::jsonrpc::{
    protocol::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse},
    transport::{Connection, TransportConfig},
};
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

/// Frames a connection may have queued for its writer
pub const OUTGOING_QUEUE_SIZE: usize = 64;

/// Outgoing frame queued for a connection's writer task
#[derive(Debug)]
pub enum Outgoing {
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

/// Handle used by method handlers to push notifications to their connection
#[derive(Debug, Clone)]
pub struct NotificationSender {
    sender: mpsc::Sender<Outgoing>,
}

pub type NotificationReceiver = mpsc::Receiver<Outgoing>;

impl NotificationSender {
    pub fn channel() -> (Self, NotificationReceiver) {
        let (sender, receiver) = mpsc::channel(OUTGOING_QUEUE_SIZE);
        (Self { sender }, receiver)
    }

    /// Queue a notification, waiting while the writer is behind.
    /// Fails only once the connection is gone.
    pub async fn send(&self, notification: JsonRpcNotification) -> Result<()> {
        self.sender
            .send(Outgoing::Notification(notification))
            .await
            .map_err(|_| anyhow!("Connection closed"))
    }

    async fn respond(&self, response: JsonRpcResponse) -> Result<()> {
        self.sender
            .send(Outgoing::Response(response))
            .await
            .map_err(|_| anyhow!("Connection closed"))
    }
}

/// Per-connection state shared with streaming method handlers
#[derive(Clone)]
pub struct ConnectionContext {
    pub connection_id: u64,
    pub notifier: NotificationSender,
    /// Feed sessions opened over this connection and how to release each one
    sessions: Arc<Mutex<HashMap<String, BoxFuture<'static, ()>>>>,
    after_response: Arc<Mutex<Vec<BoxFuture<'static, ()>>>>,
}

impl ConnectionContext {
    pub fn new(connection_id: u64, notifier: NotificationSender) -> Self {
        Self {
            connection_id,
            notifier,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            after_response: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record a feed session opened over this connection. `release` runs if the
    /// connection closes while the session is still claimed.
    pub async fn claim_session(&self, session_id: &str, release: BoxFuture<'static, ()>) {
        self.sessions
            .lock()
            .await
            .insert(session_id.to_string(), release);
    }

    pub async fn owns_session(&self, session_id: &str) -> bool {
        self.sessions.lock().await.contains_key(session_id)
    }

    /// Forget a session without running its release hook. `false` if it was not ours.
    pub async fn release_session(&self, session_id: &str) -> bool {
        self.sessions.lock().await.remove(session_id).is_some()
    }

    /// Spawn `task` once the response to the current request has been queued
    pub async fn spawn_after_response(&self, task: BoxFuture<'static, ()>) {
        self.after_response.lock().await.push(task);
    }

    async fn start_deferred_tasks(&self) {
        let tasks: Vec<_> = self.after_response.lock().await.drain(..).collect();
        for task in tasks {
            tokio::spawn(task);
        }
    }

    async fn release_all_sessions(&self) {
        let hooks: Vec<_> = self
            .sessions
            .lock()
            .await
            .drain()
            .map(|(_, hook)| hook)
            .collect();
        for hook in hooks {
            hook.await;
        }
    }
}

/// Method handler function signature
/// Takes JSON parameters and the calling connection and returns a JSON result
pub type MethodHandler = Arc<
    dyn Fn(Option<serde_json::Value>, ConnectionContext) -> BoxFuture<'static, Result<serde_json::Value, JsonRpcError>>
        + Send
        + Sync,
>;

type MethodTable = Arc<RwLock<HashMap<String, MethodHandler>>>;

/// JSON-RPC server
pub struct JsonRpcServer {
    transport_config: TransportConfig,
    methods: MethodTable,
    next_connection_id: Arc<AtomicU64>,
}

impl JsonRpcServer {
    pub fn new(transport_config: TransportConfig) -> Self {
        Self {
            transport_config,
            methods: Arc::new(RwLock::new(HashMap::new())),
            next_connection_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register an async method handler with error conversion
    pub async fn register_async_method<F, Fut, E>(&self, method_name: &str, handler: F)
    where
        F: Fn(Option<serde_json::Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<serde_json::Value, E>> + Send + 'static,
        E: Into<JsonRpcError> + Send + 'static,
    {
        let wrapped_handler: MethodHandler = Arc::new(move |params, _context| {
            let fut = handler(params);
            Box::pin(async move { fut.await.map_err(Into::into) })
        });

        self.methods
            .write()
            .await
            .insert(method_name.to_string(), wrapped_handler);
        debug!("Registered async method: {}", method_name);
    }

    /// Register a handler that needs its connection to push notifications
    pub async fn register_streaming_method<F, Fut, E>(&self, method_name: &str, handler: F)
    where
        F: Fn(Option<serde_json::Value>, ConnectionContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<serde_json::Value, E>> + Send + 'static,
        E: Into<JsonRpcError> + Send + 'static,
    {
        let wrapped_handler: MethodHandler = Arc::new(move |params, context| {
            let fut = handler(params, context);
            Box::pin(async move { fut.await.map_err(Into::into) })
        });

        self.methods
            .write()
            .await
            .insert(method_name.to_string(), wrapped_handler);
        debug!("Registered streaming method: {}", method_name);
    }

    /// Get the list of registered methods
    pub async fn get_registered_methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn transport_description(&self) -> String {
        self.transport_config.description()
    }

    /// Accept and serve connections until the listener is exhausted.
    /// Stdio serves its single connection inline; socket connections get a task each.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let mut listener = self.transport_config.bind().await?;
        info!("Starting JSON-RPC server with {}", listener.description());

        let result = match self.transport_config {
            TransportConfig::Stdio => {
                if let Some(connection) = listener.accept().await? {
                    self.serve_connection(connection).await;
                }
                Ok(())
            }
            TransportConfig::UnixSocket { .. } => loop {
                match listener.accept().await {
                    Ok(Some(connection)) => {
                        let methods = self.methods.clone();
                        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
                        tokio::spawn(async move {
                            serve(methods, id, connection).await;
                        });
                    }
                    Ok(None) => break Ok(()),
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                }
            },
        };

        if let Err(e) = listener.close().await {
            warn!("Failed to close listener: {}", e);
        }
        info!("JSON-RPC server stopped");
        result
    }

    /// Serve one already established connection to completion
    pub async fn serve_connection(&self, connection: Connection) {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        serve(self.methods.clone(), id, connection).await;
    }
}

async fn serve(methods: MethodTable, connection_id: u64, connection: Connection) {
    let Connection {
        mut reader,
        mut writer,
        peer,
    } = connection;
    info!("Connection {} opened ({})", connection_id, peer);

    let (notifier, mut outgoing) = NotificationSender::channel();
    let context = ConnectionContext::new(connection_id, notifier.clone());

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outgoing.recv().await {
            let content = match &message {
                Outgoing::Response(response) => serde_json::to_string(response),
                Outgoing::Notification(notification) => serde_json::to_string(notification),
            };
            let written = match content {
                Ok(content) => writer.write_message(&content).await,
                Err(e) => {
                    error!("Failed to serialize outgoing message: {}", e);
                    continue;
                }
            };
            if let Err(e) = written {
                debug!("Connection {} writer stopped: {}", connection_id, e);
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    loop {
        let content = match reader.read_message().await {
            Ok(Some(content)) => content,
            Ok(None) => break,
            Err(e) => {
                warn!("Connection {} read failed: {}", connection_id, e);
                break;
            }
        };

        let response = match serde_json::from_str::<JsonRpcRequest>(&content) {
            Ok(request) => process_request(&methods, request, context.clone()).await,
            Err(e) => {
                debug!("Unparseable request: {}", e);
                Some(JsonRpcResponse::parse_error())
            }
        };

        if let Some(response) = response {
            if notifier.respond(response).await.is_err() {
                break;
            }
        }
        context.start_deferred_tasks().await;
    }

    context.release_all_sessions().await;
    drop(context);
    drop(notifier);
    // Feed forwarders hold notifier clones; they end once their sessions are unregistered
    if let Err(e) = writer_task.await {
        error!("Connection {} writer task failed: {}", connection_id, e);
    }
    info!("Connection {} closed", connection_id);
}

/// Process a JSON-RPC request and return a response (if needed)
async fn process_request(
    methods: &MethodTable,
    request: JsonRpcRequest,
    context: ConnectionContext,
) -> Option<JsonRpcResponse> {
    let request_id = request.id.clone();
    let is_notification = request.is_notification();
    debug!("Received request: method={}, id={:?}", request.method, request_id);

    if let Err(error) = request.validate() {
        if is_notification {
            warn!("Invalid notification: {}", error.message);
            return None;
        }
        return Some(JsonRpcResponse::error(error, request_id));
    }

    let handler = methods.read().await.get(&request.method).cloned();
    let Some(handler) = handler else {
        if is_notification {
            warn!("Method not found for notification: {}", request.method);
            return None;
        }
        return Some(JsonRpcResponse::method_not_found(&request.method, request_id));
    };

    match handler(request.params, context).await {
        Ok(result) if !is_notification => Some(JsonRpcResponse::success(result, request_id)),
        Ok(_) => None,
        Err(error) if !is_notification => Some(JsonRpcResponse::error(error, request_id)),
        Err(error) => {
            error!(
                "Error in notification handler for {}: {}",
                request.method, error.message
            );
            None
        }
    }
}
