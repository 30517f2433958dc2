//! Shared fixtures for the integration tests: principals, report payloads, an in-memory
//! service stack and a framed JSON-RPC test client.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use siaas::broadcast::{BroadcastConfig, Broadcaster};
use siaas::jsonrpc::transport::{FramedReader, FramedWriter};
use siaas::jsonrpc::{register_siaas_methods, Connection, JsonRpcServer, TransportConfig};
use siaas::lifecycle::{LifecycleConfig, LifecycleManager};
use siaas::models::{Principal, Role};
use siaas::repository::InMemoryRepository;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub fn admin() -> Principal {
    Principal::new("root", Role::GlobalAdmin, None)
}

pub fn supervisor(zone: &str) -> Principal {
    Principal::new(format!("sup-{}", zone.to_lowercase()), Role::ZoneSupervisor, Some(zone))
}

pub fn unzoned_supervisor() -> Principal {
    Principal::new("sup-unassigned", Role::ZoneSupervisor, None)
}

pub fn reporter(zone: &str) -> Principal {
    Principal::new("brigadista-1", Role::FieldReporter, Some(zone))
}

/// Minimal mobile report in the client's field vocabulary
pub fn report(tipo: &str, zona: &str) -> Value {
    json!({ "tipo": tipo, "zona": zona })
}

pub fn report_with_client_id(tipo: &str, zona: &str, client_id: &str) -> Value {
    json!({ "tipo": tipo, "zona": zona, "client_id": client_id })
}

/// In-memory repository, default broadcaster and lifecycle manager
pub struct Stack {
    pub repository: Arc<InMemoryRepository>,
    pub broadcaster: Arc<Broadcaster>,
    pub manager: Arc<LifecycleManager>,
}

pub fn stack() -> Stack {
    stack_with(LifecycleConfig::default(), BroadcastConfig::default())
}

pub fn stack_with(lifecycle: LifecycleConfig, broadcast: BroadcastConfig) -> Stack {
    let repository = Arc::new(InMemoryRepository::new());
    let broadcaster = Arc::new(Broadcaster::new(broadcast));
    let manager = Arc::new(LifecycleManager::new(
        repository.clone(),
        broadcaster.clone(),
        lifecycle,
    ));
    Stack {
        repository,
        broadcaster,
        manager,
    }
}

/// Framed client connected to a server over an in-process duplex pipe
pub struct TestClient {
    reader: FramedReader<ReadHalf<DuplexStream>>,
    writer: FramedWriter<WriteHalf<DuplexStream>>,
    next_id: u64,
    pending_notifications: VecDeque<Value>,
    handle: JoinHandle<()>,
}

impl TestClient {
    /// Open a new connection to `server`
    pub fn connect(server: Arc<JsonRpcServer>) -> Self {
        let (client, server_side) = tokio::io::duplex(256 * 1024);
        let (server_read, server_write) = tokio::io::split(server_side);
        let handle = tokio::spawn(async move {
            server
                .serve_connection(Connection::new(server_read, server_write, "test-client"))
                .await;
        });

        let (client_read, client_write) = tokio::io::split(client);
        Self {
            reader: FramedReader::new(client_read),
            writer: FramedWriter::new(client_write),
            next_id: 1,
            pending_notifications: VecDeque::new(),
            handle,
        }
    }

    /// Send a request and wait for its response, queueing notifications seen meanwhile
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let request = json!({"jsonrpc": "2.0", "method": method, "params": params, "id": id});
        self.writer.write_message(&request.to_string()).await?;

        loop {
            let message = self.read().await?;
            if message.get("id") == Some(&json!(id)) {
                return Ok(message);
            }
            self.pending_notifications.push_back(message);
        }
    }

    /// Next server notification, failing after [`RECV_TIMEOUT`]
    pub async fn notification(&mut self) -> Result<Value> {
        if let Some(message) = self.pending_notifications.pop_front() {
            return Ok(message);
        }
        self.read().await
    }

    /// `true` if no notification arrives within `wait`
    pub async fn stays_quiet(&mut self, wait: Duration) -> bool {
        if !self.pending_notifications.is_empty() {
            return false;
        }
        timeout(wait, self.reader.read_message()).await.is_err()
    }

    /// Notifications that arrived while waiting for responses and were not read yet
    pub fn queued_notifications(&self) -> usize {
        self.pending_notifications.len()
    }

    /// Close the client side and wait for the server to finish the connection
    pub async fn close(self) -> Result<()> {
        let TestClient {
            reader,
            mut writer,
            handle,
            ..
        } = self;
        writer.shutdown().await?;
        drop(reader);
        drop(writer);
        timeout(RECV_TIMEOUT, handle)
            .await
            .map_err(|_| anyhow!("server did not finish the connection"))??;
        Ok(())
    }

    async fn read(&mut self) -> Result<Value> {
        let body = timeout(RECV_TIMEOUT, self.reader.read_message())
            .await
            .map_err(|_| anyhow!("timed out waiting for a server message"))??
            .ok_or_else(|| anyhow!("server closed the connection"))?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// JSON-RPC server over `stack` with every incident method registered
pub async fn rpc_server(stack: &Stack) -> Arc<JsonRpcServer> {
    let server = JsonRpcServer::new(TransportConfig::Stdio);
    register_siaas_methods(&server, stack.manager.clone()).await;
    Arc::new(server)
}

/// Poll `check` until it holds or the receive timeout passes
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
