//! Transport layer for JSON-RPC communication
//!
//! Implements LSP-style message framing with Content-Length headers over any async
//! byte stream, plus the two listeners the server runs on: stdio (one connection) and a
//! Unix domain socket (one connection per accepted client).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace};

/// Upper bound on a single message body
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Reads Content-Length framed messages
pub struct FramedReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next message body. `Ok(None)` on a clean end of stream between messages.
    pub async fn read_message(&mut self) -> Result<Option<String>> {
        let mut content_length = None;
        let mut saw_header = false;

        loop {
            let mut line = String::new();
            let bytes_read = self.reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                if saw_header {
                    return Err(anyhow!("Connection closed inside message headers"));
                }
                return Ok(None);
            }

            let line = line.trim_end();
            if line.is_empty() {
                if saw_header {
                    break;
                }
                // Tolerate stray blank lines between messages
                continue;
            }
            saw_header = true;

            if let Some(length_str) = line.strip_prefix("Content-Length:") {
                content_length = Some(length_str.trim().parse::<usize>()?);
            }

            trace!("Received header: {}", line);
        }

        let content_length =
            content_length.ok_or_else(|| anyhow!("Missing Content-Length header"))?;
        if content_length > MAX_MESSAGE_BYTES {
            return Err(anyhow!(
                "Message of {} bytes exceeds the {} byte limit",
                content_length,
                MAX_MESSAGE_BYTES
            ));
        }

        let mut buffer = vec![0u8; content_length];
        self.reader.read_exact(&mut buffer).await?;

        let content = String::from_utf8(buffer)?;
        debug!("Received message: {} bytes", content_length);
        trace!("Message content: {}", content);

        Ok(Some(content))
    }
}

/// Writes Content-Length framed messages
pub struct FramedWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FramedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_message(&mut self, content: &str) -> Result<()> {
        let content_bytes = content.as_bytes();

        self.writer
            .write_all(lsp_format::header(content_bytes.len()).as_bytes())
            .await?;
        self.writer.write_all(content_bytes).await?;
        self.writer.flush().await?;

        debug!("Sent message: {} bytes", content_bytes.len());
        trace!("Message content: {}", content);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// One client connection split into its framed halves
pub struct Connection {
    pub reader: FramedReader<BoxedReader>,
    pub writer: FramedWriter<BoxedWriter>,
    pub peer: String,
}

impl Connection {
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        peer: impl Into<String>,
    ) -> Self {
        Self {
            reader: FramedReader::new(Box::new(reader)),
            writer: FramedWriter::new(Box::new(writer)),
            peer: peer.into(),
        }
    }

    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout(), "stdio")
    }

    pub fn from_unix_stream(stream: tokio::net::UnixStream, peer: impl Into<String>) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self::new(read_half, write_half, peer)
    }
}

/// Source of client connections
#[async_trait]
pub trait Listener: Send {
    /// Wait for the next connection; `None` once the listener is exhausted
    async fn accept(&mut self) -> Result<Option<Connection>>;

    /// Release listener resources
    async fn close(&mut self) -> Result<()>;

    fn description(&self) -> String;
}

/// Hands out stdin/stdout exactly once
pub struct StdioListener {
    taken: bool,
}

impl StdioListener {
    pub fn new() -> Self {
        Self { taken: false }
    }
}

impl Default for StdioListener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Listener for StdioListener {
    async fn accept(&mut self) -> Result<Option<Connection>> {
        if self.taken {
            return Ok(None);
        }
        self.taken = true;
        Ok(Some(Connection::stdio()))
    }

    async fn close(&mut self) -> Result<()> {
        debug!("Stdio listener closed");
        Ok(())
    }

    fn description(&self) -> String {
        "JSON-RPC over stdin/stdout (LSP-style)".to_string()
    }
}

/// Unix domain socket listener; every accepted stream is an independent connection
pub struct UnixSocketListener {
    listener: tokio::net::UnixListener,
    socket_path: PathBuf,
    accepted: u64,
}

impl UnixSocketListener {
    /// Bind to a Unix socket path, replacing a stale socket file if present
    pub async fn bind<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        if path_ref.exists() {
            std::fs::remove_file(path_ref)
                .map_err(|e| anyhow!("Failed to remove existing socket file: {}", e))?;
        }
        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let listener = tokio::net::UnixListener::bind(path_ref)
            .map_err(|e| anyhow!("Failed to bind to socket {}: {}", path_ref.display(), e))?;

        debug!("Listening on: {}", path_ref.display());
        Ok(Self {
            listener,
            socket_path: path_ref.to_path_buf(),
            accepted: 0,
        })
    }
}

#[async_trait]
impl Listener for UnixSocketListener {
    async fn accept(&mut self) -> Result<Option<Connection>> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| anyhow!("Failed to accept connection: {}", e))?;
        self.accepted += 1;

        let peer = format!("{}#{}", self.socket_path.display(), self.accepted);
        debug!("Client connected: {}", peer);
        Ok(Some(Connection::from_unix_stream(stream, peer)))
    }

    async fn close(&mut self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        debug!("Socket listener closed: {}", self.socket_path.display());
        Ok(())
    }

    fn description(&self) -> String {
        format!(
            "JSON-RPC over Unix domain socket {} (LSP-style)",
            self.socket_path.display()
        )
    }
}

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// Standard input/output with LSP message framing
    Stdio,
    /// Unix domain socket with specified path
    UnixSocket { path: String },
}

impl TransportConfig {
    /// Build from the configured transport name
    pub fn from_settings(transport: &str, socket_path: Option<&str>) -> Result<Self> {
        match transport {
            "stdio" => Ok(TransportConfig::Stdio),
            "socket" => {
                let path = socket_path
                    .ok_or_else(|| anyhow!("Socket path is required when using socket transport"))?;
                Ok(TransportConfig::UnixSocket {
                    path: path.to_string(),
                })
            }
            other => Err(anyhow!("Unsupported transport type: {}", other)),
        }
    }

    pub async fn bind(&self) -> Result<Box<dyn Listener>> {
        match self {
            TransportConfig::Stdio => Ok(Box::new(StdioListener::new())),
            TransportConfig::UnixSocket { path } => {
                Ok(Box::new(UnixSocketListener::bind(path).await?))
            }
        }
    }

    pub fn description(&self) -> String {
        match self {
            TransportConfig::Stdio => "stdin/stdout".to_string(),
            TransportConfig::UnixSocket { path } => format!("Unix socket ({})", path),
        }
    }
}

/// Helper functions for working with LSP message format
pub mod lsp_format {
    use anyhow::{anyhow, Result};

    pub fn header(content_length: usize) -> String {
        format!("Content-Length: {}\r\n\r\n", content_length)
    }

    /// Format message with LSP headers
    pub fn format_message(content: &str) -> String {
        format!("{}{}", header(content.len()), content)
    }

    /// Split a complete raw message into its body, checking the declared length
    pub fn validate_message(raw_message: &str) -> Result<&str> {
        let header_end = raw_message
            .find("\r\n\r\n")
            .ok_or_else(|| anyhow!("Invalid LSP message format: missing header separator"))?;

        let expected_length = raw_message[..header_end]
            .lines()
            .find_map(|line| line.trim().strip_prefix("Content-Length:"))
            .ok_or_else(|| anyhow!("Content-Length header not found"))?
            .trim()
            .parse::<usize>()?;
        let content = &raw_message[header_end + 4..];

        if expected_length != content.len() {
            return Err(anyhow!(
                "Content length mismatch: expected {}, got {}",
                expected_length,
                content.len()
            ));
        }

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    const BODY: &str = r#"{"jsonrpc":"2.0","method":"siaas/incident/list","id":1}"#;

    #[tokio::test]
    async fn test_reads_framed_message_split_across_chunks() {
        let framed = lsp_format::format_message(BODY);
        let (head, tail) = framed.split_at(10);
        let mock = Builder::new()
            .read(head.as_bytes())
            .read(tail.as_bytes())
            .build();

        let mut reader = FramedReader::new(mock);
        assert_eq!(reader.read_message().await.unwrap().as_deref(), Some(BODY));
        assert!(reader.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_extra_headers_are_ignored() {
        let raw = format!(
            "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
            BODY.len(),
            BODY
        );
        let mock = Builder::new().read(raw.as_bytes()).build();

        let mut reader = FramedReader::new(mock);
        assert_eq!(reader.read_message().await.unwrap().as_deref(), Some(BODY));
    }

    #[tokio::test]
    async fn test_missing_length_is_an_error() {
        let mock = Builder::new()
            .read(b"Content-Type: application/json\r\n\r\n{}")
            .build();
        let mut reader = FramedReader::new(mock);
        assert!(reader.read_message().await.is_err());
    }

    #[tokio::test]
    async fn test_writer_frames_body() {
        let expected = lsp_format::format_message(BODY);
        let mock = Builder::new().write(expected.as_bytes()).build();

        let mut writer = FramedWriter::new(mock);
        writer.write_message(BODY).await.unwrap();
    }

    #[test]
    fn test_message_validation() {
        let message = lsp_format::format_message(BODY);
        assert_eq!(lsp_format::validate_message(&message).unwrap(), BODY);
        assert!(lsp_format::validate_message("Content-Length: 99\r\n\r\n{}").is_err());
    }

    #[test]
    fn test_transport_config() {
        assert_eq!(
            TransportConfig::from_settings("stdio", None).unwrap(),
            TransportConfig::Stdio
        );
        let socket = TransportConfig::from_settings("socket", Some("/tmp/siaas.sock")).unwrap();
        assert!(socket.description().contains("/tmp/siaas.sock"));
        assert!(TransportConfig::from_settings("socket", None).is_err());
        assert!(TransportConfig::from_settings("http", None).is_err());
    }
}
