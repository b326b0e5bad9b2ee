//! External capability-server lifecycle management.
//!
//! Servers are instantiated from config (never connected), connected
//! concurrently with per-server failure containment, and cleaned up for
//! every connected server regardless of sibling outcomes. Local-process
//! servers are spawned with kill-on-drop so a cancelled scope cannot leak
//! a child process.
//!
//! Local processes speak a JSON-lines protocol over stdio: the server
//! announces `{"type":"ready"}`, answers `{"type":"list_tools"}` with its
//! tool list, and exits on `{"type":"shutdown"}`. Remote endpoints answer
//! `GET {url}/tools` with the same tool list.

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use sitescribe_shared::{Result, ServerConfig, ServerKind, SiteScribeError};

use crate::capability::ToolDescriptor;

/// Timeout for the connect handshake (spawn→ready→tools, or HTTP GET).
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a local process gets to exit after a shutdown message.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Protocol messages
// ---------------------------------------------------------------------------

/// Messages sent to a local-process server.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    ListTools,
    Shutdown,
}

/// Messages received from a local-process server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Ready,
    Tools { tools: Vec<ToolDescriptor> },
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// Lifecycle state of one server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    Connecting,
    Connected,
    Failed,
    Cleaned,
}

/// Live link to a spawned local-process server.
struct ProcessLink {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
}

enum Transport {
    Process {
        command: String,
        args: Vec<String>,
        link: Option<ProcessLink>,
    },
    Remote {
        url: String,
        client: reqwest::Client,
    },
}

/// One external server, owned exclusively by the manager for its lifetime.
///
/// The registry only ever sees the [`ConnectedServer`] view of a connection
/// in the `Connected` state.
pub struct ServerConnection {
    name: String,
    kind: ServerKind,
    state: ConnectionState,
    tools: Vec<ToolDescriptor>,
    transport: Transport,
}

impl ServerConnection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ServerKind {
        self.kind
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Tools advertised at connect time. Empty until connected.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Attempt the connect handshake: Created → Connecting → Connected|Failed.
    async fn connect(&mut self) -> Result<()> {
        self.state = ConnectionState::Connecting;

        let result = match &mut self.transport {
            Transport::Process {
                command,
                args,
                link,
            } => connect_process(&self.name, command, args, link).await,
            Transport::Remote { url, client } => connect_remote(&self.name, url, client).await,
        };

        match result {
            Ok(tools) => {
                self.tools = tools;
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Failed;
                Err(e)
            }
        }
    }

    /// Tear the connection down: Connected → Cleaned.
    ///
    /// The state advances even when teardown reports an error; the attempt
    /// itself completes the lifecycle.
    async fn cleanup(&mut self) -> Result<()> {
        let result = match &mut self.transport {
            Transport::Process { link, .. } => cleanup_process(&self.name, link).await,
            // Remote endpoints hold no per-run state on our side.
            Transport::Remote { .. } => Ok(()),
        };
        self.state = ConnectionState::Cleaned;
        result
    }
}

/// The name + tools view of a connected server, handed to the registry.
#[derive(Debug, Clone)]
pub struct ConnectedServer {
    pub name: String,
    pub tools: Vec<ToolDescriptor>,
}

// ---------------------------------------------------------------------------
// Instantiate & connect
// ---------------------------------------------------------------------------

/// Build connections for every enabled server config. Never connects.
///
/// Invalid configs (a local process without a command, a remote endpoint
/// without a URL) are logged and skipped.
pub fn instantiate(configs: &[ServerConfig]) -> Vec<ServerConnection> {
    let mut connections = Vec::new();
    for cfg in configs {
        if !cfg.enabled {
            debug!(server = %cfg.name, "server disabled, skipping");
            continue;
        }
        match build_connection(cfg) {
            Ok(conn) => connections.push(conn),
            Err(e) => warn!(server = %cfg.name, error = %e, "invalid server config, skipping"),
        }
    }
    connections
}

fn build_connection(cfg: &ServerConfig) -> Result<ServerConnection> {
    let transport = match cfg.kind {
        ServerKind::LocalProcess => {
            let command = cfg.command.clone().ok_or_else(|| {
                SiteScribeError::server(&cfg.name, "local-process server needs a command")
            })?;
            Transport::Process {
                command,
                args: cfg.args.clone(),
                link: None,
            }
        }
        ServerKind::RemoteEndpoint => {
            let url = cfg.url.clone().ok_or_else(|| {
                SiteScribeError::server(&cfg.name, "remote-endpoint server needs a url")
            })?;
            let client = reqwest::Client::builder()
                .timeout(HANDSHAKE_TIMEOUT)
                .build()
                .map_err(|e| SiteScribeError::server(&cfg.name, format!("client build: {e}")))?;
            Transport::Remote { url, client }
        }
    };

    Ok(ServerConnection {
        name: cfg.name.clone(),
        kind: cfg.kind,
        state: ConnectionState::Created,
        tools: Vec::new(),
        transport,
    })
}

/// Connect every instantiated server concurrently.
///
/// A server that fails to connect is logged and dropped from the returned
/// set — degraded-capability continuation, not failure. It never reaches
/// `Connected` and is never cleaned up.
pub async fn connect_all(connections: Vec<ServerConnection>) -> ConnectedSet {
    let mut handles = Vec::with_capacity(connections.len());
    for mut conn in connections {
        handles.push(tokio::spawn(async move {
            match conn.connect().await {
                Ok(()) => {
                    info!(
                        server = conn.name(),
                        tools = conn.tools().len(),
                        "server connected"
                    );
                    Some(conn)
                }
                Err(e) => {
                    warn!(
                        server = conn.name(),
                        error = %e,
                        "server connect failed, continuing without it"
                    );
                    None
                }
            }
        }));
    }

    let mut servers = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Some(conn)) => servers.push(conn),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "connect task failed"),
        }
    }

    ConnectedSet { servers }
}

// ---------------------------------------------------------------------------
// ConnectedSet
// ---------------------------------------------------------------------------

/// The set of successfully connected servers for one pipeline run.
///
/// The owner must call [`ConnectedSet::cleanup`] on every exit path; child
/// processes are additionally killed on drop as a cancellation backstop.
pub struct ConnectedSet {
    servers: Vec<ServerConnection>,
}

impl ConnectedSet {
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Registry-facing views of the connected servers.
    pub fn views(&self) -> Vec<ConnectedServer> {
        self.servers
            .iter()
            .map(|s| ConnectedServer {
                name: s.name.clone(),
                tools: s.tools.clone(),
            })
            .collect()
    }

    /// Tear down every connected server, returning a per-server outcome.
    ///
    /// Cleanup is attempted for each server regardless of sibling failures;
    /// the scope is considered exited only once every server has completed
    /// (or definitively failed) its teardown.
    pub async fn cleanup(mut self) -> Vec<(String, Result<()>)> {
        let mut outcomes = Vec::with_capacity(self.servers.len());
        for conn in &mut self.servers {
            let result = conn.cleanup().await;
            match &result {
                Ok(()) => info!(server = conn.name(), "server cleaned"),
                Err(e) => warn!(server = conn.name(), error = %e, "server cleanup failed"),
            }
            outcomes.push((conn.name.clone(), result));
        }
        outcomes
    }
}

// ---------------------------------------------------------------------------
// Transport plumbing
// ---------------------------------------------------------------------------

async fn connect_process(
    name: &str,
    command: &str,
    args: &[String],
    link: &mut Option<ProcessLink>,
) -> Result<Vec<ToolDescriptor>> {
    debug!(server = name, command, "spawning server process");

    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SiteScribeError::server(name, format!("spawn failed: {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| SiteScribeError::server(name, "failed to capture stdin"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SiteScribeError::server(name, "failed to capture stdout"))?;
    let mut reader = BufReader::new(stdout);

    match read_message(&mut reader, name).await? {
        ServerMessage::Ready => {}
        other => {
            return Err(SiteScribeError::server(
                name,
                format!("expected ready message, got {other:?}"),
            ));
        }
    }

    write_message(&mut stdin, name, &ClientMessage::ListTools).await?;
    let tools = match read_message(&mut reader, name).await? {
        ServerMessage::Tools { tools } => tools,
        other => {
            return Err(SiteScribeError::server(
                name,
                format!("expected tools message, got {other:?}"),
            ));
        }
    };

    *link = Some(ProcessLink {
        child,
        stdin,
        reader,
    });
    Ok(tools)
}

async fn connect_remote(
    name: &str,
    url: &str,
    client: &reqwest::Client,
) -> Result<Vec<ToolDescriptor>> {
    #[derive(Deserialize)]
    struct ToolList {
        tools: Vec<ToolDescriptor>,
    }

    let endpoint = format!("{}/tools", url.trim_end_matches('/'));
    let response = client
        .get(&endpoint)
        .send()
        .await
        .map_err(|e| SiteScribeError::server(name, format!("{endpoint}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SiteScribeError::server(
            name,
            format!("{endpoint}: HTTP {status}"),
        ));
    }

    let list: ToolList = response
        .json()
        .await
        .map_err(|e| SiteScribeError::server(name, format!("invalid tool list: {e}")))?;
    Ok(list.tools)
}

async fn cleanup_process(name: &str, link: &mut Option<ProcessLink>) -> Result<()> {
    // Nothing to clean if the connect handshake never completed.
    let Some(mut link) = link.take() else {
        return Ok(());
    };

    // Polite shutdown first. A write failure usually means the server
    // already exited, which the wait below confirms either way.
    if let Err(e) = write_message(&mut link.stdin, name, &ClientMessage::Shutdown).await {
        debug!(server = name, error = %e, "shutdown write failed");
    }
    drop(link.stdin);

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, link.child.wait()).await {
        Ok(Ok(status)) => {
            debug!(server = name, ?status, "server exited");
            Ok(())
        }
        Ok(Err(e)) => Err(SiteScribeError::server(name, format!("wait failed: {e}"))),
        Err(_) => {
            warn!(server = name, "shutdown timed out, killing process");
            link.child
                .kill()
                .await
                .map_err(|e| SiteScribeError::server(name, format!("kill failed: {e}")))
        }
    }
}

async fn read_message(reader: &mut BufReader<ChildStdout>, name: &str) -> Result<ServerMessage> {
    let mut line = String::new();
    let n = tokio::time::timeout(HANDSHAKE_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| SiteScribeError::server(name, "handshake timed out"))?
        .map_err(|e| SiteScribeError::server(name, format!("read error: {e}")))?;

    if n == 0 {
        return Err(SiteScribeError::server(name, "server closed stdout"));
    }

    serde_json::from_str(line.trim()).map_err(|e| {
        SiteScribeError::server(name, format!("invalid message: {e} (got: {line})"))
    })
}

async fn write_message(stdin: &mut ChildStdin, name: &str, msg: &ClientMessage) -> Result<()> {
    let mut json = serde_json::to_string(msg)
        .map_err(|e| SiteScribeError::server(name, format!("serialize failed: {e}")))?;
    json.push('\n');

    stdin
        .write_all(json.as_bytes())
        .await
        .map_err(|e| SiteScribeError::server(name, format!("write failed: {e}")))?;
    stdin
        .flush()
        .await
        .map_err(|e| SiteScribeError::server(name, format!("flush failed: {e}")))
}
