//! Generation backend: the external collaborator that turns a structured
//! request into generated text.
//!
//! The production implementation, [`BridgeBackend`], drives a bridge
//! subprocess over a JSON-lines stdin/stdout protocol. Tests substitute the
//! [`GenerationBackend`] trait with stubs.

use std::collections::BTreeMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use sitescribe_capabilities::Capability;
use sitescribe_shared::{BackendConfig, Result, SiteScribeError};

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// A structured generation request for one stage invocation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    /// The stage's static instructions.
    pub instructions: String,
    /// Required artifacts by name.
    pub inputs: BTreeMap<String, Value>,
    /// The capability set the stage sees at this boundary.
    pub capabilities: Vec<Capability>,
}

/// A successful generation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// The generated text.
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub model: String,
    pub latency_ms: u64,
}

/// A classified backend failure.
///
/// Transient errors (rate limits, upstream timeouts) are retried by the
/// engine; fatal errors abort the run.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("transient backend error: {0}")]
    Transient(String),

    #[error("backend error: {0}")]
    Fatal(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// The language-generation collaborator invoked once per stage.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<GenerationResponse, BackendError>;
}

// ---------------------------------------------------------------------------
// Bridge protocol
// ---------------------------------------------------------------------------

/// Request message sent to the bridge.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum BridgeRequest<'a> {
    #[serde(rename = "generate")]
    Generate {
        id: String,
        model: &'a str,
        request: &'a GenerationRequest,
    },
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Response message received from the bridge.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum BridgeResponse {
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "result")]
    Result {
        id: String,
        result: GenerationResponse,
    },
    #[serde(rename = "error")]
    Error {
        #[allow(dead_code)]
        id: String,
        error: String,
        #[serde(default)]
        retryable: bool,
    },
}

// ---------------------------------------------------------------------------
// BridgeBackend
// ---------------------------------------------------------------------------

struct BridgeLink {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    request_counter: u64,
}

/// Generation backend backed by a bridge subprocess.
///
/// Requests are serialized through an internal mutex: the bridge answers one
/// request at a time, in order.
pub struct BridgeBackend {
    link: Mutex<BridgeLink>,
    model: String,
}

impl BridgeBackend {
    /// Spawn the bridge subprocess and wait for its ready signal.
    pub async fn spawn(config: &BackendConfig) -> Result<Self> {
        info!(
            cmd = %config.bridge_cmd,
            script = %config.bridge_script,
            "spawning generation bridge"
        );

        let mut child = Command::new(&config.bridge_cmd)
            .arg("run")
            .arg(&config.bridge_script)
            .current_dir(&config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Bridge logs go to parent stderr
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SiteScribeError::config(format!(
                    "failed to spawn bridge: {e}. Is `{}` installed?",
                    config.bridge_cmd
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SiteScribeError::config("failed to capture bridge stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SiteScribeError::config("failed to capture bridge stdout"))?;
        let mut reader = BufReader::new(stdout);

        // Wait for ready signal
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| SiteScribeError::config(format!("bridge read error: {e}")))?;

        match serde_json::from_str(line.trim()) {
            Ok(BridgeResponse::Ready) => debug!("bridge is ready"),
            _ => {
                return Err(SiteScribeError::config(format!(
                    "expected ready message from bridge, got: {line}"
                )));
            }
        }

        Ok(Self {
            link: Mutex::new(BridgeLink {
                child,
                stdin,
                reader,
                request_counter: 0,
            }),
            model: config.model.clone(),
        })
    }

    /// Send shutdown and wait for the bridge to exit.
    pub async fn shutdown(self) -> Result<()> {
        let mut link = self.link.into_inner();

        if let Ok(json) = serde_json::to_string(&BridgeRequest::Shutdown) {
            let _ = link.stdin.write_all(format!("{json}\n").as_bytes()).await;
            let _ = link.stdin.flush().await;
        }

        match link.child.wait().await {
            Ok(status) => {
                info!(?status, "bridge exited");
                Ok(())
            }
            Err(e) => {
                warn!("bridge wait error: {e}");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl GenerationBackend for BridgeBackend {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<GenerationResponse, BackendError> {
        let mut link = self.link.lock().await;

        link.request_counter += 1;
        let id = format!("req-{}", link.request_counter);

        let json = serde_json::to_string(&BridgeRequest::Generate {
            id: id.clone(),
            model: &self.model,
            request: &request,
        })
        .map_err(|e| BackendError::Fatal(format!("failed to serialize request: {e}")))?;

        link.stdin
            .write_all(format!("{json}\n").as_bytes())
            .await
            .map_err(|e| BackendError::Fatal(format!("failed to write to bridge stdin: {e}")))?;
        link.stdin
            .flush()
            .await
            .map_err(|e| BackendError::Fatal(format!("failed to flush bridge stdin: {e}")))?;

        let mut line = String::new();
        link.reader
            .read_line(&mut line)
            .await
            .map_err(|e| BackendError::Fatal(format!("bridge read error: {e}")))?;

        if line.is_empty() {
            return Err(BackendError::Fatal("bridge closed stdout unexpectedly".into()));
        }

        let msg: BridgeResponse = serde_json::from_str(line.trim()).map_err(|e| {
            BackendError::Fatal(format!(
                "invalid bridge response: {e} (got: {})",
                &line[..line.len().min(200)]
            ))
        })?;

        match msg {
            BridgeResponse::Result {
                id: resp_id,
                result,
            } => {
                debug_assert_eq!(resp_id, id);
                Ok(result)
            }
            BridgeResponse::Error {
                error, retryable, ..
            } => {
                if retryable {
                    Err(BackendError::Transient(error))
                } else {
                    Err(BackendError::Fatal(error))
                }
            }
            BridgeResponse::Ready => Err(BackendError::Fatal(
                "unexpected ready message mid-conversation".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_classification() {
        assert!(BackendError::Transient("rate limited".into()).is_transient());
        assert!(!BackendError::Fatal("bad request".into()).is_transient());
    }

    #[test]
    fn generate_request_serializes_correctly() {
        let request = GenerationRequest {
            instructions: "Write an outline.".into(),
            inputs: BTreeMap::from([("topic".to_string(), Value::String("rust".into()))]),
            capabilities: vec![Capability::network_search()],
        };

        let msg = BridgeRequest::Generate {
            id: "req-1".into(),
            model: "gpt-4.1",
            request: &request,
        };
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains(r#""type":"generate"#));
        assert!(json.contains(r#""id":"req-1"#));
        assert!(json.contains(r#""model":"gpt-4.1"#));
        assert!(json.contains(r#""instructions":"Write an outline."#));
        assert!(json.contains(r#""topic":"rust"#));
        assert!(json.contains(r#""kind":"network-search"#));
    }

    #[test]
    fn shutdown_message_serializes_correctly() {
        let json = serde_json::to_string(&BridgeRequest::Shutdown).unwrap();
        assert_eq!(json, r#"{"type":"shutdown"}"#);
    }

    #[test]
    fn response_deserializes_ready() {
        let msg: BridgeResponse = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert!(matches!(msg, BridgeResponse::Ready));
    }

    #[test]
    fn response_deserializes_result() {
        let json = r#"{"type":"result","id":"req-1","result":{"text":"draft","tokens_in":100,"tokens_out":50,"model":"test","latency_ms":200}}"#;
        let msg: BridgeResponse = serde_json::from_str(json).unwrap();
        match msg {
            BridgeResponse::Result { id, result } => {
                assert_eq!(id, "req-1");
                assert_eq!(result.text, "draft");
                assert_eq!(result.tokens_in, 100);
                assert_eq!(result.tokens_out, 50);
            }
            _ => panic!("expected Result"),
        }
    }

    #[test]
    fn response_deserializes_error_with_retry_class() {
        let json = r#"{"type":"error","id":"req-2","error":"rate limited","retryable":true}"#;
        let msg: BridgeResponse = serde_json::from_str(json).unwrap();
        match msg {
            BridgeResponse::Error {
                error, retryable, ..
            } => {
                assert_eq!(error, "rate limited");
                assert!(retryable);
            }
            _ => panic!("expected Error"),
        }

        // Missing retryable defaults to non-transient.
        let json = r#"{"type":"error","id":"req-3","error":"bad prompt"}"#;
        let msg: BridgeResponse = serde_json::from_str(json).unwrap();
        match msg {
            BridgeResponse::Error { retryable, .. } => assert!(!retryable),
            _ => panic!("expected Error"),
        }
    }
}
