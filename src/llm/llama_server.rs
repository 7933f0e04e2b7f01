use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::provider::{LlmProvider, TokenStream};
use super::stream::{spawn_token_stream, sse_data, StreamEvent};
use super::types::{ChatMessage, ChatRequest};
use crate::core::config::{AppPaths, LlmConfig};
use crate::core::errors::RagError;
use crate::embedding::Embedder;

const DEFAULT_CHAT_PORT: u16 = 8080;
const DEFAULT_EMBEDDING_PORT: u16 = 8081;
const MAX_SERVER_RETRIES: u32 = 30;
const DEFAULT_PREDICT_LEN: i32 = 1024;

/// What the spawned server is for. An embedding server is started with
/// `--embedding` and reports failures as an unavailable embedding service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    Chat,
    Embedding,
}

#[derive(Debug, Clone)]
struct ServerOptions {
    port: u16,
    n_ctx: usize,
    n_threads: Option<usize>,
    n_gpu_layers: i32,
}

/// A `llama-server` child process serving one local GGUF model. The process
/// is started lazily on first use and killed when the last handle drops.
#[derive(Clone)]
pub struct LlamaServer {
    inner: Arc<Mutex<LlamaManager>>,
    client: Client,
    model_path: PathBuf,
    role: ServerRole,
}

struct LlamaManager {
    child_process: Option<Child>,
    server_path: PathBuf,
    options: ServerOptions,
}

impl LlamaServer {
    pub fn new(paths: &AppPaths, model_path: PathBuf, role: ServerRole) -> Result<Self, RagError> {
        let port = match role {
            ServerRole::Chat => DEFAULT_CHAT_PORT,
            ServerRole::Embedding => DEFAULT_EMBEDDING_PORT,
        };
        let options = ServerOptions {
            port,
            n_ctx: 2048,
            n_threads: None,
            n_gpu_layers: -1,
        };
        Self::with_options(paths, model_path, role, options)
    }

    /// Chat server configured from the `llm` section.
    pub fn from_config(paths: &AppPaths, config: &LlmConfig) -> Result<Self, RagError> {
        let options = ServerOptions {
            port: if config.port > 0 {
                config.port
            } else {
                DEFAULT_CHAT_PORT
            },
            n_ctx: config.n_ctx,
            n_threads: config.n_threads,
            n_gpu_layers: config.n_gpu_layers,
        };
        Self::with_options(
            paths,
            paths.resolve_project(&config.model_path),
            ServerRole::Chat,
            options,
        )
    }

    fn with_options(
        paths: &AppPaths,
        model_path: PathBuf,
        role: ServerRole,
        options: ServerOptions,
    ) -> Result<Self, RagError> {
        if !model_path.is_file() {
            return Err(RagError::Config(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }

        Ok(Self {
            inner: Arc::new(Mutex::new(LlamaManager {
                child_process: None,
                server_path: find_server_binary(paths),
                options,
            })),
            client: Client::new(),
            model_path,
            role,
        })
    }

    fn fail(&self, message: impl Into<String>) -> RagError {
        match self.role {
            ServerRole::Chat => RagError::Llm(message.into()),
            ServerRole::Embedding => RagError::EmbeddingServiceUnavailable(message.into()),
        }
    }

    /// Starts the server if it is not already up and returns its base URL.
    pub async fn ensure_running(&self) -> Result<String, RagError> {
        let mut manager = self.inner.lock().await;

        if let Some(child) = manager.child_process.as_mut() {
            match child.try_wait() {
                Ok(None) => return Ok(base_url(manager.options.port)),
                Ok(Some(status)) => {
                    tracing::warn!("llama-server exited ({}), restarting", status);
                    manager.child_process = None;
                }
                Err(e) => return Err(self.fail(format!("llama-server state unknown: {}", e))),
            }
        }

        self.start_internal(&mut manager).await?;
        Ok(base_url(manager.options.port))
    }

    async fn start_internal(&self, manager: &mut LlamaManager) -> Result<(), RagError> {
        let options = manager.options.clone();

        let mut cmd = Command::new(&manager.server_path);
        cmd.arg("-m").arg(&self.model_path);
        cmd.arg("--port").arg(options.port.to_string());
        cmd.arg("-c").arg(options.n_ctx.to_string());
        if let Some(threads) = options.n_threads {
            cmd.arg("-t").arg(threads.to_string());
        }
        if options.n_gpu_layers >= 0 {
            cmd.arg("-ngl").arg(options.n_gpu_layers.to_string());
        } else {
            // offload every layer
            cmd.arg("-ngl").arg("999");
        }
        if self.role == ServerRole::Embedding {
            cmd.arg("--embedding");
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::info!(
            "Starting llama-server for {} on port {}",
            self.model_path.display(),
            options.port
        );
        let mut child = cmd
            .spawn()
            .map_err(|e| self.fail(format!("Failed to spawn llama-server: {}", e)))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    tracing::debug!("[llama-server] {}", line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    tracing::debug!("[llama-server-err] {}", line);
                }
            });
        }

        manager.child_process = Some(child);
        if let Err(err) = self.wait_for_health(options.port).await {
            if let Some(mut child) = manager.child_process.take() {
                let _ = child.kill().await;
            }
            return Err(err);
        }
        Ok(())
    }

    async fn wait_for_health(&self, port: u16) -> Result<(), RagError> {
        let url = format!("{}/health", base_url(port));
        for _ in 0..MAX_SERVER_RETRIES {
            if let Ok(res) = self.client.get(&url).send().await {
                if res.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Err(self.fail("Timed out waiting for llama-server"))
    }

    fn completion_body(&self, request: &ChatRequest, stream: bool) -> Value {
        json!({
            "prompt": format_chat_prompt(&request.messages),
            "stream": stream,
            "n_predict": request.max_tokens.unwrap_or(DEFAULT_PREDICT_LEN),
            "temperature": request.temperature.unwrap_or(0.7),
            "stop": request
                .stop
                .clone()
                .unwrap_or_else(|| vec!["User:".to_string(), "System:".to_string()]),
        })
    }

    async fn post_completion(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, RagError> {
        let url = format!("{}/completion", self.ensure_running().await?);
        let res = self
            .client
            .post(&url)
            .json(&self.completion_body(request, stream))
            .send()
            .await
            .map_err(RagError::llm)?;

        if !res.status().is_success() {
            return Err(RagError::Llm(format!(
                "llama-server error: {}",
                res.status()
            )));
        }
        Ok(res)
    }
}

fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

fn find_server_binary(paths: &AppPaths) -> PathBuf {
    let candidates = [
        paths.project_root.join("bin/llama-server.exe"),
        paths.project_root.join("bin/llama-server"),
    ];

    for path in candidates {
        if path.exists() {
            return path;
        }
    }
    which::which("llama-server").unwrap_or_else(|_| PathBuf::from("llama-server"))
}

fn capitalize(role: &str) -> String {
    let mut chars = role.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Flattens chat messages into the plain-text prompt `/completion` expects.
pub fn format_chat_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for msg in messages {
        prompt.push_str(&format!("{}: {}\n", capitalize(&msg.role), msg.content));
    }
    prompt.push_str("Assistant: ");
    prompt
}

/// Decodes one SSE line of a streamed `/completion`.
pub fn parse_completion_line(line: &str) -> Result<StreamEvent, RagError> {
    let Some(data) = sse_data(line) else {
        return Ok(StreamEvent::Skip);
    };
    let value: Value = serde_json::from_str(data)
        .map_err(|e| RagError::Llm(format!("malformed llama-server chunk: {}", e)))?;

    if let Some(content) = value["content"].as_str() {
        if !content.is_empty() {
            return Ok(StreamEvent::Token(content.to_string()));
        }
    }
    if value["stop"].as_bool().unwrap_or(false) {
        return Ok(StreamEvent::Done);
    }
    Ok(StreamEvent::Skip)
}

/// `/embedding` answers `{"embedding": [..]}` on older builds and
/// `[{"index": 0, "embedding": [[..]]}]` on newer ones.
pub fn parse_embedding(value: &Value) -> Option<Vec<f32>> {
    let embedding = match value {
        Value::Array(items) => items.first()?.get("embedding")?,
        other => other.get("embedding")?,
    };
    let row = match embedding.as_array()?.first() {
        Some(Value::Array(_)) => embedding.as_array()?.first()?,
        _ => embedding,
    };
    serde_json::from_value(row.clone()).ok()
}

#[async_trait]
impl LlmProvider for LlamaServer {
    fn name(&self) -> &str {
        "llama_server"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        Ok(self.ensure_running().await.is_ok())
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, RagError> {
        let res = self.post_completion(&request, false).await?;
        let data: Value = res.json().await.map_err(RagError::llm)?;
        Ok(data["content"].as_str().unwrap_or_default().to_string())
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream, RagError> {
        let res = self.post_completion(&request, true).await?;
        Ok(spawn_token_stream(res, parse_completion_line))
    }
}

#[async_trait]
impl Embedder for LlamaServer {
    fn model_id(&self) -> String {
        let name = self
            .model_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.model_path.display().to_string());
        format!("llama_server:{}", name)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/embedding", self.ensure_running().await?);

        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            let res = self
                .client
                .post(&url)
                .json(&json!({ "content": input }))
                .send()
                .await
                .map_err(RagError::embedding)?;

            if !res.status().is_success() {
                return Err(RagError::EmbeddingServiceUnavailable(format!(
                    "llama-server error: {}",
                    res.status()
                )));
            }

            let data: Value = res.json().await.map_err(RagError::embedding)?;
            let embedding = parse_embedding(&data).ok_or_else(|| {
                RagError::EmbeddingServiceUnavailable("invalid embedding response".to_string())
            })?;
            results.push(embedding);
        }

        Ok(results)
    }
}

impl std::fmt::Debug for LlamaServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlamaServer")
            .field("model_path", &self.model_path)
            .field("role", &self.role)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_turns_and_leaves_room_for_the_answer() {
        let prompt = format_chat_prompt(&[
            ChatMessage {
                role: "system".to_string(),
                content: "Be brief.".to_string(),
            },
            ChatMessage::user("Best crust?"),
        ]);
        assert_eq!(prompt, "System: Be brief.\nUser: Best crust?\nAssistant: ");
    }

    #[test]
    fn completion_chunks_decode() {
        assert_eq!(
            parse_completion_line(r#"data: {"content":"Deep","stop":false}"#).unwrap(),
            StreamEvent::Token("Deep".to_string())
        );
        assert_eq!(
            parse_completion_line(r#"data: {"content":"","stop":true}"#).unwrap(),
            StreamEvent::Done
        );
        assert_eq!(parse_completion_line("event: ping").unwrap(), StreamEvent::Skip);
    }

    #[test]
    fn both_embedding_shapes_parse() {
        let flat = json!({ "embedding": [0.5, 0.25] });
        let nested = json!([{ "index": 0, "embedding": [[0.5, 0.25]] }]);
        assert_eq!(parse_embedding(&flat), Some(vec![0.5, 0.25]));
        assert_eq!(parse_embedding(&nested), Some(vec![0.5, 0.25]));
        assert_eq!(parse_embedding(&json!({ "error": "no" })), None);
    }

    #[test]
    fn missing_model_file_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::with_dirs(tmp.path().to_path_buf(), tmp.path().join("data"));
        let err = LlamaServer::new(&paths, tmp.path().join("absent.gguf"), ServerRole::Chat)
            .unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn model_id_uses_the_file_name() {
        let tmp = tempfile::tempdir().unwrap();
        let model = tmp.path().join("nomic-embed.gguf");
        std::fs::write(&model, b"gguf").unwrap();
        let paths = AppPaths::with_dirs(tmp.path().to_path_buf(), tmp.path().join("data"));

        let server = LlamaServer::new(&paths, model, ServerRole::Embedding).unwrap();
        assert_eq!(server.model_id(), "llama_server:nomic-embed.gguf");
        assert_eq!(server.name(), "llama_server");
    }
}
