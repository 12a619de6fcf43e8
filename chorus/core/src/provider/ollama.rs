//! Ollama Provider
//!
//! Completion provider for Ollama (local LLM server).
//!
//! # Ollama API
//!
//! - `/api/generate` - Generate completions (streaming NDJSON)
//! - `/api/tags` - List available models, used as a health check
//!
//! Each NDJSON line carries a `response` fragment and a `done` flag. Fragments
//! become [`ProviderEvent::Chunk`]s; `done: true` becomes [`ProviderEvent::Done`].

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::traits::{BackendConfig, CompletionProvider, CompletionRequest, ProviderEvent};
use crate::messages::MessageRole;

/// Default Ollama port
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// What one NDJSON line turned into
#[derive(Debug, PartialEq, Eq)]
enum LineEvent {
    Chunk(String),
    ChunkThenDone(String),
    Done,
    Error(String),
    Skip,
}

/// Byte buffer that yields complete NDJSON lines
///
/// Lines are decoded only once their terminating newline has arrived, so a
/// multi-byte character split across network reads is reassembled intact.
#[derive(Debug, Default)]
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Next newline-terminated line, without the newline
    fn next_line(&mut self) -> Option<String> {
        let pos = self.bytes.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.bytes.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line[..pos]).into_owned())
    }

    /// Whatever is left once the stream has ended
    fn finish(&mut self) -> Option<String> {
        if self.bytes.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.bytes);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Turn one line into provider events
fn line_events(line: &str) -> Vec<ProviderEvent> {
    match parse_line(line) {
        LineEvent::Chunk(text) => vec![ProviderEvent::Chunk(text)],
        LineEvent::ChunkThenDone(text) => vec![ProviderEvent::Chunk(text), ProviderEvent::Done],
        LineEvent::Done => vec![ProviderEvent::Done],
        LineEvent::Error(message) => vec![ProviderEvent::Error(message)],
        LineEvent::Skip => Vec::new(),
    }
}

/// Send one line's events; `false` once the stream is over
async fn forward(
    tx: &mpsc::Sender<ProviderEvent>,
    line: &str,
    received_text: &mut bool,
) -> bool {
    for event in line_events(line) {
        let terminal = event.is_terminal();
        *received_text |= matches!(event, ProviderEvent::Chunk(_));
        if tx.send(event).await.is_err() || terminal {
            return false;
        }
    }
    true
}

/// Ollama completion provider
#[derive(Clone)]
pub struct OllamaProvider {
    host: String,
    port: u16,
    channel_capacity: usize,
    http_client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    pub fn new(host: impl Into<String>, port: u16) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            host: host.into(),
            port,
            channel_capacity: 100,
            http_client,
        })
    }

    /// Create from `BackendConfig`, `None` for other backend kinds
    pub fn from_config(config: &BackendConfig) -> Option<anyhow::Result<Self>> {
        match config {
            BackendConfig::Ollama { host, port } => Some(Self::new(host.clone(), *port)),
            _ => None,
        }
    }

    /// Set the event channel capacity
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url())
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url())
    }

    /// Flatten system prompt, history and question into one prompt
    fn build_prompt(request: &CompletionRequest) -> String {
        let mut full_prompt = String::new();

        if let Some(ref system) = request.system {
            full_prompt.push_str(system);
            full_prompt.push_str("\n\n");
        }

        for message in &request.history {
            let speaker = match message.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
                MessageRole::System => "System",
            };
            full_prompt.push_str(speaker);
            full_prompt.push_str(": ");
            full_prompt.push_str(&message.content);
            full_prompt.push('\n');
        }

        full_prompt.push_str(&request.question);
        full_prompt
    }

    fn request_body(request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "prompt": Self::build_prompt(request),
            "stream": true,
            "options": { "temperature": request.temperature },
        });

        if request.max_tokens > 0 {
            body["options"]["num_predict"] = serde_json::json!(request.max_tokens);
        }

        body
    }
}

/// Interpret one NDJSON line
fn parse_line(line: &str) -> LineEvent {
    let line = line.trim();
    if line.is_empty() {
        return LineEvent::Skip;
    }

    let Ok(data) = serde_json::from_str::<serde_json::Value>(line) else {
        tracing::debug!(line, "Skipping malformed Ollama line");
        return LineEvent::Skip;
    };

    if let Some(error) = data.get("error").and_then(|e| e.as_str()) {
        return LineEvent::Error(error.to_string());
    }

    let token = data
        .get("response")
        .and_then(|r| r.as_str())
        .filter(|t| !t.is_empty())
        .map(String::from);
    let done = data
        .get("done")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    match (token, done) {
        (Some(token), true) => LineEvent::ChunkThenDone(token),
        (Some(token), false) => LineEvent::Chunk(token),
        (None, true) => LineEvent::Done,
        (None, false) => LineEvent::Skip,
    }
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.tags_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
    ) -> anyhow::Result<mpsc::Receiver<ProviderEvent>> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);

        let response = self
            .http_client
            .post(self.generate_url())
            .json(&Self::request_body(request))
            .send()
            .await
            .with_context(|| format!("Failed to reach Ollama at {}", self.base_url()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {status}: {body}");
        }

        let mut stream = response.bytes_stream();
        let model = request.model.clone();

        tokio::spawn(async move {
            let mut buffer = LineBuffer::default();
            let mut received_text = false;

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(ProviderEvent::Error(e.to_string())).await;
                        return;
                    }
                };
                buffer.push(&bytes);

                while let Some(line) = buffer.next_line() {
                    if !forward(&tx, &line, &mut received_text).await {
                        return;
                    }
                }
            }

            if let Some(line) = buffer.finish() {
                if !forward(&tx, &line, &mut received_text).await {
                    return;
                }
            }

            tracing::debug!(%model, received_text, "Ollama stream ended without done flag");
            let last = if received_text {
                ProviderEvent::Done
            } else {
                ProviderEvent::Error("Ollama closed the stream without a response".to_string())
            };
            let _ = tx.send(last).await;
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::HistoryMessage;

    #[test]
    fn test_ollama_provider_creation() {
        let provider = OllamaProvider::new("localhost", DEFAULT_OLLAMA_PORT).unwrap();
        assert_eq!(provider.base_url(), "http://localhost:11434");
        assert_eq!(provider.generate_url(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn test_build_prompt() {
        let request = CompletionRequest::new("Hello", "test");
        assert_eq!(OllamaProvider::build_prompt(&request), "Hello");

        let request = CompletionRequest::new("Hello", "test").with_system("Be helpful");
        assert_eq!(
            OllamaProvider::build_prompt(&request),
            "Be helpful\n\nHello"
        );

        let request = CompletionRequest::new("And now?", "test")
            .with_system("Be helpful")
            .with_history(vec![
                HistoryMessage {
                    role: MessageRole::User,
                    content: "Hi".to_string(),
                },
                HistoryMessage {
                    role: MessageRole::Assistant,
                    content: "Hey".to_string(),
                },
            ]);
        assert_eq!(
            OllamaProvider::build_prompt(&request),
            "Be helpful\n\nUser: Hi\nAssistant: Hey\nAnd now?"
        );
    }

    #[test]
    fn test_request_body_options() {
        let request = CompletionRequest::new("Hi", "llama3.2").with_max_tokens(64);
        let body = OllamaProvider::request_body(&request);

        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], true);
        assert_eq!(body["options"]["num_predict"], 64);
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line(r#"{"response":"Hel","done":false}"#),
            LineEvent::Chunk("Hel".to_string())
        );
        assert_eq!(
            parse_line(r#"{"response":"","done":true}"#),
            LineEvent::Done
        );
        assert_eq!(
            parse_line(r#"{"response":"!","done":true}"#),
            LineEvent::ChunkThenDone("!".to_string())
        );
        assert_eq!(
            parse_line(r#"{"error":"model not found"}"#),
            LineEvent::Error("model not found".to_string())
        );
        assert_eq!(parse_line("not json"), LineEvent::Skip);
        assert_eq!(parse_line("   "), LineEvent::Skip);
    }

    #[test]
    fn test_from_config() {
        let config = BackendConfig::ollama("example.com", 8080);
        let provider = OllamaProvider::from_config(&config).unwrap().unwrap();
        assert_eq!(provider.base_url(), "http://example.com:8080");

        let config = BackendConfig::Scripted {
            chunks: vec![],
            fail_with: None,
        };
        assert!(OllamaProvider::from_config(&config).is_none());
    }

    #[test]
    fn test_line_buffer_waits_for_whole_characters() {
        let line = "{\"response\":\"h\u{e9}llo\"}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut buffer = LineBuffer::default();

        buffer.push(&line[..split]);
        assert_eq!(buffer.next_line(), None);
        buffer.push(&line[split..]);
        assert_eq!(
            buffer.next_line().as_deref(),
            Some("{\"response\":\"h\u{e9}llo\"}")
        );
        assert_eq!(buffer.finish(), None);

        buffer.push(b"tail");
        assert_eq!(buffer.finish().as_deref(), Some("tail"));
    }

    /// Serve one NDJSON response, writing `parts` with a pause between them
    async fn serve_in_parts(parts: Vec<Vec<u8>>) -> u16 {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            // consume the request so closing the socket does not reset it
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for part in parts {
                socket.write_all(&part).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            let _ = socket.shutdown().await;
        });

        port
    }

    async fn collect(provider: &OllamaProvider) -> Vec<ProviderEvent> {
        let mut rx = provider
            .stream(&CompletionRequest::new("Hi", "llama3.2"))
            .await
            .unwrap();
        let mut events = Vec::new();
        while let Some(event) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
        {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn test_stream_keeps_characters_split_across_reads() {
        let body = "{\"response\":\"h\u{e9}llo\",\"done\":false}\n{\"response\":\"\",\"done\":true}\n";
        let bytes = body.as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let port = serve_in_parts(vec![bytes[..split].to_vec(), bytes[split..].to_vec()]).await;

        let provider = OllamaProvider::new("127.0.0.1", port).unwrap();
        assert_eq!(
            collect(&provider).await,
            vec![ProviderEvent::Chunk("h\u{e9}llo".to_string()), ProviderEvent::Done]
        );
    }

    #[tokio::test]
    async fn test_stream_flushes_unterminated_last_line() {
        let port = serve_in_parts(vec![
            b"{\"response\":\"a\",\"done\":false}\n".to_vec(),
            b"{\"response\":\"b\",\"done\":true}".to_vec(),
        ])
        .await;

        let provider = OllamaProvider::new("127.0.0.1", port).unwrap();
        assert_eq!(
            collect(&provider).await,
            vec![
                ProviderEvent::Chunk("a".to_string()),
                ProviderEvent::Chunk("b".to_string()),
                ProviderEvent::Done,
            ]
        );
    }
}
