use anyhow::{Context, Result, anyhow};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::http_errors::api_request_error;
use super::{
    CompletionFuture, CompletionInvoker, CompletionRequest, Endpoint, MISSING_API_KEY_REPLY,
    NO_RESPONSE_REPLY, reply_tokens,
};
use crate::config::Config;

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: i64,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: i64,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

fn api_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// Invoker backed by an OpenAI-compatible HTTP API. The `endpoint` setting
/// picks between text completions, chat completions and the model listing.
pub struct OpenAiInvoker<'a> {
    client: &'a Client,
    cfg: &'a Config,
}

impl<'a> OpenAiInvoker<'a> {
    pub fn new(client: &'a Client, cfg: &'a Config) -> Self {
        Self { client, cfg }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Vec<String>> {
        let url = api_url(&self.cfg.base_url, "completions");
        let prompt = request.prompt();
        let body = CompletionBody {
            model: &self.cfg.completion_model,
            prompt: &prompt,
            max_tokens: request.settings.max_tokens,
            temperature: request.settings.temperature,
        };

        let parsed: Option<CompletionResponse> =
            self.fetch(self.client.post(&url).json(&body), &url).await?;
        let text = parsed
            .and_then(|response| response.choices.into_iter().next())
            .map(|choice| choice.text);
        Ok(self.reply_or_diagnostic(text.as_deref()))
    }

    async fn chat(&self, request: &CompletionRequest) -> Result<Vec<String>> {
        let url = api_url(&self.cfg.base_url, "chat/completions");
        let prompt = request.prompt();
        let body = ChatBody {
            model: &self.cfg.chat_model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            max_tokens: request.settings.max_tokens,
            temperature: request.settings.temperature,
        };

        let parsed: Option<ChatResponse> =
            self.fetch(self.client.post(&url).json(&body), &url).await?;
        let text = parsed
            .and_then(|response| response.choices.into_iter().next())
            .and_then(|choice| choice.message.content);
        Ok(self.reply_or_diagnostic(text.as_deref()))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = api_url(&self.cfg.base_url, "models");
        let parsed: Option<ModelList> = self.fetch(self.client.get(&url), &url).await?;
        let ids = parsed
            .map(|list| {
                list.data
                    .into_iter()
                    .map(|model| model.id)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();
        Ok(self.reply_or_diagnostic(Some(ids.as_str())))
    }

    /// Sends the request and decodes the body. Returns `Ok(None)` when the
    /// service rejected a request that carried no credential.
    async fn fetch<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        url: &str,
    ) -> Result<Option<T>> {
        let builder = match &self.cfg.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        };
        debug!(api_url = %url, "sending completion request");

        let response = builder.send().await.map_err(|err| {
            warn!(api_url = %url, error = %err, "completion request failed");
            api_request_error(err, url, self.cfg.timeout_secs)
        })?;

        let status = response.status();
        if !status.is_success() {
            if self.cfg.api_key.is_none()
                && matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
            {
                return Ok(None);
            }

            let response_body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read response body>".to_string());
            warn!(
                api_url = %url,
                status = %status,
                response_body_len = response_body.len(),
                "completion service returned non-success status"
            );
            return Err(anyhow!(
                "request failed with status {}: {}",
                status,
                response_body.trim()
            ));
        }

        let parsed = response
            .json::<T>()
            .await
            .with_context(|| format!("failed to parse response from '{url}'"))?;
        Ok(Some(parsed))
    }

    fn reply_or_diagnostic(&self, text: Option<&str>) -> Vec<String> {
        let tokens = text.map(reply_tokens).unwrap_or_default();
        if !tokens.is_empty() {
            return tokens;
        }

        let diagnostic = if self.cfg.api_key.is_none() {
            MISSING_API_KEY_REPLY
        } else {
            NO_RESPONSE_REPLY
        };
        debug!(diagnostic, "completion produced no reply text");
        reply_tokens(diagnostic)
    }
}

impl CompletionInvoker for OpenAiInvoker<'_> {
    fn invoke<'b>(&'b self, request: CompletionRequest) -> CompletionFuture<'b> {
        Box::pin(async move {
            debug!(
                endpoint = request.settings.endpoint.as_str(),
                prompt_tokens = request.prompt_tokens.len(),
                "invoking completion"
            );
            match request.settings.endpoint {
                Endpoint::Completions => self.complete(&request).await,
                Endpoint::Chat => self.chat(&request).await,
                Endpoint::Models => self.list_models().await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    use reqwest::Client;

    use super::{OpenAiInvoker, api_url};
    use crate::completion::{CompletionInvoker, CompletionRequest, CompletionSettings, Endpoint};
    use crate::config::Config;

    fn read_http_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let read = stream.read(&mut chunk).expect("read should succeed");
            if read == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..read]);

            if let Some(header_end) = buf.windows(4).position(|window| window == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
                let content_length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serves one canned response and hands back the raw request it received.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        let addr = listener.local_addr().expect("address should be available");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept should succeed");
            let request = read_http_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .expect("write should succeed");
            request
        });
        (format!("http://{addr}/v1"), handle)
    }

    fn test_config(base_url: String, api_key: Option<&str>) -> Config {
        Config {
            api_key: api_key.map(str::to_string),
            base_url,
            completion_model: "text-davinci-003".to_string(),
            chat_model: "gpt-3.5-turbo".to_string(),
            timeout_secs: 5,
        }
    }

    fn request(endpoint: Endpoint, prompt: &[&str]) -> CompletionRequest {
        CompletionRequest {
            prompt_tokens: prompt.iter().map(|token| token.to_string()).collect(),
            settings: CompletionSettings {
                endpoint,
                max_tokens: 16,
                temperature: 0.5,
            },
        }
    }

    #[test]
    fn api_url_trims_trailing_slash() {
        assert_eq!(
            api_url("https://api.openai.com/v1/", "completions"),
            "https://api.openai.com/v1/completions"
        );
    }

    #[tokio::test]
    async fn completions_endpoint_posts_prompt_and_splits_reply() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"id":"cmpl-1","choices":[{"text":"\n\nfour is  the answer","index":0}]}"#,
        );
        let client = Client::new();
        let cfg = test_config(base_url, Some("sk-test"));
        let invoker = OpenAiInvoker::new(&client, &cfg);

        let reply = invoker
            .invoke(request(Endpoint::Completions, &["what", "is", "2+2"]))
            .await
            .expect("completion should succeed");
        assert_eq!(reply, vec!["four", "is", "the", "answer"]);

        let raw = server.join().expect("server thread should join");
        let lowered = raw.to_ascii_lowercase();
        assert!(raw.starts_with("POST /v1/completions "), "request: {raw}");
        assert!(lowered.contains("authorization: bearer sk-test"), "request: {raw}");
        assert!(raw.contains(r#""prompt":"what is 2+2""#), "request: {raw}");
        assert!(raw.contains(r#""max_tokens":16"#), "request: {raw}");
        assert!(raw.contains(r#""temperature":0.5"#), "request: {raw}");
        assert!(raw.contains(r#""model":"text-davinci-003""#), "request: {raw}");
    }

    #[tokio::test]
    async fn chat_endpoint_sends_user_message() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"hi there"}}]}"#,
        );
        let client = Client::new();
        let cfg = test_config(base_url, Some("sk-test"));
        let invoker = OpenAiInvoker::new(&client, &cfg);

        let reply = invoker
            .invoke(request(Endpoint::Chat, &["hello"]))
            .await
            .expect("chat should succeed");
        assert_eq!(reply, vec!["hi", "there"]);

        let raw = server.join().expect("server thread should join");
        assert!(raw.starts_with("POST /v1/chat/completions "), "request: {raw}");
        assert!(
            raw.contains(r#""messages":[{"role":"user","content":"hello"}]"#),
            "request: {raw}"
        );
        assert!(raw.contains(r#""model":"gpt-3.5-turbo""#), "request: {raw}");
    }

    #[tokio::test]
    async fn models_endpoint_lists_model_ids() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"object":"list","data":[{"id":"gpt-4o"},{"id":"davinci-002"}]}"#,
        );
        let client = Client::new();
        let cfg = test_config(base_url, Some("sk-test"));
        let invoker = OpenAiInvoker::new(&client, &cfg);

        let reply = invoker
            .invoke(request(Endpoint::Models, &["ignored"]))
            .await
            .expect("listing should succeed");
        assert_eq!(reply, vec!["gpt-4o", "davinci-002"]);

        let raw = server.join().expect("server thread should join");
        assert!(raw.starts_with("GET /v1/models "), "request: {raw}");
    }

    #[tokio::test]
    async fn empty_choices_produce_plain_text_diagnostic() {
        let (base_url, server) = serve_once("200 OK", r#"{"choices":[]}"#);
        let client = Client::new();
        let cfg = test_config(base_url, Some("sk-test"));
        let invoker = OpenAiInvoker::new(&client, &cfg);

        let reply = invoker
            .invoke(request(Endpoint::Completions, &["hello"]))
            .await
            .expect("degenerate result is not an error");
        assert_eq!(reply.join(" "), "vyx: unable to generate a response");
        server.join().expect("server thread should join");
    }

    #[tokio::test]
    async fn rejected_request_without_key_reports_missing_credential() {
        let (base_url, server) = serve_once(
            "401 Unauthorized",
            r#"{"error":{"message":"You didn't provide an API key."}}"#,
        );
        let client = Client::new();
        let cfg = test_config(base_url, None);
        let invoker = OpenAiInvoker::new(&client, &cfg);

        let reply = invoker
            .invoke(request(Endpoint::Chat, &["hello"]))
            .await
            .expect("missing credential is not an error");
        assert_eq!(reply.join(" "), "vyx: missing OPENAI_API_KEY");

        let raw = server.join().expect("server thread should join");
        assert!(!raw.to_ascii_lowercase().contains("authorization:"));
    }

    #[tokio::test]
    async fn non_success_status_with_key_is_an_error() {
        let (base_url, server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#);
        let client = Client::new();
        let cfg = test_config(base_url, Some("sk-test"));
        let invoker = OpenAiInvoker::new(&client, &cfg);

        let err = invoker
            .invoke(request(Endpoint::Completions, &["hello"]))
            .await
            .expect_err("server error should fail");
        let msg = format!("{err:#}");
        assert!(msg.contains("status 500"), "unexpected message: {msg}");
        assert!(msg.contains("boom"), "unexpected message: {msg}");
        server.join().expect("server thread should join");
    }
}
