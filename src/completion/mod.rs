mod http_errors;
pub mod openai;

use anyhow::Result;
use std::future::Future;
use std::pin::Pin;

pub use openai::OpenAiInvoker;

pub(crate) const MISSING_API_KEY_REPLY: &str = "vyx: missing OPENAI_API_KEY";
pub(crate) const NO_RESPONSE_REPLY: &str = "vyx: unable to generate a response";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endpoint {
    #[default]
    Chat,
    Completions,
    Models,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "chat" => Some(Self::Chat),
            "completions" => Some(Self::Completions),
            "models" => Some(Self::Models),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Completions => "completions",
            Self::Models => "models",
        }
    }
}

/// The slice of the interactive settings an invoker needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionSettings {
    pub endpoint: Endpoint,
    pub max_tokens: i64,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt_tokens: Vec<String>,
    pub settings: CompletionSettings,
}

impl CompletionRequest {
    pub fn prompt(&self) -> String {
        self.prompt_tokens.join(" ")
    }
}

pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<String>>> + 'a>>;

/// Turns a prompt plus current settings into reply tokens. Degenerate but
/// non-failing outcomes (no credential, empty result) come back as a plain
/// text reply rather than an error.
pub trait CompletionInvoker {
    fn invoke<'a>(&'a self, request: CompletionRequest) -> CompletionFuture<'a>;
}

pub(crate) fn reply_tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::{CompletionRequest, CompletionSettings, Endpoint, reply_tokens};

    #[test]
    fn endpoint_parses_known_names_only() {
        for endpoint in [Endpoint::Chat, Endpoint::Completions, Endpoint::Models] {
            assert_eq!(Endpoint::parse(endpoint.as_str()), Some(endpoint));
        }
        assert_eq!(Endpoint::parse("CHAT"), None);
        assert_eq!(Endpoint::default(), Endpoint::Chat);
    }

    #[test]
    fn request_prompt_joins_tokens_with_single_spaces() {
        let request = CompletionRequest {
            prompt_tokens: vec!["hello".into(), "there".into()],
            settings: CompletionSettings {
                endpoint: Endpoint::Chat,
                max_tokens: 16,
                temperature: 1.0,
            },
        };
        assert_eq!(request.prompt(), "hello there");
    }

    #[test]
    fn reply_tokens_split_on_any_whitespace() {
        assert_eq!(
            reply_tokens("  four\n\nis the\tanswer "),
            vec!["four", "is", "the", "answer"]
        );
        assert!(reply_tokens(" \n ").is_empty());
    }
}
