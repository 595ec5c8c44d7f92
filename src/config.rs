use std::env;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_COMPLETION_MODEL: &str = "text-davinci-003";
const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Runtime configuration read from the environment. Interactive settings
/// live in [`crate::settings`] and are never taken from here.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub completion_model: String,
    pub chat_model: String,
    pub timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        Self {
            api_key: non_empty(get_var("OPENAI_API_KEY")),
            base_url: non_empty(get_var("OPENAI_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            completion_model: non_empty(get_var("VYX_COMPLETION_MODEL"))
                .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
            chat_model: non_empty(get_var("VYX_CHAT_MODEL"))
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            timeout_secs: parse_timeout_secs(get_var("VYX_TIMEOUT_SECS").as_deref()),
        }
    }
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_timeout_secs(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}
