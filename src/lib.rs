pub mod completion;
pub mod config;
pub mod logging;
pub mod repl;
pub mod settings;
pub mod ui;

use anyhow::{Context, Result};
use reqwest::Client;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use completion::{CompletionInvoker, CompletionRequest, OpenAiInvoker};
use config::Config;
use repl::Interpreter;
use settings::{FieldRegistry, Settings};
use ui::StdUi;

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    let cfg = Config::from_env();
    info!(
        base_url = %cfg.base_url,
        completion_model = %cfg.completion_model,
        chat_model = %cfg.chat_model,
        timeout_secs = cfg.timeout_secs,
        api_key_present = cfg.api_key.is_some(),
        "loaded runtime configuration"
    );

    let client = Client::builder()
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .build()
        .context("Failed to initialize HTTP client")?;
    let registry = FieldRegistry::builtin().context("Failed to build settings registry")?;
    let settings = Settings::new(Arc::new(registry));
    let invoker = OpenAiInvoker::new(&client, &cfg);

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        Interpreter::new(StdUi::new(), &settings, &invoker).run().await
    } else {
        let request = CompletionRequest {
            prompt_tokens: args
                .iter()
                .flat_map(|arg| arg.split_whitespace())
                .map(str::to_string)
                .collect(),
            settings: settings.completion_settings(),
        };
        let reply = invoker.invoke(request).await?;
        println!("{}", reply.join(" "));
        Ok(())
    }
}
