mod api;
mod asset;
mod config;
mod error;
mod pipeline;
mod prompt;
mod scene;

use anyhow::Context;
use api::{ChatService, OpenAiClient, ReplicateClient};
use asset::HttpFetcher;
use clap::{Parser, ValueEnum};
use config::{BackendProfile, Credentials, HttpSettings, OutputLayout, PipelineConfig, PromptStrategy};
use error::Result;
use pipeline::{Pipeline, RunResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    /// Use the literal prompts in each scene
    Static,
    /// Ask a chat model for prompts based on each scene description
    Generative,
}

#[derive(Parser, Debug)]
#[command(name = "scene-illustrator")]
#[command(about = "Generate images for scene descriptions with Replicate", long_about = None)]
struct Args {
    /// Input JSON document with a top-level `scenes` list
    #[arg(default_value = "data.json")]
    input: PathBuf,

    /// How prompts are obtained
    #[arg(short, long, value_enum, default_value_t = StrategyArg::Static)]
    strategy: StrategyArg,

    /// Visual style appended to every prompt
    #[arg(long, default_value = "Ancient rome 0 Ad")]
    style: String,

    /// Images per scene in generative mode
    #[arg(short = 'n', long, default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..))]
    variants: u16,

    /// Output directory for images
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Write into `<output-dir>/<style>_<date>` instead of `<output-dir>`
    #[arg(long)]
    dated_output: bool,

    /// Also write the JSON result to this file
    #[arg(long)]
    results: Option<PathBuf>,

    /// Replicate API token
    #[arg(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    replicate_token: Option<String>,

    /// OpenAI API key (generative mode)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_key: Option<String>,

    /// Replicate model override, `owner/name` or `owner/name:version`
    #[arg(long, env = "REPLICATE_MODEL")]
    model: Option<String>,

    /// Use the LoRA parameter profile instead of flux-pro
    #[arg(
        long,
        env = "USE_LORA",
        action = clap::ArgAction::SetTrue,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    use_lora: bool,

    #[arg(long, env = "REPLICATE_API_BASE", default_value = api::replicate::DEFAULT_API_BASE)]
    replicate_api_base: String,

    #[arg(long, env = "OPENAI_API_BASE", default_value = api::openai::DEFAULT_API_BASE)]
    openai_api_base: String,

    /// Chat model used to write prompts
    #[arg(long, env = "OPENAI_MODEL", default_value = api::openai::DEFAULT_MODEL)]
    openai_model: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 300)]
    request_timeout: u64,

    /// Seconds between Replicate status polls
    #[arg(long, default_value_t = 2)]
    poll_interval: u64,

    /// Seconds to wait for a Replicate prediction
    #[arg(long, default_value_t = 300)]
    poll_timeout: u64,
}

impl Args {
    fn strategy(&self) -> PromptStrategy {
        match self.strategy {
            StrategyArg::Static => PromptStrategy::Static,
            StrategyArg::Generative => PromptStrategy::Generative {
                variants: usize::from(self.variants),
            },
        }
    }

    fn pipeline_config(&self) -> PipelineConfig {
        let layout = if self.dated_output {
            OutputLayout::StyleDated {
                root: self.output_dir.clone(),
            }
        } else {
            OutputLayout::Fixed(self.output_dir.clone())
        };

        PipelineConfig::new(
            self.strategy(),
            BackendProfile::from_lora_flag(self.use_lora),
            self.style.clone(),
        )
        .with_model(self.model.clone())
        .with_layout(layout)
    }

    fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            request_timeout: Duration::from_secs(self.request_timeout),
            poll_interval: Duration::from_secs(self.poll_interval),
            poll_timeout: Duration::from_secs(self.poll_timeout),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = args.pipeline_config();

    // Credentials are checked before anything touches the network
    let credentials = match Credentials::require(
        config.strategy,
        args.replicate_token.clone(),
        args.openai_key.clone(),
    ) {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Style: {}, strategy: {:?}, profile: {:?}, model: {}",
        config.style, config.strategy, config.profile, config.model
    );

    let result = match run_generation(&args, config, credentials).await {
        Ok(result) => result,
        Err(e) => {
            error!("Image generation failed: {}", e);
            std::process::exit(1);
        }
    };

    let rendered = serde_json::to_string_pretty(&result)?;
    if let Some(path) = &args.results {
        tokio::fs::write(path, &rendered)
            .await
            .with_context(|| format!("Failed to write results to {}", path.display()))?;
        info!("Results written to {}", path.display());
    }
    println!("{}", rendered);

    Ok(())
}

async fn run_generation(
    args: &Args,
    config: PipelineConfig,
    credentials: Credentials,
) -> Result<RunResult> {
    let settings = args.http_settings();

    // 1. Image backend
    let images = Arc::new(ReplicateClient::new(
        credentials.replicate_token,
        &args.replicate_api_base,
        config.model.clone(),
        config.profile,
        &settings,
    )?);

    // 2. Chat model, generative mode only
    let chat: Option<Arc<dyn ChatService>> = match (config.strategy, credentials.openai_key) {
        (PromptStrategy::Generative { .. }, Some(key)) => {
            let client = OpenAiClient::new(
                key,
                &args.openai_api_base,
                args.openai_model.clone(),
                settings.request_timeout,
            )?;
            Some(Arc::new(client) as Arc<dyn ChatService>)
        }
        _ => None,
    };

    // 3. Downloads
    let fetcher = Arc::new(HttpFetcher::new(settings.request_timeout)?);

    let pipeline = Pipeline::new(config, chat, images, fetcher)?;
    pipeline.run(&args.input).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_lora_accepts_boolish_env_values() {
        let cases = [
            ("1", true),
            ("yes", true),
            ("on", true),
            ("true", true),
            ("0", false),
            ("no", false),
            ("off", false),
            ("false", false),
        ];
        for (value, expected) in cases {
            std::env::set_var("USE_LORA", value);
            let args = Args::try_parse_from(["scene-illustrator"]).unwrap();
            assert_eq!(args.use_lora, expected, "USE_LORA={value}");
        }
        std::env::remove_var("USE_LORA");

        let args = Args::try_parse_from(["scene-illustrator"]).unwrap();
        assert_eq!(args.pipeline_config().profile, BackendProfile::Pro);

        let args = Args::try_parse_from(["scene-illustrator", "--use-lora"]).unwrap();
        assert_eq!(args.pipeline_config().profile, BackendProfile::Lora);
    }

    #[test]
    fn generative_strategy_carries_variant_count() {
        let args =
            Args::try_parse_from(["scene-illustrator", "--strategy", "generative", "-n", "4"]).unwrap();
        assert_eq!(args.strategy(), PromptStrategy::Generative { variants: 4 });
        assert!(Args::try_parse_from(["scene-illustrator", "-n", "0"]).is_err());
    }
}
