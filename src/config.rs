use crate::error::{IllustratorError, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const OUTPUT_FORMAT: &str = "webp";
pub const OUTPUT_QUALITY: u8 = 80;
pub const ASPECT_RATIO: &str = "16:9";

const LORA_MODEL: &str =
    "marcusschiesser/flux-dev-me:5cbdafc09fe365d8ffadf39308246f2015a1774afc86ae9bf0d1717a77404352";
const PRO_MODEL: &str = "black-forest-labs/flux-pro";

/// How prompts are obtained for each scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStrategy {
    /// Literal prompts embedded in the scene under explicit variant labels.
    Static,
    /// Prompts written by a chat model from the scene description, `variants` per scene.
    Generative { variants: usize },
}

/// Parameter family sent to the image backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendProfile {
    /// Flux dev with a LoRA fine-tune.
    Lora,
    /// Flux pro.
    Pro,
}

impl BackendProfile {
    pub fn from_lora_flag(use_lora: bool) -> Self {
        if use_lora {
            BackendProfile::Lora
        } else {
            BackendProfile::Pro
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            BackendProfile::Lora => LORA_MODEL,
            BackendProfile::Pro => PRO_MODEL,
        }
    }
}

/// Where generated images are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLayout {
    Fixed(PathBuf),
    /// `root/{style}_{YYYY-MM-DD}`
    StyleDated { root: PathBuf },
}

impl OutputLayout {
    pub fn resolve(&self, style: &str, date: NaiveDate) -> PathBuf {
        match self {
            OutputLayout::Fixed(dir) => dir.clone(),
            OutputLayout::StyleDated { root } => {
                root.join(format!("{}_{}", style_slug(style), date.format("%Y-%m-%d")))
            }
        }
    }
}

/// Lowercased, with every run of non-alphanumeric characters collapsed to `_`.
pub fn style_slug(style: &str) -> String {
    let mut slug = String::with_capacity(style.len());
    for c in style.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        "unstyled".to_string()
    } else {
        slug
    }
}

/// Immutable settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub strategy: PromptStrategy,
    pub profile: BackendProfile,
    /// Replicate model identifier, `owner/name` or `owner/name:version`.
    pub model: String,
    pub layout: OutputLayout,
    pub style: String,
    pub output_format: &'static str,
}

impl PipelineConfig {
    pub fn new(strategy: PromptStrategy, profile: BackendProfile, style: impl Into<String>) -> Self {
        Self {
            strategy,
            profile,
            model: profile.default_model().to_string(),
            layout: OutputLayout::Fixed(PathBuf::from("output")),
            style: style.into(),
            output_format: OUTPUT_FORMAT,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()) {
            self.model = model;
        }
        self
    }

    pub fn with_layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn output_dir(&self, date: NaiveDate) -> PathBuf {
        self.layout.resolve(&self.style, date)
    }
}

/// Settings shared by the HTTP clients.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

/// API credentials, checked once before any scene is processed.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub replicate_token: String,
    pub openai_key: Option<String>,
}

impl Credentials {
    pub fn require(
        strategy: PromptStrategy,
        replicate_token: Option<String>,
        openai_key: Option<String>,
    ) -> Result<Self> {
        let replicate_token = non_empty(replicate_token)
            .ok_or(IllustratorError::MissingCredential("REPLICATE_API_TOKEN"))?;
        let openai_key = non_empty(openai_key);
        if matches!(strategy, PromptStrategy::Generative { .. }) && openai_key.is_none() {
            return Err(IllustratorError::MissingCredential("OPENAI_API_KEY"));
        }
        Ok(Self {
            replicate_token,
            openai_key,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn is_file_component(label: &str) -> bool {
    !label.is_empty()
        && label != "."
        && label != ".."
        && !label.contains(['/', '\\'])
        && Path::new(label).components().count() == 1
}
