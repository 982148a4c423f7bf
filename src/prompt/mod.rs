use crate::api::ChatService;
use crate::config::PromptStrategy;
use crate::error::{IllustratorError, Result};
use crate::scene::Scene;
use std::sync::Arc;
use tracing::info;

const SYSTEM_INSTRUCTION: &str = "You are an assistant that writes prompts for image generation \
models. Reply with the image prompt only, as a single paragraph, without quotes, labels or commentary.";

/// One requested image for a scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub label: String,
    /// 1-based position among the scene's variants
    pub position: usize,
    pub total: usize,
}

/// Appends the style the way the image backend expects it.
pub fn styled(prompt: &str, style: &str) -> String {
    format!("{}. Style: {}", prompt, style)
}

/// Meta-prompt asking the chat model for one image prompt.
pub fn meta_prompt(description: &str, style: &str, variant: &Variant) -> String {
    format!(
        r#"Create a creative and unique prompt for an image generation model based on the scene description below.

Scene description:
{description}

Visual style: {style}

This is variation {position} of {total} for this scene. Pick a composition, viewpoint or moment that differs from the other variations and avoid repeating their wording.

Return only the image prompt."#,
        description = description.trim(),
        style = style,
        position = variant.position,
        total = variant.total,
    )
}

pub enum PromptResolver {
    Static,
    Generative {
        chat: Arc<dyn ChatService>,
        variants: usize,
    },
}

impl PromptResolver {
    pub fn new(strategy: PromptStrategy, chat: Option<Arc<dyn ChatService>>) -> Result<Self> {
        match strategy {
            PromptStrategy::Static => Ok(PromptResolver::Static),
            PromptStrategy::Generative { variants } => {
                let chat = chat.ok_or(IllustratorError::MissingCredential("OPENAI_API_KEY"))?;
                Ok(PromptResolver::Generative {
                    chat,
                    variants: variants.max(1),
                })
            }
        }
    }

    /// Declared prompt keys for static scenes, `v1..vN` otherwise.
    pub fn variants(&self, scene: &Scene) -> Vec<Variant> {
        let labels: Vec<String> = match self {
            PromptResolver::Static => scene
                .prompts
                .as_ref()
                .map(|prompts| prompts.keys().cloned().collect())
                .unwrap_or_default(),
            PromptResolver::Generative { variants, .. } => {
                (1..=*variants).map(|n| format!("v{n}")).collect()
            }
        };

        let total = labels.len();
        labels
            .into_iter()
            .enumerate()
            .map(|(i, label)| Variant {
                label,
                position: i + 1,
                total,
            })
            .collect()
    }

    pub async fn resolve(&self, scene: &Scene, variant: &Variant, style: &str) -> Result<String> {
        match self {
            PromptResolver::Static => {
                let literal = scene
                    .prompts
                    .as_ref()
                    .and_then(|prompts| prompts.get(&variant.label))
                    .ok_or_else(|| {
                        IllustratorError::DataFormat(format!(
                            "scene {} has no prompt for variant {}",
                            scene.index, variant.label
                        ))
                    })?;
                Ok(styled(literal, style))
            }
            PromptResolver::Generative { chat, .. } => {
                let description = scene.description.as_deref().unwrap_or_default();
                info!(
                    "Generating prompt for scene {} variant {}",
                    scene.index, variant.label
                );
                let text = chat
                    .complete(SYSTEM_INSTRUCTION, &meta_prompt(description, style, variant))
                    .await?;
                let text = text.trim();
                if text.is_empty() {
                    return Err(IllustratorError::Upstream(
                        "chat completion returned an empty prompt".to_string(),
                    ));
                }
                Ok(text.to_string())
            }
        }
    }

    /// The text submitted to the image backend for a resolved prompt. Static
    /// prompts already carry the style suffix; model output loses one trailing
    /// period so the suffix reads as a single sentence break.
    pub fn image_prompt(&self, resolved: &str, style: &str) -> String {
        match self {
            PromptResolver::Static => resolved.to_string(),
            PromptResolver::Generative { .. } => {
                let resolved = resolved.strip_suffix('.').unwrap_or(resolved);
                styled(resolved, style)
            }
        }
    }
}
