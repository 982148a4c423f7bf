use crate::api::{ChatService, ImageService};
use crate::asset::{Fetcher, Materializer};
use crate::config::PipelineConfig;
use crate::error::{IllustratorError, Result};
use crate::prompt::{PromptResolver, Variant};
use crate::scene::{Scene, SceneCollection};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    /// Image downloaded to `filename`
    Saved,
    /// Generation succeeded but the download did not
    DownloadFailed,
    /// Prompt or image generation failed
    Failed,
}

/// Outcome of one variant. Field names match the JSON consumed downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageResult {
    #[serde(rename = "version")]
    pub variant_label: String,
    #[serde(rename = "url")]
    pub source_url: Option<String>,
    #[serde(rename = "filename")]
    pub local_filename: String,
    #[serde(rename = "prompt")]
    pub prompt_text: Option<String>,
    pub status: ImageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneResult {
    #[serde(rename = "scene_number")]
    pub scene_index: u32,
    pub images: Vec<ImageResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RunResult {
    pub scenes: Vec<SceneResult>,
}

impl RunResult {
    pub fn count(&self, status: ImageStatus) -> usize {
        self.scenes
            .iter()
            .flat_map(|scene| &scene.images)
            .filter(|image| image.status == status)
            .count()
    }
}

pub fn image_filename(scene_index: u32, variant_label: &str, format: &str) -> String {
    format!("scene_{}_{}.{}", scene_index, variant_label, format)
}

pub struct Pipeline {
    config: PipelineConfig,
    resolver: PromptResolver,
    images: Arc<dyn ImageService>,
    materializer: Materializer,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        chat: Option<Arc<dyn ChatService>>,
        images: Arc<dyn ImageService>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let resolver = PromptResolver::new(config.strategy, chat)?;
        Ok(Self {
            config,
            resolver,
            images,
            materializer: Materializer::new(fetcher),
        })
    }

    /// Loads the document at `input` and generates every requested image.
    /// Input errors abort before any API call; per-variant failures are
    /// recorded in the result.
    pub async fn run(&self, input: &Path) -> Result<RunResult> {
        info!("Starting image generation process");

        let scenes = SceneCollection::load(input).await?;
        scenes.validate(self.config.strategy)?;
        if scenes.is_empty() {
            warn!("Input document has no scenes");
        }

        let output_dir = self.config.output_dir(chrono::Local::now().date_naive());
        let result = self.process(&scenes, &output_dir).await;

        info!(
            "Image generation process completed: {} saved, {} download failures, {} failed",
            result.count(ImageStatus::Saved),
            result.count(ImageStatus::DownloadFailed),
            result.count(ImageStatus::Failed)
        );
        Ok(result)
    }

    pub async fn process(&self, scenes: &SceneCollection, output_dir: &Path) -> RunResult {
        let mut result = RunResult::default();
        let total_scenes = scenes.len();

        for (i, scene) in scenes.iter().enumerate() {
            info!(
                "Processing scene {} ({}/{})",
                scene.index,
                i + 1,
                total_scenes
            );

            let mut scene_result = SceneResult {
                scene_index: scene.index,
                images: Vec::new(),
            };
            for variant in self.resolver.variants(scene) {
                info!("Generating image for version {}", variant.label);
                let image = self.process_variant(scene, &variant, output_dir).await;
                scene_result.images.push(image);
            }
            result.scenes.push(scene_result);
        }

        result
    }

    async fn process_variant(&self, scene: &Scene, variant: &Variant, output_dir: &Path) -> ImageResult {
        let mut record = ImageResult {
            variant_label: variant.label.clone(),
            source_url: None,
            local_filename: image_filename(scene.index, &variant.label, self.config.output_format),
            prompt_text: None,
            status: ImageStatus::Failed,
            error: None,
        };

        // 1. Prompt
        let resolved = match self.resolver.resolve(scene, variant, &self.config.style).await {
            Ok(resolved) => resolved,
            Err(e) => return fail(record, e),
        };

        // 2. Image generation
        let prompt = self.resolver.image_prompt(&resolved, &self.config.style);
        record.prompt_text = Some(prompt.clone());
        let url = match self.images.request_image(&prompt).await {
            Ok(urls) => match urls.into_iter().next() {
                Some(url) => url,
                None => {
                    return fail(
                        record,
                        IllustratorError::Upstream("image backend returned no URLs".to_string()),
                    )
                }
            },
            Err(e) => return fail(record, e),
        };
        record.source_url = Some(url.clone());

        // 3. Download
        match self
            .materializer
            .save(&url, output_dir, &record.local_filename)
            .await
        {
            Ok(_) => record.status = ImageStatus::Saved,
            Err(e) => {
                warn!("Scene {} version {}: {}", scene.index, variant.label, e);
                record.status = ImageStatus::DownloadFailed;
                record.error = Some(e.to_string());
            }
        }
        record
    }
}

fn fail(mut record: ImageResult, error: IllustratorError) -> ImageResult {
    warn!("Version {} failed: {}", record.variant_label, error);
    record.status = ImageStatus::Failed;
    record.error = Some(error.to_string());
    record
}
