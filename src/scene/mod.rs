use crate::config::{is_file_component, PromptStrategy};
use crate::error::{IllustratorError, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct SceneDocument {
    scenes: Vec<SceneRecord>,
}

#[derive(Debug, Deserialize)]
struct SceneRecord {
    scene_number: Option<u32>,
    description: Option<String>,
    prompts: Option<IndexMap<String, String>>,
}

/// One scene from the input document
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    /// Declared `scene_number`, or the 1-based position when absent
    pub index: u32,
    /// Free-text description, used by the generative strategy
    pub description: Option<String>,
    /// Literal prompts keyed by variant label, in document order
    pub prompts: Option<IndexMap<String, String>>,
}

/// Scenes in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneCollection {
    scenes: Vec<Scene>,
}

impl SceneCollection {
    /// Reads and parses the input document at `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading scenes from {}", path.display());

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IllustratorError::NotFound(path.display().to_string())
            } else {
                IllustratorError::Io(e)
            }
        })?;

        let scenes = Self::parse(&content)?;
        info!("Loaded {} scenes", scenes.len());
        Ok(scenes)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let document: SceneDocument = serde_json::from_str(content)
            .map_err(|e| IllustratorError::DataFormat(e.to_string()))?;

        let scenes = document
            .scenes
            .into_iter()
            .enumerate()
            .map(|(i, record)| Scene {
                index: record.scene_number.unwrap_or(i as u32 + 1),
                description: record.description,
                prompts: record.prompts,
            })
            .collect();

        Ok(Self { scenes })
    }

    /// Checks that every scene carries what `strategy` needs and that output
    /// filenames cannot collide.
    pub fn validate(&self, strategy: PromptStrategy) -> Result<()> {
        let mut seen = HashSet::new();
        for scene in &self.scenes {
            if !seen.insert(scene.index) {
                return Err(IllustratorError::DataFormat(format!(
                    "duplicate scene number {}",
                    scene.index
                )));
            }

            match strategy {
                PromptStrategy::Static => {
                    let prompts = scene.prompts.as_ref().ok_or_else(|| {
                        IllustratorError::DataFormat(format!("scene {} has no prompts", scene.index))
                    })?;
                    if let Some(label) = prompts.keys().find(|label| !is_file_component(label)) {
                        return Err(IllustratorError::DataFormat(format!(
                            "scene {} has an invalid variant label {:?}",
                            scene.index, label
                        )));
                    }
                }
                PromptStrategy::Generative { .. } => {
                    let has_description = scene
                        .description
                        .as_deref()
                        .is_some_and(|d| !d.trim().is_empty());
                    if !has_description {
                        return Err(IllustratorError::DataFormat(format!(
                            "scene {} has no description",
                            scene.index
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.iter()
    }
}
