use super::{http_client, ImageService};
use crate::config::{BackendProfile, HttpSettings, ASPECT_RATIO, OUTPUT_FORMAT, OUTPUT_QUALITY};
use crate::error::{IllustratorError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const DEFAULT_API_BASE: &str = "https://api.replicate.com/v1";

#[derive(Debug, Clone)]
pub struct ReplicateClient {
    api_token: String,
    api_base: String,
    model: String,
    profile: BackendProfile,
    poll_interval: Duration,
    poll_timeout: Duration,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    status: String,
    output: Option<PredictionOutput>,
    error: Option<Value>,
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

/// LoRA models answer with a list of URLs, flux-pro with a bare URL.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PredictionOutput {
    Single(String),
    Many(Vec<String>),
}

impl PredictionOutput {
    pub fn into_urls(self) -> Vec<String> {
        let urls = match self {
            PredictionOutput::Single(url) => vec![url],
            PredictionOutput::Many(urls) => urls,
        };
        urls.into_iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect()
    }
}

/// Input parameters for `profile`, with `prompt` already styled.
pub fn build_input(profile: BackendProfile, prompt: &str) -> Value {
    let mut input = json!({
        "prompt": prompt,
        "aspect_ratio": ASPECT_RATIO,
        "output_format": OUTPUT_FORMAT,
        "output_quality": OUTPUT_QUALITY,
    });

    let extra = match profile {
        BackendProfile::Lora => json!({
            "model": "dev",
            "lora_scale": 1,
            "num_outputs": 1,
            "guidance_scale": 3.5,
            "prompt_strength": 0.8,
            "extra_lora_scale": 0.8,
            "num_inference_steps": 28,
        }),
        BackendProfile::Pro => json!({
            "steps": 25,
            "guidance": 3,
            "interval": 2,
            "safety_tolerance": 2,
        }),
    };

    if let (Some(input), Value::Object(extra)) = (input.as_object_mut(), extra) {
        input.extend(extra);
    }
    input
}

/// Versioned identifiers (`owner/name:hash`) go through `/predictions`,
/// bare `owner/name` through the model's own predictions endpoint.
fn prediction_request(api_base: &str, model: &str, input: Value) -> (String, Value) {
    match model.split_once(':') {
        Some((_, version)) => (
            format!("{}/predictions", api_base),
            json!({ "version": version, "input": input }),
        ),
        None => (
            format!("{}/models/{}/predictions", api_base, model),
            json!({ "input": input }),
        ),
    }
}

impl Prediction {
    fn is_pending(&self) -> bool {
        matches!(self.status.as_str(), "starting" | "processing")
    }

    fn poll_url(&self) -> Result<String> {
        self.urls
            .as_ref()
            .and_then(|urls| urls.get.clone())
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                IllustratorError::Upstream("Replicate prediction missing poll URL".to_string())
            })
    }
}

/// URLs of a finished prediction, or the reason it produced none.
fn settle(prediction: Prediction) -> Result<Vec<String>> {
    if prediction.status != "succeeded" {
        let reason = prediction
            .error
            .filter(|e| !e.is_null())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no error reported".to_string());
        warn!("Replicate prediction did not succeed: {}", reason);
        return Err(IllustratorError::Upstream(format!(
            "Replicate prediction {}: {}",
            prediction.status, reason
        )));
    }

    let urls = prediction
        .output
        .map(PredictionOutput::into_urls)
        .unwrap_or_default();
    if urls.is_empty() {
        return Err(IllustratorError::Upstream(
            "Replicate response returned no image URLs".to_string(),
        ));
    }
    Ok(urls)
}

fn check_deadline(elapsed: Duration, timeout: Duration) -> Result<()> {
    if elapsed >= timeout {
        return Err(IllustratorError::Upstream(format!(
            "Replicate prediction timed out after {}s",
            timeout.as_secs()
        )));
    }
    Ok(())
}

impl ReplicateClient {
    pub fn new(
        api_token: String,
        api_base: &str,
        model: String,
        profile: BackendProfile,
        settings: &HttpSettings,
    ) -> Result<Self> {
        Ok(Self {
            api_token,
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            model,
            profile,
            poll_interval: settings.poll_interval,
            poll_timeout: settings.poll_timeout,
            client: http_client(settings.request_timeout)?,
        })
    }

    async fn read_prediction(&self, response: reqwest::Response) -> Result<Prediction> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(IllustratorError::Upstream(format!(
                "Replicate API error (HTTP {}): {}",
                status, error_text
            )));
        }
        response.json().await.map_err(|e| {
            IllustratorError::Upstream(format!("malformed Replicate response: {e}"))
        })
    }

    async fn wait_for_prediction(&self, poll_url: &str) -> Result<Prediction> {
        let started = Instant::now();

        loop {
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .client
                .get(poll_url)
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(|e| IllustratorError::Upstream(format!("Replicate poll failed: {e}")))?;

            let prediction = self.read_prediction(response).await?;
            if !prediction.is_pending() {
                return Ok(prediction);
            }
            info!(
                "Prediction status: {} ({}s elapsed)",
                prediction.status,
                started.elapsed().as_secs()
            );
            check_deadline(started.elapsed(), self.poll_timeout)?;
        }
    }
}

#[async_trait]
impl ImageService for ReplicateClient {
    async fn request_image(&self, prompt: &str) -> Result<Vec<String>> {
        info!(
            "Calling Replicate API with prompt: {}...",
            prompt.chars().take(50).collect::<String>()
        );

        let input = build_input(self.profile, prompt);
        let (endpoint, body) = prediction_request(&self.api_base, &self.model, input);

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .map_err(|e| IllustratorError::Upstream(format!("Replicate request failed: {e}")))?;

        let mut prediction = self.read_prediction(response).await?;
        if prediction.is_pending() {
            let poll_url = prediction.poll_url()?;
            info!("Prediction still running, polling {}", poll_url);
            prediction = self.wait_for_prediction(&poll_url).await?;
        }

        let urls = settle(prediction)?;
        info!("Replicate API call completed");
        Ok(urls)
    }
}
