//! Clients for the text- and image-generation services.

#[cfg(test)]
pub mod mock;
pub mod openai;
pub mod replicate;

pub use openai::OpenAiClient;
pub use replicate::ReplicateClient;

use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Single-turn chat completion.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Image generation from a finished prompt. Implementations return at least one URL.
#[async_trait]
pub trait ImageService: Send + Sync {
    async fn request_image(&self, prompt: &str) -> Result<Vec<String>>;
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}
