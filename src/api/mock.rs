//! In-memory service doubles for tests.

use super::{ChatService, ImageService};
use crate::asset::{FetchedAsset, Fetcher};
use crate::error::{IllustratorError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Returns a fixed completion and records every user prompt it receives.
pub struct MockChatClient {
    response: String,
    pub calls: Mutex<Vec<String>>,
}

impl MockChatClient {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatService for MockChatClient {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
        self.calls.lock().unwrap().push(prompt.to_string());
        Ok(self.response.clone())
    }
}

/// Replays queued outcomes; once the queue is empty every call succeeds with
/// a URL derived from the call number.
pub struct MockImageClient {
    outcomes: Mutex<VecDeque<Result<Vec<String>>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl MockImageClient {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn then_fail(self, message: &str) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(IllustratorError::Upstream(message.to_string())));
        self
    }

    pub fn then_urls(self, urls: &[&str]) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Ok(urls.iter().map(|u| u.to_string()).collect()));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageService for MockImageClient {
    async fn request_image(&self, prompt: &str) -> Result<Vec<String>> {
        let call = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            prompts.len()
        };
        match self.outcomes.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(vec![format!("https://replicate.delivery/mock/{call}.webp")]),
        }
    }
}

/// Answers every fetch with the same status and payload.
pub struct MockFetcher {
    status: u16,
    payload: Vec<u8>,
    pub urls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new(status: u16, payload: &[u8]) -> Self {
        Self {
            status,
            payload: payload.to_vec(),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.urls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(FetchedAsset {
            status: self.status,
            bytes: self.payload.clone(),
        })
    }
}
