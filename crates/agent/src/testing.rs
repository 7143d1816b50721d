//! Deterministic provider for tests across the workspace.
//!
//! [`ScriptedProvider`] replays queued completions (or errors) in order and
//! embeds text with [`hash_embedding`], a bag-of-words hash, so texts that
//! share words land close together without a real model.

use async_trait::async_trait;
use relaydesk_core::error::ProviderError;
use relaydesk_core::message::{Message, Role};
use relaydesk_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub struct ScriptedProvider {
    dimensions: usize,
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    embed_error: Mutex<Option<ProviderError>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
    complete_calls: AtomicUsize,
    embed_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            replies: Mutex::new(VecDeque::new()),
            embed_error: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            delay: None,
            complete_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
        }
    }

    /// Queue a successful completion.
    pub fn reply(self, text: impl Into<String>) -> Self {
        lock(&self.replies).push_back(Ok(text.into()));
        self
    }

    /// Queue a failed completion.
    pub fn fail(self, error: ProviderError) -> Self {
        lock(&self.replies).push_back(Err(error));
        self
    }

    /// Make every embedding call fail with `error`.
    pub fn fail_embeddings(self, error: ProviderError) -> Self {
        *lock(&self.embed_error) = Some(error);
        self
    }

    /// Sleep before answering any call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Every completion request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        lock(&self.requests).clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        // Unscripted calls echo the last user turn.
        let fallback = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| format!("echo: {}", m.content))
            .unwrap_or_else(|| "echo".into());
        let model = request.model.clone();
        lock(&self.requests).push(request);

        let text = lock(&self.replies).pop_front().unwrap_or(Ok(fallback))?;
        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model,
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if let Some(err) = lock(&self.embed_error).clone() {
            return Err(err);
        }
        Ok(EmbeddingResponse {
            embeddings: request
                .inputs
                .iter()
                .map(|text| hash_embedding(text, self.dimensions))
                .collect(),
            model: request.model,
            usage: None,
        })
    }
}

/// Bag-of-words embedding: each lowercase word bumps one FNV-1a bucket.
pub fn hash_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimensions.max(1)];
    let len = vector.len() as u64;
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in word.to_lowercase().bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        vector[(hash % len) as usize] += 1.0;
    }
    vector
}
