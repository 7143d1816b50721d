//! Retrieval-augmented responder.
//!
//! # Flow
//!
//! 1. Without an owner, answer from general instructions only.
//! 2. Otherwise embed the query and search the owner's namespace (top-k).
//! 3. With hits, build a grounded system instruction that lists each chunk
//!    under `[Source: <file>]`; without hits, tell the model no business
//!    information is available.
//! 4. Append the owner's website, if known, for citation.
//! 5. Send system + mapped history + query to the completion provider.
//!
//! Any retrieval failure, and a failed grounded generation, fall back to one
//! context-free generation flagged `degraded`. Only when that also fails does
//! the error reach the caller.

use relaydesk_config::AppConfig;
use relaydesk_core::conversation::{ChatMessage, Origin, SourceRef};
use relaydesk_core::error::ProviderError;
use relaydesk_core::identity::OwnerId;
use relaydesk_core::knowledge::{KnowledgeStore, ScoredRecord};
use relaydesk_core::message::{Message, Role};
use relaydesk_core::provider::{Provider, ProviderRequest};
use relaydesk_core::store::OwnerSettingsStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::embedder::Embedder;
use crate::within;

#[derive(Debug, Clone)]
pub struct ResponderSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub top_k: usize,
    pub history_turns: usize,
    pub timeout: Option<Duration>,
    /// Name the assistant introduces itself with.
    pub persona: String,
}

impl ResponderSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            top_k: config.retrieval.top_k,
            history_turns: config.retrieval.history_turns,
            timeout: config.retrieval.timeout_secs.map(Duration::from_secs),
            persona: config.persona.name.clone(),
        }
    }
}

/// What the responder produced for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    /// Retrieved knowledge grounded this reply.
    pub context_used: bool,
    pub sources: Vec<SourceRef>,
    /// Produced by the context-free fallback after a failure.
    pub degraded: bool,
}

impl Reply {
    pub fn into_message(self) -> ChatMessage {
        ChatMessage::ai(self.text, self.context_used, self.sources, self.degraded)
    }
}

pub struct Responder {
    provider: Arc<dyn Provider>,
    embedder: Arc<Embedder>,
    knowledge: Arc<dyn KnowledgeStore>,
    owner_settings: Arc<dyn OwnerSettingsStore>,
    settings: ResponderSettings,
}

impl Responder {
    pub fn new(
        provider: Arc<dyn Provider>,
        embedder: Arc<Embedder>,
        knowledge: Arc<dyn KnowledgeStore>,
        owner_settings: Arc<dyn OwnerSettingsStore>,
        settings: ResponderSettings,
    ) -> Self {
        Self {
            provider,
            embedder,
            knowledge,
            owner_settings,
            settings,
        }
    }

    /// Answer `query` for a user bound to `owner`.
    ///
    /// `history` is the conversation so far, excluding `query` itself.
    pub async fn respond(
        &self,
        owner: Option<&OwnerId>,
        query: &str,
        history: &[ChatMessage],
    ) -> Result<Reply, ProviderError> {
        let Some(owner) = owner else {
            let system = self.general_instructions(None, None);
            let text = self.generate(system, history, query).await?;
            return Ok(Reply {
                text,
                context_used: false,
                sources: Vec::new(),
                degraded: false,
            });
        };

        let website = self.website(owner).await;
        let hits = match self.retrieve(owner, query).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(owner_id = %owner, error = %e, "Retrieval failed, answering without context");
                return self.degraded(owner, website.as_deref(), query, history).await;
            }
        };
        debug!(owner_id = %owner, hits = hits.len(), "Retrieved knowledge");

        if hits.is_empty() {
            let system = self.general_instructions(Some(owner), website.as_deref());
            let text = self.generate(system, history, query).await?;
            return Ok(Reply {
                text,
                context_used: false,
                sources: Vec::new(),
                degraded: false,
            });
        }

        let system = self.grounded_instructions(&hits, website.as_deref());
        match self.generate(system, history, query).await {
            Ok(text) => {
                info!(owner_id = %owner, sources = hits.len(), "Grounded reply generated");
                Ok(Reply {
                    text,
                    context_used: true,
                    sources: hits.iter().map(source_ref).collect(),
                    degraded: false,
                })
            }
            Err(e) => {
                warn!(owner_id = %owner, error = %e, "Grounded generation failed, retrying without context");
                self.degraded(owner, website.as_deref(), query, history).await
            }
        }
    }

    async fn degraded(
        &self,
        owner: &OwnerId,
        website: Option<&str>,
        query: &str,
        history: &[ChatMessage],
    ) -> Result<Reply, ProviderError> {
        let system = self.general_instructions(Some(owner), website);
        let text = self.generate(system, history, query).await?;
        Ok(Reply {
            text,
            context_used: false,
            sources: Vec::new(),
            degraded: true,
        })
    }

    async fn retrieve(&self, owner: &OwnerId, query: &str) -> Result<Vec<ScoredRecord>, String> {
        let vector = self.embedder.embed_one(query).await.map_err(|e| e.to_string())?;
        within(self.settings.timeout, self.knowledge.search(owner, &vector, self.settings.top_k))
            .await
            .ok_or_else(|| "knowledge search timed out".to_string())?
            .map_err(|e| e.to_string())
    }

    async fn website(&self, owner: &OwnerId) -> Option<String> {
        match self.owner_settings.get_settings(owner).await {
            Ok(settings) => settings.and_then(|s| s.website_url),
            Err(e) => {
                warn!(owner_id = %owner, error = %e, "Could not load owner settings");
                None
            }
        }
    }

    async fn generate(&self, system: String, history: &[ChatMessage], query: &str) -> Result<String, ProviderError> {
        let start = history.len().saturating_sub(self.settings.history_turns);
        let mut messages = vec![Message::system(system)];
        messages.extend(history_to_messages(&history[start..], query));

        let request = ProviderRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };
        let response = within(self.settings.timeout, self.provider.complete(request))
            .await
            .ok_or_else(|| ProviderError::Timeout("completion".into()))??;

        if let Some(usage) = &response.usage {
            debug!(
                model = %response.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion finished"
            );
        }
        Ok(response.message.content)
    }

    fn general_instructions(&self, owner: Option<&OwnerId>, website: Option<&str>) -> String {
        let mut out = format!(
            "You are {}, a friendly customer-support assistant. Answer clearly and concisely.",
            self.settings.persona
        );
        if owner.is_some() {
            out.push_str(
                "\n\nNo business-specific information is available for this question. \
                 Answer from general knowledge and suggest contacting the team for details you cannot confirm.",
            );
        }
        push_website(&mut out, website);
        out
    }

    fn grounded_instructions(&self, hits: &[ScoredRecord], website: Option<&str>) -> String {
        let mut out = format!(
            "You are {}, a friendly customer-support assistant for this business.\n\
             Answer using the business information below. Prefer it over general knowledge, \
             and fall back to general knowledge only when it does not cover the question.\n\n\
             ## Business information\n",
            self.settings.persona
        );
        for hit in hits {
            out.push_str(&format!("[Source: {}] {}\n", hit.record.file_name, hit.record.text));
        }
        push_website(&mut out, website);
        out
    }
}

fn push_website(out: &mut String, website: Option<&str>) {
    if let Some(url) = website {
        out.push_str(&format!(
            "\n\nCompany website: {url}\nMention it only when pointing the user to more information."
        ));
    }
}

fn source_ref(hit: &ScoredRecord) -> SourceRef {
    SourceRef {
        file_name: hit.record.file_name.clone(),
        source_type: hit.record.source_type,
        relevance_score: hit.score,
    }
}

/// Map conversation turns to the two-party prompt roles and append `query`.
///
/// Owner and AI turns both speak for the business. Consecutive turns of the
/// same role are merged so roles strictly alternate.
pub fn history_to_messages(history: &[ChatMessage], query: &str) -> Vec<Message> {
    let turns = history
        .iter()
        .map(|m| {
            let role = match m.origin {
                Origin::User => Role::User,
                Origin::Owner | Origin::Ai => Role::Assistant,
            };
            (role, m.text.as_str())
        })
        .chain(std::iter::once((Role::User, query)));

    let mut out: Vec<Message> = Vec::new();
    for (role, text) in turns {
        match out.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(text);
            }
            _ => out.push(Message { role, content: text.to_string() }),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{IngestMetadata, IngestPipeline};
    use crate::testing::ScriptedProvider;
    use relaydesk_config::IngestConfig;
    use relaydesk_core::knowledge::SourceType;
    use relaydesk_memory::{InMemoryKnowledgeStore, InMemoryStore};

    const DIMS: usize = 32;

    struct Fixture {
        responder: Responder,
        provider: Arc<ScriptedProvider>,
        pipeline: IngestPipeline,
        store: InMemoryStore,
    }

    fn fixture(provider: ScriptedProvider, timeout: Option<Duration>) -> Fixture {
        let provider = Arc::new(provider);
        let embedder = Arc::new(Embedder::new(provider.clone(), "embed-test", DIMS).with_timeout(timeout));
        let knowledge: Arc<dyn KnowledgeStore> = Arc::new(InMemoryKnowledgeStore::new());
        let store = InMemoryStore::new();
        let settings = ResponderSettings {
            model: "mock-model".into(),
            temperature: 0.2,
            max_tokens: Some(256),
            top_k: 3,
            history_turns: 10,
            timeout,
            persona: "Ava".into(),
        };
        let responder = Responder::new(
            provider.clone(),
            embedder.clone(),
            knowledge.clone(),
            Arc::new(store.clone()),
            settings,
        );
        let pipeline = IngestPipeline::new(embedder, knowledge, &IngestConfig::default());
        Fixture { responder, provider, pipeline, store }
    }

    fn system_prompt(provider: &ScriptedProvider, call: usize) -> String {
        provider.requests()[call].messages[0].content.clone()
    }

    #[tokio::test]
    async fn no_owner_skips_retrieval() {
        let f = fixture(ScriptedProvider::new(DIMS).reply("Hello there!"), None);
        let reply = f.responder.respond(None, "hi", &[]).await.unwrap();

        assert_eq!(reply.text, "Hello there!");
        assert!(!reply.context_used);
        assert!(!reply.degraded);
        assert_eq!(f.provider.embed_calls(), 0);
    }

    #[tokio::test]
    async fn owner_without_resources_answers_ungrounded() {
        let f = fixture(ScriptedProvider::new(DIMS).reply("We'd love to help."), None);
        let owner = OwnerId::from("acme");
        let reply = f.responder.respond(Some(&owner), "Do you ship abroad?", &[]).await.unwrap();

        assert!(!reply.text.is_empty());
        assert!(!reply.context_used);
        assert!(reply.sources.is_empty());
        assert!(!reply.degraded);
        assert!(system_prompt(&f.provider, 0).contains("No business-specific information"));
    }

    #[tokio::test]
    async fn grounded_reply_cites_sources() {
        let f = fixture(ScriptedProvider::new(DIMS).reply("We're open 9-5, Monday to Friday."), None);
        let owner = OwnerId::from("acme");
        f.pipeline
            .ingest(
                &owner,
                r#"{"hours": "9-5 Mon-Fri"}"#,
                IngestMetadata {
                    file_name: "hours.json".into(),
                    source_type: SourceType::Json,
                },
            )
            .await
            .unwrap();

        let reply = f.responder.respond(Some(&owner), "What are your hours?", &[]).await.unwrap();
        assert!(reply.context_used);
        assert!(!reply.degraded);
        assert_eq!(reply.sources.len(), 1);
        assert_eq!(reply.sources[0].file_name, "hours.json");
        assert_eq!(reply.sources[0].source_type, SourceType::Json);

        let prompt = system_prompt(&f.provider, 0);
        assert!(prompt.contains("[Source: hours.json]"));
        assert!(prompt.contains("9-5"));
    }

    #[tokio::test]
    async fn website_is_offered_for_citation() {
        let f = fixture(ScriptedProvider::new(DIMS), None);
        let owner = OwnerId::from("acme");
        f.store
            .set_website(&owner, Some("https://acme.example".into()))
            .await
            .unwrap();
        f.responder.respond(Some(&owner), "hello", &[]).await.unwrap();
        assert!(system_prompt(&f.provider, 0).contains("https://acme.example"));
    }

    #[tokio::test]
    async fn retrieval_failure_degrades() {
        let f = fixture(
            ScriptedProvider::new(DIMS)
                .fail_embeddings(ProviderError::Network("embeddings down".into()))
                .reply("Let me find out for you."),
            None,
        );
        let owner = OwnerId::from("acme");
        let reply = f.responder.respond(Some(&owner), "hours?", &[]).await.unwrap();

        assert_eq!(reply.text, "Let me find out for you.");
        assert!(!reply.context_used);
        assert!(reply.degraded);
    }

    #[tokio::test]
    async fn grounded_generation_failure_retries_without_context() {
        let f = fixture(
            ScriptedProvider::new(DIMS)
                .fail(ProviderError::ApiError {
                    status_code: 500,
                    message: "boom".into(),
                })
                .reply("Fallback answer"),
            None,
        );
        let owner = OwnerId::from("acme");
        f.pipeline
            .ingest(
                &owner,
                "Refunds within 30 days",
                IngestMetadata {
                    file_name: "policy.txt".into(),
                    source_type: SourceType::Text,
                },
            )
            .await
            .unwrap();

        let reply = f.responder.respond(Some(&owner), "refunds?", &[]).await.unwrap();
        assert_eq!(reply.text, "Fallback answer");
        assert!(reply.degraded);
        assert!(!reply.context_used);
        assert!(reply.sources.is_empty());
        assert_eq!(f.provider.complete_calls(), 2);
        assert!(!system_prompt(&f.provider, 1).contains("[Source:"));
    }

    #[tokio::test]
    async fn failed_fallback_surfaces_error() {
        let f = fixture(
            ScriptedProvider::new(DIMS)
                .fail_embeddings(ProviderError::Network("down".into()))
                .fail(ProviderError::Network("still down".into())),
            None,
        );
        let owner = OwnerId::from("acme");
        let err = f.responder.respond(Some(&owner), "hours?", &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_completion_times_out() {
        let f = fixture(
            ScriptedProvider::new(DIMS).with_delay(Duration::from_secs(120)),
            Some(Duration::from_secs(5)),
        );
        let err = f.responder.respond(None, "hi", &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn history_is_windowed_and_alternating() {
        let f = fixture(ScriptedProvider::new(DIMS), None);
        let mut history = Vec::new();
        for i in 0..12 {
            history.push(ChatMessage::user(format!("u{i}")));
            history.push(ChatMessage::ai(format!("a{i}"), false, Vec::new(), false));
        }
        f.responder.respond(None, "latest", &history).await.unwrap();

        let messages = &f.provider.requests()[0].messages;
        // system + last 10 history turns + query
        assert_eq!(messages.len(), 12);
        assert_eq!(messages[1].content, "u7");
        assert_eq!(messages.last().map(|m| m.content.as_str()), Some("latest"));
    }

    #[test]
    fn consecutive_same_role_turns_merge() {
        let history = vec![
            ChatMessage::user("Hi"),
            ChatMessage::owner(OwnerId::from("acme"), "Hello, this is Sam"),
            ChatMessage::ai("How can I help?", false, Vec::new(), false),
            ChatMessage::user("Hours?"),
        ];
        let messages = history_to_messages(&history, "And weekends?");

        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(messages[1].content, "Hello, this is Sam\n\nHow can I help?");
        assert_eq!(messages[2].content, "Hours?\n\nAnd weekends?");
    }
}
