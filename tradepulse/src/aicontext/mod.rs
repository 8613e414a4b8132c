// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! AI conversation context cache
//!
//! Conversations keep a short active message list; once it exceeds the
//! compaction threshold everything but the newest messages moves into a
//! compressed history blob and the active list gains a summary slot.
//! Request contexts are assembled from the newest messages verbatim plus
//! the highest-scoring earlier messages under the caller's budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::CacheStore;

const NS_CONTEXT: &str = "ai_context";
const NS_HISTORY: &str = "ai_history";
const NS_RESPONSE: &str = "ai_response";

/// Active list length that triggers compaction
pub const COMPACT_THRESHOLD: usize = 20;
/// Messages kept in the active list after compaction
pub const COMPACT_KEEP: usize = 10;
/// Default request-context budget
pub const DEFAULT_CONTEXT_BUDGET: usize = 10;

/// Keywords that mark a message as important for context selection
const IMPORTANCE_KEYWORDS: &[&str] = &[
    "strategy", "risk", "loss", "profit", "stop", "entry", "exit", "portfolio", "indicator",
    "error",
];

/// Token pricing hook: measured tokens in, cost units out
///
/// Pricing policy belongs to the host; the default meters raw token
/// count with no markup.
pub type PricingFn = Arc<dyn Fn(u64) -> f64 + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub meta: Option<Value>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>, meta: Option<Value>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            meta,
        }
    }
}

/// Conversation state held in the active cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub messages: Vec<ChatMessage>,
    /// Summary slot standing in for compacted messages
    pub summary: Option<String>,
    pub compacted_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_tokens: u64,
    pub total_cost: f64,
}

/// AI context cache service
pub struct AiContextCache {
    store: Arc<CacheStore>,
    pricing: PricingFn,
}

impl AiContextCache {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            pricing: Arc::new(|tokens| tokens as f64),
        }
    }

    /// Install a host-supplied pricing function
    pub fn with_pricing(store: Arc<CacheStore>, pricing: PricingFn) -> Self {
        Self { store, pricing }
    }

    /// Create a conversation, returning its id
    pub async fn create_conversation(
        &self,
        user_id: &str,
        kind: &str,
        initial_message: Option<&str>,
    ) -> String {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let mut conversation = Conversation {
            id: id.clone(),
            user_id: user_id.to_string(),
            kind: kind.to_string(),
            messages: Vec::new(),
            summary: None,
            compacted_count: 0,
            created_at: now,
            updated_at: now,
            total_tokens: 0,
            total_cost: 0.0,
        };
        if let Some(content) = initial_message {
            conversation
                .messages
                .push(ChatMessage::new(MessageRole::User, content, None));
        }
        self.store.set_as(NS_CONTEXT, &id, &conversation).await;
        log::debug!("conversation {} created for user {}", id, user_id);
        id
    }

    /// Append a message, compacting the active list when it grows too long
    pub async fn add_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        meta: Option<Value>,
    ) -> bool {
        let Some(mut conversation) = self.load(conversation_id).await else {
            return false;
        };

        conversation
            .messages
            .push(ChatMessage::new(role, content, meta));
        conversation.updated_at = Utc::now();

        if conversation.messages.len() > COMPACT_THRESHOLD {
            self.compact(&mut conversation).await;
        }

        self.store
            .set_as(NS_CONTEXT, conversation_id, &conversation)
            .await
    }

    /// Move all but the newest [`COMPACT_KEEP`] messages into the
    /// compressed history blob and refresh the summary slot.
    async fn compact(&self, conversation: &mut Conversation) {
        let keep_from = conversation.messages.len() - COMPACT_KEEP;
        let drained: Vec<ChatMessage> = conversation.messages.drain(..keep_from).collect();

        let mut history: Vec<ChatMessage> = self
            .store
            .get_as(NS_HISTORY, &conversation.id)
            .await
            .unwrap_or_default();
        history.extend(drained.iter().cloned());
        self.store
            .set_as(NS_HISTORY, &conversation.id, &history)
            .await;

        conversation.compacted_count += drained.len();
        conversation.summary = Some(summarize(&drained, conversation.compacted_count));
        log::debug!(
            "conversation {} compacted: {} messages moved to history",
            conversation.id,
            drained.len()
        );
    }

    /// Assemble a request context under `max_messages`
    ///
    /// The newest half of the budget is taken verbatim; the rest of the
    /// budget goes to the highest-scoring earlier messages. Output is in
    /// chronological order, preceded by the summary slot when present.
    pub async fn get_context_for_request(
        &self,
        conversation_id: &str,
        max_messages: Option<usize>,
    ) -> Vec<ChatMessage> {
        let Some(conversation) = self.load(conversation_id).await else {
            return Vec::new();
        };
        let budget = max_messages.unwrap_or(DEFAULT_CONTEXT_BUDGET).max(1);

        let mut context = Vec::new();
        if let Some(summary) = &conversation.summary {
            context.push(ChatMessage::new(MessageRole::System, summary.clone(), None));
        }

        let messages = &conversation.messages;
        if messages.len() <= budget {
            context.extend(messages.iter().cloned());
            return context;
        }

        let recent_count = (budget / 2).max(1);
        let earlier_budget = budget - recent_count;
        let split = messages.len() - recent_count;
        let (earlier, recent) = messages.split_at(split);

        let mut ranked: Vec<(usize, f64)> = earlier
            .iter()
            .enumerate()
            .map(|(idx, msg)| (idx, importance_score(msg)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let mut picked: Vec<usize> = ranked
            .into_iter()
            .take(earlier_budget)
            .map(|(idx, _)| idx)
            .collect();
        picked.sort_unstable();

        context.extend(picked.into_iter().map(|idx| earlier[idx].clone()));
        context.extend(recent.iter().cloned());
        context
    }

    /// Active list plus everything previously compacted, oldest first
    pub async fn get_full_history(&self, conversation_id: &str) -> Vec<ChatMessage> {
        let mut all: Vec<ChatMessage> = self
            .store
            .get_as(NS_HISTORY, conversation_id)
            .await
            .unwrap_or_default();
        if let Some(conversation) = self.load(conversation_id).await {
            all.extend(conversation.messages);
        }
        all
    }

    /// Cache a model response for an exact query
    pub async fn cache_response(&self, conversation_id: &str, query: &str, response: &str) -> bool {
        let key = response_key(conversation_id, query);
        self.store
            .set(NS_RESPONSE, &key, Value::String(response.to_string()))
            .await
    }

    pub async fn get_cached_response(&self, conversation_id: &str, query: &str) -> Option<String> {
        let key = response_key(conversation_id, query);
        match self.store.get(NS_RESPONSE, &key).await {
            Some(Value::String(response)) => Some(response),
            Some(other) => Some(other.to_string()),
            None => None,
        }
    }

    /// Meter token usage against the conversation, returning the cost
    /// computed by the installed pricing function.
    pub async fn record_usage(&self, conversation_id: &str, tokens: u64) -> f64 {
        let cost = (self.pricing)(tokens);
        if let Some(mut conversation) = self.load(conversation_id).await {
            conversation.total_tokens += tokens;
            conversation.total_cost += cost;
            conversation.updated_at = Utc::now();
            self.store
                .set_as(NS_CONTEXT, conversation_id, &conversation)
                .await;
        }
        cost
    }

    pub async fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.load(conversation_id).await
    }

    async fn load(&self, conversation_id: &str) -> Option<Conversation> {
        self.store.get_as(NS_CONTEXT, conversation_id).await
    }
}

/// Importance heuristic: keyword hits + length factor + author bonus
fn importance_score(message: &ChatMessage) -> f64 {
    let lowered = message.content.to_lowercase();
    let keyword_hits = IMPORTANCE_KEYWORDS
        .iter()
        .filter(|kw| lowered.contains(**kw))
        .count() as f64;
    let length_factor = (message.content.len() as f64 / 200.0).min(2.0);
    let author_bonus = if message.role == MessageRole::User {
        1.5
    } else {
        0.0
    };
    keyword_hits * 2.0 + length_factor + author_bonus
}

/// Cheap extractive summary for the compacted span
fn summarize(drained: &[ChatMessage], total_compacted: usize) -> String {
    let first_user = drained
        .iter()
        .find(|m| m.role == MessageRole::User)
        .map(|m| {
            let mut snippet: String = m.content.chars().take(80).collect();
            if m.content.chars().count() > 80 {
                snippet.push('…');
            }
            snippet
        })
        .unwrap_or_else(|| "no user messages".to_string());
    format!(
        "Earlier conversation ({} messages archived). Opening topic: {}",
        total_compacted, first_user
    )
}

fn response_key(conversation_id: &str, query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        hex.push_str(&format!("{:02x}", byte));
    }
    format!("{}:{}", conversation_id, hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: MessageRole, content: &str) -> ChatMessage {
        ChatMessage::new(role, content, None)
    }

    #[test]
    fn user_messages_with_keywords_outrank_short_assistant_ones() {
        let important = msg(MessageRole::User, "my stop loss strategy keeps failing");
        let filler = msg(MessageRole::Assistant, "ok");
        assert!(importance_score(&important) > importance_score(&filler));
    }

    #[test]
    fn summary_names_the_archived_count() {
        let drained = vec![msg(MessageRole::User, "how do I size a position?")];
        let summary = summarize(&drained, 15);
        assert!(summary.contains("15 messages"));
        assert!(summary.contains("position"));
    }

    #[test]
    fn response_keys_differ_per_query_but_are_stable() {
        let a = response_key("c1", "what is a limit order?");
        let b = response_key("c1", "what is a market order?");
        assert_ne!(a, b);
        assert_eq!(a, response_key("c1", "what is a limit order?"));
    }
}
