//! Bounded conversation history and document Q&A.
//!
//! Conversations are keyed by an explicit (owner, document) composite key
//! and capped at the most recent entries — older entries are evicted from
//! the front, never summarized. The store trait keeps the backing
//! injectable: the in-memory implementation ships here, a persistent one
//! is a backing swap, not a contract change.
//!
//! Q&A replays a *smaller* window of history than the store retains, so a
//! cushion of context stays server-side beyond what each request sends.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{ChatConfig, InferenceConfig};
use crate::inference::{ChatMessage, GenerationRequest, Inference};
use crate::models::{ChatEntry, ChatRole};
use crate::retry::with_retry;

/// Composite conversation key. An explicit type rather than a joined
/// string, so identifiers containing a separator cannot collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub owner_id: String,
    pub doc_id: String,
}

impl ConversationKey {
    pub fn new(owner_id: impl Into<String>, doc_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            doc_id: doc_id.into(),
        }
    }
}

/// Keyed, bounded message history.
///
/// Implementations must tolerate concurrent appends: two appends to the
/// same key must not interleave or drop entries; different keys are
/// independent.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Push an entry, evicting from the front once the key exceeds `cap`.
    async fn append(&self, key: &ConversationKey, entry: ChatEntry, cap: usize);

    /// Current ordered entries for a key (empty if absent).
    async fn history(&self, key: &ConversationKey) -> Vec<ChatEntry>;

    /// Remove the keyed conversation entirely. Idempotent.
    async fn clear(&self, key: &ConversationKey);
}

/// In-memory conversation store; process-lifetime state, deliberately not
/// a durability guarantee.
#[derive(Default)]
pub struct MemoryConversationStore {
    conversations: Mutex<HashMap<ConversationKey, Vec<ChatEntry>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn append(&self, key: &ConversationKey, entry: ChatEntry, cap: usize) {
        let mut map = self.conversations.lock().unwrap();
        let entries = map.entry(key.clone()).or_default();
        entries.push(entry);
        if entries.len() > cap {
            let excess = entries.len() - cap;
            entries.drain(..excess);
        }
    }

    async fn history(&self, key: &ConversationKey) -> Vec<ChatEntry> {
        let map = self.conversations.lock().unwrap();
        map.get(key).cloned().unwrap_or_default()
    }

    async fn clear(&self, key: &ConversationKey) {
        let mut map = self.conversations.lock().unwrap();
        map.remove(key);
    }
}

/// Answer to a document question; `success` is false when the capability
/// was unavailable and `answer` carries the fallback text.
#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub success: bool,
    pub question: String,
    pub answer: String,
}

const FALLBACK_ANSWER: &str =
    "Sorry, I couldn't process your question right now. Please try again.";

/// Ask a question about a document with multi-turn context.
///
/// The last `replay_window` history entries are replayed ahead of the new
/// question. On success both the question and the answer are appended to
/// the window; an unavailable exchange is not recorded, so a failed call
/// never poisons future replay context.
#[allow(clippy::too_many_arguments)]
pub async fn ask_question(
    inference: &dyn Inference,
    store: &dyn ConversationStore,
    inference_cfg: &InferenceConfig,
    chat_cfg: &ChatConfig,
    key: &ConversationKey,
    document_body: &str,
    document_type: &str,
    question: &str,
    language: &str,
) -> ChatAnswer {
    let system_prompt = format!(
        "You are a helpful document assistant analyzing a {doc_type} document.\n\n\
         DOCUMENT CONTENT:\n{body}\n\n---\n\n\
         Answer questions about this specific document accurately, reference specific \
         parts when relevant, and explain clearly in {lang}. If the user asks something \
         not covered in the document, say so politely. Base your answers on the actual \
         document content above.",
        doc_type = document_type,
        body = truncate_chars(document_body, 15_000),
        lang = language,
    );

    let history = store.history(key).await;
    let replay_start = history.len().saturating_sub(chat_cfg.replay_window);

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    for entry in &history[replay_start..] {
        messages.push(ChatMessage {
            role: entry.role.as_str().to_string(),
            content: entry.content.clone(),
        });
    }
    messages.push(ChatMessage::user(question));

    let request = GenerationRequest::new(messages)
        .with_temperature(0.5)
        .with_max_tokens(1500);

    let policy = inference_cfg.retry_policy();
    let outcome = with_retry(&policy, "document-qa", move || {
        let request = request.clone();
        async move { inference.generate(request).await }
    })
    .await;

    match outcome.ok() {
        Some(answer) => {
            store
                .append(key, ChatEntry::user(question), chat_cfg.history_cap)
                .await;
            store
                .append(
                    key,
                    ChatEntry {
                        role: ChatRole::Assistant,
                        content: answer.clone(),
                    },
                    chat_cfg.history_cap,
                )
                .await;
            ChatAnswer {
                success: true,
                question: question.to_string(),
                answer,
            }
        }
        None => ChatAnswer {
            success: false,
            question: question.to_string(),
            answer: FALLBACK_ANSWER.to_string(),
        },
    }
}

/// Static question suggestions per document type, with a generic fallback.
pub fn suggested_questions(document_type: &str) -> Vec<&'static str> {
    match document_type {
        "Home Loan" => vec![
            "What is the interest rate?",
            "What are the EMI payment terms?",
            "Are there any prepayment penalties?",
            "What is the loan tenure?",
            "What happens if I miss a payment?",
        ],
        "Rent Agreement" => vec![
            "What is the monthly rent?",
            "What is the security deposit?",
            "When does the lease end?",
            "Can I sublet this property?",
            "What are my maintenance responsibilities?",
        ],
        "Employment Contract" => vec![
            "What is the salary mentioned?",
            "What are the working hours?",
            "What is the notice period?",
            "What benefits are included?",
            "Is there a non-compete clause?",
        ],
        "Insurance Policy" => vec![
            "What is covered under this policy?",
            "What is the premium amount?",
            "What are the exclusions?",
            "How do I file a claim?",
            "What is the deductible?",
        ],
        _ => vec![
            "What is this document about?",
            "What are the key terms?",
            "What are my obligations?",
            "Are there any penalties mentioned?",
            "When does this expire?",
        ],
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
