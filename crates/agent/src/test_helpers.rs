//! Shared test helpers for loop tests.

use async_trait::async_trait;
use ragent_core::error::{ProviderError, Result};
use ragent_core::message::Conversation;
use ragent_core::prompt::{PromptInputs, PromptRenderer};
use ragent_core::provider::{Completion, GenerationConfig, GenerationProvider, Usage};
use ragent_core::retrieval::Document;
use ragent_tools::{Collaborators, InMemoryCorpus, ToolDispatcher, default_registry};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One scripted provider reply.
pub enum Reply {
    Text(String),
    Error(ProviderError),
    /// Never completes.
    Hang,
}

/// A provider that plays back scripted replies in order.
///
/// Every completion reports one completion token so budget arithmetic in
/// tests is exact. Once the script runs out the provider keeps repeating
/// `repeat`, or fails as unavailable when there is none.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Reply>>,
    repeat: Option<String>,
    calls: AtomicUsize,
    last_turns: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Reply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            calls: AtomicUsize::new(0),
            last_turns: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[String]) -> Self {
        Self::new(texts.iter().cloned().map(Reply::Text).collect())
    }

    /// Always answer with `text`.
    pub fn repeating(text: String) -> Self {
        let mut provider = Self::new(Vec::new());
        provider.repeat = Some(text);
        provider
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The wire text of the last turn of each submitted conversation.
    pub fn last_turns(&self) -> Vec<String> {
        self.last_turns.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn submit(
        &self,
        conversation: &Conversation,
        _config: &GenerationConfig,
    ) -> std::result::Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(turn) = conversation.last() {
            self.last_turns.lock().unwrap().push(turn.wire_text().to_string());
        }

        let next = self.script.lock().unwrap().pop_front();
        let text = match next {
            Some(Reply::Text(text)) => text,
            Some(Reply::Error(error)) => return Err(error),
            Some(Reply::Hang) => std::future::pending().await,
            None => match &self.repeat {
                Some(text) => text.clone(),
                None => return Err(ProviderError::Unavailable("script exhausted".into())),
            },
        };

        Ok(Completion::new(text, "scripted-model").with_usage(Usage {
            prompt_tokens: 0,
            completion_tokens: 1,
            total_tokens: 1,
        }))
    }
}

/// Renders a fixed system prompt.
pub struct StaticRenderer(pub String);

impl PromptRenderer for StaticRenderer {
    fn render(&self, _inputs: &PromptInputs) -> Result<String> {
        Ok(self.0.clone())
    }
}

pub fn respond(thought: &str, answer: &str) -> String {
    format!("<Thought>{thought}</Thought><Response>{answer}</Response>")
}

pub fn act(thought: &str, calls: &[(&str, serde_json::Value)]) -> String {
    let calls: String = calls
        .iter()
        .map(|(name, params)| {
            format!("<ToolCall><Name>{name}</Name><Parameters>{params}</Parameters></ToolCall>")
        })
        .collect();
    format!("<Thought>{thought}</Thought><Action><ToolCalls>{calls}</ToolCalls></Action>")
}

pub fn documents() -> Vec<Document> {
    let doc = |id: &str, title: &str, text: &str| Document {
        id: id.into(),
        title: title.into(),
        text: text.into(),
        metadata: serde_json::Map::new(),
    };
    vec![
        doc(
            "rust-book",
            "The Rust Programming Language",
            "Rust is a systems programming language focused on safety, speed and \
             concurrency. Ownership rules let the compiler guarantee memory safety \
             without a garbage collector, and the borrow checker enforces them at \
             compile time for every program.",
        ),
        doc(
            "tokio",
            "Tokio",
            "Tokio is an asynchronous runtime for the Rust programming language. It \
             provides the building blocks needed for writing network applications \
             with reliable performance and a multi-threaded work-stealing scheduler.",
        ),
    ]
}

/// A dispatcher over an in-memory corpus of [`documents`].
pub fn corpus_dispatcher() -> ToolDispatcher {
    let corpus = InMemoryCorpus::from_documents(documents());
    ToolDispatcher::new(default_registry(Collaborators::from_corpus(corpus)))
}
