//! Conversation memory.
//!
//! [`ConversationMemory`] is a sum type over the three retention policies.
//! All variants support the same operations: [`record`](ConversationMemory::record),
//! [`variables`](ConversationMemory::variables), and
//! [`clear`](ConversationMemory::clear). Memory lives for one chat session and
//! is never persisted.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{MemoryConfig, MemoryKind};
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;
use crate::prompt::summary_prompt;

/// One question and its answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    /// The user's question.
    pub input: String,
    /// The answer that was returned.
    pub output: String,
}

impl ConversationTurn {
    /// Create a turn.
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self { input: input.into(), output: output.into() }
    }
}

/// What memory exposes to the prompt assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryVariables {
    /// Retained turns, oldest first.
    Turns(Vec<ConversationTurn>),
    /// Running summary of the whole conversation.
    Summary(String),
}

impl MemoryVariables {
    /// Whether there is no history to show.
    pub fn is_empty(&self) -> bool {
        match self {
            MemoryVariables::Turns(turns) => turns.is_empty(),
            MemoryVariables::Summary(summary) => summary.trim().is_empty(),
        }
    }
}

/// Conversation history with a retention policy.
pub enum ConversationMemory {
    /// Every turn, unbounded.
    Buffer(Vec<ConversationTurn>),
    /// The most recent `size` turns; older turns are evicted first.
    Window {
        /// Retained turns, oldest first.
        turns: VecDeque<ConversationTurn>,
        /// Maximum number of retained turns.
        size: usize,
    },
    /// A running summary rewritten by the language model on every turn.
    Summary {
        /// Current summary text.
        summary: String,
        /// Model used to fold new turns into the summary.
        model: Arc<dyn LanguageModel>,
    },
}

impl fmt::Debug for ConversationMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationMemory::Buffer(turns) => f.debug_tuple("Buffer").field(turns).finish(),
            ConversationMemory::Window { turns, size } => {
                f.debug_struct("Window").field("turns", turns).field("size", size).finish()
            }
            ConversationMemory::Summary { summary, model } => f
                .debug_struct("Summary")
                .field("summary", summary)
                .field("model", &model.name())
                .finish(),
        }
    }
}

impl ConversationMemory {
    /// An empty buffer memory.
    pub fn buffer() -> Self {
        ConversationMemory::Buffer(Vec::new())
    }

    /// An empty window memory retaining `size` turns.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `size` is zero.
    pub fn window(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(RagError::ConfigError("window_size must be greater than zero".into()));
        }
        Ok(ConversationMemory::Window { turns: VecDeque::with_capacity(size), size })
    }

    /// An empty summary memory backed by `model`.
    pub fn summary(model: Arc<dyn LanguageModel>) -> Self {
        ConversationMemory::Summary { summary: String::new(), model }
    }

    /// Build memory from configuration.
    ///
    /// Summary memory without a model degrades to buffer memory with a
    /// warning.
    pub fn from_config(
        config: &MemoryConfig,
        model: Option<Arc<dyn LanguageModel>>,
    ) -> Result<Self> {
        let memory = match (config.kind, model) {
            (MemoryKind::Buffer, _) => Self::buffer(),
            (MemoryKind::Window, _) => Self::window(config.window_size)?,
            (MemoryKind::Summary, Some(model)) => Self::summary(model),
            (MemoryKind::Summary, None) => {
                warn!("summary memory needs a language model; falling back to buffer memory");
                Self::buffer()
            }
        };
        info!(kind = ?memory.kind(), "conversation memory initialised");
        Ok(memory)
    }

    /// Which retention policy is in effect.
    pub fn kind(&self) -> MemoryKind {
        match self {
            ConversationMemory::Buffer(_) => MemoryKind::Buffer,
            ConversationMemory::Window { .. } => MemoryKind::Window,
            ConversationMemory::Summary { .. } => MemoryKind::Summary,
        }
    }

    /// Record a turn.
    ///
    /// # Errors
    ///
    /// Summary memory propagates the model's error; the previous summary is
    /// kept in that case.
    pub async fn record(&mut self, turn: ConversationTurn) -> Result<()> {
        match self {
            ConversationMemory::Buffer(turns) => turns.push(turn),
            ConversationMemory::Window { turns, size } => {
                turns.push_back(turn);
                while turns.len() > *size {
                    turns.pop_front();
                }
            }
            ConversationMemory::Summary { summary, model } => {
                let prompt = summary_prompt(summary, &turn);
                let updated = model.generate(&prompt).await?;
                *summary = updated.trim().to_string();
            }
        }
        debug!(kind = ?self.kind(), "recorded conversation turn");
        Ok(())
    }

    /// Current contents for prompt rendering.
    pub fn variables(&self) -> MemoryVariables {
        match self {
            ConversationMemory::Buffer(turns) => MemoryVariables::Turns(turns.clone()),
            ConversationMemory::Window { turns, .. } => {
                MemoryVariables::Turns(turns.iter().cloned().collect())
            }
            ConversationMemory::Summary { summary, .. } => {
                MemoryVariables::Summary(summary.clone())
            }
        }
    }

    /// Reset to the empty initial state, keeping the policy.
    pub fn clear(&mut self) {
        match self {
            ConversationMemory::Buffer(turns) => turns.clear(),
            ConversationMemory::Window { turns, .. } => turns.clear(),
            ConversationMemory::Summary { summary, .. } => summary.clear(),
        }
        debug!(kind = ?self.kind(), "cleared conversation memory");
    }
}
