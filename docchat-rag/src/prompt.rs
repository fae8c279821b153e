//! Prompt assembly and source citations.
//!
//! Everything here is pure string rendering: the same passages, question, and
//! history always produce the same prompt.

use serde::{Deserialize, Serialize};

use crate::document::RetrievedChunk;
use crate::memory::{ConversationTurn, MemoryVariables};

/// Line separating passages in the rendered context.
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Maximum length of a source snippet in characters, ellipsis included.
pub const SNIPPET_MAX_CHARS: usize = 200;

const ELLIPSIS: &str = "...";

const INSTRUCTION: &str = "Aşağıdaki dokümandan elde edilen bilgilere dayanarak soruyu cevapla.\n\
Sadece verilen bilgileri kullan. Bilmiyorsan \"Bu bilgi dokümanda yok\" de.";

/// A citation returned alongside an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceCitation {
    /// Document the passage came from.
    pub source_file: String,
    /// Page of the passage.
    pub page: u32,
    /// Similarity to the question, rounded to three decimals.
    pub similarity: f32,
    /// Start of the passage text, at most [`SNIPPET_MAX_CHARS`] characters.
    pub text_snippet: String,
    /// Position of the passage in the document's chunk stream.
    pub chunk_id: u32,
}

/// Join passages in input order, each prefixed with a citation tag.
///
/// ```rust,ignore
/// [Kaynak 1 - guide.pdf, Sayfa 3]
/// passage text
///
/// ---
///
/// [Kaynak 2 - guide.pdf, Sayfa 1]
/// ...
/// ```
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[Kaynak {} - {}, Sayfa {}]\n{}",
                i + 1,
                chunk.metadata.source_file,
                chunk.metadata.page,
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

/// Render the grounding prompt.
///
/// Prior conversation, when present, is placed after the instruction and
/// before the document context, oldest turn first.
pub fn build_prompt(context: &str, question: &str, history: Option<&MemoryVariables>) -> String {
    let mut prompt = String::with_capacity(INSTRUCTION.len() + context.len() + question.len() + 64);
    prompt.push_str(INSTRUCTION);
    prompt.push_str("\n\n");

    if let Some(block) = history.and_then(render_history) {
        prompt.push_str(&block);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Doküman İçeriği:\n");
    prompt.push_str(context);
    prompt.push_str("\n\nSoru: ");
    prompt.push_str(question);
    prompt.push_str("\n\nCevap:");
    prompt
}

/// Render memory contents as a prompt block. `None` when there is nothing
/// to show.
pub fn render_history(variables: &MemoryVariables) -> Option<String> {
    match variables {
        MemoryVariables::Turns(turns) if turns.is_empty() => None,
        MemoryVariables::Turns(turns) => {
            let lines: Vec<String> = turns.iter().map(render_turn).collect();
            Some(format!("Önceki Konuşma:\n{}", lines.join("\n")))
        }
        MemoryVariables::Summary(summary) if summary.trim().is_empty() => None,
        MemoryVariables::Summary(summary) => Some(format!("Konuşma Özeti:\n{}", summary.trim())),
    }
}

fn render_turn(turn: &ConversationTurn) -> String {
    format!("Kullanıcı: {}\nAsistan: {}", turn.input, turn.output)
}

/// Prompt asking the model to fold a new turn into a running summary.
pub fn summary_prompt(current_summary: &str, turn: &ConversationTurn) -> String {
    let current = if current_summary.trim().is_empty() { "(boş)" } else { current_summary.trim() };
    format!(
        "Aşağıdaki konuşma özetini yeni konuşma satırlarıyla güncelle ve yalnızca yeni özeti yaz.\n\n\
         Mevcut özet:\n{current}\n\n\
         Yeni satırlar:\n{}\n\n\
         Yeni özet:",
        render_turn(turn)
    )
}

/// Build citations for passages, in input order.
pub fn format_sources(chunks: &[RetrievedChunk]) -> Vec<SourceCitation> {
    chunks
        .iter()
        .map(|chunk| SourceCitation {
            source_file: chunk.metadata.source_file.clone(),
            page: chunk.metadata.page,
            similarity: round3(chunk.similarity()),
            text_snippet: snippet(&chunk.text),
            chunk_id: chunk.metadata.chunk_id,
        })
        .collect()
}

/// Truncate to [`SNIPPET_MAX_CHARS`] characters, marking the cut with `...`.
pub fn snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_MAX_CHARS {
        return text.to_string();
    }
    let keep = SNIPPET_MAX_CHARS - ELLIPSIS.len();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}
