//! Interactive menu and chat loop.

use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use docchat_rag::SourceCitation;
use futures::StreamExt;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::error;

use crate::app::{App, CollectionChoice, RULE, choose_collection, describe, parse_selection};

const EXIT_COMMANDS: [&str; 3] = ["/exit", "/quit", "/çıkış"];
const CLEAR_COMMAND: &str = "/clear";

/// One line typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    /// Leave the chat.
    Exit,
    /// Forget the conversation so far.
    Clear,
    /// Blank line.
    Skip,
    /// Anything else.
    Question(String),
}

pub fn classify_input(line: &str) -> ChatInput {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Skip;
    }
    let lower = line.to_lowercase();
    if EXIT_COMMANDS.contains(&lower.as_str()) {
        ChatInput::Exit
    } else if lower == CLEAR_COMMAND {
        ChatInput::Clear
    } else {
        ChatInput::Question(line.to_string())
    }
}

/// `  - rapor.pdf, Sayfa 3 (Benzerlik: 0.812)`
pub fn format_source(source: &SourceCitation) -> String {
    format!("  - {}, Sayfa {} (Benzerlik: {})", source.source_file, source.page, source.similarity)
}

impl App {
    /// Pick a collection and chat until the user leaves.
    pub async fn chat(&self) -> Result<()> {
        let mut editor = DefaultEditor::new()?;
        self.chat_with(&mut editor).await
    }

    /// The interactive menu shown when no subcommand is given.
    pub async fn menu(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new()?;
        loop {
            println!("\n{RULE}");
            println!("=== Doküman Sohbet Botu ===");
            println!("{RULE}");
            println!("[1] Doküman Yükle");
            println!("[2] Sohbet Başlat");
            println!("[3] Çıkış");
            println!("{RULE}");

            let choice = match editor.readline("\nSeçiminiz: ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                    println!("\nÇıkılıyor...\n");
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            match choice.trim() {
                "1" => {
                    let path = match editor.readline("Doküman yolu: ") {
                        Ok(line) => line,
                        Err(ReadlineError::Interrupted | ReadlineError::Eof) => continue,
                        Err(e) => return Err(e.into()),
                    };
                    let path = path.trim();
                    if path.is_empty() {
                        continue;
                    }
                    if let Err(e) = self.load(Path::new(path)).await {
                        error!(path, error = %e, "document load failed");
                        println!("\n❌ Hata: {e:#}\n");
                    }
                }
                "2" => {
                    if let Err(e) = self.chat_with(&mut editor).await {
                        error!(error = %e, "chat failed");
                        println!("\n❌ Hata: {e:#}\n");
                    }
                }
                "3" => {
                    println!("\nÇıkılıyor...\n");
                    break;
                }
                _ => println!("\n❌ Geçersiz seçim. Lütfen 1, 2 veya 3 girin.\n"),
            }
        }
        Ok(())
    }

    async fn chat_with(&self, editor: &mut DefaultEditor) -> Result<()> {
        let Some(collection) = self.select_collection(editor).await? else {
            return Ok(());
        };
        self.pipeline().switch_collection(&collection).await?;
        self.check_model().await;

        println!("\n{RULE}");
        println!("Doküman Sohbet Botu - Sohbet Modu");
        println!("{RULE}");
        println!("Çıkmak için '/exit' veya '/quit', geçmişi silmek için '/clear' yazın\n");

        loop {
            let line = match editor.readline("Siz: ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                    println!("\n\nSohbet sonlandırıldı.\n");
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            match classify_input(&line) {
                ChatInput::Skip => {}
                ChatInput::Exit => {
                    println!("\nSohbet sonlandırıldı.\n");
                    break;
                }
                ChatInput::Clear => {
                    self.pipeline().clear_memory().await;
                    println!("✓ Konuşma geçmişi temizlendi.\n");
                }
                ChatInput::Question(question) => {
                    editor.add_history_entry(question.as_str())?;
                    if let Err(e) = self.ask(&question).await {
                        error!(error = %e, "question failed");
                        println!("\n❌ Hata: {e}\n");
                    }
                }
            }
        }
        Ok(())
    }

    /// Stream one answer to stdout. Ctrl-C abandons the answer; nothing is
    /// recorded in memory for it.
    async fn ask(&self, question: &str) -> Result<()> {
        let answer = tokio::select! {
            answer = self.pipeline().query_stream(question) => answer?,
            _ = tokio::signal::ctrl_c() => {
                println!("\n\nSorgu iptal edildi.\n");
                return Ok(());
            }
        };

        print!("\nBot: ");
        io::stdout().flush()?;
        let mut fragments = answer.fragments;
        loop {
            tokio::select! {
                fragment = fragments.next() => match fragment {
                    Some(text) => {
                        print!("{text}");
                        io::stdout().flush()?;
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    println!("\n\nSorgu iptal edildi.\n");
                    return Ok(());
                }
            }
        }
        println!("\n");

        if self.config().cli.show_sources && !answer.sources.is_empty() {
            println!("Kaynaklar:");
            for source in &answer.sources {
                println!("{}", format_source(source));
            }
            println!();
        }
        Ok(())
    }

    async fn select_collection(&self, editor: &mut DefaultEditor) -> Result<Option<String>> {
        let collections = self.pipeline().list_collections().await?;
        match choose_collection(self.last_loaded(), collections) {
            CollectionChoice::Loaded(name) => {
                println!("\n✓ Collection yüklendi: {name}\n");
                Ok(Some(name))
            }
            CollectionChoice::Only(info) => {
                println!("\n✓ Collection yüklendi: {}\n", describe(&info));
                Ok(Some(info.name))
            }
            CollectionChoice::Nothing => {
                println!("\n❌ Henüz doküman yüklenmemiş. Önce bir doküman yükleyin.\n");
                Ok(None)
            }
            CollectionChoice::Ask(candidates) => {
                println!("\nMevcut collection'lar:");
                for (i, candidate) in candidates.iter().enumerate() {
                    println!("  [{}] {}", i + 1, describe(candidate));
                }
                loop {
                    let prompt = "\nKullanmak istediğiniz collection numarasını girin: ";
                    match editor.readline(prompt) {
                        Ok(line) => match parse_selection(&line, candidates.len()) {
                            Some(i) => {
                                let name = candidates[i].name.clone();
                                println!("\n✓ Collection yüklendi: {name}\n");
                                return Ok(Some(name));
                            }
                            None => println!(
                                "❌ Geçersiz seçim. Lütfen 1 ile {} arasında bir numara girin.",
                                candidates.len()
                            ),
                        },
                        Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                            println!("\n\nİşlem iptal edildi.\n");
                            return Ok(None);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_commands_are_case_insensitive() {
        assert_eq!(classify_input("/exit"), ChatInput::Exit);
        assert_eq!(classify_input("  /QUIT "), ChatInput::Exit);
        assert_eq!(classify_input("/çıkış"), ChatInput::Exit);
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(classify_input(""), ChatInput::Skip);
        assert_eq!(classify_input("   \t"), ChatInput::Skip);
    }

    #[test]
    fn questions_are_trimmed() {
        assert_eq!(classify_input("/clear"), ChatInput::Clear);
        assert_eq!(
            classify_input("  Rapor neyi anlatıyor?  "),
            ChatInput::Question("Rapor neyi anlatıyor?".to_string())
        );
    }

    #[test]
    fn sources_render_file_page_and_similarity() {
        let source = SourceCitation {
            source_file: "rapor.pdf".to_string(),
            page: 3,
            similarity: 0.812,
            text_snippet: "metin".to_string(),
            chunk_id: 7,
        };
        assert_eq!(format_source(&source), "  - rapor.pdf, Sayfa 3 (Benzerlik: 0.812)");
    }
}
