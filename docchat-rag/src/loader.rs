//! Document loading: validation, page extraction, and collection naming.
//!
//! PDF text comes from `pdf-extract` (feature `pdf`) one page at a time.
//! Plain text and Markdown files separate pages with form feeds, so a file
//! without form feeds is a single page.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::document::Page;
use crate::error::{RagError, Result};

/// Prefix used for collection names when none is configured.
pub const DEFAULT_COLLECTION_PREFIX: &str = "pdf";

const PAGE_BREAK: char = '\x0C';

/// Summary of a document on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentInfo {
    /// File name without directories.
    pub filename: String,
    /// Path the document was read from.
    pub path: PathBuf,
    /// Number of pages, including pages without text.
    pub total_pages: usize,
    /// File size in megabytes, rounded to two decimals.
    pub file_size_mb: f64,
}

/// A document read and extracted in one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub info: DocumentInfo,
    /// Pages with text, numbered as in the source document.
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    Text,
}

/// Validates documents and extracts their pages.
///
/// # Example
///
/// ```rust,ignore
/// use docchat_rag::{DocumentLoader, LoaderConfig};
///
/// let loader = DocumentLoader::new(LoaderConfig::default());
/// let pages = loader.extract_pages("rapor.pdf".as_ref()).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    config: LoaderConfig,
}

impl DocumentLoader {
    /// Create a loader with the given limits.
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// File extensions this build accepts, lowercase and without the dot.
    pub fn supported_extensions() -> &'static [&'static str] {
        if cfg!(feature = "pdf") { &["pdf", "txt", "md"] } else { &["txt", "md"] }
    }

    /// Check that `path` exists, has a supported extension, and is within the
    /// size limit. Returns the file size in bytes.
    ///
    /// # Errors
    ///
    /// [`RagError::NotFound`], [`RagError::InvalidFormat`], or
    /// [`RagError::TooLarge`].
    pub async fn validate(&self, path: &Path) -> Result<u64> {
        self.kind_of(path)?;
        self.checked_size(path).await
    }

    /// Describe a document without chunking it.
    pub async fn info(&self, path: &Path) -> Result<DocumentInfo> {
        let size = self.validate(path).await?;
        let total_pages = self.page_texts(path).await?.len();
        Ok(describe(path, size, total_pages))
    }

    /// Validate and extract a document, returning its description together
    /// with the pages that have text. The file is read once.
    ///
    /// Pages are numbered from 1. Blank pages are skipped but keep their
    /// numbers, so page provenance matches the source document.
    ///
    /// # Errors
    ///
    /// The validation errors of [`validate`](Self::validate), extraction
    /// failures as [`RagError::InvalidFormat`], and [`RagError::NoText`] when
    /// no page has text (for example an image-only PDF).
    pub async fn load(&self, path: &Path) -> Result<LoadedDocument> {
        let size = self.validate(path).await?;
        let segments = self.page_texts(path).await?;
        let total = segments.len();

        let mut pages = Vec::with_capacity(total);
        for (i, segment) in segments.iter().enumerate() {
            let number = u32::try_from(i + 1).unwrap_or(u32::MAX);
            let text = segment.trim();
            if text.is_empty() {
                warn!(path = %path.display(), page = number, "page has no extractable text");
                continue;
            }
            pages.push(Page::new(number, text));
        }

        if pages.is_empty() {
            return Err(RagError::NoText(path.to_path_buf()));
        }
        info!(path = %path.display(), total_pages = total, text_pages = pages.len(), "extracted");
        Ok(LoadedDocument { info: describe(path, size, total), pages })
    }

    /// Extract the text of every page that has any. See [`load`](Self::load).
    pub async fn extract_pages(&self, path: &Path) -> Result<Vec<Page>> {
        Ok(self.load(path).await?.pages)
    }

    fn kind_of(&self, path: &Path) -> Result<DocumentKind> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" if cfg!(feature = "pdf") => Ok(DocumentKind::Pdf),
            "txt" | "md" => Ok(DocumentKind::Text),
            _ => {
                let supported: Vec<String> =
                    Self::supported_extensions().iter().map(|e| format!(".{e}")).collect();
                Err(RagError::InvalidFormat(format!(
                    "{}: supported extensions are {}",
                    path.display(),
                    supported.join(", ")
                )))
            }
        }
    }

    async fn checked_size(&self, path: &Path) -> Result<u64> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RagError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(RagError::InvalidFormat(format!("{} is not a file", path.display())));
        }

        let size = metadata.len();
        let limit = self.config.max_file_size_bytes();
        if size > limit {
            return Err(RagError::TooLarge { size_bytes: size, limit_bytes: limit });
        }
        Ok(size)
    }

    /// Raw text of every page, blank ones included, in document order.
    async fn page_texts(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = tokio::fs::read(path).await?;
        debug!(path = %path.display(), size_bytes = bytes.len(), "read document");

        match self.kind_of(path)? {
            DocumentKind::Text => {
                let text = String::from_utf8(bytes).map_err(|e| {
                    RagError::InvalidFormat(format!("{} is not valid UTF-8: {e}", path.display()))
                })?;
                Ok(split_pages(&text).into_iter().map(str::to_owned).collect())
            }
            DocumentKind::Pdf => extract_pdf_pages(path, bytes).await,
        }
    }
}

#[cfg(feature = "pdf")]
async fn extract_pdf_pages(path: &Path, bytes: Vec<u8>) -> Result<Vec<String>> {
    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .await
        .map_err(|e| RagError::PipelineError(format!("PDF extraction task failed: {e}")))?
        .map_err(|e| RagError::InvalidFormat(format!("{display}: cannot read PDF: {e}")))
}

#[cfg(not(feature = "pdf"))]
async fn extract_pdf_pages(path: &Path, _bytes: Vec<u8>) -> Result<Vec<String>> {
    Err(RagError::InvalidFormat(format!(
        "{}: PDF support is not enabled in this build",
        path.display()
    )))
}

/// Split extracted text into per-page segments on form feeds.
///
/// A trailing form feed closes the last page rather than opening a new one.
fn split_pages(raw: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = raw.split(PAGE_BREAK).collect();
    if segments.len() > 1 && segments.last().is_some_and(|s| s.trim().is_empty()) {
        segments.pop();
    }
    segments
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn describe(path: &Path, size: u64, total_pages: usize) -> DocumentInfo {
    DocumentInfo {
        filename: file_name(path),
        path: path.to_path_buf(),
        total_pages,
        file_size_mb: (size as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0,
    }
}

/// Collection name for a document: `"{prefix}_{stem}"`, with every character
/// outside `[A-Za-z0-9_-]` replaced by `_`.
///
/// When replacement changed anything, the first 8 hex digits of the SHA-256
/// of the unsanitized name are appended, so `a b.pdf` and `a_b.pdf` get
/// different collections.
///
/// ```rust,ignore
/// assert_eq!(collection_name_for("guide.pdf", "pdf"), "pdf_guide");
/// assert!(collection_name_for("Yıllık Rapor.pdf", "pdf").starts_with("pdf_Y_ll_k_Rapor_"));
/// ```
pub fn collection_name_for(filename: &str, prefix: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());

    let raw = format!("{prefix}_{stem}");
    let name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if name == raw {
        return name;
    }

    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("{name}_{}", &hash[..8])
}
