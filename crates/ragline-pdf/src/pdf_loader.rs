//! PDF directory loader backed by `pdf-extract`.

use std::path::{Path, PathBuf};

use ragline_core::error::RagError;
use ragline_core::types::Document;
use tracing::{debug, info, warn};

use crate::DocumentLoader;

/// Loads every `*.pdf` file directly inside a directory.
///
/// Files are visited in file-name order. Hidden files and subdirectories are
/// skipped. Each file becomes one [`Document`] whose `source` is the
/// directory joined with the file name, as given by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfDirectoryLoader;

impl PdfDirectoryLoader {
    pub fn new() -> Self {
        Self
    }

    /// List the PDF files in `directory`, sorted by file name.
    pub fn list_pdfs(directory: &Path) -> Result<Vec<PathBuf>, RagError> {
        let entries = std::fs::read_dir(directory).map_err(|e| RagError::Extraction {
            path: directory.display().to_string(),
            reason: format!("cannot read directory: {}", e),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            let is_pdf = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false);
            if is_pdf {
                files.push(directory.join(entry.file_name()));
            }
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// Extract one PDF file into a document with one page per PDF page.
    ///
    /// `pdf-extract` can panic on malformed input; the panic is contained and
    /// reported as an extraction error for this file.
    pub fn load_file(path: &Path) -> Result<Document, RagError> {
        let source = path.display().to_string();

        let extracted = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pdf_extract::extract_text_by_pages(path)
        }));

        let pages = match extracted {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => {
                warn!(path = %source, error = %e, "PDF extraction failed");
                return Err(RagError::Extraction {
                    path: source,
                    reason: e.to_string(),
                });
            }
            Err(panic_payload) => {
                let reason = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic in PDF parser".to_string()
                };
                warn!(path = %source, reason = %reason, "PDF parser panicked");
                return Err(RagError::Extraction {
                    path: source,
                    reason,
                });
            }
        };

        debug!(path = %source, pages = pages.len(), "PDF extracted");
        Ok(Document::from_page_texts(source, pages))
    }

    fn load_sync(directory: &Path) -> Result<Vec<Document>, RagError> {
        let files = Self::list_pdfs(directory)?;
        let mut documents = Vec::with_capacity(files.len());
        for file in &files {
            documents.push(Self::load_file(file)?);
        }

        info!(
            directory = %directory.display(),
            documents = documents.len(),
            pages = documents.iter().map(Document::page_count).sum::<usize>(),
            "Loaded PDFs"
        );
        Ok(documents)
    }
}

impl DocumentLoader for PdfDirectoryLoader {
    async fn load(&self, directory: &Path) -> Result<Vec<Document>, RagError> {
        // PDF parsing is CPU-bound; run it on a blocking thread.
        let directory = directory.to_path_buf();
        tokio::task::spawn_blocking(move || Self::load_sync(&directory))
            .await
            .map_err(|e| RagError::Extraction {
                path: "<loader>".to_string(),
                reason: format!("extraction task failed: {}", e),
            })?
    }
}
