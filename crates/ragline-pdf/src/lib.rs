//! Ragline document loading.
//!
//! Provides the DocumentLoader trait for turning a directory into extracted
//! documents, a StaticLoader for testing, and a PdfDirectoryLoader that uses
//! `pdf-extract` to read every PDF in a directory page by page.

pub mod pdf_loader;

use std::path::Path;

use ragline_core::error::RagError;
use ragline_core::types::Document;

pub use pdf_loader::PdfDirectoryLoader;

/// Service for extracting documents from a directory.
///
/// Implementations return documents with their pages in page order. The
/// ingestion pipeline sorts documents by source before chunking, so loaders
/// are free to return them in any order.
pub trait DocumentLoader: Send + Sync {
    /// Load every supported document in `directory`.
    ///
    /// An empty directory yields an empty list; deciding whether that is an
    /// error is left to the caller.
    fn load(
        &self,
        directory: &Path,
    ) -> impl std::future::Future<Output = Result<Vec<Document>, RagError>> + Send;
}

/// Loader that returns a fixed set of documents regardless of directory.
///
/// Useful for exercising the ingestion pipeline without PDF fixtures.
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    documents: Vec<Document>,
}

impl StaticLoader {
    /// Create a loader that returns no documents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loader that returns the given documents.
    pub fn with_documents(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

impl DocumentLoader for StaticLoader {
    async fn load(&self, _directory: &Path) -> Result<Vec<Document>, RagError> {
        Ok(self.documents.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_loader_empty() {
        let loader = StaticLoader::new();
        let docs = loader.load(Path::new("/anywhere")).await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_static_loader_returns_documents() {
        let loader = StaticLoader::with_documents(vec![Document::from_page_texts(
            "doc.pdf",
            ["page one", "page two"],
        )]);
        let docs = loader.load(Path::new("/anywhere")).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].pages[1].text, "page two");
    }

    #[tokio::test]
    async fn test_static_loader_deterministic() {
        let loader =
            StaticLoader::with_documents(vec![Document::from_page_texts("a.pdf", ["x"])]);
        let d1 = loader.load(Path::new("/one")).await.unwrap();
        let d2 = loader.load(Path::new("/two")).await.unwrap();
        assert_eq!(d1, d2);
    }
}
