//! The per-manual search index artifact.
//!
//! Built offline from OCR output and shipped as JSON:
//!
//! ```json
//! {
//!   "words": { "motor": [{ "pageId": 3, "context": "...motoren sidder..." }] },
//!   "pages": [{ "chapter": "2", "page": "14", "imagePath": "images/page_014.jpg" }]
//! }
//! ```
//!
//! Loaded once and never mutated.

use crate::error::{ErrorKind, Result};
use crate::ordered::{Label, ordered_map};
use exn::ResultExt;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::instrument;

/// One appearance of an index word on a page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub page_id: u32,
    /// Snippet cached by the index builder around this appearance.
    #[serde(default)]
    pub context: String,
}

/// A normalized word and everywhere it appears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordEntry {
    pub word: String,
    pub occurrences: Vec<Occurrence>,
}

/// One scanned page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Ordinal identifier, stable within the manual.
    pub id: u32,
    pub chapter: String,
    pub page: String,
    pub image_path: String,
    /// Raw OCR text, when the artifact carries it.
    pub text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPage {
    #[serde(default)]
    id: Option<u32>,
    #[serde(default)]
    chapter: Label,
    #[serde(default)]
    page: Label,
    #[serde(default, alias = "image")]
    image_path: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct RawIndex {
    #[serde(default, deserialize_with = "ordered_map")]
    words: Vec<(String, Vec<Occurrence>)>,
    #[serde(default)]
    pages: Vec<RawPage>,
}

/// In-memory word index for one manual.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    words: Vec<WordEntry>,
    pages: Vec<Page>,
    page_positions: HashMap<u32, usize>,
}

impl SearchIndex {
    /// Decode the JSON artifact.
    #[instrument(skip(bytes), fields(bytes = bytes.as_ref().len()))]
    pub fn from_json(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let raw: RawIndex = serde_json::from_slice(bytes.as_ref()).or_raise(|| ErrorKind::InvalidIndex)?;
        let index = Self::from_parts(
            raw.words.into_iter().map(|(word, occurrences)| WordEntry { word: word.to_lowercase(), occurrences }),
            raw.pages.into_iter().enumerate().map(|(position, page)| Page {
                id: page.id.unwrap_or(position as u32),
                chapter: page.chapter.into(),
                page: page.page.into(),
                image_path: page.image_path,
                text: page.text.filter(|t| !t.trim().is_empty()),
            }),
        );
        tracing::debug!(words = index.words.len(), pages = index.pages.len(), "Loaded search index");
        Ok(index)
    }

    /// Build an index from already-decoded parts, keeping their order.
    pub fn from_parts(words: impl IntoIterator<Item = WordEntry>, pages: impl IntoIterator<Item = Page>) -> Self {
        let pages: Vec<Page> = pages.into_iter().collect();
        let page_positions = pages.iter().enumerate().map(|(position, page)| (page.id, position)).collect();
        Self {
            words: words.into_iter().collect(),
            pages,
            page_positions,
        }
    }

    pub fn words(&self) -> &[WordEntry] {
        &self.words
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, id: u32) -> Option<&Page> {
        self.page_positions.get(&id).map(|&position| &self.pages[position])
    }

    /// Every distinct page image path, in page order. Pages without an image
    /// path are skipped.
    pub fn image_paths(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.pages
            .iter()
            .map(|page| page.image_path.trim())
            .filter(|path| !path.is_empty() && seen.insert(*path))
            .map(str::to_string)
            .collect()
    }
}
