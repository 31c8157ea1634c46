//! Table of contents artifacts.
//!
//! Manuals ship their table of contents either as JSON keyed by chapter, or as
//! a plain text file with one `page;title` entry per line.

use crate::error::{ErrorKind, Result};
use crate::ordered::{Label, ordered_map};
use exn::ResultExt;
use serde::Deserialize;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub number: String,
    pub name: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// Key the chapter is stored under, also used as the page chapter key.
    pub key: String,
    pub name: String,
    pub first_page: String,
    pub sections: Vec<Section>,
}

/// One line of the delimited form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub page: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOfContents {
    Chapters(Vec<Chapter>),
    Entries(Vec<TocEntry>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChapter {
    #[serde(default)]
    name: String,
    #[serde(default)]
    first_page: Label,
    #[serde(default)]
    sections: Vec<RawSection>,
}

#[derive(Deserialize)]
struct RawSection {
    #[serde(default)]
    number: Label,
    #[serde(default)]
    name: String,
    #[serde(default)]
    filename: String,
}

#[derive(Deserialize)]
#[serde(transparent)]
struct RawToc(#[serde(deserialize_with = "ordered_map")] Vec<(String, RawChapter)>);

impl TableOfContents {
    /// Parse either form; JSON is recognised by a leading `{`.
    #[instrument(skip(bytes), fields(bytes = bytes.len()))]
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).or_raise(|| ErrorKind::InvalidToc)?;
        let trimmed = text.trim_start_matches('\u{feff}').trim_start();
        if trimmed.starts_with('{') {
            Self::from_json(trimmed)
        } else {
            Self::from_delimited(trimmed)
        }
    }

    fn from_json(text: &str) -> Result<Self> {
        let RawToc(raw) = serde_json::from_str(text).or_raise(|| ErrorKind::InvalidToc)?;
        let chapters = raw
            .into_iter()
            .map(|(key, chapter)| Chapter {
                key,
                name: chapter.name,
                first_page: chapter.first_page.into(),
                sections: chapter
                    .sections
                    .into_iter()
                    .map(|s| Section {
                        number: s.number.into(),
                        name: s.name,
                        filename: s.filename,
                    })
                    .collect(),
            })
            .collect();
        Ok(Self::Chapters(chapters))
    }

    fn from_delimited(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let malformed = || ErrorKind::MalformedTocLine {
                line: index + 1,
                value: line.to_string(),
            };
            let Some((page, title)) = line.split_once(';') else {
                exn::bail!(malformed());
            };
            let (page, title) = (page.trim(), title.trim());
            if page.is_empty() || title.is_empty() {
                exn::bail!(malformed());
            }
            entries.push(TocEntry {
                page: page.to_string(),
                title: title.to_string(),
            });
        }
        Ok(Self::Entries(entries))
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Chapters(chapters) => chapters.len(),
            Self::Entries(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
