mod consts;
mod context;
pub mod error;
mod index;
mod ordered;
mod query;
mod text;
mod toc;

pub use crate::consts::{MAX_RESULTS, NO_CONTEXT};
pub use crate::context::{extract_context, highlight};
pub use crate::index::{Occurrence, Page, SearchIndex, WordEntry};
pub use crate::query::SearchResult;
pub use crate::text::{MatchKind, classify, tokenize};
pub use crate::toc::{Chapter, Section, TableOfContents, TocEntry};
