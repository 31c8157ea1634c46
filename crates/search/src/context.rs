//! Excerpt extraction and query highlighting.
//!
//! Both functions are total: they degrade to the input (or the
//! [`NO_CONTEXT`] sentinel) instead of failing.

use crate::consts::{
    CONTEXT_LEAD_CHARS, CONTEXT_SPAN_CHARS, CONTEXT_STEP_CHARS, CONTEXT_WINDOW_CHARS, ELLIPSIS, HIGHLIGHT_CLOSE,
    HIGHLIGHT_OPEN, NO_CONTEXT, WEAK_PREFIX_CHARS, WORD_REGEX,
};
use crate::text::{classify, tokenize, tokenize_all};
use std::collections::HashSet;

/// Pick the most relevant excerpt of `page_text` for `query`.
///
/// Offsets are counted in characters, so multi-byte letters never split.
pub fn extract_context(page_text: &str, query: &str) -> String {
    if page_text.trim().is_empty() {
        return NO_CONTEXT.to_string();
    }

    let chars: Vec<char> = page_text.chars().collect();
    // One lowercase char per source char keeps window offsets aligned.
    let lowered: Vec<char> = chars.iter().map(|c| c.to_lowercase().next().unwrap_or(*c)).collect();

    let mut seen = HashSet::new();
    let tokens: Vec<String> = tokenize_all(query).into_iter().filter(|t| seen.insert(t.clone())).collect();

    let best = best_window(&lowered, &tokens);
    let start = best.saturating_sub(CONTEXT_LEAD_CHARS);
    let end = (best + CONTEXT_SPAN_CHARS).min(chars.len());

    let mut out = String::with_capacity((end - start) + 2 * ELLIPSIS.len());
    if start > 0 {
        out.push_str(ELLIPSIS);
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push_str(ELLIPSIS);
    }
    out
}

/// Start offsets of every candidate window; a single window at 0 when the
/// text is shorter than one window. The last window always ends at the end
/// of the text, even when the step does not land there.
fn window_starts(len: usize) -> impl Iterator<Item = usize> {
    let last = len.saturating_sub(CONTEXT_WINDOW_CHARS);
    let tail = (last % CONTEXT_STEP_CHARS != 0).then_some(last);
    (0..=last).step_by(CONTEXT_STEP_CHARS).chain(tail)
}

fn window(lowered: &[char], start: usize) -> String {
    lowered[start..(start + CONTEXT_WINDOW_CHARS).min(lowered.len())].iter().collect()
}

fn best_window(lowered: &[char], tokens: &[String]) -> usize {
    if tokens.is_empty() {
        return 0;
    }

    let mut best = (0, 0);
    for start in window_starts(lowered.len()) {
        let text = window(lowered, start);
        let score = tokens.iter().filter(|t| text.contains(t.as_str())).count();
        if score > best.1 {
            best = (start, score);
        }
    }
    if best.1 > 0 {
        return best.0;
    }

    // Weak pass: the leading letters of any token.
    let prefixes: Vec<String> = tokens.iter().map(|t| t.chars().take(WEAK_PREFIX_CHARS).collect()).collect();
    window_starts(lowered.len())
        .find(|&start| {
            let text = window(lowered, start);
            prefixes.iter().any(|p| text.contains(p.as_str()))
        })
        .unwrap_or(0)
}

/// Wrap every whole word of `context` that matches a query token in
/// `<mark>` tags.
///
/// Existing `<mark>` spans are copied through untouched, so calling this on
/// already highlighted text never nests markers.
pub fn highlight(context: &str, query: &str) -> String {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return context.to_string();
    }

    let mut out = String::with_capacity(context.len());
    let mut rest = context;
    while let Some(open) = rest.find(HIGHLIGHT_OPEN) {
        let (plain, marked) = rest.split_at(open);
        mark_words(plain, &tokens, &mut out);
        match marked.find(HIGHLIGHT_CLOSE) {
            Some(close) => {
                let end = close + HIGHLIGHT_CLOSE.len();
                out.push_str(&marked[..end]);
                rest = &marked[end..];
            }
            None => {
                // Unterminated marker: leave the remainder alone.
                out.push_str(marked);
                return out;
            }
        }
    }
    mark_words(rest, &tokens, &mut out);
    out
}

fn mark_words(plain: &str, tokens: &[String], out: &mut String) {
    let mut last = 0;
    for word in WORD_REGEX.find_iter(plain) {
        let lowered = word.as_str().to_lowercase();
        if !tokens.iter().any(|t| classify(t, &lowered).is_some()) {
            continue;
        }
        out.push_str(&plain[last..word.start()]);
        out.push_str(HIGHLIGHT_OPEN);
        out.push_str(word.as_str());
        out.push_str(HIGHLIGHT_CLOSE);
        last = word.end();
    }
    out.push_str(&plain[last..]);
}
