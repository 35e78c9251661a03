// src/analyze/normalize.rs
//! Text normalizer: raw filing bytes → flat text + lowercase token sequence.
//!
//! Steps:
//! 1) lossy UTF-8 decode
//! 2) drop `<script>`, `<style>`, `<noscript>` blocks and HTML comments
//! 3) turn page-break markers (`page-break-before/after: always`, `<hr>`,
//!    `<PAGE>`, form feeds) into a sentinel so page positions survive
//! 4) replace remaining tags with spaces, decode entities
//! 5) collapse whitespace (case is kept in `text`, tokens are lowercased)
//!
//! Token spans are byte offsets into `NormalizedDocument::text` and always sit
//! on char boundaries.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::errors::{MonitorError, MonitorResult};

/// Used for the linear page estimate when a document carries no page breaks.
pub const DEFAULT_TOKENS_PER_PAGE: usize = 500;

const PAGE_BREAK: char = '\u{000C}';

/// A single token with byte span and sequential index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub index: usize, // 0-based token index in the sequence
}

/// Basic, Unicode-friendly tokenizer. Token text is lowercased; spans point
/// into `input`.
pub fn tokenize(input: &str) -> Vec<Token> {
    static RE_WORD: OnceCell<Regex> = OnceCell::new();
    let re = RE_WORD.get_or_init(|| Regex::new(r"(?u)\w+").expect("tokenizer regex"));
    re.find_iter(input)
        .enumerate()
        .map(|(i, m)| Token {
            text: m.as_str().to_lowercase(),
            start: m.start(),
            end: m.end(),
            index: i,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDocument {
    /// Flattened, whitespace-collapsed text (original case).
    pub text: String,
    pub tokens: Vec<Token>,
    /// Byte offsets into `text` where a page break was found, ascending.
    pub page_breaks: Vec<usize>,
    tokens_per_page: usize,
}

impl NormalizedDocument {
    /// Build from already-flat text (no markup handling).
    pub fn from_text(text: &str) -> Self {
        let (text, page_breaks) = collapse_whitespace(text);
        let tokens = tokenize(&text);
        Self {
            text,
            tokens,
            page_breaks,
            tokens_per_page: DEFAULT_TOKENS_PER_PAGE,
        }
    }

    pub fn with_tokens_per_page(mut self, tokens_per_page: usize) -> Self {
        self.tokens_per_page = tokens_per_page.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Lowercase token strings in document order.
    pub fn words(&self) -> Vec<&str> {
        self.tokens.iter().map(|t| t.text.as_str()).collect()
    }

    /// Coarse page number for a token. Counts explicit page breaks when the
    /// document has any, otherwise assumes `tokens_per_page` tokens per page.
    pub fn estimated_page(&self, token_index: usize) -> Option<u32> {
        let tok = self.tokens.get(token_index)?;
        let page = if self.page_breaks.is_empty() {
            token_index / self.tokens_per_page + 1
        } else {
            self.page_breaks.partition_point(|&b| b <= tok.start) + 1
        };
        u32::try_from(page).ok()
    }

    /// Text window of at most `budget` characters centered between tokens `a`
    /// and `b`, cut on token boundaries. Cuts are marked with `...`.
    pub fn excerpt(&self, a: usize, b: usize, budget: usize) -> String {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let (Some(first), Some(last)) = (self.tokens.get(lo), self.tokens.get(hi)) else {
            return String::new();
        };
        let chars = self.text.chars().count();
        if chars <= budget {
            return self.text.clone();
        }
        let len = self.text.len();

        // Window bounds are chosen in chars, then mapped back to byte offsets.
        let char_pos = |byte: usize| self.text[..byte].chars().count();
        let byte_pos = |ch: usize| {
            self.text
                .char_indices()
                .nth(ch)
                .map_or(len, |(i, _)| i)
        };
        let mid = (char_pos(first.start) + char_pos(last.end)) / 2;
        let mut start_ch = mid.saturating_sub(budget / 2);
        let end_ch = (start_ch + budget).min(chars);
        if end_ch - start_ch < budget {
            start_ch = end_ch.saturating_sub(budget);
        }
        let start = byte_pos(start_ch);
        let end_raw = byte_pos(end_ch);

        // Snap inward to whole tokens.
        let start_tok = self.tokens.partition_point(|t| t.start < start);
        let end_tok = self.tokens.partition_point(|t| t.end <= end_raw);
        let (from, to) = if start_tok < end_tok {
            let from = if start == 0 { 0 } else { self.tokens[start_tok].start };
            let to = if end_raw == len {
                len
            } else {
                self.tokens[end_tok - 1].end
            };
            (from, to)
        } else {
            // Budget smaller than a single token.
            (first.start, first.end)
        };

        let mut out = String::with_capacity(to - from + 6);
        if from > 0 {
            out.push_str("...");
        }
        out.push_str(self.text[from..to].trim());
        if to < len {
            out.push_str("...");
        }
        out
    }
}

/// Convert raw document bytes (HTML or plain text) into a normalized document.
pub fn normalize(raw: &[u8]) -> MonitorResult<NormalizedDocument> {
    normalize_with(raw, DEFAULT_TOKENS_PER_PAGE)
}

pub fn normalize_with(raw: &[u8], tokens_per_page: usize) -> MonitorResult<NormalizedDocument> {
    let decoded = String::from_utf8_lossy(raw);
    let flat = strip_markup(&decoded);
    let doc = NormalizedDocument::from_text(&flat).with_tokens_per_page(tokens_per_page);
    if doc.is_empty() {
        return Err(MonitorError::NormalizationFailure(format!(
            "no words in {} byte body",
            raw.len()
        )));
    }
    Ok(doc)
}

fn strip_markup(s: &str) -> String {
    static RE_BLOCKS: OnceCell<Regex> = OnceCell::new();
    static RE_PAGE: OnceCell<Regex> = OnceCell::new();
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();

    let re_blocks = RE_BLOCKS.get_or_init(|| {
        Regex::new(
            r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<!--.*?-->",
        )
        .expect("block regex")
    });
    let re_page = RE_PAGE.get_or_init(|| {
        Regex::new(
            r"(?is)<[^>]*page-break-(?:before|after)\s*:\s*always[^>]*>|<hr\b[^>]*>|<page>",
        )
        .expect("page-break regex")
    });
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z!?][^>]*>").expect("tag regex"));

    let out = re_blocks.replace_all(s, " ");
    let out = re_page.replace_all(&out, " \u{000C} ");
    let out = re_tags.replace_all(&out, " ");
    html_escape::decode_html_entities(&out).into_owned()
}

/// Collapse whitespace runs to one space, trim, and pull out page-break
/// sentinels as byte offsets into the returned text.
fn collapse_whitespace(s: &str) -> (String, Vec<usize>) {
    let mut out = String::with_capacity(s.len());
    let mut breaks = Vec::new();
    let mut pending_space = false;

    for c in s.chars() {
        if c == PAGE_BREAK {
            pending_space = true;
            if breaks.last() != Some(&out.len()) {
                breaks.push(out.len());
            }
        } else if c.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        }
    }

    // A break recorded right before a collapsed space points at the space;
    // shift it onto the next word so `<=` lookups stay exact.
    for b in breaks.iter_mut() {
        if out.as_bytes().get(*b) == Some(&b' ') {
            *b += 1;
        }
    }
    // Breaks before any text do not start a new page.
    breaks.retain(|&b| b > 0);
    breaks.dedup();
    (out, breaks)
}
