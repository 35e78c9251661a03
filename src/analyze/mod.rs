// src/analyze/mod.rs
//! Analysis pipeline entry: normalize a fetched document, run the proximity
//! matcher, and summarize what was found for the result sink.

pub mod normalize;
pub mod proximity;
pub mod terms;

use std::collections::BTreeSet;

use crate::errors::MonitorResult;

// Re-export convenient types.
pub use crate::analyze::normalize::{normalize, normalize_with, NormalizedDocument, Token};
pub use crate::analyze::proximity::{find_matches, match_words, ProximityMatch};
pub use crate::analyze::terms::{TermIndex, TermRole, TermSet};

pub const DEFAULT_EXCERPT_CHARS: usize = 500;

/// Summary of one document's qualifying pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub matches: Vec<ProximityMatch>,
    pub trigger_terms: Vec<String>,
    pub context_terms: Vec<String>,
    pub excerpt: String,
    pub estimated_page: Option<u32>,
}

/// Stateless document analyzer shared by both monitor variants.
#[derive(Debug, Clone)]
pub struct Analyzer {
    pub terms: TermIndex,
    pub excerpt_chars: usize,
    pub tokens_per_page: usize,
}

impl Analyzer {
    pub fn new(terms: TermIndex) -> Self {
        Self {
            terms,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
            tokens_per_page: normalize::DEFAULT_TOKENS_PER_PAGE,
        }
    }

    pub fn with_excerpt_chars(mut self, n: usize) -> Self {
        self.excerpt_chars = n.max(1);
        self
    }

    pub fn with_tokens_per_page(mut self, n: usize) -> Self {
        self.tokens_per_page = n.max(1);
        self
    }

    /// Normalize raw bytes and match. `Ok(None)` means no qualifying pair.
    pub fn analyze_bytes(&self, raw: &[u8]) -> MonitorResult<Option<Analysis>> {
        let doc = normalize_with(raw, self.tokens_per_page)?;
        Ok(self.analyze(&doc))
    }

    pub fn analyze(&self, doc: &NormalizedDocument) -> Option<Analysis> {
        let matches = find_matches(doc, &self.terms);
        let first = matches.first()?;

        let (lo, hi) = first.span();
        let excerpt = doc.excerpt(lo, hi, self.excerpt_chars);
        let estimated_page = doc.estimated_page(lo);

        let trigger_terms: BTreeSet<&str> = matches.iter().map(|m| m.trigger.as_str()).collect();
        let context_terms: BTreeSet<&str> = matches.iter().map(|m| m.context.as_str()).collect();

        Some(Analysis {
            trigger_terms: trigger_terms.into_iter().map(String::from).collect(),
            context_terms: context_terms.into_iter().map(String::from).collect(),
            excerpt,
            estimated_page,
            matches,
        })
    }
}
