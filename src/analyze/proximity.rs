// src/analyze/proximity.rs
//! Proximity matcher: finds every (trigger, context) phrase combination that
//! occurs within `window` tokens. Pure, no I/O.

use std::collections::HashMap;

use super::normalize::NormalizedDocument;
use super::terms::{TermIndex, TermSet};

/// One qualifying phrase combination with the offsets of its representative
/// pair (the first qualifying pair in document order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProximityMatch {
    pub trigger: String,
    pub context: String,
    pub trigger_offset: usize,
    pub context_offset: usize,
}

impl ProximityMatch {
    pub fn distance(&self) -> usize {
        self.trigger_offset.abs_diff(self.context_offset)
    }

    /// `(first, last)` token offsets of the pair.
    pub fn span(&self) -> (usize, usize) {
        (
            self.trigger_offset.min(self.context_offset),
            self.trigger_offset.max(self.context_offset),
        )
    }
}

/// Match a normalized document against the index.
pub fn find_matches(doc: &NormalizedDocument, terms: &TermIndex) -> Vec<ProximityMatch> {
    let words = doc.words();
    match_words(&words, &terms.trigger, &terms.context, terms.window)
}

/// Core matcher over a token sequence.
///
/// A pair qualifies when `|trigger_offset - context_offset| <= window`. Each
/// distinct phrase combination is reported once; its offsets come from the
/// earliest trigger occurrence that qualifies, nearest context first. An
/// occurrence is never paired with itself when a phrase sits in both sets.
pub fn match_words<S: AsRef<str>>(
    words: &[S],
    trigger: &TermSet,
    context: &TermSet,
    window: usize,
) -> Vec<ProximityMatch> {
    let trig_occ = trigger.occurrences(words);
    let ctx_occ = context.occurrences(words);
    if trig_occ.is_empty() || ctx_occ.is_empty() {
        return Vec::new();
    }

    // ctx_occ is ordered by offset: binary-search the window bounds.
    let mut best: HashMap<(usize, usize), ProximityMatch> = HashMap::new();
    for &(t_idx, t_off) in &trig_occ {
        let lo = t_off.saturating_sub(window);
        let hi = t_off.saturating_add(window);
        let from = ctx_occ.partition_point(|&(_, off)| off < lo);
        let to = ctx_occ.partition_point(|&(_, off)| off <= hi);

        let mut cands: Vec<(usize, usize)> = ctx_occ[from..to].to_vec();
        cands.sort_by_key(|&(_, off)| (off.abs_diff(t_off), off));

        let Some(t_phrase) = trigger.get(t_idx).map(|p| &p.text) else {
            continue;
        };
        for (c_idx, c_off) in cands {
            let Some(c_phrase) = context.get(c_idx).map(|p| &p.text) else {
                continue;
            };
            if c_off == t_off && c_phrase == t_phrase {
                continue;
            }
            best.entry((t_idx, c_idx)).or_insert_with(|| ProximityMatch {
                trigger: t_phrase.clone(),
                context: c_phrase.clone(),
                trigger_offset: t_off,
                context_offset: c_off,
            });
        }
    }

    let mut out: Vec<ProximityMatch> = best.into_values().collect();
    out.sort_by(|a, b| {
        a.span()
            .cmp(&b.span())
            .then_with(|| a.trigger.cmp(&b.trigger))
            .then_with(|| a.context.cmp(&b.context))
    });
    out
}
