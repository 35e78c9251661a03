// src/analyze/terms.rs
//! Term index: the two phrase sets a monitor looks for, plus the window.
//!
//! Phrases are tokenized with the document tokenizer, so `"nation-state"`
//! matches the token run `["nation", "state"]` and case never matters.

use std::collections::HashMap;

use super::normalize::tokenize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    /// Canonical form: lowercase tokens joined by single spaces.
    pub text: String,
    pub tokens: Vec<String>,
}

/// Ordered list of case-insensitive phrases.
#[derive(Debug, Clone, Default)]
pub struct TermSet {
    phrases: Vec<Phrase>,
    // first token -> phrase indices starting with it
    by_first: HashMap<String, Vec<usize>>,
}

impl TermSet {
    /// Empty phrases are dropped, duplicates keep their first position.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for raw in phrases {
            let tokens: Vec<String> = tokenize(raw.as_ref()).into_iter().map(|t| t.text).collect();
            if tokens.is_empty() {
                continue;
            }
            let text = tokens.join(" ");
            if set.phrases.iter().any(|p| p.text == text) {
                continue;
            }
            set.by_first
                .entry(tokens[0].clone())
                .or_default()
                .push(set.phrases.len());
            set.phrases.push(Phrase { text, tokens });
        }
        set
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Phrase> {
        self.phrases.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&Phrase> {
        self.phrases.get(idx)
    }

    /// Membership test for a raw phrase (normalized the same way as entries).
    pub fn contains(&self, phrase: &str) -> bool {
        self.position(phrase).is_some()
    }

    pub fn position(&self, phrase: &str) -> Option<usize> {
        let key = tokenize(phrase)
            .into_iter()
            .map(|t| t.text)
            .collect::<Vec<_>>()
            .join(" ");
        self.phrases.iter().position(|p| p.text == key)
    }

    /// Every `(phrase index, start token offset)` where a phrase occurs as a
    /// contiguous run in `words`, ordered by offset then phrase index.
    pub fn occurrences<S: AsRef<str>>(&self, words: &[S]) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for (offset, w) in words.iter().enumerate() {
            let Some(cands) = self.by_first.get(w.as_ref()) else {
                continue;
            };
            for &idx in cands {
                let toks = &self.phrases[idx].tokens;
                let end = offset + toks.len();
                if end <= words.len()
                    && toks
                        .iter()
                        .zip(&words[offset..end])
                        .all(|(a, b)| a == b.as_ref())
                {
                    out.push((idx, offset));
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermRole {
    Trigger,
    Context,
    Both,
}

/// Trigger set, context set and proximity window (in tokens).
#[derive(Debug, Clone)]
pub struct TermIndex {
    pub trigger: TermSet,
    pub context: TermSet,
    pub window: usize,
}

impl TermIndex {
    pub fn new(trigger: TermSet, context: TermSet, window: usize) -> Self {
        Self {
            trigger,
            context,
            window,
        }
    }

    pub fn from_lists<S: AsRef<str>>(trigger: &[S], context: &[S], window: usize) -> Self {
        Self::new(
            TermSet::new(trigger.iter().map(|s| s.as_ref())),
            TermSet::new(context.iter().map(|s| s.as_ref())),
            window,
        )
    }

    /// Which set(s) a phrase belongs to.
    pub fn role_of(&self, phrase: &str) -> Option<TermRole> {
        match (self.trigger.contains(phrase), self.context.contains(phrase)) {
            (true, true) => Some(TermRole::Both),
            (true, false) => Some(TermRole::Trigger),
            (false, true) => Some(TermRole::Context),
            (false, false) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrases_are_normalized_and_deduped() {
        let set = TermSet::new(["Nation-State", "nation state", "", "  ", "PRC"]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0).unwrap().tokens, vec!["nation", "state"]);
        assert!(set.contains("NATION STATE"));
        assert!(set.contains("prc"));
        assert!(!set.contains("china"));
    }

    #[test]
    fn occurrences_match_contiguous_runs_only() {
        let set = TermSet::new(["export control", "china"]);
        let words = ["export", "control", "rules", "export", "china", "control"];
        assert_eq!(set.occurrences(&words), vec![(0, 0), (1, 4)]);
    }

    #[test]
    fn occurrences_handle_phrases_sharing_a_first_token() {
        let set = TermSet::new(["export", "export license", "export licenses"]);
        let words = ["an", "export", "license"];
        assert_eq!(set.occurrences(&words), vec![(0, 1), (1, 1)]);
    }

    #[test]
    fn role_lookup() {
        let idx = TermIndex::from_lists(
            &["cyber incident", "advanced persistent threat"],
            &["nation-state", "advanced persistent threat"],
            100,
        );
        assert_eq!(idx.role_of("Cyber Incident"), Some(TermRole::Trigger));
        assert_eq!(idx.role_of("nation state"), Some(TermRole::Context));
        assert_eq!(
            idx.role_of("advanced persistent threat"),
            Some(TermRole::Both)
        );
        assert_eq!(idx.role_of("ransomware"), None);
    }
}
