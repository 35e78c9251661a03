// src/ingest/config.rs
//! Watch-list loading: entity identifiers (CIKs) a monitor restricts itself to,
//! optionally labeled with a ticker.
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One watched entity. `cik` is zero-padded to 10 digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub cik: String,
    pub ticker: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Cik(String),
    Labeled { cik: String, ticker: Option<String> },
}

/// Load a watch-list from an explicit path. Supports TOML or JSON formats:
/// `entities = ["0001045810", ...]`, `[[entities]] cik = "...", ticker = "NVDA"`
/// or `["0001045810", {"cik": "...", "ticker": "..."}]`.
pub fn load_watchlist_from(path: &Path) -> Result<Vec<WatchEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading watch-list from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_watchlist(&content, ext.as_str())
}

fn parse_watchlist(s: &str, hint_ext: &str) -> Result<Vec<WatchEntry>> {
    // Try TOML first if hinted or content looks like toml.
    let try_toml = hint_ext == "toml" || s.contains("entities");
    let raw = try_toml
        .then(|| parse_toml(s).ok())
        .flatten()
        // Try JSON array
        .or_else(|| serde_json::from_str::<Vec<RawEntry>>(s).ok())
        // Fallback: also try TOML if not attempted
        .or_else(|| (!try_toml).then(|| parse_toml(s).ok()).flatten())
        .ok_or_else(|| anyhow!("unsupported watch-list format"))?;
    clean_entries(raw)
}

fn parse_toml(s: &str) -> Result<Vec<RawEntry>> {
    #[derive(Deserialize)]
    struct TomlWl {
        entities: Vec<RawEntry>,
    }
    let v: TomlWl = toml::from_str(s)?;
    Ok(v.entities)
}

// Sorted by CIK; the first non-empty ticker given for a CIK wins.
fn clean_entries(raw: Vec<RawEntry>) -> Result<Vec<WatchEntry>> {
    let mut out: BTreeMap<String, Option<String>> = BTreeMap::new();
    for r in raw {
        let (cik, ticker) = match r {
            RawEntry::Cik(c) => (c, None),
            RawEntry::Labeled { cik, ticker } => (cik, ticker),
        };
        let t = cik.trim();
        if t.is_empty() {
            continue;
        }
        let cik = normalize_cik(t).ok_or_else(|| anyhow!("watch-list entry `{t}` is not a CIK"))?;
        let ticker = ticker
            .map(|t| t.trim().to_ascii_uppercase())
            .filter(|t| !t.is_empty());
        let slot = out.entry(cik).or_default();
        if slot.is_none() {
            *slot = ticker;
        }
    }
    Ok(out
        .into_iter()
        .map(|(cik, ticker)| WatchEntry { cik, ticker })
        .collect())
}

/// Trim, zero-pad to 10 digits, sort, dedup. Non-numeric entries are errors.
pub fn clean_list(items: Vec<String>) -> Result<Vec<String>> {
    use std::collections::BTreeSet;
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim();
        if t.is_empty() {
            continue;
        }
        let cik = normalize_cik(t).ok_or_else(|| anyhow!("watch-list entry `{t}` is not a CIK"))?;
        set.insert(cik);
    }
    Ok(set.into_iter().collect())
}

/// `"1045810"` → `"0001045810"`. `None` for anything but 1–10 ASCII digits.
pub fn normalize_cik(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() || t.len() > 10 || !t.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{t:0>10}"))
}
