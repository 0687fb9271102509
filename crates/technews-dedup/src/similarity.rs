//! Title similarity for mixed Japanese/English headlines.
//!
//! ASCII words tokenize as whole words; non-ASCII runs tokenize as character
//! bigrams, which works tolerably for Japanese without segmentation.

use std::collections::HashSet;

use technews_core::thresholds::{CategoryThresholds, Layer2Fallback};

use crate::urlnorm;

/// Lowercase and fold full-width ASCII variants (ＡＢＣ１２３, ideographic
/// space) to their half-width forms.
pub fn fold(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => {
                char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
            }
            _ => c,
        })
        .flat_map(char::to_lowercase)
        .collect()
}

/// Tokenize a title into the union of ASCII alphanumeric words and
/// non-ASCII character bigrams (a lone non-ASCII character stands alone).
#[must_use]
pub fn tokenize(s: &str) -> HashSet<String> {
    let folded = fold(s);
    let mut tokens = HashSet::new();
    let mut word = String::new();
    let mut residue: Vec<char> = Vec::new();

    let flush_word = |word: &mut String, tokens: &mut HashSet<String>| {
        if !word.is_empty() {
            tokens.insert(std::mem::take(word));
        }
    };
    let flush_residue = |residue: &mut Vec<char>, tokens: &mut HashSet<String>| {
        match residue.len() {
            0 => {}
            1 => {
                tokens.insert(residue[0].to_string());
            }
            _ => {
                for pair in residue.windows(2) {
                    tokens.insert(pair.iter().collect());
                }
            }
        }
        residue.clear();
    };

    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            flush_residue(&mut residue, &mut tokens);
            word.push(c);
        } else if c.is_ascii() {
            flush_word(&mut word, &mut tokens);
            flush_residue(&mut residue, &mut tokens);
        } else {
            flush_word(&mut word, &mut tokens);
            residue.push(c);
        }
    }
    flush_word(&mut word, &mut tokens);
    flush_residue(&mut residue, &mut tokens);

    tokens
}

/// Jaccard similarity of two titles' token sets. Two empty sets are
/// identical (1); exactly one empty set shares nothing (0).
#[must_use]
pub fn jaccard(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    match (ta.is_empty(), tb.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => {
            let intersection = ta.intersection(&tb).count();
            let union = ta.union(&tb).count();
            intersection as f64 / union as f64
        }
    }
}

/// Edit distance between fold-normalized titles, divided by the longer
/// length. 0 for two empty strings, 1 when exactly one is empty.
#[must_use]
pub fn normalized_levenshtein(a: &str, b: &str) -> f64 {
    let fa = fold(a);
    let fb = fold(b);
    let la = fa.chars().count();
    let lb = fb.chars().count();
    if la == 0 && lb == 0 {
        return 0.0;
    }
    strsim::levenshtein(&fa, &fb) as f64 / la.max(lb) as f64
}

/// Classify a source into a dedup category by source id substring, then by
/// hostname substring, with `default` as the fallback.
#[must_use]
pub fn detect_category(source_id: &str, url: &str) -> &'static str {
    if let Some(category) = category_of(&source_id.to_lowercase()) {
        return category;
    }
    if let Ok(domain) = urlnorm::extract_domain(url) {
        if let Some(category) = category_of(&domain) {
            return category;
        }
    }
    "default"
}

fn category_of(s: &str) -> Option<&'static str> {
    if s.contains("arxiv") {
        Some("arxiv")
    } else if s.contains("news") || s.contains("techcrunch") {
        Some("news")
    } else if s.contains("blog") || s.contains("qiita") || s.contains("zenn") {
        Some("blog")
    } else {
        None
    }
}

/// A fuzzy (Layer-3) duplicate hit with its component scores.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyMatch {
    pub jaccard: f64,
    pub edit: f64,
}

impl FuzzyMatch {
    /// Combined score used to rank competing hits: higher is closer.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.jaccard + (1.0 - self.edit)
    }
}

/// Layer-3 rule: duplicates iff Jaccard is at or above the category cut-off
/// OR normalized edit distance is at or below it.
#[must_use]
pub fn fuzzy_match(a: &str, b: &str, thresholds: &CategoryThresholds) -> Option<FuzzyMatch> {
    let j = jaccard(a, b);
    let e = normalized_levenshtein(a, b);
    (j >= thresholds.jaccard_gte || e <= thresholds.levenshtein_lte)
        .then_some(FuzzyMatch { jaccard: j, edit: e })
}

/// Layer-2 rule: Jaccard only, with the cut-off picked by domain relation.
#[must_use]
pub fn near_duplicate(a: &str, b: &str, same_domain: bool, fallback: &Layer2Fallback) -> bool {
    let cutoff = if same_domain {
        fallback.same_domain
    } else {
        fallback.cross_domain
    };
    jaccard(a, b) >= cutoff
}

/// Stable djb2 hash of the fold-normalized, whitespace-collapsed title,
/// rendered as the base-16 absolute value. Used only to narrow fuzzy
/// candidate sets, never as a duplicate signal on its own.
#[must_use]
pub fn title_hash(title: &str) -> String {
    let normalized = fold(title)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let mut hash: i32 = 5381;
    for c in normalized.chars() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_add(hash)
            .wrapping_add(c as i32);
    }
    format!("{:x}", i64::from(hash).abs())
}
