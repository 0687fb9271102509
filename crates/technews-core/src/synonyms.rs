use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::ConfigError;

/// Canonical tag → synonyms map with a case-insensitive reverse index.
///
/// Lookup works from any direction: a canonical tag or any of its synonyms
/// resolves to the canonical tag and its full expansion set.
#[derive(Debug, Clone, Default)]
pub struct TagSynonyms {
    canonical: HashMap<String, Vec<String>>,
    /// lowercased term → canonical tag
    reverse: HashMap<String, String>,
}

impl TagSynonyms {
    #[must_use]
    pub fn from_map(map: HashMap<String, Vec<String>>) -> Self {
        let mut reverse = HashMap::new();
        for (tag, synonyms) in &map {
            reverse.insert(tag.to_lowercase(), tag.clone());
            for syn in synonyms {
                reverse.insert(syn.to_lowercase(), tag.clone());
            }
        }
        Self {
            canonical: map,
            reverse,
        }
    }

    /// Resolve a term (canonical or synonym, any case) to its canonical tag.
    #[must_use]
    pub fn canonical_of(&self, term: &str) -> Option<&str> {
        self.reverse.get(&term.to_lowercase()).map(String::as_str)
    }

    /// All spellings for the tag a term belongs to: the canonical tag plus
    /// its synonyms. A term with no tag expands to itself.
    #[must_use]
    pub fn expansions<'a>(&'a self, term: &'a str) -> Vec<&'a str> {
        match self.canonical_of(term) {
            Some(tag) => {
                let mut out = vec![tag];
                if let Some(synonyms) = self.canonical.get(tag) {
                    out.extend(synonyms.iter().map(String::as_str));
                }
                out
            }
            None => vec![term],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct SynonymsFile(HashMap<String, Vec<String>>);

/// Load the tag-synonym map from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed.
pub fn load_tag_synonyms(path: &Path) -> Result<TagSynonyms, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: SynonymsFile =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::FileParse {
            path: path.display().to_string(),
            source: e,
        })?;

    Ok(TagSynonyms::from_map(file.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TagSynonyms {
        let mut map = HashMap::new();
        map.insert(
            "llm".to_string(),
            vec!["large language model".to_string(), "GPT".to_string()],
        );
        map.insert("rust".to_string(), vec!["rustlang".to_string()]);
        TagSynonyms::from_map(map)
    }

    #[test]
    fn canonical_lookup_is_case_insensitive() {
        let syn = sample();
        assert_eq!(syn.canonical_of("gpt"), Some("llm"));
        assert_eq!(syn.canonical_of("GPT"), Some("llm"));
        assert_eq!(syn.canonical_of("LLM"), Some("llm"));
    }

    #[test]
    fn unknown_term_has_no_canonical() {
        assert_eq!(sample().canonical_of("golang"), None);
    }

    #[test]
    fn expansions_include_canonical_and_synonyms() {
        let syn = sample();
        let exp = syn.expansions("rustlang");
        assert!(exp.contains(&"rust"));
        assert!(exp.contains(&"rustlang"));
    }

    #[test]
    fn expansions_of_unknown_term_is_itself() {
        let syn = sample();
        assert_eq!(syn.expansions("golang"), vec!["golang"]);
    }
}
