//! Gazetteer-based NER backend.
//!
//! The "weights" of this model are a JSON file listing known phrases per
//! entity label. Tagging is a greedy longest match over regex tokens, with an
//! optional fallback label for capitalized words the lexicon does not know.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use nerve_core::{ModelError, RawEntity};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grouping::{group_entities, Tag, TokenTag};
use crate::NerBackend;

/// Model shipped inside the binary, used when no model path is configured.
pub const EMBEDDED_MODEL: &str = include_str!("../models/conll03-lexicon-en.json");

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\w+(?:-\w+)*|[^\w\s]").expect("token pattern should compile")
});

const SENTENCE_END: [&str; 3] = [".", "!", "?"];

// ============================================================================
// Model file format
// ============================================================================

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("Failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse model file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Label {label} has score {score} outside [0, 1]")]
    InvalidScore { label: String, score: f32 },

    #[error("Label {label} has an entry with no tokens")]
    EmptyEntry { label: String },

    #[error("Model defines no labels")]
    NoLabels,
}

impl From<LexiconError> for ModelError {
    fn from(err: LexiconError) -> Self {
        ModelError::Load(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexiconModelFile {
    pub name: String,
    pub labels: BTreeMap<String, LabelSpec>,
    #[serde(default)]
    pub fallback: Option<FallbackSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelSpec {
    /// Score given to entries that do not set their own.
    pub score: f32,
    pub entries: Vec<LexiconEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LexiconEntry {
    Plain(String),
    Scored { text: String, score: f32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackSpec {
    pub label: String,
    pub score: f32,
    /// Capitalized words that never take the fallback label.
    #[serde(default)]
    pub ignore: Vec<String>,
}

// ============================================================================
// Backend
// ============================================================================

#[derive(Debug)]
struct Phrase {
    tokens: Vec<String>,
    label: String,
    score: f32,
}

#[derive(Debug)]
struct Fallback {
    label: String,
    score: f32,
    ignore: HashSet<String>,
}

/// Lexicon NER backend. Deterministic: the same text always yields the
/// same tags and scores.
#[derive(Debug)]
pub struct LexiconBackend {
    name: String,
    /// Phrases keyed by first token, longest first.
    phrases: HashMap<String, Vec<Phrase>>,
    fallback: Option<Fallback>,
}

impl LexiconBackend {
    /// Loads the model embedded in the binary.
    pub fn embedded() -> Result<Self, LexiconError> {
        Self::from_json(EMBEDDED_MODEL)
    }

    pub fn from_path(path: &Path) -> Result<Self, LexiconError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, LexiconError> {
        let file: LexiconModelFile = serde_json::from_str(json)?;
        Self::from_model(file)
    }

    pub fn from_model(file: LexiconModelFile) -> Result<Self, LexiconError> {
        if file.labels.is_empty() {
            return Err(LexiconError::NoLabels);
        }

        let mut phrases: HashMap<String, Vec<Phrase>> = HashMap::new();
        for (label, spec) in file.labels {
            check_score(&label, spec.score)?;
            for entry in spec.entries {
                let (text, score) = match entry {
                    LexiconEntry::Plain(text) => (text, spec.score),
                    LexiconEntry::Scored { text, score } => (text, score),
                };
                check_score(&label, score)?;

                let tokens: Vec<String> = tokenize(&text).map(|(_, _, t)| t.to_string()).collect();
                let Some(first) = tokens.first().cloned() else {
                    return Err(LexiconError::EmptyEntry { label });
                };
                phrases.entry(first).or_default().push(Phrase {
                    tokens,
                    label: label.clone(),
                    score,
                });
            }
        }
        for candidates in phrases.values_mut() {
            candidates.sort_by(|a, b| b.tokens.len().cmp(&a.tokens.len()));
        }

        let fallback = match file.fallback {
            Some(spec) => {
                check_score(&spec.label, spec.score)?;
                Some(Fallback {
                    label: spec.label,
                    score: spec.score,
                    ignore: spec.ignore.into_iter().collect(),
                })
            }
            None => None,
        };

        Ok(Self {
            name: file.name,
            phrases,
            fallback,
        })
    }

    /// Model name from the model file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of distinct phrases known to the model.
    pub fn phrase_count(&self) -> usize {
        self.phrases.values().map(Vec::len).sum()
    }

    /// Tags every token of `text`.
    pub fn tag(&self, text: &str) -> Vec<TokenTag> {
        let tokens: Vec<(usize, usize, &str)> = tokenize(text).collect();
        let mut tags = Vec::with_capacity(tokens.len());
        let mut in_fallback_run = false;
        let mut i = 0;

        while i < tokens.len() {
            if let Some(phrase) = self.longest_match(&tokens[i..]) {
                for (k, (start, end, _)) in tokens[i..i + phrase.tokens.len()].iter().enumerate() {
                    let tag = if k == 0 {
                        Tag::Begin(phrase.label.clone())
                    } else {
                        Tag::Inside(phrase.label.clone())
                    };
                    tags.push(TokenTag {
                        start: *start,
                        end: *end,
                        tag,
                        score: phrase.score,
                    });
                }
                i += phrase.tokens.len();
                in_fallback_run = false;
                continue;
            }

            let (start, end, _) = tokens[i];
            let token = match &self.fallback {
                Some(fb) if fb.applies(&tokens, i) => {
                    let tag = if in_fallback_run {
                        Tag::Inside(fb.label.clone())
                    } else {
                        Tag::Begin(fb.label.clone())
                    };
                    in_fallback_run = true;
                    TokenTag { start, end, tag, score: fb.score }
                }
                _ => {
                    in_fallback_run = false;
                    TokenTag { start, end, tag: Tag::Outside, score: 0.0 }
                }
            };
            tags.push(token);
            i += 1;
        }

        tags
    }

    fn longest_match(&self, tokens: &[(usize, usize, &str)]) -> Option<&Phrase> {
        let (_, _, first) = tokens.first()?;
        self.phrases.get(*first)?.iter().find(|phrase| {
            phrase.tokens.len() <= tokens.len()
                && phrase
                    .tokens
                    .iter()
                    .zip(tokens)
                    .all(|(expected, (_, _, actual))| expected.as_str() == *actual)
        })
    }
}

impl Fallback {
    fn applies(&self, tokens: &[(usize, usize, &str)], i: usize) -> bool {
        let (_, _, token) = tokens[i];
        let capitalized = token.chars().next().is_some_and(char::is_uppercase);
        let sentence_initial = i == 0 || SENTENCE_END.contains(&tokens[i - 1].2);

        capitalized
            && token.chars().count() > 1
            && !sentence_initial
            && !self.ignore.contains(token)
    }
}

impl NerBackend for LexiconBackend {
    fn backend_id(&self) -> &str {
        "lexicon"
    }

    fn predict(&mut self, text: &str) -> Result<Vec<RawEntity>, ModelError> {
        let tags = self.tag(text);
        group_entities(text, &tags)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = (usize, usize, &str)> {
    TOKEN_PATTERN
        .find_iter(text)
        .map(|m| (m.start(), m.end(), m.as_str()))
}

fn check_score(label: &str, score: f32) -> Result<(), LexiconError> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        Ok(())
    } else {
        Err(LexiconError::InvalidScore {
            label: label.to_string(),
            score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn embedded() -> LexiconBackend {
        LexiconBackend::embedded().unwrap()
    }

    fn labels(entities: &[RawEntity]) -> Vec<(&str, &str)> {
        entities
            .iter()
            .map(|e| (e.word.as_str(), e.entity_group.as_str()))
            .collect()
    }

    #[test]
    fn test_embedded_model_loads() {
        let backend = embedded();
        assert_eq!(backend.name(), "conll03-lexicon-en");
        assert!(backend.phrase_count() > 50);
        assert_eq!(backend.backend_id(), "lexicon");
    }

    #[test]
    fn test_apple_in_california() {
        let mut backend = embedded();
        let text = "Apple announced a new product in California.";
        let entities = backend.predict(text).unwrap();

        assert_eq!(labels(&entities), vec![("Apple", "ORG"), ("California", "LOC")]);
        assert_eq!((entities[0].start, entities[0].end), (0, 5));
        assert_eq!((entities[1].start, entities[1].end), (33, 43));
    }

    #[test]
    fn test_multi_token_phrases() {
        let mut backend = embedded();
        let text = "The football match between Real Madrid and Barcelona ended 2-1.";
        let entities = backend.predict(text).unwrap();

        assert_eq!(labels(&entities), vec![("Real Madrid", "ORG"), ("Barcelona", "ORG")]);
        assert_eq!(entities[0].score, 0.99);
    }

    #[test]
    fn test_longest_match_wins() {
        let mut backend = embedded();
        let entities = backend.predict("Flights from New York to Paris.").unwrap();
        assert_eq!(labels(&entities), vec![("New York", "LOC"), ("Paris", "LOC")]);
    }

    #[test]
    fn test_entry_score_override() {
        let mut backend = embedded();
        let entities = backend.predict("Startups in Silicon Valley.").unwrap();
        assert_eq!(entities[0].word, "Silicon Valley");
        assert_eq!(entities[0].score, 0.95);
    }

    #[test]
    fn test_fallback_for_unknown_capitalized_run() {
        let mut backend = embedded();
        let entities = backend
            .predict("Shares of Initech Systems rose on Monday.")
            .unwrap();

        assert_eq!(labels(&entities), vec![("Initech Systems", "MISC")]);
        assert_eq!(entities[0].score, 0.5);
    }

    #[test]
    fn test_fallback_skips_sentence_initial_and_ignored() {
        let mut backend = embedded();
        let entities = backend.predict("Yesterday it rained. The sky cleared.").unwrap();
        assert!(entities.is_empty());
    }

    #[test]
    fn test_possessive_still_matches() {
        let mut backend = embedded();
        let entities = backend.predict("We saw Google's results.").unwrap();
        assert_eq!(labels(&entities), vec![("Google", "ORG")]);
    }

    #[test]
    fn test_empty_text() {
        let mut backend = embedded();
        assert!(backend.predict("").unwrap().is_empty());
        assert!(backend.tag("").is_empty());
    }

    #[test]
    fn test_deterministic() {
        let mut backend = embedded();
        let text = "Tim Cook said Apple will invest in Texas.";
        let first = backend.predict(text).unwrap();
        let second = backend.predict(text).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_spans_within_text() {
        let mut backend = embedded();
        let text = "Über Berlin flog Lufthansa nach Tokyo, sagte Angela Merkel.";
        let chars = text.chars().count() as u32;
        for e in backend.predict(text).unwrap() {
            assert!(e.start <= e.end && e.end <= chars);
            assert!((0.0..=1.0).contains(&e.score));
            let slice: String = text
                .chars()
                .skip(e.start as usize)
                .take((e.end - e.start) as usize)
                .collect();
            assert_eq!(slice, e.word);
        }
    }

    #[test]
    fn test_rejects_bad_score() {
        let json = r#"{"name": "bad", "labels": {"ORG": {"score": 1.5, "entries": ["Acme"]}}}"#;
        let err = LexiconBackend::from_json(json).unwrap_err();
        assert!(matches!(err, LexiconError::InvalidScore { .. }));
    }

    #[test]
    fn test_rejects_empty_entry() {
        let json = r#"{"name": "bad", "labels": {"ORG": {"score": 0.9, "entries": ["  "]}}}"#;
        let err = LexiconBackend::from_json(json).unwrap_err();
        assert!(matches!(err, LexiconError::EmptyEntry { .. }));
    }

    #[test]
    fn test_rejects_no_labels() {
        let err = LexiconBackend::from_json(r#"{"name": "empty", "labels": {}}"#).unwrap_err();
        assert!(matches!(err, LexiconError::NoLabels));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"name": "tiny", "labels": {{"ORG": {{"score": 0.8, "entries": ["Acme Corp"]}}}}}}"#
        )
        .unwrap();

        let mut backend = LexiconBackend::from_path(file.path()).unwrap();
        let entities = backend.predict("Buy from Acme Corp today").unwrap();
        assert_eq!(labels(&entities), vec![("Acme Corp", "ORG")]);
        assert_eq!(entities[0].score, 0.8);
    }
}
