//! Token-level BIO tags and their aggregation into entity spans.

use nerve_core::{ModelError, RawEntity};

/// BIO tag of a single token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Outside,
    Begin(String),
    Inside(String),
}

impl Tag {
    fn label(&self) -> Option<&str> {
        match self {
            Tag::Outside => None,
            Tag::Begin(l) | Tag::Inside(l) => Some(l),
        }
    }
}

/// A tagged token. Offsets are byte offsets into the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenTag {
    pub start: usize,
    pub end: usize,
    pub tag: Tag,
    pub score: f32,
}

/// Merges consecutive tokens of one entity into a single record.
///
/// A group opens on `B-X`, or on an `I-X` that does not continue an open
/// `X` group, and closes on `O`, a label change, or the next `B-`. The
/// group score is the mean of its token scores and its word is the source
/// slice from the first token's start to the last token's end. Offsets in
/// the returned records are character offsets.
pub fn group_entities(text: &str, tokens: &[TokenTag]) -> Result<Vec<RawEntity>, ModelError> {
    let mut groups: Vec<(usize, usize, &str, Vec<f32>)> = Vec::new();

    for token in tokens {
        let Some(label) = token.tag.label() else {
            continue;
        };

        let continues = match (&token.tag, groups.last()) {
            (Tag::Inside(_), Some((_, end, open, _))) => {
                *open == label
                    && text
                        .get(*end..token.start)
                        .is_some_and(|gap| gap.trim().is_empty())
            }
            _ => false,
        };

        match groups.last_mut() {
            Some((_, end, _, scores)) if continues => {
                *end = token.end;
                scores.push(token.score);
            }
            _ => groups.push((token.start, token.end, label, vec![token.score])),
        }
    }

    let offsets = CharOffsets::new(text);
    groups
        .into_iter()
        .map(|(start, end, label, scores)| {
            let word = text
                .get(start..end)
                .ok_or_else(|| ModelError::Malformed(format!("token bounds {}..{}", start, end)))?;
            let score = scores.iter().sum::<f32>() / scores.len() as f32;
            Ok(RawEntity {
                entity_group: label.to_string(),
                score,
                word: word.to_string(),
                start: offsets.to_char(start)?,
                end: offsets.to_char(end)?,
            })
        })
        .collect()
}

/// Byte-to-character offset lookup for one text.
struct CharOffsets {
    boundaries: Vec<usize>,
}

impl CharOffsets {
    fn new(text: &str) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        Self { boundaries }
    }

    fn to_char(&self, byte: usize) -> Result<u32, ModelError> {
        let index = self
            .boundaries
            .binary_search(&byte)
            .map_err(|_| ModelError::Malformed(format!("offset {} splits a character", byte)))?;
        u32::try_from(index).map_err(|e| ModelError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(start: usize, end: usize, tag: Tag, score: f32) -> TokenTag {
        TokenTag { start, end, tag, score }
    }

    fn b(label: &str) -> Tag {
        Tag::Begin(label.into())
    }

    fn i(label: &str) -> Tag {
        Tag::Inside(label.into())
    }

    #[test]
    fn test_merges_begin_inside() {
        let text = "Real Madrid won";
        let tokens = vec![
            tok(0, 4, b("ORG"), 1.0),
            tok(5, 11, i("ORG"), 0.5),
            tok(12, 15, Tag::Outside, 0.0),
        ];
        let groups = group_entities(text, &tokens).unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].word, "Real Madrid");
        assert_eq!(groups[0].entity_group, "ORG");
        assert_eq!((groups[0].start, groups[0].end), (0, 11));
        assert_eq!(groups[0].score, 0.75);
    }

    #[test]
    fn test_new_begin_splits_groups() {
        let text = "Apple Google";
        let tokens = vec![tok(0, 5, b("ORG"), 0.9), tok(6, 12, b("ORG"), 0.9)];
        let groups = group_entities(text, &tokens).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].word, "Google");
    }

    #[test]
    fn test_label_change_splits_groups() {
        let text = "Paris Hilton";
        let tokens = vec![tok(0, 5, b("LOC"), 0.9), tok(6, 12, i("PER"), 0.8)];
        let groups = group_entities(text, &tokens).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].entity_group, "LOC");
        assert_eq!(groups[1].entity_group, "PER");
    }

    #[test]
    fn test_inside_across_punctuation_does_not_merge() {
        let text = "Acme, Initech";
        let tokens = vec![tok(0, 4, b("ORG"), 0.9), tok(6, 13, i("ORG"), 0.9)];
        let groups = group_entities(text, &tokens).unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_char_offsets_for_multibyte_text() {
        let text = "Zoë met Zürich";
        let tokens = vec![tok(9, 16, b("LOC"), 0.9)];
        let groups = group_entities(text, &tokens).unwrap();
        assert_eq!(groups[0].word, "Zürich");
        assert_eq!((groups[0].start, groups[0].end), (8, 14));
    }

    #[test]
    fn test_outside_only() {
        let tokens = vec![tok(0, 3, Tag::Outside, 0.0)];
        assert!(group_entities("the", &tokens).unwrap().is_empty());
    }
}
