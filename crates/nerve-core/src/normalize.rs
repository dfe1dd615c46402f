//! Response normalization: validated spans in, response envelope out.

use std::time::Duration;

use crate::{AnnotationResult, Category, EntitySpan, Meta, NormalizationError};

/// Substring that marks an entity as business-related.
const COMPANY_KEYWORD: &str = "company";

/// Builds the response for `text` from adapter output.
///
/// Every span is checked against the input: the score must lie in `[0, 1]`
/// and the offsets must fall inside the text. A single bad span fails the
/// whole result. Entities are returned ordered by start offset.
pub fn normalize(
    text: &str,
    mut spans: Vec<EntitySpan>,
    latency: Duration,
) -> Result<AnnotationResult, NormalizationError> {
    let chars = char_len(text);

    for (index, span) in spans.iter().enumerate() {
        if !span.score.is_finite() || !(0.0..=1.0).contains(&span.score) {
            return Err(NormalizationError::ScoreOutOfRange {
                index,
                score: span.score,
            });
        }
        if span.start > span.end || span.end > chars {
            return Err(NormalizationError::InvalidOffsets {
                index,
                start: span.start,
                end: span.end,
                chars,
            });
        }
    }

    spans.sort_by_key(|s| s.start);
    let category = categorize(&spans);

    Ok(AnnotationResult {
        entities: spans,
        category,
        meta: Meta {
            chars,
            latency_seconds: latency.as_secs_f64(),
        },
    })
}

/// Naive keyword category. Low precision on purpose: any organization, or
/// any entity mentioning "company", marks the text as news.
pub fn categorize(spans: &[EntitySpan]) -> Category {
    let is_news = spans
        .iter()
        .any(|s| s.label == "ORG" || s.text.to_lowercase().contains(COMPANY_KEYWORD));

    if is_news {
        Category::News
    } else {
        Category::Other
    }
}

/// Length of `text` in characters, the unit used for all offsets.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(label: &str, text: &str, start: usize, end: usize, score: f64) -> EntitySpan {
        EntitySpan {
            label: label.into(),
            score,
            text: text.into(),
            start,
            end,
        }
    }

    #[test]
    fn test_empty_input() {
        let result = normalize("", Vec::new(), Duration::ZERO).unwrap();
        assert!(result.entities.is_empty());
        assert_eq!(result.category, Category::Other);
        assert_eq!(result.meta.chars, 0);
        assert_eq!(result.meta.latency_seconds, 0.0);
    }

    #[test]
    fn test_org_marks_news() {
        let text = "Apple announced a new product in California.";
        let spans = vec![
            span("LOC", "California", 33, 43, 0.99),
            span("ORG", "Apple", 0, 5, 0.98),
        ];
        let result = normalize(text, spans, Duration::from_millis(12)).unwrap();

        assert_eq!(result.category, Category::News);
        assert_eq!(result.meta.chars, 44);
        assert!((result.meta.latency_seconds - 0.012).abs() < 1e-9);
        assert_eq!(result.entities[0].text, "Apple");
        assert_eq!(result.entities[1].text, "California");
    }

    #[test]
    fn test_company_keyword_marks_news() {
        let spans = vec![span("MISC", "Fruit Company", 4, 17, 0.5)];
        assert_eq!(categorize(&spans), Category::News);
    }

    #[test]
    fn test_other_without_org_or_keyword() {
        let spans = vec![
            span("PER", "Ada Lovelace", 0, 12, 0.9),
            span("LOC", "London", 20, 26, 0.9),
        ];
        assert_eq!(categorize(&spans), Category::Other);
    }

    #[test]
    fn test_chars_counts_unicode_scalars() {
        let text = "Zoë visited Zürich";
        let result = normalize(text, Vec::new(), Duration::ZERO).unwrap();
        assert_eq!(result.meta.chars, 18);
        assert_ne!(result.meta.chars, text.len());
    }

    #[test]
    fn test_rejects_score_above_one() {
        let err = normalize("Apple", vec![span("ORG", "Apple", 0, 5, 1.5)], Duration::ZERO)
            .unwrap_err();
        assert_eq!(err, NormalizationError::ScoreOutOfRange { index: 0, score: 1.5 });
    }

    #[test]
    fn test_rejects_offsets_past_end() {
        let err = normalize("Apple", vec![span("ORG", "Apple", 0, 9, 0.9)], Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, NormalizationError::InvalidOffsets { end: 9, chars: 5, .. }));
    }
}
