//! Shelf item to catalog record resolution
//!
//! Identity (ISBN) matches win outright with confidence 1.0. Otherwise
//! candidates are scored on normalized title and author similarity and the
//! best one is accepted only at or above [`FUZZY_THRESHOLD`].

use serde_json::json;
use shelfsync_common::catalog::{CatalogProvider, ProviderBook, SearchQuery};
use shelfsync_common::db::models::{MatchMethod, ShelfItem};
use shelfsync_common::errors::Result;
use shelfsync_common::normalize::{normalize_isbn, normalize_text};
use std::cmp::Ordering;
use tracing::debug;

/// Minimum combined score for a fuzzy match
pub const FUZZY_THRESHOLD: f64 = 0.72;

const TITLE_WEIGHT: f64 = 0.75;
const AUTHOR_WEIGHT: f64 = 0.25;
const NEUTRAL_AUTHOR_SCORE: f64 = 0.5;
const TOP_CANDIDATES: usize = 5;
/// Float noise allowed when comparing against the threshold
const SCORE_EPSILON: f64 = 1e-9;

/// Fields the matcher reads from a shelf item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSubject {
    pub title: String,
    pub author: String,
    pub isbn10: Option<String>,
    pub isbn13: Option<String>,
}

impl From<&ShelfItem> for MatchSubject {
    fn from(item: &ShelfItem) -> Self {
        Self {
            title: item.title.clone(),
            author: item.author.clone(),
            isbn10: item.isbn10.clone(),
            isbn13: item.isbn13.clone(),
        }
    }
}

/// Accepted catalog candidate
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub book: ProviderBook,
    pub method: MatchMethod,
    pub confidence: f64,
    pub evidence: serde_json::Value,
}

/// Longest-common-subsequence similarity in [0, 1]
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let lcs = prev[b.len()];
    2.0 * lcs as f64 / (a.len() + b.len()) as f64
}

/// Whether a combined fuzzy score is good enough
pub fn is_acceptable(combined: f64) -> bool {
    combined + SCORE_EPSILON >= FUZZY_THRESHOLD
}

#[derive(Debug, Clone)]
struct Scored {
    combined: f64,
    title_score: f64,
    author_score: f64,
    book: ProviderBook,
}

impl Scored {
    fn evidence(&self) -> Result<serde_json::Value> {
        Ok(json!({
            "combined": self.combined,
            "title_score": self.title_score,
            "author_score": self.author_score,
            "book": serde_json::to_value(&self.book)?,
        }))
    }
}

fn score(title_norm: &str, author_norm: &str, book: &ProviderBook) -> Scored {
    let candidate_title = normalize_text(&book.title);
    let candidate_author = normalize_text(book.author.as_deref().unwrap_or(""));

    let title_score = similarity(title_norm, &candidate_title);
    let author_score = if author_norm.is_empty() || candidate_author.is_empty() {
        NEUTRAL_AUTHOR_SCORE
    } else {
        similarity(author_norm, &candidate_author)
    };

    Scored {
        combined: TITLE_WEIGHT * title_score + AUTHOR_WEIGHT * author_score,
        title_score,
        author_score,
        book: book.clone(),
    }
}

fn isbn13_of(book: &ProviderBook) -> Option<&str> {
    book.isbn13.as_deref()
}

fn isbn10_of(book: &ProviderBook) -> Option<&str> {
    book.isbn10.as_deref()
}

fn identity_match(
    subject: &MatchSubject,
    candidates: &[ProviderBook],
) -> Result<Option<MatchResult>> {
    let passes: [(&str, Option<String>, fn(&ProviderBook) -> Option<&str>); 2] = [
        ("isbn13 exact", subject.isbn13.as_deref().and_then(normalize_isbn), isbn13_of),
        ("isbn10 exact", subject.isbn10.as_deref().and_then(normalize_isbn), isbn10_of),
    ];

    for (reason, wanted, field) in passes {
        let Some(wanted) = wanted else { continue };
        let hit = candidates
            .iter()
            .find(|c| field(c).and_then(normalize_isbn).as_deref() == Some(wanted.as_str()));

        if let Some(book) = hit {
            return Ok(Some(MatchResult {
                book: book.clone(),
                method: MatchMethod::Isbn,
                confidence: 1.0,
                evidence: json!({
                    "reason": reason,
                    "candidates": [serde_json::to_value(book)?],
                }),
            }));
        }
    }

    Ok(None)
}

/// Resolve a shelf item to the best catalog candidate, if any
pub async fn match_shelf_item(
    provider: &dyn CatalogProvider,
    subject: &MatchSubject,
    limit: usize,
) -> Result<Option<MatchResult>> {
    let candidates = provider
        .search(&SearchQuery {
            title: Some(subject.title.clone()),
            author: Some(subject.author.clone()),
            isbn10: subject.isbn10.clone(),
            isbn13: subject.isbn13.clone(),
            limit,
        })
        .await?;

    if let Some(result) = identity_match(subject, &candidates)? {
        return Ok(Some(result));
    }

    let title_norm = normalize_text(&subject.title);
    let author_norm = normalize_text(&subject.author);

    let mut scored: Vec<Scored> = candidates
        .iter()
        .map(|book| score(&title_norm, &author_norm, book))
        .collect();

    // Stable: equal scores keep provider order
    scored.sort_by(|a, b| {
        b.combined
            .partial_cmp(&a.combined)
            .unwrap_or(Ordering::Equal)
            .then(b.title_score.partial_cmp(&a.title_score).unwrap_or(Ordering::Equal))
    });

    let Some(best) = scored.first() else {
        debug!(title = %subject.title, "No catalog candidates");
        return Ok(None);
    };

    if !is_acceptable(best.combined) {
        debug!(
            title = %subject.title,
            best = best.combined,
            candidate = %best.book.title,
            "Best candidate below threshold"
        );
        return Ok(None);
    }

    let top = scored
        .iter()
        .take(TOP_CANDIDATES)
        .map(Scored::evidence)
        .collect::<Result<Vec<_>>>()?;

    let evidence = json!({
        "threshold": FUZZY_THRESHOLD,
        "title_norm": title_norm,
        "author_norm": author_norm,
        "best": best.evidence()?,
        "top_candidates": top,
    });

    Ok(Some(MatchResult {
        book: best.book.clone(),
        method: MatchMethod::Fuzzy,
        confidence: best.combined,
        evidence,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shelfsync_common::catalog::FixtureProvider;

    fn provider() -> FixtureProvider {
        FixtureProvider::from_value(json!({
            "items": [
                {"provider_item_id": "od-phm", "title": "Project Hail Mary", "author": "Andy Weir",
                 "isbn13": "9780593135204", "formats": {}},
                {"provider_item_id": "od-hobbit", "title": "The Hobbit", "author": "J.R.R. Tolkien",
                 "isbn10": "0-261-10221-4", "formats": {}},
                {"provider_item_id": "od-dune", "title": "Dune", "author": "Frank Herbert",
                 "formats": {}}
            ]
        }))
        .unwrap()
    }

    fn subject(title: &str, author: &str) -> MatchSubject {
        MatchSubject {
            title: title.to_string(),
            author: author.to_string(),
            ..MatchSubject::default()
        }
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("", "abc"), 0.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("dune", "dune"), 1.0);
        assert!((similarity("hobbit", "the hobbit") - 0.75).abs() < 1e-9);
        assert!((similarity("tolkien", "j r r tolkien") - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(is_acceptable(0.72));
        assert!(is_acceptable(FUZZY_THRESHOLD));
        assert!(!is_acceptable(0.7199));
    }

    #[tokio::test]
    async fn test_isbn13_identity_match() {
        let subject = MatchSubject {
            isbn13: Some("978-0-593-13520-4".to_string()),
            ..subject("Hail Mary", "Weir")
        };

        let result = match_shelf_item(&provider(), &subject, 10).await.unwrap().unwrap();
        assert_eq!(result.method, MatchMethod::Isbn);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.book.provider_item_id, "od-phm");
        assert_eq!(result.evidence["reason"], "isbn13 exact");
    }

    #[tokio::test]
    async fn test_isbn10_identity_match_ignores_formatting() {
        let subject = MatchSubject {
            isbn10: Some("0261102214".to_string()),
            ..subject("Whatever", "Someone")
        };

        let result = match_shelf_item(&provider(), &subject, 10).await.unwrap().unwrap();
        assert_eq!(result.method, MatchMethod::Isbn);
        assert_eq!(result.evidence["reason"], "isbn10 exact");
    }

    #[tokio::test]
    async fn test_hobbit_fuzzy_match() {
        let result = match_shelf_item(&provider(), &subject("Hobbit", "Tolkien"), 10)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.method, MatchMethod::Fuzzy);
        assert_eq!(result.book.provider_item_id, "od-hobbit");
        assert!((result.confidence - 0.7375).abs() < 1e-9);
        assert_eq!(result.evidence["threshold"], 0.72);
        assert_eq!(result.evidence["title_norm"], "hobbit");
        assert!(result.evidence["top_candidates"].as_array().unwrap().len() <= 5);
    }

    fn single(title: &str, author: &str) -> FixtureProvider {
        FixtureProvider::from_value(json!({
            "items": [{"provider_item_id": "od-1", "title": title, "author": author, "formats": {}}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_weak_candidate_is_rejected() {
        // "dune" is a substring of the candidate, so it is searched and scored
        let provider = single("Dune Messiah", "Frank Herbert");
        let query = SearchQuery {
            title: Some("Dune".to_string()),
            limit: 10,
            ..SearchQuery::default()
        };
        assert_eq!(provider.search(&query).await.unwrap().len(), 1);

        // 0.75 * 0.5 + 0.25 * 1.0
        let result = match_shelf_item(&provider, &subject("Dune", "Frank Herbert"), 10)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_threshold_boundary_through_matcher() {
        // title 16/25 = 0.64, author 24/25 = 0.96, combined 0.72
        let provider = single("Dark Sea of Stars", "Mara Ellisson");

        let at = match_shelf_item(&provider, &subject("Dark Sea", "Mara Ellison"), 10)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(at.method, MatchMethod::Fuzzy);
        assert!((at.confidence - 0.72).abs() < 1e-9);

        // author 22/24 drops the combined score just under
        let below = match_shelf_item(&provider, &subject("Dark Sea", "Mara Elison"), 10)
            .await
            .unwrap();
        assert!(below.is_none());
    }

    #[tokio::test]
    async fn test_no_candidates_yields_none() {
        let empty = FixtureProvider::from_value(json!({"items": []})).unwrap();
        let result = match_shelf_item(&empty, &subject("Dune", "Frank Herbert"), 10).await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_missing_author_scores_neutral() {
        let book = ProviderBook {
            provider: "fixture".to_string(),
            provider_item_id: "x".to_string(),
            title: "Dune".to_string(),
            author: None,
            isbn10: None,
            isbn13: None,
            asin: None,
            raw: json!({}),
        };
        let scored = score("dune", "frank herbert", &book);
        assert_eq!(scored.author_score, 0.5);
        assert!((scored.combined - 0.875).abs() < 1e-9);
    }
}
