//! Identity normalization for shelf entries and catalog candidates
//!
//! Pure functions, no I/O. ISBNs are sanitized but never checksum-validated
//! so exports with formatting noise still resolve.

use serde::{Deserialize, Serialize};

/// Lowercase, collapse every run of non-alphanumeric characters to a single
/// space and trim.
pub fn normalize_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;

    for c in s.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }

    out
}

/// Keep digits and `X`, uppercased. `None` when nothing survives.
pub fn normalize_isbn(s: &str) -> Option<String> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == 'x' || *c == 'X')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn is_isbn13(s: &str) -> bool {
    s.len() == 13 && s.chars().all(|c| c.is_ascii_digit())
}

fn is_isbn10(s: &str) -> bool {
    s.len() == 10
        && s[..9].chars().all(|c| c.is_ascii_digit())
        && s[9..].chars().all(|c| c.is_ascii_digit() || c == 'X')
}

/// Normalized identifiers plus the identity key chosen for an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedIdentity {
    pub isbn13: Option<String>,
    pub isbn10: Option<String>,
    pub asin: Option<String>,
    pub normalized_title: String,
    pub normalized_author: String,
    pub identity_key: String,
    pub needs_fuzzy_match: bool,
}

/// Build the identity of a book.
///
/// Key priority: ISBN-13 > ISBN-10 > ASIN > title+author. Only the
/// title+author fallback requires fuzzy catalog resolution.
pub fn build_identity(
    title: &str,
    author: &str,
    isbn13: Option<&str>,
    isbn10: Option<&str>,
    asin: Option<&str>,
) -> NormalizedIdentity {
    let normalized_title = normalize_text(title);
    let normalized_author = normalize_text(author);

    let isbn13 = isbn13.and_then(normalize_isbn);
    let isbn10 = isbn10.and_then(normalize_isbn);
    let asin = asin.map(str::trim).filter(|a| !a.is_empty()).map(str::to_string);

    let (identity_key, needs_fuzzy_match) = match (&isbn13, &isbn10, &asin) {
        (Some(i13), _, _) if is_isbn13(i13) => (format!("isbn13:{}", i13), false),
        (_, Some(i10), _) if is_isbn10(i10) => (format!("isbn10:{}", i10), false),
        (_, _, Some(a)) => (format!("asin:{}", a), false),
        _ => (
            format!("title_author:{}|{}", normalized_title, normalized_author),
            true,
        ),
    };

    NormalizedIdentity {
        isbn13,
        isbn10,
        asin,
        normalized_title,
        normalized_author,
        identity_key,
        needs_fuzzy_match,
    }
}
