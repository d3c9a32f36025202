//! Post-processing of raw model output.

use regex::Regex;
use std::sync::LazyLock;

static ROLE_TAG_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*\[(SYSTEM|CONTEXT|USER|ASSISTANT)\].*$").expect("Invalid regex"));

static LEAD_FILLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:sure|okay|ok|of course|here['’]?s|here\s+(?:is|are)|below\s+(?:is|are)|the\s+revised\s+version|revised\s+version|dưới\s+đây\s+là|sau\s+đây\s+là|đây\s+là)\b\s*[:\-–.,!]?\s*",
    )
    .expect("Invalid regex")
});

static SEED_LIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^s?e{2}\s*d[.!?]*$").expect("Invalid regex"));

/// Longest overlap considered when merging a continuation.
const MAX_OVERLAP: usize = 200;
/// Shortest overlap treated as a real seam rather than a coincidence.
const MIN_OVERLAP: usize = 3;

/// Drops role-tag lines and up to two leading filler phrases. Falls back to
/// the raw text when stripping leaves two words or fewer.
pub fn clean_answer(raw: &str) -> String {
    let mut text = ROLE_TAG_LINE.replace_all(raw, "").trim().to_string();
    for _ in 0..2 {
        text = LEAD_FILLER.replace(&text, "").trim().to_string();
    }
    let trimmed_raw = raw.trim();
    if text.split_whitespace().count() <= 2 && trimmed_raw.chars().count() > 2 {
        return trimmed_raw.to_string();
    }
    text
}

/// Truncated-token garbage ("seed", "see d") or a bare short lowercase word.
pub fn looks_degenerate(answer: &str) -> bool {
    let t = answer.trim().to_lowercase();
    if t.is_empty() {
        return true;
    }
    SEED_LIKE.is_match(&t) || (t.len() <= 4 && t.chars().all(|c| c.is_ascii_lowercase()))
}

pub fn ends_sentence(answer: &str) -> bool {
    matches!(answer.trim_end().chars().last(), Some('.' | '!' | '?' | '…'))
}

/// Last `n` characters.
pub fn tail(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    let start = text.char_indices().nth(count - n).map_or(0, |(i, _)| i);
    &text[start..]
}

/// Joins `prev` and `cont` on their longest suffix/prefix overlap, or with a
/// single space when there is none.
pub fn merge_no_overlap(prev: &str, cont: &str) -> String {
    if prev.is_empty() || cont.is_empty() {
        return format!("{prev} {cont}").trim().to_string();
    }
    let a: Vec<char> = prev.chars().collect();
    let b: Vec<char> = cont.chars().collect();
    let max = MAX_OVERLAP.min(a.len()).min(b.len());
    for k in (MIN_OVERLAP..=max).rev() {
        if a[a.len() - k..] == b[..k] {
            let rest: String = b[k..].iter().collect();
            return format!("{prev}{rest}").trim().to_string();
        }
    }
    format!("{prev} {cont}").trim().to_string()
}
