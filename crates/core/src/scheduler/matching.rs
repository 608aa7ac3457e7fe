//! Title normalization and release matching.
//!
//! Indexer relevance ranking is not trusted: every hit is re-filtered
//! locally against the wanted title, then classified so only "main" releases
//! drive acquisition. The listing check reuses the same normalization with a
//! three-stage cascade (exact, word-boundary regex, word containment).

use regex_lite::Regex;

/// Release categories an indexer hit can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    /// The game itself.
    Main,
    /// Patch/update for an already-owned copy.
    Update,
    Dlc,
    /// Soundtracks, artbooks, bonus content.
    Extra,
}

/// Lowercase, separators and punctuation to spaces, whitespace collapsed.
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_space = true;
    for c in title.chars() {
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                out.push(lower);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Strict local re-filter: the hit must start with the full wanted title on
/// a word boundary. "elden ring update v1 2" matches "Elden Ring";
/// "eldenworld" does not.
pub fn title_matches(wanted: &str, hit_title: &str) -> bool {
    let wanted = normalize_title(wanted);
    let hit = normalize_title(hit_title);
    if wanted.is_empty() || hit.is_empty() {
        return false;
    }
    match hit.strip_prefix(&wanted) {
        Some(rest) => rest.is_empty() || rest.starts_with(' '),
        None => false,
    }
}

/// Classify a hit that already passed [`title_matches`].
pub fn classify_hit(wanted: &str, hit_title: &str) -> HitKind {
    let wanted = normalize_title(wanted);
    let hit = normalize_title(hit_title);
    let trailer = hit.strip_prefix(&wanted).unwrap_or(&hit).trim();

    let words: Vec<&str> = trailer.split_whitespace().collect();
    let has = |needle: &str| words.iter().any(|w| *w == needle);

    if has("update") || has("patch") || has("hotfix") {
        HitKind::Update
    } else if has("dlc") || has("expansion") {
        HitKind::Dlc
    } else if has("soundtrack") || has("ost") || has("artbook") || has("demo") {
        HitKind::Extra
    } else {
        HitKind::Main
    }
}

/// Minimal regex metacharacter escaping (regex-lite has no escape helper).
fn escape_regex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Listing-check cascade: exact normalized match, then word-boundary regex,
/// then every-component-word containment.
pub fn listing_matches(wanted_title: &str, listed_title: &str) -> bool {
    let wanted = normalize_title(wanted_title);
    let listed = normalize_title(listed_title);
    if wanted.is_empty() || listed.is_empty() {
        return false;
    }

    if wanted == listed {
        return true;
    }

    if let Ok(re) = Regex::new(&format!(r"\b{}\b", escape_regex(&wanted))) {
        if re.is_match(&listed) {
            return true;
        }
    }

    // Fallback: every word of the wanted title appears in the listing.
    let listed_words: Vec<&str> = listed.split_whitespace().collect();
    wanted
        .split_whitespace()
        .all(|w| listed_words.contains(&w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("Elden.Ring-GROUP"), "elden ring group");
        assert_eq!(normalize_title("  Hollow_Knight:  Silksong "), "hollow knight silksong");
        assert_eq!(normalize_title("OK"), "ok");
        assert_eq!(normalize_title("..."), "");
    }

    #[test]
    fn test_title_matches_word_boundary() {
        assert!(title_matches("Elden Ring", "Elden.Ring.v1.02-GROUP"));
        assert!(title_matches("Elden Ring", "elden ring"));
        assert!(!title_matches("Elden Ring", "Eldenworld Ring"));
        assert!(!title_matches("Elden Ring", "Elden Ringworld"));
        assert!(!title_matches("Elden Ring", "Some Other Game"));
    }

    #[test]
    fn test_classify_hit() {
        assert_eq!(classify_hit("Elden Ring", "Elden.Ring-GROUP"), HitKind::Main);
        assert_eq!(
            classify_hit("Elden Ring", "Elden.Ring.Update.v1.05-GROUP"),
            HitKind::Update
        );
        assert_eq!(
            classify_hit("Elden Ring", "Elden.Ring.Shadow.DLC-GROUP"),
            HitKind::Dlc
        );
        assert_eq!(
            classify_hit("Elden Ring", "Elden.Ring.Original.Soundtrack"),
            HitKind::Extra
        );
    }

    #[test]
    fn test_listing_matches_exact() {
        assert!(listing_matches("Hollow Knight", "hollow.knight"));
    }

    #[test]
    fn test_listing_matches_word_boundary_regex() {
        assert!(listing_matches("Hollow Knight", "Hollow Knight Silksong"));
        assert!(!listing_matches("Hollow Knight", "Hollowest Knights"));
    }

    #[test]
    fn test_listing_matches_word_containment_fallback() {
        // Words present but reordered: only the containment stage catches it.
        assert!(listing_matches("Knight Hollow", "Hollow Super Knight"));
        assert!(!listing_matches("Knight Hollow", "Hollow Something"));
    }

    #[test]
    fn test_escape_regex_metacharacters() {
        // Normalization strips punctuation, but the escape must still be safe
        // for any input it is handed.
        assert_eq!(escape_regex("a.b+c"), r"a\.b\+c");
        assert!(Regex::new(&escape_regex("weird (title) [x]")).is_ok());
    }
}
