//! Tokenization shared by the router, the keyword index, and the hash embedder.

/// Lowercase alphanumeric words. Everything else is a separator, so
/// `"Q4-2024 audit_report"` yields `["q4", "2024", "audit", "report"]`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Whether `token` is `word` or a regular plural of it
/// (`invoice`/`invoices`, `status`/`statuses`, `category`/`categories`).
pub fn word_matches(token: &str, word: &str) -> bool {
    if token == word {
        return true;
    }
    if token.strip_suffix('s') == Some(word) || token.strip_suffix("es") == Some(word) {
        return true;
    }
    match (token.strip_suffix("ies"), word.strip_suffix('y')) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Whether `phrase` occurs as consecutive words of `tokens`, each word
/// matched with [`word_matches`].
pub fn contains_phrase(tokens: &[String], phrase: &[String]) -> bool {
    if phrase.is_empty() || phrase.len() > tokens.len() {
        return false;
    }
    tokens
        .windows(phrase.len())
        .any(|w| w.iter().zip(phrase).all(|(t, p)| word_matches(t, p)))
}

/// Key used to detect duplicate chunk text: whitespace collapsed, lowercase.
pub fn normalize_for_dedup(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// First `max_chars` characters, cut back to a word boundary when possible.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    let trimmed = match cut.rfind(' ') {
        Some(pos) if pos > max_chars / 2 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}…", trimmed.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_splits_punctuation() {
        assert_eq!(
            tokenize("Show me the Q4-2024 audit_report!"),
            vec!["show", "me", "the", "q4", "2024", "audit", "report"]
        );
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("  ,;  ").is_empty());
    }

    #[test]
    fn test_normalize_for_dedup() {
        assert_eq!(
            normalize_for_dedup("  Revenue   grew\n15%  "),
            normalize_for_dedup("revenue grew 15%")
        );
    }

    #[test]
    fn test_excerpt_short_text_untouched() {
        assert_eq!(excerpt("short  text", 50), "short text");
    }

    #[test]
    fn test_excerpt_cuts_on_word_boundary() {
        let text = "The company has maintained a steady growth of fifteen percent";
        let ex = excerpt(text, 30);
        assert!(ex.ends_with('…'));
        assert!(ex.chars().count() <= 31);
        assert!(text.starts_with(ex.trim_end_matches('…')));
    }

    #[test]
    fn test_word_matches_plurals_only() {
        assert!(word_matches("invoices", "invoice"));
        assert!(word_matches("statuses", "status"));
        assert!(word_matches("categories", "category"));
        assert!(!word_matches("summary", "sum"));
        assert!(!word_matches("accounting", "count"));
    }

    #[test]
    fn test_contains_phrase_consecutive() {
        let tokens = tokenize("How many invoices are on hold?");
        assert!(contains_phrase(&tokens, &tokenize("how many")));
        assert!(contains_phrase(&tokens, &tokenize("on hold")));
        assert!(!contains_phrase(&tokens, &tokenize("many are")));
        assert!(!contains_phrase(&tokens, &[]));
    }
}
