//! Name normalization used to collapse duplicate stops and lines.

use regex::Regex;
use std::sync::LazyLock;

/// Everything that is not a Latin or Cyrillic letter, or a digit.
static NON_KEY_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Latin}\p{Cyrillic}0-9]+").expect("static regex"));

/// Lowercase, alphanumeric-only key for a stop or line name.
///
/// Accents are kept, so "Gràcia" and "Gracia" stay distinct.
pub fn normalized_key(name: &str) -> String {
    let lower = name.to_lowercase();
    NON_KEY_CHARS.replace_all(&lower, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_punctuation_and_case() {
        assert_eq!(normalized_key("Sants Estació"), "santsestació");
        assert_eq!(normalized_key("SANTS-ESTACIÓ"), "santsestació");
        assert_eq!(normalized_key("Passeig de Gràcia - L3"), "passeigdegràcial3");
    }

    #[test]
    fn test_keeps_cyrillic() {
        assert_eq!(normalized_key("Охотный Ряд"), "охотныйряд");
        assert_eq!(normalized_key("охотный ряд (выход 2)"), "охотныйрядвыход2");
    }

    #[test]
    fn test_drops_other_scripts_and_symbols() {
        assert_eq!(normalized_key("新宿 Shinjuku ★"), "shinjuku");
        assert_eq!(normalized_key("  "), "");
    }
}
