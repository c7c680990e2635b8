//! Name and phone normalization.
//!
//! Handles:
//! - Diacritic folding (é→e, ç→c, œ→oe)
//! - Punctuation as separators (Ould-Ali → ould ali, H. → h)
//! - Phone digits in national form (+213 555… → 0555…)

use strsim::normalized_levenshtein;

/// Minimum digits for a phone to count as present.
const MIN_PHONE_DIGITS: usize = 6;

/// Country calling code folded into the national leading zero.
const COUNTRY_CODE: &str = "213";

/// Lowercase, fold diacritics, split on anything that is not a letter or digit,
/// and rejoin the tokens with single spaces.
pub fn normalize_name(raw: &str) -> String {
    let mut folded = String::with_capacity(raw.len());
    for c in raw.chars() {
        match fold_char(c) {
            Some(ascii) => folded.push_str(ascii),
            None if c.is_alphanumeric() => folded.extend(c.to_lowercase()),
            None => folded.push(' '),
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Order-insensitive key of a full name: normalized tokens, sorted.
pub fn name_key(given: &str, family: &str) -> String {
    let joined = format!("{} {}", given, family);
    let normalized = normalize_name(&joined);
    let mut tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Similarity of two people's names (0.0 - 1.0).
///
/// Compares "given family" against both orders of the other name and keeps the best,
/// since plans often swap the columns.
pub fn name_similarity(given_a: &str, family_a: &str, given_b: &str, family_b: &str) -> f64 {
    let a = normalize_name(&format!("{} {}", given_a, family_a));
    if a.is_empty() {
        return 0.0;
    }
    let forward = normalize_name(&format!("{} {}", given_b, family_b));
    let swapped = normalize_name(&format!("{} {}", family_b, given_b));
    normalized_levenshtein(&a, &forward).max(normalized_levenshtein(&a, &swapped))
}

/// Digits only, national form. `None` when too short to identify anyone.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let national = if let Some(rest) = digits.strip_prefix(&format!("00{}", COUNTRY_CODE)) {
        format!("0{}", rest)
    } else if raw.trim_start().starts_with('+') {
        match digits.strip_prefix(COUNTRY_CODE) {
            Some(rest) => format!("0{}", rest),
            None => digits,
        }
    } else {
        digits
    };
    (national.len() >= MIN_PHONE_DIGITS).then_some(national)
}

/// ASCII replacement for accented Latin letters.
fn fold_char(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "a",
        'æ' | 'Æ' => "ae",
        'ç' | 'Ç' => "c",
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => "i",
        'ñ' | 'Ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => "o",
        'œ' | 'Œ' => "oe",
        'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => "u",
        'ý' | 'ÿ' | 'Ý' | 'Ÿ' => "y",
        'ß' => "ss",
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Hélène"), "helene");
        assert_eq!(normalize_name("  Ould-Ali  "), "ould ali");
        assert_eq!(normalize_name("Karim H."), "karim h");
        assert_eq!(normalize_name("FRANÇOIS  Lœw"), "francois loew");
        assert_eq!(normalize_name("--"), "");
    }

    #[test]
    fn test_name_key_is_order_insensitive() {
        assert_eq!(name_key("Amel", "Boudiaf"), name_key("BOUDIAF", "amel"));
        assert_eq!(name_key("Amel", "Boudiaf"), "amel boudiaf");
        assert_eq!(name_key("", ""), "");
    }

    #[test]
    fn test_similarity_identical_and_swapped() {
        assert!(name_similarity("Amel", "Boudiaf", "Amel", "Boudiaf") > 0.99);
        assert!(name_similarity("Boudiaf", "Amel", "Amel", "Boudiaf") > 0.99);
        assert!(name_similarity("Amèl", "BOUDIAF", "Amel", "Boudiaf") > 0.99);
    }

    #[test]
    fn test_similarity_typo_vs_abbreviation() {
        // One typo in a long name stays close
        assert!(name_similarity("Amel", "Boudiaff", "Amel", "Boudiaf") > 0.9);
        // Abbreviated family name drifts away
        assert!(name_similarity("Karim", "H.", "Karim", "Hadj") < 0.8);
        assert_eq!(name_similarity("", "", "Karim", "Hadj"), 0.0);
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("0555 11 11 11"), Some("0555111111".into()));
        assert_eq!(normalize_phone("+213 555-111-111"), Some("0555111111".into()));
        assert_eq!(normalize_phone("00213555111111"), Some("0555111111".into()));
        assert_eq!(normalize_phone("213555111111"), Some("213555111111".into()));
        assert_eq!(normalize_phone("12"), None);
        assert_eq!(normalize_phone("n/a"), None);
    }
}
