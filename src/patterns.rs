//! Pattern fragments shared by rule catalogs.
//!
//! These only build pattern strings; compilation still happens in
//! `RuleDef::compile`, so a malformed combination is reported as a normal
//! `RuleCompilationError`.

/// `\b{pattern}\b`
pub fn word_boundary(pattern: &str) -> String {
    format!(r"\b{pattern}\b")
}

/// Match the whole input around `pattern`, so a replacement swaps the entire
/// description.
pub fn partial_match(pattern: &str) -> String {
    format!(".*{pattern}.*")
}

pub fn alternation(terms: &[&str]) -> String {
    format!("({})", terms.join("|"))
}

/// `dd/mm`, `dd.mm.yyyy`, `del dd:mm:yy` and similar.
pub fn date_pattern() -> &'static str {
    r"(\b|del )\d{2}(/\d{2}(/\d{2,4})?|\.\d{2}(\.\d{2,4})?|:\d{2}(:\d{2,4})?)\b"
}

pub fn iban_pattern() -> &'static str {
    r"\b[A-Z]{2}\d{4}[A-Z]{3}\d\b"
}

pub fn bank_code_pattern() -> &'static str {
    r"\b[A-Z]{0,4}[0-9:,_/-]{3,}[A-Z]{0,6}\b"
}

pub fn currency_pattern(currencies: &[&str]) -> String {
    format!(r"\b({})\b", currencies.join("|"))
}

/// A literal `{name}` placeholder.
pub fn placeholder(name: &str) -> String {
    format!(r"\{{{name}\}}")
}

pub fn multiple_spaces() -> &'static str {
    r"\s+"
}

pub fn is_alternation(pattern: &str) -> bool {
    pattern.contains('|')
}

/// Terms of the first parenthesized alternation in `pattern`.
pub fn extract_alternation_terms(pattern: &str) -> Vec<String> {
    match crate::regex!(r"\(([^)]+)\)").captures(pattern).and_then(|c| c.get(1)) {
        Some(group) => group.as_str().split('|').map(str::to_string).collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn builders_compile() {
        for p in [
            word_boundary("pam"),
            partial_match("esso"),
            alternation(&["a", "b"]),
            date_pattern().to_string(),
            iban_pattern().to_string(),
            bank_code_pattern().to_string(),
            currency_pattern(&["EUR", "USD"]),
            placeholder("amount"),
            multiple_spaces().to_string(),
        ] {
            assert!(Regex::new(&p).is_ok(), "pattern {p} should compile");
        }
    }

    #[test]
    fn date_pattern_matches_italian_dates() {
        let re = Regex::new(date_pattern()).unwrap();
        assert_eq!(re.replace_all("Pagamento del 12/04/2023 EUR", ""), "Pagamento  EUR");
        assert!(re.is_match("PRELIEVO 02.08.18"));
        assert!(!re.is_match("Bonifico da GOOGLE PAY"));
    }

    #[test]
    fn placeholder_is_literal() {
        let re = Regex::new(&placeholder("amount")).unwrap();
        assert!(re.is_match("paid {amount} today"));
    }

    #[test]
    fn alternation_terms() {
        assert!(is_alternation("(pizza|pasta)"));
        assert_eq!(extract_alternation_terms(r"\b(pizza|pasta|pane)\b"), ["pizza", "pasta", "pane"]);
        assert!(extract_alternation_terms("pizza").is_empty());
    }
}
