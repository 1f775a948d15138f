/// Case-fold a nickname or channel name for use as an identity key.
///
/// ASCII letters are lowercased directly; anything outside ASCII falls back
/// to Unicode uppercase-then-lowercase so locale-sensitive nicknames still
/// compare sensibly without requiring a full IRC casemapping table.
pub fn casefold(s: &str) -> String {
    if s.is_ascii() {
        s.to_ascii_lowercase()
    } else {
        s.to_uppercase().to_lowercase()
    }
}

pub fn eq_casefold(a: &str, b: &str) -> bool {
    casefold(a) == casefold(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_casefold_is_lowercase() {
        assert_eq!(casefold("Alice"), "alice");
    }

    #[test]
    fn casefold_equality_is_case_insensitive() {
        assert!(eq_casefold("Bob", "BOB"));
        assert!(!eq_casefold("Bob", "Carol"));
    }
}
