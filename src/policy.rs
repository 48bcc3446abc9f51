//! Sender policy — classify a sender against the allow-list and master address.

/// Where a sender stands with respect to the configured addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderClass {
    /// Not on the allow-list. Audited, otherwise ignored.
    Unauthorized,
    /// On the allow-list but not the master; forwarded for review.
    StandardAuthorized,
    /// The master address; acknowledged directly.
    Privileged,
}

/// Extract the bare address from a header-style sender string.
///
/// `"Alice <alice@example.com>"` yields `alice@example.com`; a string with
/// no angle brackets is returned trimmed.
pub fn extract_address(sender: &str) -> &str {
    if let Some(start) = sender.find('<')
        && let Some(len) = sender[start + 1..].find('>')
    {
        return &sender[start + 1..start + 1 + len];
    }
    sender.trim()
}

/// Classify a header-style sender string.
///
/// Matching is case-sensitive and exact — no normalization. The master
/// address wins even when it also appears on the allow-list.
pub fn classify(sender: &str, allowed: &[String], master: &str) -> SenderClass {
    let address = extract_address(sender);
    if address == master {
        SenderClass::Privileged
    } else if allowed.iter().any(|a| a == address) {
        SenderClass::StandardAuthorized
    } else {
        SenderClass::Unauthorized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_from_display_name_form() {
        assert_eq!(
            extract_address("Alice <alice@example.com>"),
            "alice@example.com"
        );
    }

    #[test]
    fn extract_bare_address_trimmed() {
        assert_eq!(extract_address("  bob@example.com  "), "bob@example.com");
    }

    #[test]
    fn extract_takes_first_bracket_pair() {
        assert_eq!(extract_address("<a@x.com> <b@y.com>"), "a@x.com");
    }

    #[test]
    fn extract_unclosed_bracket_falls_back_to_whole_string() {
        assert_eq!(extract_address("Alice <alice@example.com"), "Alice <alice@example.com");
    }

    #[test]
    fn extract_empty_brackets() {
        assert_eq!(extract_address("Nobody <>"), "");
    }

    #[test]
    fn master_classifies_privileged() {
        let allowed = vec!["trusted@example.com".to_string()];
        assert_eq!(
            classify("master@example.com", &allowed, "master@example.com"),
            SenderClass::Privileged
        );
    }

    #[test]
    fn master_wins_even_when_allow_listed() {
        let allowed = vec!["master@example.com".to_string()];
        assert_eq!(
            classify("Boss <master@example.com>", &allowed, "master@example.com"),
            SenderClass::Privileged
        );
    }

    #[test]
    fn allow_listed_is_standard() {
        let allowed = vec!["trusted@example.com".to_string()];
        assert_eq!(
            classify("Alice <trusted@example.com>", &allowed, "master@example.com"),
            SenderClass::StandardAuthorized
        );
    }

    #[test]
    fn unknown_is_unauthorized() {
        let allowed = vec!["trusted@example.com".to_string()];
        assert_eq!(
            classify("stranger@evil.com", &allowed, "master@example.com"),
            SenderClass::Unauthorized
        );
    }

    #[test]
    fn matching_is_case_sensitive() {
        let allowed = vec!["trusted@example.com".to_string()];
        assert_eq!(
            classify("Trusted@Example.com", &allowed, "master@example.com"),
            SenderClass::Unauthorized
        );
    }
}
