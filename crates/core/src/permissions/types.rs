//! Permission literal types and matching
//!
//! This module defines how a stored literal matches a queried one.

use bitflags::bitflags;

use crate::error::{PermsError, PermsResult};

/// Prefix marking a negated (revoking) literal
pub const NEGATION_PREFIX: char = '-';

/// Suffix marking a wildcard literal
pub const WILDCARD_SUFFIX: char = '*';

bitflags! {
    /// How the stored literals of one node matched a query
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MatchFlags: u8 {
        /// The exact literal is stored
        const EXPLICIT_GRANTED = 0x01;
        /// The exact negated literal is stored
        const EXPLICIT_REVOKED = 0x02;
        /// A wildcard covering the literal is stored
        const WILDCARD_GRANTED = 0x04;
        /// A negated wildcard covering the literal is stored
        const WILDCARD_REVOKED = 0x08;
    }
}

/// Outcome of scanning one node's stored literals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matches<'a> {
    pub flags: MatchFlags,
    /// Every stored literal that matched, with the class it matched as
    pub literals: Vec<(&'a str, MatchFlags)>,
}

/// Normalize a permission literal for storage or lookup
///
/// Lower-cases and trims the literal. Empty literals, a bare `-`, and
/// literals containing whitespace are rejected.
pub fn normalize(permission: &str) -> PermsResult<String> {
    let literal = permission.trim().to_lowercase();
    if literal.is_empty()
        || literal == NEGATION_PREFIX.to_string()
        || literal.contains(char::is_whitespace)
    {
        return Err(PermsError::InvalidPermission(permission.to_string()));
    }
    Ok(literal)
}

/// Split a leading negation off a literal
///
/// `-foo.bar` -> `(true, "foo.bar")`
/// `foo.bar` -> `(false, "foo.bar")`
pub fn split_negation(literal: &str) -> (bool, &str) {
    match literal.strip_prefix(NEGATION_PREFIX) {
        Some(positive) => (true, positive),
        None => (false, literal),
    }
}

/// Prefix covered by a wildcard literal
///
/// `foo.*` -> `Some("foo.")`
/// `*` -> `Some("")`
/// `foo.bar` -> `None`
pub fn wildcard_prefix(literal: &str) -> Option<&str> {
    literal.strip_suffix(WILDCARD_SUFFIX)
}

/// Classify how `stored` literals match the positive query `literal`
pub fn classify<'a, I>(stored: I, literal: &str) -> Matches<'a>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut matches = Matches::default();

    for candidate in stored {
        let (negated, positive) = split_negation(candidate);
        let mut flag = MatchFlags::empty();

        if positive == literal {
            flag |= if negated {
                MatchFlags::EXPLICIT_REVOKED
            } else {
                MatchFlags::EXPLICIT_GRANTED
            };
        }
        if let Some(prefix) = wildcard_prefix(positive) {
            if literal.starts_with(prefix) {
                flag |= if negated {
                    MatchFlags::WILDCARD_REVOKED
                } else {
                    MatchFlags::WILDCARD_GRANTED
                };
            }
        }

        if !flag.is_empty() {
            matches.flags |= flag;
            matches.literals.push((candidate.as_str(), flag));
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(literals: &[&str]) -> Vec<String> {
        literals.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Cmd.Ban ").unwrap(), "cmd.ban");
        assert!(normalize("").is_err());
        assert!(normalize("-").is_err());
        assert!(normalize("cmd ban").is_err());
    }

    #[test]
    fn test_split_negation() {
        assert_eq!(split_negation("-foo.bar"), (true, "foo.bar"));
        assert_eq!(split_negation("foo.bar"), (false, "foo.bar"));
    }

    #[test]
    fn test_wildcard_prefix() {
        assert_eq!(wildcard_prefix("foo.*"), Some("foo."));
        assert_eq!(wildcard_prefix("*"), Some(""));
        assert_eq!(wildcard_prefix("foo.bar"), None);
    }

    #[test]
    fn test_classify_classes_are_independent() {
        let literals = stored(&["foo.*", "-foo.bar", "other.x"]);
        let matches = classify(&literals, "foo.bar");

        assert_eq!(
            matches.flags,
            MatchFlags::WILDCARD_GRANTED | MatchFlags::EXPLICIT_REVOKED
        );
        assert_eq!(matches.literals.len(), 2);
    }

    #[test]
    fn test_classify_negated_wildcard() {
        let literals = stored(&["-foo.*"]);
        assert_eq!(
            classify(&literals, "foo.baz").flags,
            MatchFlags::WILDCARD_REVOKED
        );
        assert!(classify(&literals, "food").flags.is_empty());
    }

    #[test]
    fn test_classify_wildcard_query() {
        // Querying a wildcard literal itself matches it both ways
        let literals = stored(&["cmd.*"]);
        assert_eq!(
            classify(&literals, "cmd.*").flags,
            MatchFlags::EXPLICIT_GRANTED | MatchFlags::WILDCARD_GRANTED
        );
    }

    #[test]
    fn test_bare_wildcard_matches_everything() {
        let literals = stored(&["*"]);
        assert_eq!(
            classify(&literals, "anything.at.all").flags,
            MatchFlags::WILDCARD_GRANTED
        );
    }
}
