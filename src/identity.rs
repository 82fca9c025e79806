//! Identity translation between the external identity provider and storage.
//!
//! Storage keys are scoped by a canonical identifier, an RFC 4122 UUID in
//! its hyphenated text form. Tokens issued by the identity provider are
//! either already in that form or opaque strings, which are mapped with a
//! name-based (v5) UUID. No mapping table is persisted: the derivation is
//! recomputed on every request, so the namespace must never change.

use crate::constants::identity::{CANONICAL_LEN, SEPARATOR};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Namespace all opaque tokens are derived under.
pub const NAMESPACE: Uuid = Uuid::NAMESPACE_DNS;

/// Storage-layer user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalId(Uuid);

impl CanonicalId {
    /// Underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for CanonicalId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if !is_canonical(s) {
            return Err(Error::validation(format!("'{s}' is not a canonical identifier")));
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::validation(format!("'{s}' is not a canonical identifier: {e}")))
    }
}

/// Whether `token` is already a hyphenated UUID.
///
/// Only the 36-character `8-4-4-4-12` form is accepted; braced, URN and
/// simple forms are treated as opaque tokens.
pub fn is_canonical(token: &str) -> bool {
    const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];

    token.len() == CANONICAL_LEN
        && token
            .split(SEPARATOR)
            .map(str::len)
            .eq(GROUPS.iter().copied())
        && token
            .chars()
            .all(|c| c == SEPARATOR || c.is_ascii_hexdigit())
}

/// Deterministic identifier for an opaque token.
pub fn derive(token: &str) -> CanonicalId {
    CanonicalId(Uuid::new_v5(&NAMESPACE, token.as_bytes()))
}

/// Map any external token to its canonical identifier.
///
/// A token already in canonical form keeps its value but is normalized to
/// lowercase hex, so `6F1C...` and `6f1c...` name the same owner and yield
/// the same storage prefix. Every other token is derived.
pub fn translate(token: &str) -> CanonicalId {
    if is_canonical(token)
        && let Ok(uuid) = Uuid::parse_str(token)
    {
        return CanonicalId(uuid);
    }
    derive(token)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CANONICAL: &str = "6f1c2d4e-8a9b-4c3d-9e2f-0a1b2c3d4e5f";

    #[test]
    fn test_is_canonical() {
        assert!(is_canonical(CANONICAL));
        assert!(is_canonical(&CANONICAL.to_uppercase()));
        assert!(!is_canonical("user_2abcDEF"));
        assert!(!is_canonical("6f1c2d4e8a9b4c3d9e2f0a1b2c3d4e5f"));
        assert!(!is_canonical("6f1c2d4e-8a9b-4c3d-9e2f-0a1b2c3d4e5g"));
        assert!(!is_canonical("6f1c2d4e8-a9b-4c3d-9e2f-0a1b2c3d4e5f"));
        assert!(!is_canonical("a-b"));
        assert!(!is_canonical(""));
    }

    #[test]
    fn test_canonical_passes_through() {
        assert_eq!(translate(CANONICAL).to_string(), CANONICAL);
    }

    #[test]
    fn test_uppercase_canonical_is_normalized_to_lowercase() {
        let upper = CANONICAL.to_uppercase();
        assert_eq!(translate(&upper).to_string(), CANONICAL);
        assert_eq!(translate(&upper), translate(CANONICAL));
    }

    #[test]
    fn test_translate_is_idempotent() {
        for token in ["user_2abcDEF", CANONICAL, "", "a-b-c"] {
            let once = translate(token);
            let twice = translate(&once.to_string());
            assert_eq!(once, twice, "token {token:?}");
        }
    }

    #[test]
    fn test_derivation_is_deterministic_and_distinct() {
        let a = translate("user_2abcDEF");
        assert_eq!(a, translate("user_2abcDEF"));
        assert_eq!(a, derive("user_2abcDEF"));
        assert_ne!(a, translate("user_2abcDEG"));
        assert_eq!(a.as_uuid().get_version_num(), 5);
    }

    #[test]
    fn test_derivation_is_pinned() {
        // Changing the namespace would orphan every stored result.
        assert_eq!(
            derive("python.org").to_string(),
            "886313e1-3b8a-5372-9b90-0c9aee199e5d"
        );
    }

    #[test]
    fn test_from_str_requires_canonical_form() {
        let id: CanonicalId = CANONICAL.parse().unwrap();
        assert_eq!(id.to_string(), CANONICAL);
        assert!("not-an-id".parse::<CanonicalId>().is_err());
    }
}
