//! Verified token claims.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims of a token whose signature and registered claims have been checked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenClaims {
    pub subject: String,
    pub audience: Vec<String>,
    pub issuer: String,
    pub issued_at: u64,
    pub expires_at: u64,
    pub not_before: Option<u64>,
    /// Union of the `permissions` array and the space-delimited `scope`.
    pub permissions: BTreeSet<String>,
    /// Every claim not listed above.
    pub custom: Map<String, Value>,
}

impl TokenClaims {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// `aud` may be a single string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub(crate) fn into_vec(self) -> Vec<String> {
        match self {
            Audience::One(aud) => vec![aud],
            Audience::Many(auds) => auds,
        }
    }
}

/// Claims as they appear on the wire; presence is checked by the verifier.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawClaims {
    pub sub: Option<String>,
    pub iss: Option<String>,
    pub aud: Option<Audience>,
    pub iat: Option<u64>,
    pub exp: Option<u64>,
    pub nbf: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawClaims {
    pub(crate) fn permission_set(&self) -> BTreeSet<String> {
        let from_scope = self
            .scope
            .iter()
            .flat_map(|scope| scope.split_whitespace())
            .map(str::to_string);
        let listed = self.permissions.iter().flatten().cloned();
        from_scope.chain(listed).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawClaims {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_audience_string_or_array() {
        let one = raw(json!({ "aud": "api" }));
        assert_eq!(one.aud.unwrap().into_vec(), vec!["api"]);

        let many = raw(json!({ "aud": ["api", "userinfo"] }));
        assert_eq!(many.aud.unwrap().into_vec(), vec!["api", "userinfo"]);
    }

    #[test]
    fn test_permissions_merge_scope_and_array() {
        let claims = raw(json!({
            "scope": "openid read:profile",
            "permissions": ["read:reports", "read:profile"],
        }));
        let set = claims.permission_set();
        assert_eq!(set.len(), 3);
        assert!(set.contains("openid"));
        assert!(set.contains("read:reports"));
    }

    #[test]
    fn test_unknown_claims_are_kept() {
        let claims = raw(json!({ "sub": "u1", "https://example.com/roles": ["admin"] }));
        assert_eq!(claims.extra["https://example.com/roles"], json!(["admin"]));
        assert!(!claims.extra.contains_key("sub"));
    }
}
