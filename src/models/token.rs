use diesel::prelude::*;
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::models::user::User;

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = crate::schema::tokens)]
#[diesel(belongs_to(User))]
pub struct Token {
    pub id: String,
    pub user_id: String,
    pub service: String,
    pub value: String,
    pub token_type: String,
    pub secret: Option<String>,
    pub refresh_token: Option<String>,
    /// RFC 3339 UTC
    pub expiration: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::tokens)]
pub struct NewToken {
    pub id: String,
    pub user_id: String,
    pub service: String,
    pub value: String,
    pub token_type: String,
    pub secret: Option<String>,
    pub refresh_token: Option<String>,
    pub expiration: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Insertable)]
#[diesel(table_name = crate::schema::scopes)]
#[diesel(belongs_to(Token))]
pub struct Scope {
    pub id: String,
    pub token_id: String,
    pub name: String,
}

/// A token row together with its granted scopes.
#[derive(Debug, Clone)]
pub struct StoredToken {
    pub token: Token,
    pub scopes: Vec<Scope>,
}

/// Token shape handed to HTTP clients acting on the user's behalf.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OAuthToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: i64,
}

impl StoredToken {
    pub fn scope_names(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(|s| s.name.as_str())
    }

    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.token.expiration, &Rfc3339).ok()
    }

    pub fn to_oauth_token(&self) -> OAuthToken {
        OAuthToken {
            access_token: self.token.value.clone(),
            token_type: self.token.token_type.clone(),
            expires_at: self.expires_at().map(|t| t.unix_timestamp()).unwrap_or(i64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(expiration: &str) -> StoredToken {
        StoredToken {
            token: Token {
                id: "t1".into(),
                user_id: "u1".into(),
                service: "github".into(),
                value: "gho_abc".into(),
                token_type: "bearer".into(),
                secret: None,
                refresh_token: None,
                expiration: expiration.into(),
                created_at: "2024-01-01T00:00:00Z".into(),
            },
            scopes: vec![
                Scope { id: "s1".into(), token_id: "t1".into(), name: "repo".into() },
                Scope { id: "s2".into(), token_id: "t1".into(), name: "user".into() },
            ],
        }
    }

    #[test]
    fn oauth_token_uses_unix_expiry() {
        let t = stored("2024-01-01T01:00:00Z").to_oauth_token();
        assert_eq!(t.access_token, "gho_abc");
        assert_eq!(t.token_type, "bearer");
        assert_eq!(t.expires_at, 1_704_070_800);
    }

    #[test]
    fn scope_names_lists_all_scopes() {
        let names: Vec<_> = stored("2024-01-01T01:00:00Z").scope_names().map(str::to_string).collect();
        assert_eq!(names, vec!["repo", "user"]);
    }
}
