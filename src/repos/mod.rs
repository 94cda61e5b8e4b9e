use async_trait::async_trait;

use crate::models::{
    token::{NewToken, StoredToken},
    user::{NewUser, User},
};

#[async_trait]
pub trait AccountsRepo: Send + Sync {
    // User operations
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn create_user(&self, new_user: NewUser<'_>) -> anyhow::Result<User>;

    // Token operations
    /// Inserts `token` with its scopes, removing any earlier token the same
    /// user holds for the same service.
    async fn replace_token(&self, token: NewToken, scopes: Vec<String>) -> anyhow::Result<StoredToken>;
    async fn list_tokens(&self, user_id: &str) -> anyhow::Result<Vec<StoredToken>>;
}

pub mod sqlite;
