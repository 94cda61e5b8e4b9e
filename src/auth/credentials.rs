use std::sync::Arc;

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    error::AuthError,
    models::user::{NewUser, User},
    repos::AccountsRepo,
    security::{hash_password, verify_password},
};

pub const MIN_PASSWORD_LEN: usize = 8;

/// User accounts and password login.
#[derive(Clone)]
pub struct CredentialStore {
    accounts: Arc<dyn AccountsRepo>,
}

impl CredentialStore {
    pub fn new(accounts: Arc<dyn AccountsRepo>) -> Self {
        Self { accounts }
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = self.accounts.find_user_by_email(email).await?;
        match user {
            Some(user) if verify_password(&user.password_hash, password) => Ok(user),
            _ => Err(AuthError::LoginFailed),
        }
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User, AuthError> {
        if self.accounts.find_user_by_email(email).await?.is_some() {
            return Err(AuthError::AccountExists);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidPassword);
        }

        let password_hash = hash_password(password)?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(anyhow::Error::from)?;

        let created = self
            .accounts
            .create_user(NewUser {
                id: &id,
                email,
                password_hash: &password_hash,
                name,
                created_at: &now,
            })
            .await;

        match created {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "registered account");
                Ok(user)
            }
            // Lost a race with a concurrent registration of the same email.
            Err(e) if is_unique_violation(&e) => Err(AuthError::AccountExists),
            Err(e) => Err(AuthError::Storage(e)),
        }
    }
}

fn is_unique_violation(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<DieselError>(),
        Some(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _))
    )
}
