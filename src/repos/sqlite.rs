use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::OptionalExtension;

use crate::models::{
    token::{NewToken, Scope, StoredToken, Token},
    user::{NewUser, User},
};
use crate::repos::AccountsRepo;
use crate::schema::{scopes, tokens, users};

pub struct SqliteAccountsRepo {
    pool: crate::db::sqlite::SqlitePool,
}

impl SqliteAccountsRepo {
    pub fn new(pool: crate::db::sqlite::SqlitePool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl AccountsRepo for SqliteAccountsRepo {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let email = email.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<User>> {
            let mut conn = pool.get()?;
            let u = users::table
                .filter(users::email.eq(&email))
                .first::<User>(&mut conn)
                .optional()?;
            Ok(u)
        })
        .await?
    }

    async fn create_user(&self, new_user: NewUser<'_>) -> anyhow::Result<User> {
        let pool = self.pool.clone();
        let row = (
            new_user.id.to_string(),
            new_user.email.to_string(),
            new_user.password_hash.to_string(),
            new_user.name.to_string(),
            new_user.created_at.to_string(),
        );
        let user = tokio::task::spawn_blocking(move || -> anyhow::Result<User> {
            let mut conn = pool.get()?;
            diesel::insert_into(users::table)
                .values(&NewUser {
                    id: &row.0,
                    email: &row.1,
                    password_hash: &row.2,
                    name: &row.3,
                    created_at: &row.4,
                })
                .execute(&mut conn)?;
            let u = users::table.find(&row.0).first::<User>(&mut conn)?;
            Ok(u)
        })
        .await??;
        Ok(user)
    }

    async fn replace_token(&self, token: NewToken, scope_names: Vec<String>) -> anyhow::Result<StoredToken> {
        let pool = self.pool.clone();
        let stored = tokio::task::spawn_blocking(move || -> anyhow::Result<StoredToken> {
            let mut conn = pool.get()?;
            let stored = conn.immediate_transaction(|conn| {
                let previous: Vec<String> = tokens::table
                    .filter(tokens::user_id.eq(&token.user_id))
                    .filter(tokens::service.eq(&token.service))
                    .select(tokens::id)
                    .load(conn)?;
                if !previous.is_empty() {
                    diesel::delete(scopes::table.filter(scopes::token_id.eq_any(&previous)))
                        .execute(conn)?;
                    diesel::delete(tokens::table.filter(tokens::id.eq_any(&previous)))
                        .execute(conn)?;
                }

                diesel::insert_into(tokens::table).values(&token).execute(conn)?;
                let rows: Vec<Scope> = scope_names
                    .iter()
                    .map(|name| Scope {
                        id: uuid::Uuid::new_v4().to_string(),
                        token_id: token.id.clone(),
                        name: name.clone(),
                    })
                    .collect();
                if !rows.is_empty() {
                    diesel::insert_into(scopes::table).values(&rows).execute(conn)?;
                }

                let saved = tokens::table.find(&token.id).first::<Token>(conn)?;
                Ok::<_, diesel::result::Error>(StoredToken { token: saved, scopes: rows })
            })?;
            Ok(stored)
        })
        .await??;
        Ok(stored)
    }

    async fn list_tokens(&self, user_id: &str) -> anyhow::Result<Vec<StoredToken>> {
        let user_id = user_id.to_string();
        let pool = self.pool.clone();
        let rows = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<StoredToken>> {
            let mut conn = pool.get()?;
            let token_rows = tokens::table
                .filter(tokens::user_id.eq(&user_id))
                .order((tokens::service.asc(), tokens::created_at.asc()))
                .load::<Token>(&mut conn)?;
            let scope_rows = Scope::belonging_to(&token_rows)
                .order(scopes::name.asc())
                .load::<Scope>(&mut conn)?
                .grouped_by(&token_rows);
            Ok(token_rows
                .into_iter()
                .zip(scope_rows)
                .map(|(token, scopes)| StoredToken { token, scopes })
                .collect())
        })
        .await??;
        Ok(rows)
    }
}
