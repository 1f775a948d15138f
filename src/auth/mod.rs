//! Password check against the stored SCrypt hash (C12) and session key
//! issuance (C11).

pub mod scrypt;
pub mod session;

pub use scrypt::{ScryptError, ScryptParams};
pub use session::SessionStore;

use sqlx::SqlitePool;
use tracing::warn;

use crate::error::DbError;

pub struct AuthAdapter {
    pool: SqlitePool,
}

impl AuthAdapter {
    pub fn new(pool: SqlitePool) -> Self {
        AuthAdapter { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), DbError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS User (
                userIdx INTEGER PRIMARY KEY AUTOINCREMENT,
                userId TEXT NOT NULL UNIQUE,
                passwordHash TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS UserServer (
                userIdx INTEGER NOT NULL,
                serverName TEXT NOT NULL,
                host TEXT NOT NULL,
                port INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// `false` on any mismatch, unknown user, or malformed stored hash —
    /// auth failures never propagate as errors, they just deny.
    pub async fn check(&self, user_id: &str, password: &str) -> Result<bool, DbError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT passwordHash FROM User WHERE userId = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some((stored_hash,)) = row else {
            return Ok(false);
        };

        match scrypt::verify_password(password, &stored_hash) {
            Ok(matches) => Ok(matches),
            Err(err) => {
                warn!(error = %err, user = %user_id, "stored password hash is malformed");
                Ok(false)
            }
        }
    }
}
