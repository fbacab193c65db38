use super::util::{downcast, is_dup_key, parse_column, store_err};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

pub struct MySqlUserRepo {
    pool: MySqlPool,
}

impl MySqlUserRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlUserRepo { pool }
    }

    fn row_to_record(row: MySqlRow) -> Result<UserRecord, AuthError> {
        let status: String = row.try_get("status").map_err(store_err)?;
        Ok(UserRecord {
            user_id: row.try_get("user_id").map_err(store_err)?,
            email: row.try_get("email").map_err(store_err)?,
            status: parse_column("status", &status)?,
            created_at: row.try_get("created_at").map_err(store_err)?,
        })
    }
}

#[async_trait::async_trait]
impl UserRepo for MySqlUserRepo {
    async fn create_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        record: &UserRecord,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;

        sqlx::query(
            r#"
INSERT INTO user (user_id, email, status, created_at)
VALUES (?, ?, ?, ?)
"#,
        )
        .bind(record.user_id)
        .bind(&record.email)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .execute(tx.conn())
        .await
        .map_err(|e| {
            if is_dup_key(&e) {
                AuthError::Conflict("email already registered".to_string())
            } else {
                store_err(e)
            }
        })?;

        Ok(())
    }

    async fn get_by_id(&self, user_id: UserId) -> Result<Option<UserRecord>, AuthError> {
        sqlx::query("SELECT user_id, email, status, created_at FROM user WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Store(format!("query user: {e}")))?
            .map(Self::row_to_record)
            .transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError> {
        sqlx::query("SELECT user_id, email, status, created_at FROM user WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Store(format!("query user: {e}")))?
            .map(Self::row_to_record)
            .transpose()
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AuthError> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM user WHERE email = ?"#)
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(count > 0)
    }
}
