use super::util::{downcast, store_err};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

pub struct MySqlAuthRepo {
    pool: MySqlPool,
}

impl MySqlAuthRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlAuthRepo { pool }
    }
}

#[async_trait::async_trait]
impl AuthRepo for MySqlAuthRepo {
    async fn create_credentials_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
        password_hash: &str,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;

        sqlx::query(
            r#"
INSERT INTO auth_credential (user_id, password_hash)
VALUES (?, ?)
"#,
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(tx.conn())
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn create_security_state_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        state: &SecurityStateRecord,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;

        sqlx::query(
            r#"
INSERT INTO auth_security_state
    (user_id, failed_login_count, locked_until, password_changed_at, last_login_at)
VALUES (?, ?, ?, ?, ?)
"#,
        )
        .bind(state.user_id)
        .bind(state.failed_login_count)
        .bind(state.locked_until)
        .bind(state.password_changed_at)
        .bind(state.last_login_at)
        .execute(tx.conn())
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn record_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<(), AuthError> {
        let result = sqlx::query(
            r#"
UPDATE auth_security_state
SET last_login_at = ?, failed_login_count = 0
WHERE user_id = ?
"#,
        )
        .bind(at)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound("security state".to_string()));
        }
        Ok(())
    }
}
