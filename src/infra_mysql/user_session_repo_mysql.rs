use super::util::{downcast, parse_column, store_err};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use std::sync::Arc;

const SELECT_SESSION: &str = r#"
SELECT id, user_id, refresh_token_id, ip_address, user_agent, status,
       created_at, last_used_at, revoked_at
FROM user_session
"#;

pub struct MySqlUserSessionRepo {
    pool: MySqlPool,
    clock: Arc<dyn Clock>,
}

impl MySqlUserSessionRepo {
    pub fn new(pool: MySqlPool, clock: Arc<dyn Clock>) -> Self {
        MySqlUserSessionRepo { pool, clock }
    }

    fn row_to_record(row: MySqlRow) -> Result<UserSessionRecord, AuthError> {
        let status: String = row.try_get("status").map_err(store_err)?;
        Ok(UserSessionRecord {
            id: row.try_get("id").map_err(store_err)?,
            user_id: row.try_get("user_id").map_err(store_err)?,
            refresh_token_id: row.try_get("refresh_token_id").map_err(store_err)?,
            client: ClientMeta {
                ip_address: row.try_get("ip_address").map_err(store_err)?,
                user_agent: row.try_get("user_agent").map_err(store_err)?,
            },
            status: parse_column("status", &status)?,
            created_at: row.try_get("created_at").map_err(store_err)?,
            last_used_at: row.try_get("last_used_at").map_err(store_err)?,
            revoked_at: row.try_get("revoked_at").map_err(store_err)?,
        })
    }
}

#[async_trait::async_trait]
impl UserSessionRepo for MySqlUserSessionRepo {
    async fn create_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        record: &UserSessionRecord,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;

        sqlx::query(
            r#"
INSERT INTO user_session
    (id, user_id, refresh_token_id, ip_address, user_agent, status, created_at, last_used_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.refresh_token_id)
        .bind(&record.client.ip_address)
        .bind(&record.client.user_agent)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.last_used_at)
        .execute(tx.conn())
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn get_by_id(&self, id: UserSessionId) -> Result<Option<UserSessionRecord>, AuthError> {
        sqlx::query(&format!("{SELECT_SESSION} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Store(format!("query user session: {e}")))?
            .map(Self::row_to_record)
            .transpose()
    }

    async fn get_by_refresh_token_id(
        &self,
        refresh_token_id: RefreshTokenId,
    ) -> Result<Option<UserSessionRecord>, AuthError> {
        sqlx::query(&format!("{SELECT_SESSION} WHERE refresh_token_id = ?"))
            .bind(refresh_token_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Store(format!("query user session: {e}")))?
            .map(Self::row_to_record)
            .transpose()
    }

    async fn get_by_refresh_token_id_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        refresh_token_id: RefreshTokenId,
    ) -> Result<Option<UserSessionRecord>, AuthError> {
        let tx = downcast(tx)?;

        sqlx::query(&format!(
            "{SELECT_SESSION} WHERE refresh_token_id = ? FOR UPDATE"
        ))
        .bind(refresh_token_id)
        .fetch_optional(tx.conn())
        .await
        .map_err(store_err)?
        .map(Self::row_to_record)
        .transpose()
    }

    async fn update_refresh_token_id_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        id: UserSessionId,
        refresh_token_id: RefreshTokenId,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;

        sqlx::query(
            r#"
UPDATE user_session
SET refresh_token_id = ?, last_used_at = ?
WHERE id = ?
"#,
        )
        .bind(refresh_token_id)
        .bind(self.clock.now())
        .bind(id)
        .execute(tx.conn())
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn revoke_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        id: UserSessionId,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;

        sqlx::query(
            r#"
UPDATE user_session
SET status = 'REVOKED', revoked_at = ?
WHERE id = ? AND status = 'ACTIVE'
"#,
        )
        .bind(self.clock.now())
        .bind(id)
        .execute(tx.conn())
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn revoke_all_by_user_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
    ) -> Result<u64, AuthError> {
        let tx = downcast(tx)?;

        let result = sqlx::query(
            r#"
UPDATE user_session
SET status = 'REVOKED', revoked_at = ?
WHERE user_id = ? AND status = 'ACTIVE'
"#,
        )
        .bind(self.clock.now())
        .bind(user_id)
        .execute(tx.conn())
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected())
    }
}
