use super::util::{downcast, is_dup_key, parse_column, store_err};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use std::sync::Arc;

const SELECT_TOKEN: &str = r#"
SELECT id, user_id, token_hash, family_id, created_at, expires_at,
       revoked_at, revoked_reason, replaced_by
FROM refresh_token
"#;

pub struct MySqlRefreshTokenRepo {
    pool: MySqlPool,
    clock: Arc<dyn Clock>,
}

impl MySqlRefreshTokenRepo {
    pub fn new(pool: MySqlPool, clock: Arc<dyn Clock>) -> Self {
        MySqlRefreshTokenRepo { pool, clock }
    }

    fn row_to_record(row: MySqlRow) -> Result<RefreshTokenRecord, AuthError> {
        let reason: Option<String> = row.try_get("revoked_reason").map_err(store_err)?;
        Ok(RefreshTokenRecord {
            id: row.try_get("id").map_err(store_err)?,
            user_id: row.try_get("user_id").map_err(store_err)?,
            token_hash: row.try_get("token_hash").map_err(store_err)?,
            family_id: row.try_get("family_id").map_err(store_err)?,
            created_at: row.try_get("created_at").map_err(store_err)?,
            expires_at: row.try_get("expires_at").map_err(store_err)?,
            revoked_at: row.try_get("revoked_at").map_err(store_err)?,
            revoked_reason: reason
                .as_deref()
                .map(|r| parse_column("revoked_reason", r))
                .transpose()?,
            replaced_by: row.try_get("replaced_by").map_err(store_err)?,
        })
    }
}

#[async_trait::async_trait]
impl RefreshTokenRepo for MySqlRefreshTokenRepo {
    async fn create_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        record: &RefreshTokenRecord,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;

        sqlx::query(
            r#"
INSERT INTO refresh_token
    (id, user_id, token_hash, family_id, created_at, expires_at)
VALUES (?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.family_id)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(tx.conn())
        .await
        .map_err(|e| {
            if is_dup_key(&e) {
                AuthError::Conflict("refresh token hash collision".to_string())
            } else {
                store_err(e)
            }
        })?;

        Ok(())
    }

    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, AuthError> {
        sqlx::query(&format!("{SELECT_TOKEN} WHERE token_hash = ?"))
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Store(format!("query refresh token: {e}")))?
            .map(Self::row_to_record)
            .transpose()
    }

    async fn get_by_id(&self, id: RefreshTokenId) -> Result<Option<RefreshTokenRecord>, AuthError> {
        sqlx::query(&format!("{SELECT_TOKEN} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Store(format!("query refresh token: {e}")))?
            .map(Self::row_to_record)
            .transpose()
    }

    async fn revoke_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        id: RefreshTokenId,
        reason: RevokeReason,
    ) -> Result<bool, AuthError> {
        let tx = downcast(tx)?;

        let result = sqlx::query(
            r#"
UPDATE refresh_token
SET revoked_at = ?, revoked_reason = ?
WHERE id = ? AND revoked_at IS NULL
"#,
        )
        .bind(self.clock.now())
        .bind(reason.as_str())
        .bind(id)
        .execute(tx.conn())
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_by_user_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
        reason: RevokeReason,
    ) -> Result<u64, AuthError> {
        let tx = downcast(tx)?;

        let result = sqlx::query(
            r#"
UPDATE refresh_token
SET revoked_at = ?, revoked_reason = ?
WHERE user_id = ? AND revoked_at IS NULL
"#,
        )
        .bind(self.clock.now())
        .bind(reason.as_str())
        .bind(user_id)
        .execute(tx.conn())
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected())
    }

    async fn revoke_by_family_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        family_id: TokenFamilyId,
        reason: RevokeReason,
    ) -> Result<u64, AuthError> {
        let tx = downcast(tx)?;

        let result = sqlx::query(
            r#"
UPDATE refresh_token
SET revoked_at = ?, revoked_reason = ?
WHERE family_id = ? AND revoked_at IS NULL
"#,
        )
        .bind(self.clock.now())
        .bind(reason.as_str())
        .bind(family_id)
        .execute(tx.conn())
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected())
    }

    async fn set_replaced_by_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        id: RefreshTokenId,
        replaced_by: RefreshTokenId,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;

        let result = sqlx::query("UPDATE refresh_token SET replaced_by = ? WHERE id = ?")
            .bind(replaced_by)
            .bind(id)
            .execute(tx.conn())
            .await
            .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound(format!("refresh token {id}")));
        }
        Ok(())
    }
}
