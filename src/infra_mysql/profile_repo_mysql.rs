use super::util::{downcast, store_err};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use sqlx::{MySqlPool, Row};

pub struct MySqlProfileRepo {
    pool: MySqlPool,
}

impl MySqlProfileRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlProfileRepo { pool }
    }
}

#[async_trait::async_trait]
impl ProfileRepo for MySqlProfileRepo {
    async fn create_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
        profile: &NewProfile,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;

        sqlx::query(
            r#"
INSERT INTO user_profile (user_id, first_name, last_name, date_of_birth, gender_code)
VALUES (?, ?, ?, ?, ?)
"#,
        )
        .bind(user_id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(profile.date_of_birth)
        .bind(&profile.gender_code)
        .execute(tx.conn())
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn get(&self, user_id: UserId) -> Result<Option<ProfileRecord>, AuthError> {
        let row = sqlx::query(
            r#"
SELECT first_name, last_name, date_of_birth, gender_code
FROM user_profile
WHERE user_id = ?
"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Store(format!("query profile: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(ProfileRecord {
            user_id,
            profile: NewProfile {
                first_name: row.try_get("first_name").map_err(store_err)?,
                last_name: row.try_get("last_name").map_err(store_err)?,
                date_of_birth: row.try_get("date_of_birth").map_err(store_err)?,
                gender_code: row.try_get("gender_code").map_err(store_err)?,
            },
        }))
    }
}

pub struct MySqlReferenceData {
    pool: MySqlPool,
}

impl MySqlReferenceData {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlReferenceData { pool }
    }
}

#[async_trait::async_trait]
impl ReferenceDataRepo for MySqlReferenceData {
    async fn gender_exists(&self, code: &str) -> Result<bool, AuthError> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM ref_gender WHERE code = ?"#)
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(count > 0)
    }
}
