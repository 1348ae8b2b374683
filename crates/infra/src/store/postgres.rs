//! Postgres-backed contact and profile store.
//!
//! Listing reads the `contacts_with_user_info` view. Deployments without the
//! view get the same rows from a manual join.
//!
//! ## Error Mapping
//!
//! | PostgreSQL code | StoreError |
//! |---|---|
//! | `23505` unique violation | `Conflict` |
//! | `42501` insufficient privilege / RLS | `PermissionDenied` |
//! | `42P01` undefined table | `MissingRelation` |
//! | pool closed, io, timeout | `Unavailable` |
//! | anything else | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use contacthub_core::{
    Contact, ContactId, ContactMeta, ContactPatch, ContactType, ContactWithUploader, ProfileId,
    UserId, UserProfile,
};

use super::{ContactStore, ProfileStore, StoreError};

const CONTACT_COLUMNS: &str = "c.id, c.name, c.email, c.phone_number, c.business_sector, \
     c.business_name, c.business_details, c.contact_type, c.added_by, c.created_at";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    async fn list_from_view(
        &self,
        owner: Option<UserId>,
    ) -> Result<Vec<ContactWithUploader>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                c.id, c.name, c.email, c.phone_number, c.business_sector,
                c.business_name, c.business_details, c.contact_type, c.added_by, c.created_at,
                c.source_description, c.meta_created_at,
                c.added_by_name, c.added_by_position
            FROM contacts_with_user_info c
            WHERE ($1::uuid IS NULL OR c.added_by = $1)
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(owner.map(Uuid::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_contacts_view", e))?;

        rows.iter().map(contact_with_uploader_from_row).collect()
    }

    async fn list_from_join(
        &self,
        owner: Option<UserId>,
    ) -> Result<Vec<ContactWithUploader>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                c.id, c.name, c.email, c.phone_number, c.business_sector,
                c.business_name, c.business_details, c.contact_type, c.added_by, c.created_at,
                m.source_description, m.created_at AS meta_created_at,
                p.full_name AS added_by_name, p.user_position AS added_by_position
            FROM contacts c
            LEFT JOIN contact_meta m ON m.contact_id = c.id
            LEFT JOIN user_profiles p ON p.user_id = c.added_by
            WHERE ($1::uuid IS NULL OR c.added_by = $1)
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(owner.map(Uuid::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_contacts_join", e))?;

        rows.iter().map(contact_with_uploader_from_row).collect()
    }
}

#[async_trait]
impl ContactStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn list_with_uploader(
        &self,
        owner: Option<UserId>,
    ) -> Result<Vec<ContactWithUploader>, StoreError> {
        match self.list_from_view(owner).await {
            Err(StoreError::MissingRelation(msg)) => {
                tracing::warn!(error = %msg, "contacts_with_user_info view not found, falling back to join");
                self.list_from_join(owner).await
            }
            other => other,
        }
    }

    async fn get(&self, id: ContactId) -> Result<Option<Contact>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CONTACT_COLUMNS}, m.source_description, m.created_at AS meta_created_at \
             FROM contacts c LEFT JOIN contact_meta m ON m.contact_id = c.id \
             WHERE c.id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_contact", e))?;

        row.as_ref().map(contact_from_row).transpose()
    }

    #[instrument(skip(self, contact, meta), fields(contact_id = %contact.id), err)]
    async fn insert(&self, mut contact: Contact, meta: ContactMeta) -> Result<Contact, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO contacts (
                id, name, email, phone_number, business_sector,
                business_name, business_details, contact_type, added_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::from(contact.id))
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.phone_number)
        .bind(&contact.business_sector)
        .bind(&contact.business_name)
        .bind(&contact.business_details)
        .bind(contact.contact_type.as_str())
        .bind(Uuid::from(contact.added_by))
        .bind(contact.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_contact", e))?;

        sqlx::query(
            "INSERT INTO contact_meta (contact_id, source_description, created_at) VALUES ($1, $2, $3)",
        )
        .bind(Uuid::from(meta.contact_id))
        .bind(&meta.source_description)
        .bind(meta.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_contact_meta", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        contact.contact_meta = Some(meta);
        Ok(contact)
    }

    #[instrument(skip(self, patch), err)]
    async fn update(&self, id: ContactId, patch: &ContactPatch) -> Result<Contact, StoreError> {
        let mut contact = self
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("contact {id}")))?;
        patch.apply_to(&mut contact);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            UPDATE contacts SET
                name = $2, email = $3, phone_number = $4, business_sector = $5,
                business_name = $6, business_details = $7, contact_type = $8
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.phone_number)
        .bind(&contact.business_sector)
        .bind(&contact.business_name)
        .bind(&contact.business_details)
        .bind(contact.contact_type.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_contact", e))?;

        if let Some(source) = &patch.source_description {
            sqlx::query("UPDATE contact_meta SET source_description = $2 WHERE contact_id = $1")
                .bind(Uuid::from(id))
                .bind(source)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("update_contact_meta", e))?;
            if let Some(meta) = contact.contact_meta.as_mut() {
                meta.source_description = source.clone();
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;
        Ok(contact)
    }

    async fn delete(&self, id: ContactId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_contact", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("contact {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_by_owner(&self, owner: UserId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM contacts WHERE added_by = $1")
            .bind(Uuid::from(owner))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_contacts_by_owner", e))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ProfileStore for PostgresStore {
    async fn get_by_user(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, full_name, phone_number, user_position, created_at
            FROM user_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_profile", e))?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn insert(&self, profile: UserProfile) -> Result<UserProfile, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_profiles (id, user_id, full_name, phone_number, user_position, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::from(profile.id))
        .bind(Uuid::from(profile.user_id))
        .bind(&profile.full_name)
        .bind(&profile.phone_number)
        .bind(&profile.user_position)
        .bind(profile.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_profile", e))?;
        Ok(profile)
    }

    async fn delete_by_user(&self, user_id: UserId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM user_profiles WHERE user_id = $1")
            .bind(Uuid::from(user_id))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_profile", e))?;
        Ok(result.rows_affected())
    }
}

fn decode<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to decode column {column}: {e}")))
}

fn contact_from_row(row: &PgRow) -> Result<Contact, StoreError> {
    let id = ContactId::from_uuid(decode(row, "id")?);
    let contact_type: String = decode(row, "contact_type")?;
    let source_description: Option<String> = decode(row, "source_description")?;
    let meta_created_at: Option<DateTime<Utc>> = decode(row, "meta_created_at")?;

    let contact_meta = source_description.map(|source_description| ContactMeta {
        contact_id: id,
        source_description,
        created_at: meta_created_at.unwrap_or_else(Utc::now),
    });

    Ok(Contact {
        id,
        name: decode(row, "name")?,
        email: decode(row, "email")?,
        phone_number: decode(row, "phone_number")?,
        business_sector: decode(row, "business_sector")?,
        business_name: decode(row, "business_name")?,
        business_details: decode(row, "business_details")?,
        contact_type: contact_type.parse().unwrap_or(ContactType::Other),
        added_by: UserId::from_uuid(decode(row, "added_by")?),
        created_at: decode(row, "created_at")?,
        contact_meta,
    })
}

fn contact_with_uploader_from_row(row: &PgRow) -> Result<ContactWithUploader, StoreError> {
    Ok(ContactWithUploader {
        contact: contact_from_row(row)?,
        added_by_name: decode(row, "added_by_name")?,
        added_by_position: decode(row, "added_by_position")?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<UserProfile, StoreError> {
    Ok(UserProfile {
        id: ProfileId::from_uuid(decode(row, "id")?),
        user_id: UserId::from_uuid(decode(row, "user_id")?),
        full_name: decode(row, "full_name")?,
        phone_number: decode(row, "phone_number")?,
        user_position: decode(row, "user_position")?,
        created_at: decode(row, "created_at")?,
    })
}

/// Whether a database failure means the relation is absent.
pub(crate) fn is_missing_relation(code: Option<&str>, message: &str) -> bool {
    code == Some("42P01") || message.contains("does not exist")
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string());
            let msg = db_err.message().to_string();
            if is_missing_relation(code.as_deref(), &msg) {
                return StoreError::MissingRelation(msg);
            }
            match code.as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("42501") => StoreError::PermissionDenied(msg),
                _ => StoreError::Backend(format!("database error in {operation}: {msg}")),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("row not found in {operation}")),
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StoreError::Unavailable(format!("{operation}: {err}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_view_detection() {
        assert!(is_missing_relation(Some("42P01"), "whatever"));
        assert!(is_missing_relation(
            None,
            "relation \"contacts_with_user_info\" does not exist"
        ));
        assert!(!is_missing_relation(Some("42501"), "permission denied for table contacts"));
    }

    #[test]
    fn pool_errors_are_unavailable() {
        assert!(matches!(
            map_sqlx_error("list", sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error("get", sqlx::Error::RowNotFound),
            StoreError::NotFound(_)
        ));
    }
}
