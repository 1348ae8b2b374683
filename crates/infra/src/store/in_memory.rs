use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;

use contacthub_core::{
    Contact, ContactId, ContactMeta, ContactPatch, ContactWithUploader, UserId, UserProfile,
};

use super::{ContactStore, ProfileStore, StoreError};

/// Store operations, used to inject failures and to inspect call order in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListContacts,
    GetContact,
    InsertContact,
    UpdateContact,
    DeleteContact,
    DeleteContactsByOwner,
    GetProfile,
    InsertProfile,
    DeleteProfile,
}

#[derive(Debug, Default)]
struct Tables {
    contacts: HashMap<ContactId, Contact>,
    profiles: HashMap<UserId, UserProfile>,
}

/// In-memory `contacts` / `contact_meta` / `user_profiles` for tests and dev.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    failing: Mutex<HashSet<StoreOp>>,
    calls: Mutex<Vec<StoreOp>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of `op` fail with [`StoreError::Unavailable`].
    pub fn fail_on(&self, op: StoreOp) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(op);
        }
    }

    pub fn recover(&self, op: StoreOp) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.remove(&op);
        }
    }

    pub fn calls(&self) -> Vec<StoreOp> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn contact_count(&self) -> usize {
        self.tables.read().map(|t| t.contacts.len()).unwrap_or(0)
    }

    fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(op);
        }
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(&op))
            .unwrap_or(false);
        if failing {
            return Err(StoreError::Unavailable(format!("injected failure for {op:?}")));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ContactStore for InMemoryStore {
    async fn list_with_uploader(
        &self,
        owner: Option<UserId>,
    ) -> Result<Vec<ContactWithUploader>, StoreError> {
        self.enter(StoreOp::ListContacts)?;
        let tables = self.read()?;

        let mut rows: Vec<ContactWithUploader> = tables
            .contacts
            .values()
            .filter(|c| owner.is_none_or(|o| c.added_by == o))
            .map(|c| {
                let uploader = tables.profiles.get(&c.added_by);
                ContactWithUploader {
                    contact: c.clone(),
                    added_by_name: uploader.map(|p| p.full_name.clone()),
                    added_by_position: uploader.map(|p| p.user_position.clone()),
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            b.contact
                .created_at
                .cmp(&a.contact.created_at)
                .then_with(|| b.contact.id.cmp(&a.contact.id))
        });
        Ok(rows)
    }

    async fn get(&self, id: ContactId) -> Result<Option<Contact>, StoreError> {
        self.enter(StoreOp::GetContact)?;
        Ok(self.read()?.contacts.get(&id).cloned())
    }

    async fn insert(&self, mut contact: Contact, meta: ContactMeta) -> Result<Contact, StoreError> {
        self.enter(StoreOp::InsertContact)?;
        let mut tables = self.write()?;
        if tables.contacts.contains_key(&contact.id) {
            return Err(StoreError::Conflict(
                "duplicate key value violates unique constraint \"contacts_pkey\"".to_string(),
            ));
        }
        contact.contact_meta = Some(meta);
        tables.contacts.insert(contact.id, contact.clone());
        Ok(contact)
    }

    async fn update(&self, id: ContactId, patch: &ContactPatch) -> Result<Contact, StoreError> {
        self.enter(StoreOp::UpdateContact)?;
        let mut tables = self.write()?;
        let contact = tables
            .contacts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("contact {id}")))?;

        patch.apply_to(contact);
        if let (Some(source), Some(meta)) = (&patch.source_description, contact.contact_meta.as_mut()) {
            meta.source_description = source.clone();
        }
        Ok(contact.clone())
    }

    async fn delete(&self, id: ContactId) -> Result<(), StoreError> {
        self.enter(StoreOp::DeleteContact)?;
        self.write()?
            .contacts
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("contact {id}")))
    }

    async fn delete_by_owner(&self, owner: UserId) -> Result<u64, StoreError> {
        self.enter(StoreOp::DeleteContactsByOwner)?;
        let mut tables = self.write()?;
        let before = tables.contacts.len();
        tables.contacts.retain(|_, c| c.added_by != owner);
        Ok((before - tables.contacts.len()) as u64)
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn get_by_user(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        self.enter(StoreOp::GetProfile)?;
        Ok(self.read()?.profiles.get(&user_id).cloned())
    }

    async fn insert(&self, profile: UserProfile) -> Result<UserProfile, StoreError> {
        self.enter(StoreOp::InsertProfile)?;
        let mut tables = self.write()?;
        if tables.profiles.contains_key(&profile.user_id) {
            return Err(StoreError::Conflict(
                "duplicate key value violates unique constraint \"user_profiles_user_id_key\""
                    .to_string(),
            ));
        }
        tables.profiles.insert(profile.user_id, profile.clone());
        Ok(profile)
    }

    async fn delete_by_user(&self, user_id: UserId) -> Result<u64, StoreError> {
        self.enter(StoreOp::DeleteProfile)?;
        Ok(self.write()?.profiles.remove(&user_id).map_or(0, |_| 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use contacthub_core::{ContactType, NewUserProfile};

    fn contact(owner: UserId, name: &str, age_minutes: i64) -> (Contact, ContactMeta) {
        let id = ContactId::new();
        let created_at = Utc::now() - Duration::minutes(age_minutes);
        (
            Contact {
                id,
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
                phone_number: None,
                business_sector: None,
                business_name: None,
                business_details: None,
                contact_type: ContactType::Alumni,
                added_by: owner,
                created_at,
                contact_meta: None,
            },
            ContactMeta {
                contact_id: id,
                source_description: "Met at the spring mixer".to_string(),
                created_at,
            },
        )
    }

    #[tokio::test]
    async fn list_filters_by_owner_newest_first_with_uploader() {
        let store = InMemoryStore::new();
        let alice = UserId::new();
        let bob = UserId::new();

        ProfileStore::insert(
            &store,
            NewUserProfile {
                user_id: alice,
                full_name: "Alice Smith".to_string(),
                phone_number: "+1 555 0100".to_string(),
                user_position: Some("Officer".to_string()),
            }
            .into_profile(Utc::now()),
        )
        .await
        .unwrap();

        for (owner, name, age) in [(alice, "Old", 30), (alice, "New", 1), (bob, "Other", 5)] {
            let (c, m) = contact(owner, name, age);
            ContactStore::insert(&store, c, m).await.unwrap();
        }

        let all = store.list_with_uploader(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].contact.name, "New");

        let mine = store.list_with_uploader(Some(alice)).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[1].contact.name, "Old");
        assert_eq!(mine[0].added_by_name.as_deref(), Some("Alice Smith"));
        assert_eq!(mine[0].added_by_position.as_deref(), Some("Officer"));
    }

    #[tokio::test]
    async fn update_touches_meta_when_source_given() {
        let store = InMemoryStore::new();
        let (c, m) = contact(UserId::new(), "Ada", 0);
        let id = c.id;
        ContactStore::insert(&store, c, m).await.unwrap();

        let patch = ContactPatch {
            business_name: Some("Analytical Engines".to_string()),
            source_description: Some("Referred by a board member".to_string()),
            ..ContactPatch::default()
        };
        let updated = store.update(id, &patch).await.unwrap();
        assert_eq!(updated.business_name.as_deref(), Some("Analytical Engines"));
        assert_eq!(
            updated.contact_meta.unwrap().source_description,
            "Referred by a board member"
        );
        assert_eq!(updated.name, "Ada");
    }

    #[tokio::test]
    async fn injected_failure_is_reported_and_recorded() {
        let store = InMemoryStore::new();
        store.fail_on(StoreOp::DeleteContactsByOwner);

        let err = store.delete_by_owner(UserId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.calls(), vec![StoreOp::DeleteContactsByOwner]);

        store.recover(StoreOp::DeleteContactsByOwner);
        assert_eq!(store.delete_by_owner(UserId::new()).await.unwrap(), 0);
    }
}
