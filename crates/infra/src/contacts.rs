//! Role-aware contact operations.
//!
//! Every call checks the caller's predicate first, then goes through the
//! [`OperationExecutor`].

use std::sync::Arc;

use chrono::Utc;

use contacthub_auth::{AuthzPredicate, Requirement, authorize};
use contacthub_core::{
    AppError, AppResult, Contact, ContactId, ContactMeta, ContactPatch, ContactWithUploader,
    NewContact, UserId,
};

use crate::operations::{OperationExecutor, OperationOptions};
use crate::store::ContactStore;

/// Who is acting.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: UserId,
    pub predicate: AuthzPredicate,
}

pub struct ContactService {
    store: Arc<dyn ContactStore>,
    executor: Arc<OperationExecutor>,
}

impl ContactService {
    pub fn new(store: Arc<dyn ContactStore>, executor: Arc<OperationExecutor>) -> Self {
        Self { store, executor }
    }

    /// Members see their own contacts; officers and VPs see everyone's.
    pub async fn list(&self, actor: &Actor) -> AppResult<Vec<ContactWithUploader>> {
        authorize(&actor.predicate, Requirement::Approved)?;
        let owner = (!actor.predicate.is_officer_or_vp()).then_some(actor.user_id);

        let options = OperationOptions::default().loading(Some("contacts"), "Loading contacts...");
        self.executor
            .execute("Fetch Contacts", &options, || self.store.list_with_uploader(owner))
            .await
    }

    pub async fn get(&self, actor: &Actor, id: ContactId) -> AppResult<Contact> {
        authorize(&actor.predicate, Requirement::Approved)?;

        let options = OperationOptions::default().loading(None, "Loading contact details...");
        let contact = self
            .executor
            .execute("Get Contact", &options, || self.store.get(id))
            .await?
            .ok_or_else(|| AppError::not_found(format!("contact {id} not found")))?;

        if !actor.predicate.is_officer_or_vp() && contact.added_by != actor.user_id {
            return Err(AppError::not_found(format!("contact {id} not found")));
        }
        Ok(contact)
    }

    /// Any approved user may add; the contact and its meta row are written together.
    pub async fn add(&self, actor: &Actor, input: NewContact) -> AppResult<Contact> {
        authorize(&actor.predicate, Requirement::Approved)?;
        input.validate()?;

        let now = Utc::now();
        let id = ContactId::new();
        let contact = Contact {
            id,
            name: input.name.trim().to_string(),
            email: input.email.trim().to_string(),
            phone_number: input.phone_number,
            business_sector: input.business_sector,
            business_name: input.business_name,
            business_details: input.business_details,
            contact_type: input.contact_type,
            added_by: actor.user_id,
            created_at: now,
            contact_meta: None,
        };
        let meta = ContactMeta {
            contact_id: id,
            source_description: input.source_description.trim().to_string(),
            created_at: now,
        };

        let options = OperationOptions::default()
            .loading(None, "Adding contact...")
            .on_success("Contact Added", "Contact has been successfully added to the database.");
        self.executor
            .execute("Add Contact", &options, || {
                self.store.insert(contact.clone(), meta.clone())
            })
            .await
    }

    pub async fn update(&self, actor: &Actor, id: ContactId, patch: ContactPatch) -> AppResult<Contact> {
        authorize(&actor.predicate, Requirement::EditContacts)?;
        if patch.is_empty() {
            return Err(AppError::validation("patch", "No fields to update"));
        }
        patch.validate()?;

        let options = OperationOptions::default()
            .loading(None, "Updating contact...")
            .on_success("Contact Updated", "Contact has been successfully updated.");
        self.executor
            .execute("Update Contact", &options, || self.store.update(id, &patch))
            .await
    }

    pub async fn delete(&self, actor: &Actor, id: ContactId) -> AppResult<()> {
        authorize(&actor.predicate, Requirement::DeleteContacts)?;

        let options = OperationOptions::default()
            .loading(None, "Deleting contact...")
            .on_success("Contact Deleted", "Contact has been successfully removed.");
        self.executor
            .execute("Delete Contact", &options, || self.store.delete(id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loading::LoadingTracker;
    use crate::notifications::NotificationLog;
    use crate::store::InMemoryStore;
    use contacthub_auth::{Role, UserMetadata};
    use contacthub_core::{ContactType, ErrorCode};

    fn actor(role: Role, approved: bool) -> Actor {
        Actor {
            user_id: UserId::new(),
            predicate: AuthzPredicate::from_metadata(Some(&UserMetadata::new(
                Some(role),
                Some(approved),
            ))),
        }
    }

    fn service() -> ContactService {
        let executor = OperationExecutor::new(LoadingTracker::new(), Arc::new(NotificationLog::new()));
        ContactService::new(Arc::new(InMemoryStore::new()), Arc::new(executor))
    }

    fn input(name: &str) -> NewContact {
        NewContact {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone_number: None,
            business_sector: Some("Education".to_string()),
            business_name: None,
            business_details: None,
            contact_type: ContactType::Mentor,
            source_description: "Introduced at alumni night".to_string(),
        }
    }

    #[tokio::test]
    async fn members_list_only_their_own() {
        let svc = service();
        let member = actor(Role::Member, true);
        let officer = actor(Role::Officer, true);

        svc.add(&member, input("Mine")).await.unwrap();
        svc.add(&officer, input("Theirs")).await.unwrap();

        let mine = svc.list(&member).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].contact.name, "Mine");
        assert_eq!(svc.list(&officer).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn add_requires_approval_and_valid_input() {
        let svc = service();
        // An assigned member role counts as approved even with the flag off.
        let err = svc.add(&actor(Role::Member, false), input("N")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let pending = Actor {
            user_id: UserId::new(),
            predicate: AuthzPredicate::from_metadata(Some(&UserMetadata::default())),
        };
        let err = svc.add(&pending, input("Nope")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthorizationError);
    }

    #[tokio::test]
    async fn update_and_delete_are_role_gated() {
        let svc = service();
        let member = actor(Role::Member, true);
        let officer = actor(Role::Officer, true);
        let vp = actor(Role::Vp, true);
        let created = svc.add(&member, input("Target")).await.unwrap();

        let patch = ContactPatch {
            business_name: Some("Acme".to_string()),
            ..ContactPatch::default()
        };
        let err = svc.update(&member, created.id, patch.clone()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthorizationError);
        assert_eq!(
            svc.update(&officer, created.id, patch).await.unwrap().business_name.as_deref(),
            Some("Acme")
        );

        let err = svc.delete(&officer, created.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthorizationError);
        svc.delete(&vp, created.id).await.unwrap();
        assert_eq!(svc.get(&vp, created.id).await.unwrap_err().code, ErrorCode::NotFound);
    }
}
