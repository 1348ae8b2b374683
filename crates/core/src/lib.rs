//! `contacthub-core`: shared domain building blocks.
//!
//! Identifiers, the error taxonomy, and the contact/profile records.
//! No IO lives here.

pub mod contact;
pub mod error;
pub mod id;
pub mod profile;

pub use contact::{Contact, ContactMeta, ContactPatch, ContactType, ContactWithUploader, NewContact};
pub use error::{AppError, AppResult, ErrorCode, readable_message};
pub use id::{ContactId, ProfileId, UserId};
pub use profile::{NewUserProfile, UserProfile};
