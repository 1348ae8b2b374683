//! Contact records and their input validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::id::{ContactId, UserId};

/// Kind of relationship a contact has with the organization.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactType {
    Alumni,
    Mentor,
    Other,
}

impl ContactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactType::Alumni => "Alumni",
            ContactType::Mentor => "Mentor",
            ContactType::Other => "Other",
        }
    }
}

impl Default for ContactType {
    fn default() -> Self {
        ContactType::Other
    }
}

impl core::str::FromStr for ContactType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Alumni" => Ok(ContactType::Alumni),
            "Mentor" => Ok(ContactType::Mentor),
            "Other" => Ok(ContactType::Other),
            other => Err(AppError::validation(
                "contact_type",
                format!("contact_type must be one of: Alumni, Mentor, Other (got '{other}')"),
            )),
        }
    }
}

/// Provenance note attached one-to-one to a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMeta {
    pub contact_id: ContactId,
    pub source_description: String,
    pub created_at: DateTime<Utc>,
}

/// A stored contact. Exactly one owner (`added_by`), at most one meta row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub business_sector: Option<String>,
    pub business_name: Option<String>,
    pub business_details: Option<String>,
    pub contact_type: ContactType,
    pub added_by: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_meta: Option<ContactMeta>,
}

/// Contact joined with the uploader's profile (the `contacts_with_user_info` shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactWithUploader {
    #[serde(flatten)]
    pub contact: Contact,
    pub added_by_name: Option<String>,
    pub added_by_position: Option<String>,
}

/// Input for creating a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub business_sector: Option<String>,
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub business_details: Option<String>,
    pub contact_type: ContactType,
    pub source_description: String,
}

/// Partial update of a contact. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub business_sector: Option<String>,
    pub business_name: Option<String>,
    pub business_details: Option<String>,
    pub contact_type: Option<ContactType>,
    pub source_description: Option<String>,
}

impl NewContact {
    /// Validate field presence, lengths and formats.
    pub fn validate(&self) -> AppResult<()> {
        check_len("name", &self.name, 2, 100)?;
        check_email(&self.email)?;
        if let Some(phone) = &self.phone_number {
            check_phone(phone)?;
        }
        check_optional_max("business_sector", &self.business_sector, 100)?;
        check_optional_max("business_name", &self.business_name, 200)?;
        check_optional_max("business_details", &self.business_details, 1000)?;
        check_len("source_description", &self.source_description, 10, 500)?;
        Ok(())
    }
}

impl ContactPatch {
    pub fn is_empty(&self) -> bool {
        self == &ContactPatch::default()
    }

    /// Validate only the fields being changed.
    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = &self.name {
            check_len("name", name, 2, 100)?;
        }
        if let Some(email) = &self.email {
            check_email(email)?;
        }
        if let Some(phone) = &self.phone_number {
            check_phone(phone)?;
        }
        check_optional_max("business_sector", &self.business_sector, 100)?;
        check_optional_max("business_name", &self.business_name, 200)?;
        check_optional_max("business_details", &self.business_details, 1000)?;
        if let Some(source) = &self.source_description {
            check_len("source_description", source, 10, 500)?;
        }
        Ok(())
    }

    /// Apply the patch to a contact in place (meta excluded).
    pub fn apply_to(&self, contact: &mut Contact) {
        if let Some(v) = &self.name {
            contact.name = v.trim().to_string();
        }
        if let Some(v) = &self.email {
            contact.email = v.trim().to_string();
        }
        if let Some(v) = &self.phone_number {
            contact.phone_number = Some(v.clone());
        }
        if let Some(v) = &self.business_sector {
            contact.business_sector = Some(v.clone());
        }
        if let Some(v) = &self.business_name {
            contact.business_name = Some(v.clone());
        }
        if let Some(v) = &self.business_details {
            contact.business_details = Some(v.clone());
        }
        if let Some(v) = self.contact_type {
            contact.contact_type = v;
        }
    }
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> AppResult<()> {
    let len = value.trim().chars().count();
    if len == 0 {
        return Err(AppError::validation(field, format!("{field} is required")));
    }
    if len < min {
        return Err(AppError::validation(
            field,
            format!("{field} must be at least {min} characters long"),
        ));
    }
    if len > max {
        return Err(AppError::validation(
            field,
            format!("{field} must be no more than {max} characters long"),
        ));
    }
    Ok(())
}

fn check_optional_max(field: &str, value: &Option<String>, max: usize) -> AppResult<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(AppError::validation(
            field,
            format!("{field} must be no more than {max} characters long"),
        )),
        _ => Ok(()),
    }
}

pub(crate) fn check_email(email: &str) -> AppResult<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AppError::validation("email", "email is required"));
    }
    if email.len() > 255 {
        return Err(AppError::validation(
            "email",
            "email must be no more than 255 characters long",
        ));
    }
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AppError::validation("email", "Please enter a valid email address"));
    }
    Ok(())
}

pub(crate) fn check_phone(phone: &str) -> AppResult<()> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Ok(());
    }
    if phone.len() > 20 {
        return Err(AppError::validation(
            "phone_number",
            "phone_number must be no more than 20 characters long",
        ));
    }
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'));
    if !allowed || digits < 7 {
        return Err(AppError::validation(
            "phone_number",
            "Please enter a valid phone number",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> NewContact {
        NewContact {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone_number: Some("+1 (555) 010-2000".to_string()),
            business_sector: None,
            business_name: Some("Analytical Engines".to_string()),
            business_details: None,
            contact_type: ContactType::Mentor,
            source_description: "Met at the spring networking night".to_string(),
        }
    }

    #[test]
    fn valid_contact_passes() {
        assert!(input().validate().is_ok());
    }

    #[test]
    fn short_source_description_rejected() {
        let mut c = input();
        c.source_description = "short".to_string();
        let err = c.validate().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("source_description"));
    }

    #[test]
    fn bad_email_rejected() {
        let mut c = input();
        c.email = "ada.example.com".to_string();
        assert_eq!(c.validate().unwrap_err().field.as_deref(), Some("email"));
    }

    #[test]
    fn bad_phone_rejected() {
        let mut c = input();
        c.phone_number = Some("call me".to_string());
        assert_eq!(c.validate().unwrap_err().field.as_deref(), Some("phone_number"));
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let mut contact = Contact {
            id: ContactId::new(),
            name: "Old".to_string(),
            email: "old@example.com".to_string(),
            phone_number: None,
            business_sector: None,
            business_name: None,
            business_details: None,
            contact_type: ContactType::Alumni,
            added_by: UserId::new(),
            created_at: Utc::now(),
            contact_meta: None,
        };
        let patch = ContactPatch {
            name: Some("New Name".to_string()),
            ..ContactPatch::default()
        };
        assert!(patch.validate().is_ok());
        patch.apply_to(&mut contact);
        assert_eq!(contact.name, "New Name");
        assert_eq!(contact.email, "old@example.com");
        assert_eq!(contact.contact_type, ContactType::Alumni);
    }

    #[test]
    fn contact_type_parses_exact_names() {
        assert_eq!("Mentor".parse::<ContactType>().unwrap(), ContactType::Mentor);
        assert!("mentor".parse::<ContactType>().is_err());
    }
}
