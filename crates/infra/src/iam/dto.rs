//! Request payloads for grant and role management.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

use academia_auth::resolve_expiry;
use academia_core::UserId;

/// Create a delegated account or delegated school admin.
///
/// Either `user_id` links an existing user, or the email is looked up and,
/// when unknown, a password-less user is created from the name fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGrantRequest {
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub permissions: Vec<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    /// Legacy single-instant expiry, used when `end_date` is absent.
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateGrantRequest {
    pub fn has_names(&self) -> bool {
        self.first_name.as_deref().is_some_and(|n| !n.trim().is_empty())
            || self.last_name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }

    pub fn resolved_expiry(&self) -> Option<DateTime<Utc>> {
        resolve_expiry(self.end_date, self.end_time, self.expiry_date)
    }
}

/// Partial update; absent fields are left unchanged.
///
/// Sending any of the window fields replaces the whole window.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGrantRequest {
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl UpdateGrantRequest {
    pub fn touches_window(&self) -> bool {
        self.start_date.is_some() || self.end_date.is_some() || self.expiry_date.is_some()
    }

    pub fn resolved_expiry(&self) -> Option<DateTime<Utc>> {
        resolve_expiry(self.end_date, self.end_time, self.expiry_date)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}
