use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use academia_core::{DomainError, DomainResult, Entity, SchoolId};

/// Lifecycle status of a school (tenant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchoolStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
}

impl SchoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchoolStatus::Active => "active",
            SchoolStatus::Inactive => "inactive",
            SchoolStatus::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SchoolStatus::Active),
            "inactive" => Some(SchoolStatus::Inactive),
            "suspended" => Some(SchoolStatus::Suspended),
            _ => None,
        }
    }
}

/// Tenant record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: SchoolId,
    pub name: String,
    pub code: String,
    pub status: SchoolStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl School {
    pub fn new(name: &str, code: &str, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = name.trim();
        let code = code.trim();
        if name.is_empty() {
            return Err(DomainError::validation("school name is required"));
        }
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(DomainError::validation(format!("invalid school code '{code}'")));
        }

        Ok(Self {
            id: SchoolId::new(),
            name: name.to_string(),
            code: code.to_uppercase(),
            status: SchoolStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.status = SchoolStatus::Inactive;
        self.updated_at = now;
    }
}

impl Entity for School {
    type Id = SchoolId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_uppercased() {
        let school = School::new("Green Valley", "gv-01", Utc::now()).unwrap();
        assert_eq!(school.code, "GV-01");
        assert_eq!(school.status, SchoolStatus::Active);
    }

    #[test]
    fn rejects_blank_name_and_bad_code() {
        assert!(School::new("  ", "GV", Utc::now()).is_err());
        assert!(School::new("Green Valley", "g v", Utc::now()).is_err());
    }
}
