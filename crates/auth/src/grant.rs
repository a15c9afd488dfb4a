//! Delegated permission grants.
//!
//! Two kinds share one model: a global delegated account (cross-tenant,
//! granted by a super-admin) and a delegated school admin (scoped to one
//! school). Both go through the same effective-status algorithm.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use academia_core::{DomainError, DomainResult, Entity, GrantId, SchoolId, UserId};

use crate::permissions::any_matches;
use crate::Permission;

/// Lifecycle status of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    Active,
    /// Not started yet (start date in the future).
    Inactive,
    /// Manually paused; reversible through unsuspend.
    Suspended,
    /// Expiry date passed. Sticky.
    Expired,
    /// Terminal.
    Revoked,
}

impl GrantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantStatus::Active => "active",
            GrantStatus::Inactive => "inactive",
            GrantStatus::Suspended => "suspended",
            GrantStatus::Expired => "expired",
            GrantStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(GrantStatus::Active),
            "inactive" => Some(GrantStatus::Inactive),
            "suspended" => Some(GrantStatus::Suspended),
            "expired" => Some(GrantStatus::Expired),
            "revoked" => Some(GrantStatus::Revoked),
            _ => None,
        }
    }
}

impl core::fmt::Display for GrantStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a grant applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "schoolId", rename_all = "snake_case")]
pub enum GrantScope {
    /// Delegated account: cross-tenant, super-admin capabilities subset.
    Global,
    /// Delegated school admin: single tenant.
    School(SchoolId),
}

impl GrantScope {
    pub fn school_id(&self) -> Option<SchoolId> {
        match self {
            GrantScope::Global => None,
            GrantScope::School(id) => Some(*id),
        }
    }
}

/// What the caller is doing while status is being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvaluation {
    /// Plain read / permission check.
    Read,
    /// Lifting a manual suspension.
    Unsuspend,
}

/// Compute the authorization-relevant status of a grant.
///
/// Rules, first match wins:
/// 1. a stored `suspended` stays suspended unless the caller is unsuspending;
/// 2. stored `revoked` and `expired` are sticky;
/// 3. a start date in the future yields `inactive`;
/// 4. an expiry date at or before `now` yields `expired`;
/// 5. otherwise `active`.
pub fn effective_status(
    stored: GrantStatus,
    start_date: Option<DateTime<Utc>>,
    expiry_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    evaluation: StatusEvaluation,
) -> GrantStatus {
    if stored == GrantStatus::Suspended && evaluation != StatusEvaluation::Unsuspend {
        return GrantStatus::Suspended;
    }
    if matches!(stored, GrantStatus::Revoked | GrantStatus::Expired) {
        return stored;
    }
    if start_date.is_some_and(|start| start > now) {
        return GrantStatus::Inactive;
    }
    if expiry_date.is_some_and(|expiry| expiry <= now) {
        return GrantStatus::Expired;
    }
    GrantStatus::Active
}

/// Resolve a grant's expiry instant from the request fields.
///
/// `end_date` (+ optional `end_time`, default end of day) wins over the legacy
/// `expiry_date`; when neither is given the grant never expires.
pub fn resolve_expiry(
    end_date: Option<NaiveDate>,
    end_time: Option<NaiveTime>,
    legacy_expiry: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match end_date {
        Some(date) => {
            let time = end_time.unwrap_or_else(end_of_day);
            Some(date.and_time(time).and_utc())
        }
        None => legacy_expiry,
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

/// A time-bounded, permission-string-based grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedGrant {
    pub id: GrantId,
    pub scope: GrantScope,
    pub user_id: UserId,
    /// Copy of the owning user's email at grant time (match key).
    pub email: String,
    pub permissions: Vec<Permission>,
    pub start_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub status: GrantStatus,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub suspended_by: Option<UserId>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<UserId>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Fields needed to create a grant; permissions are assumed catalog-checked.
#[derive(Debug, Clone)]
pub struct NewGrant {
    pub scope: GrantScope,
    pub user_id: UserId,
    pub email: String,
    pub permissions: Vec<Permission>,
    pub start_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: UserId,
}

fn validate_window(start: Option<DateTime<Utc>>, expiry: Option<DateTime<Utc>>) -> DomainResult<()> {
    if let (Some(start), Some(expiry)) = (start, expiry) {
        if expiry <= start {
            return Err(DomainError::validation("expiry date must be after start date"));
        }
    }
    Ok(())
}

impl DelegatedGrant {
    pub fn new(new: NewGrant, now: DateTime<Utc>) -> DomainResult<Self> {
        if new.permissions.is_empty() {
            return Err(DomainError::validation("at least one permission is required"));
        }
        validate_window(new.start_date, new.expiry_date)?;

        let status = effective_status(
            GrantStatus::Active,
            new.start_date,
            new.expiry_date,
            now,
            StatusEvaluation::Read,
        );

        Ok(Self {
            id: GrantId::new(),
            scope: new.scope,
            user_id: new.user_id,
            email: crate::user::normalize_email(&new.email),
            permissions: new.permissions,
            start_date: new.start_date,
            expiry_date: new.expiry_date,
            status,
            notes: new.notes,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
            suspended_by: None,
            suspended_at: None,
            revoked_by: None,
            revoked_at: None,
        })
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> GrantStatus {
        effective_status(self.status, self.start_date, self.expiry_date, now, StatusEvaluation::Read)
    }

    /// Align the stored status with the effective one. Returns `true` when it changed.
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> bool {
        let effective = self.effective_status(now);
        if effective == self.status {
            return false;
        }
        self.status = effective;
        self.updated_at = now;
        true
    }

    /// Whether the grant is effectively active and covers `required`.
    pub fn allows(&self, required: &str, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == GrantStatus::Active
            && any_matches(self.permissions.iter().map(Permission::as_str), required)
    }

    pub fn set_permissions(&mut self, permissions: Vec<Permission>, now: DateTime<Utc>) -> DomainResult<()> {
        if permissions.is_empty() {
            return Err(DomainError::validation("at least one permission is required"));
        }
        self.ensure_mutable()?;
        self.permissions = permissions;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_window(
        &mut self,
        start_date: Option<DateTime<Utc>>,
        expiry_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_mutable()?;
        validate_window(start_date, expiry_date)?;
        self.start_date = start_date;
        self.expiry_date = expiry_date;
        if self.status == GrantStatus::Expired {
            // Extending an expired grant is an explicit lifecycle transition.
            self.status = GrantStatus::Active;
        }
        self.updated_at = now;
        self.reconcile(now);
        Ok(())
    }

    pub fn suspend(&mut self, by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        match self.status {
            GrantStatus::Revoked | GrantStatus::Expired => Err(DomainError::invariant(format!(
                "cannot suspend a {} grant",
                self.status
            ))),
            GrantStatus::Suspended => Err(DomainError::invariant("grant is already suspended")),
            GrantStatus::Active | GrantStatus::Inactive => {
                self.status = GrantStatus::Suspended;
                self.suspended_by = Some(by);
                self.suspended_at = Some(now);
                self.updated_at = now;
                Ok(())
            }
        }
    }

    /// Lift a manual suspension; only suspended grants qualify.
    pub fn unsuspend(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != GrantStatus::Suspended {
            return Err(DomainError::invariant(format!(
                "only suspended grants can be unsuspended (status is {})",
                self.status
            )));
        }
        self.status = effective_status(
            self.status,
            self.start_date,
            self.expiry_date,
            now,
            StatusEvaluation::Unsuspend,
        );
        self.suspended_by = None;
        self.suspended_at = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn revoke(&mut self, by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status == GrantStatus::Revoked {
            return Err(DomainError::invariant("grant is already revoked"));
        }
        self.status = GrantStatus::Revoked;
        self.revoked_by = Some(by);
        self.revoked_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    fn ensure_mutable(&self) -> DomainResult<()> {
        if self.status == GrantStatus::Revoked {
            return Err(DomainError::invariant("revoked grants cannot be modified"));
        }
        Ok(())
    }
}

impl Entity for DelegatedGrant {
    type Id = GrantId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn grant(start: Option<DateTime<Utc>>, expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DelegatedGrant {
        DelegatedGrant::new(
            NewGrant {
                scope: GrantScope::Global,
                user_id: UserId::new(),
                email: "Delegate@Example.com".into(),
                permissions: vec![Permission::from("schools:read")],
                start_date: start,
                expiry_date: expiry,
                notes: None,
                created_by: UserId::new(),
            },
            now,
        )
        .unwrap()
    }

    #[test]
    fn new_grant_without_dates_is_active() {
        let now = Utc::now();
        let g = grant(None, None, now);
        assert_eq!(g.status, GrantStatus::Active);
        assert_eq!(g.email, "delegate@example.com");
        assert!(g.allows("schools:read", now));
        assert!(!g.allows("schools:delete", now));
    }

    #[test]
    fn grants_serialize_with_camel_case_keys() {
        let now = Utc::now();
        let mut g = grant(None, Some(now + Duration::days(3)), now);
        let school = SchoolId::new();
        g.scope = GrantScope::School(school);

        let json = serde_json::to_value(&g).unwrap();
        assert_eq!(json["scope"]["kind"], "school");
        assert_eq!(json["scope"]["schoolId"], school.to_string());
        assert!(json.get("userId").is_some());
        assert!(json.get("expiryDate").is_some());
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn future_start_is_inactive_then_active() {
        let now = Utc::now();
        let g = grant(Some(now + Duration::days(30)), None, now);
        assert_eq!(g.status, GrantStatus::Inactive);
        assert!(!g.allows("schools:read", now));
        assert_eq!(g.effective_status(now + Duration::days(31)), GrantStatus::Active);
    }

    #[test]
    fn past_expiry_expires_and_sticks() {
        let now = Utc::now();
        let mut g = grant(None, Some(now + Duration::hours(1)), now);
        let later = now + Duration::hours(2);
        assert!(g.reconcile(later));
        assert_eq!(g.status, GrantStatus::Expired);
        assert!(!g.reconcile(later + Duration::days(1)));
    }

    #[test]
    fn window_must_be_ordered() {
        let now = Utc::now();
        let result = DelegatedGrant::new(
            NewGrant {
                scope: GrantScope::Global,
                user_id: UserId::new(),
                email: "d@example.com".into(),
                permissions: vec![Permission::from("schools:read")],
                start_date: Some(now + Duration::days(2)),
                expiry_date: Some(now + Duration::days(1)),
                notes: None,
                created_by: UserId::new(),
            },
            now,
        );
        assert!(result.is_err());
    }

    #[test]
    fn suspend_unsuspend_cycle() {
        let now = Utc::now();
        let admin = UserId::new();
        let mut g = grant(None, None, now);
        g.suspend(admin, now).unwrap();
        assert_eq!(g.effective_status(now), GrantStatus::Suspended);
        assert!(!g.allows("schools:read", now));
        g.unsuspend(now).unwrap();
        assert_eq!(g.status, GrantStatus::Active);
        assert_eq!(g.suspended_by, None);
    }

    #[test]
    fn unsuspend_past_expiry_lands_on_expired() {
        let now = Utc::now();
        let mut g = grant(None, Some(now + Duration::hours(1)), now);
        g.suspend(UserId::new(), now).unwrap();
        g.unsuspend(now + Duration::hours(2)).unwrap();
        assert_eq!(g.status, GrantStatus::Expired);
    }

    #[test]
    fn revoked_cannot_be_unsuspended_or_suspended() {
        let now = Utc::now();
        let mut g = grant(None, None, now);
        g.revoke(UserId::new(), now).unwrap();
        assert!(g.unsuspend(now).is_err());
        assert!(g.suspend(UserId::new(), now).is_err());
        assert!(g.set_permissions(vec![Permission::from("*")], now).is_err());
        assert_eq!(g.status, GrantStatus::Revoked);
    }

    #[test]
    fn extending_an_expired_grant_reactivates_it() {
        let now = Utc::now();
        let mut g = grant(None, Some(now + Duration::hours(1)), now);
        let later = now + Duration::hours(2);
        g.reconcile(later);
        g.set_window(None, Some(later + Duration::days(1)), later).unwrap();
        assert_eq!(g.status, GrantStatus::Active);
    }

    #[test]
    fn resolve_expiry_precedence() {
        let date = NaiveDate::from_ymd_opt(2030, 1, 31).unwrap();
        let time = NaiveTime::from_hms_opt(8, 30, 0).unwrap();
        let legacy = Utc::now();

        assert_eq!(
            resolve_expiry(Some(date), Some(time), Some(legacy)),
            Some(date.and_time(time).and_utc())
        );
        assert_eq!(
            resolve_expiry(Some(date), None, None),
            Some(date.and_hms_opt(23, 59, 59).unwrap().and_utc())
        );
        assert_eq!(resolve_expiry(None, Some(time), Some(legacy)), Some(legacy));
        assert_eq!(resolve_expiry(None, None, None), None);
    }

    fn any_status() -> impl Strategy<Value = GrantStatus> {
        prop_oneof![
            Just(GrantStatus::Active),
            Just(GrantStatus::Inactive),
            Just(GrantStatus::Suspended),
            Just(GrantStatus::Expired),
            Just(GrantStatus::Revoked),
        ]
    }

    fn offset() -> impl Strategy<Value = Option<i64>> {
        prop::option::of(-100_000i64..100_000i64)
    }

    proptest! {
        #[test]
        fn sticky_states_survive_any_dates(
            stored in prop_oneof![Just(GrantStatus::Revoked), Just(GrantStatus::Expired)],
            start in offset(),
            expiry in offset(),
        ) {
            let now = Utc::now();
            let start = start.map(|s| now + Duration::minutes(s));
            let expiry = expiry.map(|e| now + Duration::minutes(e));
            prop_assert_eq!(effective_status(stored, start, expiry, now, StatusEvaluation::Read), stored);
        }

        #[test]
        fn suspension_survives_reads(start in offset(), expiry in offset()) {
            let now = Utc::now();
            let start = start.map(|s| now + Duration::minutes(s));
            let expiry = expiry.map(|e| now + Duration::minutes(e));
            prop_assert_eq!(
                effective_status(GrantStatus::Suspended, start, expiry, now, StatusEvaluation::Read),
                GrantStatus::Suspended
            );
        }

        #[test]
        fn no_expiry_never_expires(stored in any_status(), days_ahead in 0i64..100_000i64) {
            prop_assume!(!matches!(stored, GrantStatus::Expired));
            let now = Utc::now() + Duration::days(days_ahead);
            let status = effective_status(stored, None, None, now, StatusEvaluation::Read);
            prop_assert_ne!(status, GrantStatus::Expired);
        }
    }
}
