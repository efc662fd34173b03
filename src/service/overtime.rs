use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::model::{
    overtime::{NewOvertimeRequest, OvertimeRequest, OvertimeStatus},
    role::Role,
};
use crate::service::{
    error::ServiceError,
    ports::{Clock, EmployeeLookup, ManagerAssignments, OvertimeStore, RoleLookup, StoreError},
    reconcile::minutes_to_hours,
};

pub const AUTO_APPROVED_REMARK: &str = "Auto-approved by HRD Manager";
pub const AUTO_PROCESSED_REMARK: &str = "Auto-processed by HRD Manager";

/// Everything the workflow needs to know about who is acting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorProfile {
    pub actor_id: u64,
    pub roles: BTreeSet<Role>,
    pub managed_departments: BTreeSet<String>,
    /// Department of the employee record linked to the actor's account.
    pub department: Option<String>,
}

impl ActorProfile {
    pub fn has(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub async fn resolve(
        actor_id: u64,
        roles: &dyn RoleLookup,
        employees: &dyn EmployeeLookup,
    ) -> Result<Self, StoreError> {
        let mut held = BTreeSet::new();
        for role in [
            Role::Superadmin,
            Role::HrdManager,
            Role::HrdTimekeeper,
            Role::DepartmentManager,
        ] {
            if roles.has_role(actor_id, role).await? {
                held.insert(role);
            }
        }
        if held.is_empty() {
            held.insert(Role::Regular);
        }

        let managed_departments = if held.contains(&Role::DepartmentManager) {
            roles.managed_departments(actor_id).await?
        } else {
            BTreeSet::new()
        };
        let department = employees
            .resolve_by_user(actor_id)
            .await?
            .and_then(|e| e.department);

        Ok(Self {
            actor_id,
            roles: held,
            managed_departments,
            department,
        })
    }
}

/// The capacity in which an actor is allowed to perform a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Superadmin,
    DepartmentManager,
    HrdManager,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("remarks are required when rejecting an overtime request")]
    RemarksRequired,

    #[error("{0}")]
    Denied(String),
}

impl From<TransitionError> for ServiceError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::RemarksRequired => ServiceError::Validation(e.to_string()),
            TransitionError::Denied(msg) => ServiceError::Authorization(msg),
        }
    }
}

/// Rejection needs a reason; approval remarks are optional. Blank counts as absent.
pub fn normalize_remarks(
    target: OvertimeStatus,
    remarks: Option<&str>,
) -> Result<Option<String>, TransitionError> {
    let remarks = remarks
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    if target == OvertimeStatus::Rejected && remarks.is_none() {
        return Err(TransitionError::RemarksRequired);
    }
    Ok(remarks)
}

/// Decides whether `actor` may move `request` to `target`. Pure; no side effects.
pub fn authorize(
    actor: &ActorProfile,
    request: &OvertimeRequest,
    target: OvertimeStatus,
) -> Result<Authority, TransitionError> {
    if target == OvertimeStatus::Pending {
        return Err(TransitionError::Denied(
            "an overtime request cannot be moved back to pending".to_string(),
        ));
    }
    if request.status.is_terminal() {
        return Err(TransitionError::Denied(format!(
            "overtime request {} is already {}",
            request.id, request.status
        )));
    }

    if actor.has(Role::Superadmin) {
        if target == OvertimeStatus::ManagerApproved && request.status != OvertimeStatus::Pending {
            return Err(TransitionError::Denied(format!(
                "overtime request {} already passed department approval",
                request.id
            )));
        }
        return Ok(Authority::Superadmin);
    }

    if actor.has(Role::DepartmentManager)
        && request.status == OvertimeStatus::Pending
        && matches!(
            target,
            OvertimeStatus::ManagerApproved | OvertimeStatus::Rejected
        )
    {
        let assigned = request.dept_manager_id == Some(actor.actor_id);
        let manages_department = request
            .employee_department
            .as_ref()
            .is_some_and(|d| actor.managed_departments.contains(d));
        if assigned || manages_department {
            return Ok(Authority::DepartmentManager);
        }
        return Err(TransitionError::Denied(format!(
            "you are not a department approver for overtime request {}",
            request.id
        )));
    }

    if actor.has(Role::HrdManager)
        && request.status == OvertimeStatus::ManagerApproved
        && matches!(target, OvertimeStatus::Approved | OvertimeStatus::Rejected)
    {
        return Ok(Authority::HrdManager);
    }

    Err(TransitionError::Denied(format!(
        "you cannot move overtime request {} from {} to {}",
        request.id, request.status, target
    )))
}

fn stamp_department(
    request: &mut OvertimeRequest,
    actor_id: u64,
    now: DateTime<Utc>,
    remarks: Option<String>,
) {
    request.dept_approved_by = Some(actor_id);
    request.dept_approved_at = Some(now);
    request.dept_remarks = remarks;
}

fn stamp_hrd(
    request: &mut OvertimeRequest,
    actor_id: u64,
    now: DateTime<Utc>,
    remarks: Option<String>,
    placeholder: &str,
) {
    if request.dept_approved_by.is_none() {
        stamp_department(request, actor_id, now, Some(placeholder.to_string()));
    }
    request.hrd_approved_by = Some(actor_id);
    request.hrd_approved_at = Some(now);
    request.hrd_remarks = remarks;
}

/// Applies an authorized transition and its audit stamps.
pub fn apply(
    mut request: OvertimeRequest,
    authority: Authority,
    target: OvertimeStatus,
    actor_id: u64,
    remarks: Option<String>,
    now: DateTime<Utc>,
) -> OvertimeRequest {
    match target {
        OvertimeStatus::ManagerApproved => stamp_department(&mut request, actor_id, now, remarks),
        OvertimeStatus::Approved => {
            stamp_hrd(&mut request, actor_id, now, remarks, AUTO_APPROVED_REMARK)
        }
        OvertimeStatus::Rejected => {
            let department_level = authority == Authority::DepartmentManager
                || (authority == Authority::Superadmin
                    && request.status == OvertimeStatus::Pending);
            if department_level {
                stamp_department(&mut request, actor_id, now, remarks);
            } else {
                stamp_hrd(&mut request, actor_id, now, remarks, AUTO_PROCESSED_REMARK);
            }
        }
        OvertimeStatus::Pending => {}
    }
    request.status = target;
    request
}

/// Which overtime requests an actor may read. Conditions are OR-ed together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityScope {
    pub actor_id: u64,
    pub all: bool,
    pub include_manager_approved: bool,
    pub include_assigned: bool,
    pub departments: BTreeSet<String>,
}

impl VisibilityScope {
    pub fn for_actor(actor: &ActorProfile) -> Self {
        let mut scope = VisibilityScope {
            actor_id: actor.actor_id,
            ..Default::default()
        };
        if actor.has(Role::Superadmin) || actor.has(Role::HrdManager) {
            scope.all = true;
            return scope;
        }
        if actor.has(Role::HrdTimekeeper) {
            scope.include_manager_approved = true;
        }
        if actor.has(Role::DepartmentManager) {
            scope.include_assigned = true;
            scope.departments = actor.managed_departments.clone();
        }
        if !actor.has(Role::HrdTimekeeper) && !actor.has(Role::DepartmentManager) {
            scope.departments.extend(actor.department.clone());
        }
        scope
    }

    pub fn admits(&self, request: &OvertimeRequest) -> bool {
        self.all
            || request.created_by == self.actor_id
            || (self.include_manager_approved && request.status == OvertimeStatus::ManagerApproved)
            || (self.include_assigned && request.dept_manager_id == Some(self.actor_id))
            || request
                .employee_department
                .as_ref()
                .is_some_and(|d| self.departments.contains(d))
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateOvertime {
    #[schema(example = 12)]
    pub employee_id: u64,
    #[schema(example = "2026-01-05", value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(example = "17:00:00", value_type = String)]
    pub start_time: NaiveTime,
    #[schema(example = "20:00:00", value_type = String)]
    pub end_time: NaiveTime,
    #[schema(example = "1.25", value_type = Option<String>)]
    pub rate_multiplier: Option<Decimal>,
    #[schema(example = "Quarter-end closing")]
    pub reason: String,
    /// Defaults to the first manager assigned to the employee's department.
    pub dept_manager_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct BulkFailure {
    pub id: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct BulkTransitionSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub failures: Vec<BulkFailure>,
}

pub struct OvertimeWorkflow<'a> {
    store: &'a dyn OvertimeStore,
    roles: &'a dyn RoleLookup,
    employees: &'a dyn EmployeeLookup,
    managers: &'a dyn ManagerAssignments,
    clock: &'a dyn Clock,
    default_rate: Decimal,
}

impl<'a> OvertimeWorkflow<'a> {
    pub fn new(
        store: &'a dyn OvertimeStore,
        roles: &'a dyn RoleLookup,
        employees: &'a dyn EmployeeLookup,
        managers: &'a dyn ManagerAssignments,
        clock: &'a dyn Clock,
        default_rate: Decimal,
    ) -> Self {
        Self {
            store,
            roles,
            employees,
            managers,
            clock,
            default_rate,
        }
    }

    async fn actor(&self, actor_id: u64) -> Result<ActorProfile, ServiceError> {
        Ok(ActorProfile::resolve(actor_id, self.roles, self.employees).await?)
    }

    pub async fn create(
        &self,
        actor_id: u64,
        input: CreateOvertime,
    ) -> Result<OvertimeRequest, ServiceError> {
        let reason = input.reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::Validation("reason is required".to_string()));
        }
        if input.start_time == input.end_time {
            return Err(ServiceError::Validation(
                "start_time and end_time must differ".to_string(),
            ));
        }
        let rate_multiplier = input.rate_multiplier.unwrap_or(self.default_rate);
        if rate_multiplier <= Decimal::ZERO {
            return Err(ServiceError::Validation(
                "rate_multiplier must be positive".to_string(),
            ));
        }

        let employee = self
            .employees
            .resolve_by_internal_id(input.employee_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("employee {}", input.employee_id)))?;

        let mut span = input.end_time - input.start_time;
        if span < Duration::zero() {
            // ends after midnight
            span += Duration::hours(24);
        }

        let dept_manager_id = match (input.dept_manager_id, employee.department.as_deref()) {
            (Some(id), _) => Some(id),
            (None, Some(department)) => self.managers.managers_of(department).await?.first().copied(),
            (None, None) => None,
        };

        let created = self
            .store
            .insert_overtime(&NewOvertimeRequest {
                employee_id: employee.id,
                date: input.date,
                start_time: input.start_time,
                end_time: input.end_time,
                total_hours: minutes_to_hours(span.num_minutes()),
                rate_multiplier,
                reason: reason.to_string(),
                created_by: actor_id,
                dept_manager_id,
            })
            .await?;

        info!(request_id = created.id, employee_id = created.employee_id, actor_id, "Overtime request created");
        Ok(created)
    }

    pub async fn transition(
        &self,
        request_id: u64,
        actor_id: u64,
        target: OvertimeStatus,
        remarks: Option<&str>,
    ) -> Result<OvertimeRequest, ServiceError> {
        let actor = self.actor(actor_id).await?;
        self.transition_as(&actor, request_id, target, remarks).await
    }

    async fn transition_as(
        &self,
        actor: &ActorProfile,
        request_id: u64,
        target: OvertimeStatus,
        remarks: Option<&str>,
    ) -> Result<OvertimeRequest, ServiceError> {
        let request = self
            .store
            .find_overtime(request_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("overtime request {}", request_id)))?;

        let remarks = normalize_remarks(target, remarks)?;
        let authority = authorize(actor, &request, target).inspect_err(|e| {
            warn!(request_id, actor_id = actor.actor_id, reason = %e, "Overtime transition denied");
        })?;

        let from = request.status;
        let updated = apply(request, authority, target, actor.actor_id, remarks, self.clock.now());
        let saved = self.store.update_overtime(&updated).await?;

        info!(
            request_id,
            actor_id = actor.actor_id,
            from = %from,
            to = %saved.status,
            "Overtime request transitioned"
        );
        Ok(saved)
    }

    /// Applies the same transition to each id independently.
    pub async fn bulk_transition(
        &self,
        request_ids: &[u64],
        actor_id: u64,
        target: OvertimeStatus,
        remarks: Option<&str>,
    ) -> Result<BulkTransitionSummary, ServiceError> {
        normalize_remarks(target, remarks)?;
        let actor = self.actor(actor_id).await?;

        let mut summary = BulkTransitionSummary::default();
        for &id in request_ids {
            match self.transition_as(&actor, id, target, remarks).await {
                Ok(_) => summary.success_count += 1,
                Err(e) => {
                    if let ServiceError::Storage(detail) = &e {
                        error!(request_id = id, error = %detail, "Bulk transition storage failure");
                    }
                    summary.failure_count += 1;
                    summary.failures.push(BulkFailure {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            actor_id,
            to = %target,
            succeeded = summary.success_count,
            failed = summary.failure_count,
            "Bulk overtime transition finished"
        );
        Ok(summary)
    }

    pub async fn list_visible(&self, actor_id: u64) -> Result<Vec<OvertimeRequest>, ServiceError> {
        let actor = self.actor(actor_id).await?;
        let scope = VisibilityScope::for_actor(&actor);
        Ok(self.store.list_overtime(&scope).await?)
    }

    /// Requests outside the actor's visibility are reported as missing.
    pub async fn get_visible(
        &self,
        request_id: u64,
        actor_id: u64,
    ) -> Result<OvertimeRequest, ServiceError> {
        let actor = self.actor(actor_id).await?;
        self.store
            .find_overtime(request_id)
            .await?
            .filter(|r| VisibilityScope::for_actor(&actor).admits(r))
            .ok_or_else(|| ServiceError::NotFound(format!("overtime request {}", request_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::in_memory::{FixedClock, InMemoryStore};
    use chrono::TimeZone;
    use rstest::{fixture, rstest};
    use rust_decimal_macros::dec;

    const SUPERADMIN: u64 = 100;
    const HRD_MANAGER: u64 = 101;
    const TIMEKEEPER: u64 = 102;
    const ENG_MANAGER: u64 = 103;
    const FIN_MANAGER: u64 = 104;
    const ENG_STAFF: u64 = 105;
    const FIN_STAFF: u64 = 106;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 6, 9, 30, 0).unwrap()
    }

    fn request(status: OvertimeStatus) -> OvertimeRequest {
        OvertimeRequest {
            id: 1,
            employee_id: 1,
            date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            start_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            total_hours: dec!(3),
            rate_multiplier: dec!(1.25),
            reason: "release".into(),
            status,
            created_by: ENG_STAFF,
            dept_manager_id: None,
            dept_approved_by: None,
            dept_approved_at: None,
            dept_remarks: None,
            hrd_approved_by: None,
            hrd_approved_at: None,
            hrd_remarks: None,
            employee_department: Some("Engineering".into()),
            version: 1,
        }
    }

    fn profile(actor_id: u64, roles: &[Role], managed: &[&str], department: Option<&str>) -> ActorProfile {
        ActorProfile {
            actor_id,
            roles: roles.iter().copied().collect(),
            managed_departments: managed.iter().map(|d| d.to_string()).collect(),
            department: department.map(str::to_string),
        }
    }

    #[fixture]
    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.add_employee(1, "1001", "Jane", "Doe", Some("Engineering"));
        store.add_employee(2, "1002", "Ravi", "Kumar", Some("Finance"));
        store.add_employee(3, "1003", "Ola", "Nord", Some("Engineering"));

        store.grant(SUPERADMIN, Role::Superadmin);
        store.grant(HRD_MANAGER, Role::HrdManager);
        store.grant(TIMEKEEPER, Role::HrdTimekeeper);
        store.grant(ENG_MANAGER, Role::DepartmentManager);
        store.grant(FIN_MANAGER, Role::DepartmentManager);
        store.assign_manager(ENG_MANAGER, "Engineering");
        store.assign_manager(FIN_MANAGER, "Finance");

        store.link_user(ENG_STAFF, 3);
        store.link_user(FIN_STAFF, 2);
        store
    }

    fn workflow<'a>(store: &'a InMemoryStore, clock: &'a FixedClock) -> OvertimeWorkflow<'a> {
        OvertimeWorkflow::new(store, store, store, store, clock, dec!(1.25))
    }

    async fn pending_for(workflow: &OvertimeWorkflow<'_>, employee_id: u64) -> OvertimeRequest {
        workflow
            .create(
                ENG_STAFF,
                CreateOvertime {
                    employee_id,
                    date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                    start_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                    end_time: NaiveTime::from_hms_opt(20, 30, 0).unwrap(),
                    rate_multiplier: None,
                    reason: "Release night".into(),
                    dept_manager_id: None,
                },
            )
            .await
            .unwrap()
    }

    #[rstest]
    #[case(OvertimeStatus::Pending, OvertimeStatus::ManagerApproved, true)]
    #[case(OvertimeStatus::Pending, OvertimeStatus::Rejected, true)]
    #[case(OvertimeStatus::Pending, OvertimeStatus::Approved, false)]
    #[case(OvertimeStatus::ManagerApproved, OvertimeStatus::Approved, false)]
    #[case(OvertimeStatus::ManagerApproved, OvertimeStatus::Rejected, false)]
    fn department_manager_acts_only_on_pending(
        #[case] from: OvertimeStatus,
        #[case] to: OvertimeStatus,
        #[case] allowed: bool,
    ) {
        let actor = profile(ENG_MANAGER, &[Role::DepartmentManager], &["Engineering"], None);
        assert_eq!(authorize(&actor, &request(from), to).is_ok(), allowed);
    }

    #[rstest]
    #[case(OvertimeStatus::Pending, OvertimeStatus::Approved, false)]
    #[case(OvertimeStatus::Pending, OvertimeStatus::ManagerApproved, false)]
    #[case(OvertimeStatus::ManagerApproved, OvertimeStatus::Approved, true)]
    #[case(OvertimeStatus::ManagerApproved, OvertimeStatus::Rejected, true)]
    fn hrd_manager_acts_only_after_department_approval(
        #[case] from: OvertimeStatus,
        #[case] to: OvertimeStatus,
        #[case] allowed: bool,
    ) {
        let actor = profile(HRD_MANAGER, &[Role::HrdManager], &[], None);
        assert_eq!(authorize(&actor, &request(from), to).is_ok(), allowed);
    }

    #[rstest]
    #[case(OvertimeStatus::Pending, OvertimeStatus::Approved, true)]
    #[case(OvertimeStatus::Pending, OvertimeStatus::ManagerApproved, true)]
    #[case(OvertimeStatus::ManagerApproved, OvertimeStatus::Rejected, true)]
    #[case(OvertimeStatus::ManagerApproved, OvertimeStatus::ManagerApproved, false)]
    #[case(OvertimeStatus::Approved, OvertimeStatus::Rejected, false)]
    #[case(OvertimeStatus::Rejected, OvertimeStatus::Approved, false)]
    #[case(OvertimeStatus::Pending, OvertimeStatus::Pending, false)]
    fn superadmin_bypasses_gates_but_not_terminal_states(
        #[case] from: OvertimeStatus,
        #[case] to: OvertimeStatus,
        #[case] allowed: bool,
    ) {
        let actor = profile(SUPERADMIN, &[Role::Superadmin], &[], None);
        assert_eq!(authorize(&actor, &request(from), to).is_ok(), allowed);
    }

    #[test]
    fn assigned_approver_may_act_outside_managed_departments() {
        let actor = profile(FIN_MANAGER, &[Role::DepartmentManager], &["Finance"], None);
        let mut req = request(OvertimeStatus::Pending);
        assert!(authorize(&actor, &req, OvertimeStatus::ManagerApproved).is_err());
        req.dept_manager_id = Some(FIN_MANAGER);
        assert_eq!(
            authorize(&actor, &req, OvertimeStatus::ManagerApproved),
            Ok(Authority::DepartmentManager)
        );
    }

    #[test]
    fn regular_and_timekeeper_cannot_transition() {
        for actor in [
            profile(ENG_STAFF, &[Role::Regular], &[], Some("Engineering")),
            profile(TIMEKEEPER, &[Role::HrdTimekeeper], &[], None),
        ] {
            for target in [
                OvertimeStatus::ManagerApproved,
                OvertimeStatus::Approved,
                OvertimeStatus::Rejected,
            ] {
                assert!(authorize(&actor, &request(OvertimeStatus::Pending), target).is_err());
                assert!(
                    authorize(&actor, &request(OvertimeStatus::ManagerApproved), target).is_err()
                );
            }
        }
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("   "))]
    fn rejection_needs_remarks(#[case] remarks: Option<&str>) {
        assert_eq!(
            normalize_remarks(OvertimeStatus::Rejected, remarks),
            Err(TransitionError::RemarksRequired)
        );
        assert_eq!(normalize_remarks(OvertimeStatus::Approved, remarks), Ok(None));
    }

    #[test]
    fn superadmin_fast_track_backfills_department_level() {
        let updated = apply(
            request(OvertimeStatus::Pending),
            Authority::Superadmin,
            OvertimeStatus::Approved,
            SUPERADMIN,
            Some("ok".into()),
            now(),
        );
        assert_eq!(updated.status, OvertimeStatus::Approved);
        assert_eq!(updated.dept_approved_by, Some(SUPERADMIN));
        assert_eq!(updated.dept_approved_at, Some(now()));
        assert_eq!(updated.dept_remarks.as_deref(), Some(AUTO_APPROVED_REMARK));
        assert_eq!(updated.hrd_approved_by, Some(SUPERADMIN));
        assert_eq!(updated.hrd_remarks.as_deref(), Some("ok"));
    }

    #[test]
    fn superadmin_rejecting_pending_stamps_department_level_only() {
        let updated = apply(
            request(OvertimeStatus::Pending),
            Authority::Superadmin,
            OvertimeStatus::Rejected,
            SUPERADMIN,
            Some("duplicate".into()),
            now(),
        );
        assert_eq!(updated.dept_approved_by, Some(SUPERADMIN));
        assert_eq!(updated.dept_remarks.as_deref(), Some("duplicate"));
        assert_eq!(updated.hrd_approved_by, None);
    }

    #[test]
    fn hrd_rejection_keeps_existing_department_stamp() {
        let mut req = request(OvertimeStatus::ManagerApproved);
        req.dept_approved_by = Some(ENG_MANAGER);
        req.dept_remarks = Some("fine by me".into());

        let updated = apply(
            req,
            Authority::HrdManager,
            OvertimeStatus::Rejected,
            HRD_MANAGER,
            Some("budget".into()),
            now(),
        );
        assert_eq!(updated.dept_approved_by, Some(ENG_MANAGER));
        assert_eq!(updated.dept_remarks.as_deref(), Some("fine by me"));
        assert_eq!(updated.hrd_approved_by, Some(HRD_MANAGER));
        assert_eq!(updated.hrd_remarks.as_deref(), Some("budget"));
    }

    #[test]
    fn hrd_rejection_without_department_stamp_uses_placeholder() {
        let updated = apply(
            request(OvertimeStatus::ManagerApproved),
            Authority::HrdManager,
            OvertimeStatus::Rejected,
            HRD_MANAGER,
            Some("budget".into()),
            now(),
        );
        assert_eq!(updated.dept_approved_by, Some(HRD_MANAGER));
        assert_eq!(updated.dept_remarks.as_deref(), Some(AUTO_PROCESSED_REMARK));
    }

    #[test]
    fn visibility_scopes_follow_roles() {
        let mut own = request(OvertimeStatus::Pending);
        own.created_by = TIMEKEEPER;
        let mut finance = request(OvertimeStatus::Pending);
        finance.employee_department = Some("Finance".into());
        let mut finance_approved = finance.clone();
        finance_approved.status = OvertimeStatus::ManagerApproved;
        let mut assigned = finance.clone();
        assigned.dept_manager_id = Some(ENG_MANAGER);

        let hrd = VisibilityScope::for_actor(&profile(HRD_MANAGER, &[Role::HrdManager], &[], None));
        assert!(hrd.admits(&finance));

        let timekeeper =
            VisibilityScope::for_actor(&profile(TIMEKEEPER, &[Role::HrdTimekeeper], &[], None));
        assert!(timekeeper.admits(&own));
        assert!(timekeeper.admits(&finance_approved));
        assert!(!timekeeper.admits(&finance));

        let manager = VisibilityScope::for_actor(&profile(
            ENG_MANAGER,
            &[Role::DepartmentManager],
            &["Engineering"],
            Some("Engineering"),
        ));
        assert!(manager.admits(&request(OvertimeStatus::Pending)));
        assert!(manager.admits(&assigned));
        assert!(!manager.admits(&finance));

        let staff = VisibilityScope::for_actor(&profile(
            FIN_STAFF,
            &[Role::Regular],
            &[],
            Some("Finance"),
        ));
        assert!(staff.admits(&finance));
        assert!(!staff.admits(&request(OvertimeStatus::Pending)));
    }

    #[rstest]
    #[actix_web::test]
    async fn creation_defaults_rate_hours_and_approver(store: InMemoryStore) {
        let clock = FixedClock(now());
        let workflow = workflow(&store, &clock);

        let created = pending_for(&workflow, 1).await;

        assert_eq!(created.status, OvertimeStatus::Pending);
        assert_eq!(created.total_hours, dec!(3.50));
        assert_eq!(created.rate_multiplier, dec!(1.25));
        assert_eq!(created.dept_manager_id, Some(ENG_MANAGER));
        assert_eq!(created.created_by, ENG_STAFF);
        assert_eq!(created.employee_department.as_deref(), Some("Engineering"));
    }

    #[rstest]
    #[actix_web::test]
    async fn creation_handles_shifts_past_midnight(store: InMemoryStore) {
        let clock = FixedClock(now());
        let workflow = workflow(&store, &clock);

        let created = workflow
            .create(
                TIMEKEEPER,
                CreateOvertime {
                    employee_id: 2,
                    date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                    start_time: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
                    end_time: NaiveTime::from_hms_opt(1, 15, 0).unwrap(),
                    rate_multiplier: Some(dec!(1.5)),
                    reason: "Inventory count".into(),
                    dept_manager_id: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(created.total_hours, dec!(3.25));
        assert_eq!(created.rate_multiplier, dec!(1.5));
        assert_eq!(created.dept_manager_id, Some(FIN_MANAGER));
    }

    #[rstest]
    #[actix_web::test]
    async fn creation_validates_input(store: InMemoryStore) {
        let clock = FixedClock(now());
        let workflow = workflow(&store, &clock);
        let base = CreateOvertime {
            employee_id: 1,
            date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            start_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            rate_multiplier: None,
            reason: "Release".into(),
            dept_manager_id: None,
        };

        let blank_reason = CreateOvertime {
            reason: "  ".into(),
            ..base.clone()
        };
        let zero_span = CreateOvertime {
            end_time: base.start_time,
            ..base.clone()
        };
        let unknown = CreateOvertime {
            employee_id: 99,
            ..base
        };

        assert!(matches!(
            workflow.create(ENG_STAFF, blank_reason).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            workflow.create(ENG_STAFF, zero_span).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            workflow.create(ENG_STAFF, unknown).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[rstest]
    #[actix_web::test]
    async fn two_level_approval_stamps_both_levels(store: InMemoryStore) {
        let clock = FixedClock(now());
        let workflow = workflow(&store, &clock);
        let created = pending_for(&workflow, 1).await;

        let dept = workflow
            .transition(created.id, ENG_MANAGER, OvertimeStatus::ManagerApproved, Some("go"))
            .await
            .unwrap();
        assert_eq!(dept.status, OvertimeStatus::ManagerApproved);
        assert_eq!(dept.dept_approved_by, Some(ENG_MANAGER));
        assert_eq!(dept.dept_remarks.as_deref(), Some("go"));
        assert_eq!(dept.hrd_approved_by, None);

        let hrd = workflow
            .transition(created.id, HRD_MANAGER, OvertimeStatus::Approved, None)
            .await
            .unwrap();
        assert_eq!(hrd.status, OvertimeStatus::Approved);
        assert_eq!(hrd.dept_approved_by, Some(ENG_MANAGER));
        assert_eq!(hrd.hrd_approved_by, Some(HRD_MANAGER));
        assert_eq!(hrd.hrd_approved_at, Some(now()));
        assert_eq!(hrd.hrd_remarks, None);
    }

    #[rstest]
    #[actix_web::test]
    async fn foreign_department_manager_is_denied(store: InMemoryStore) {
        let clock = FixedClock(now());
        let workflow = workflow(&store, &clock);
        let created = pending_for(&workflow, 1).await;

        let result = workflow
            .transition(created.id, FIN_MANAGER, OvertimeStatus::ManagerApproved, None)
            .await;

        assert!(matches!(result, Err(ServiceError::Authorization(_))));
        let unchanged = store.find_overtime(created.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, OvertimeStatus::Pending);
        assert_eq!(unchanged.dept_approved_by, None);
    }

    #[rstest]
    #[actix_web::test]
    async fn empty_rejection_remarks_are_a_validation_error(store: InMemoryStore) {
        let clock = FixedClock(now());
        let workflow = workflow(&store, &clock);
        let created = pending_for(&workflow, 1).await;

        let result = workflow
            .transition(created.id, ENG_MANAGER, OvertimeStatus::Rejected, Some(""))
            .await;

        assert!(matches!(result, Err(ServiceError::Validation(_))));
        let unchanged = store.find_overtime(created.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, OvertimeStatus::Pending);
    }

    #[rstest]
    #[actix_web::test]
    async fn superadmin_fast_track_is_persisted(store: InMemoryStore) {
        let clock = FixedClock(now());
        let workflow = workflow(&store, &clock);
        let created = pending_for(&workflow, 1).await;

        let approved = workflow
            .transition(created.id, SUPERADMIN, OvertimeStatus::Approved, None)
            .await
            .unwrap();

        assert_eq!(approved.dept_approved_by, Some(SUPERADMIN));
        assert_eq!(approved.hrd_approved_by, Some(SUPERADMIN));
        assert_eq!(approved.dept_remarks.as_deref(), Some(AUTO_APPROVED_REMARK));
        assert_eq!(approved.version, created.version + 1);
    }

    #[rstest]
    #[actix_web::test]
    async fn missing_request_is_not_found(store: InMemoryStore) {
        let clock = FixedClock(now());
        let workflow = workflow(&store, &clock);

        let result = workflow
            .transition(404, SUPERADMIN, OvertimeStatus::Approved, None)
            .await;

        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[rstest]
    #[actix_web::test]
    async fn stale_versions_are_conflicts(store: InMemoryStore) {
        let clock = FixedClock(now());
        let workflow = workflow(&store, &clock);
        let created = pending_for(&workflow, 1).await;
        workflow
            .transition(created.id, ENG_MANAGER, OvertimeStatus::ManagerApproved, None)
            .await
            .unwrap();

        let stale = apply(
            created,
            Authority::Superadmin,
            OvertimeStatus::Rejected,
            SUPERADMIN,
            Some("late".into()),
            now(),
        );
        let result = store.update_overtime(&stale).await;

        assert!(matches!(result, Err(StoreError::VersionMismatch { .. })));
    }

    #[rstest]
    #[actix_web::test]
    async fn bulk_counts_successes_and_denials_separately(store: InMemoryStore) {
        let clock = FixedClock(now());
        let workflow = workflow(&store, &clock);
        let mut ids = Vec::new();
        for employee_id in [1, 3, 1, 2, 2] {
            ids.push(pending_for(&workflow, employee_id).await.id);
        }

        let summary = workflow
            .bulk_transition(&ids, ENG_MANAGER, OvertimeStatus::ManagerApproved, Some("batch"))
            .await
            .unwrap();

        assert_eq!(summary.success_count, 3);
        assert_eq!(summary.failure_count, 2);
        let failed: Vec<u64> = summary.failures.iter().map(|f| f.id).collect();
        assert_eq!(failed, vec![ids[3], ids[4]]);

        for id in &ids[..3] {
            let row = store.find_overtime(*id).await.unwrap().unwrap();
            assert_eq!(row.status, OvertimeStatus::ManagerApproved);
            assert_eq!(row.dept_approved_by, Some(ENG_MANAGER));
            assert_eq!(row.dept_approved_at, Some(now()));
            assert_eq!(row.dept_remarks.as_deref(), Some("batch"));
        }
        for id in &ids[3..] {
            let row = store.find_overtime(*id).await.unwrap().unwrap();
            assert_eq!(row.status, OvertimeStatus::Pending);
            assert_eq!(row.dept_approved_by, None);
        }
    }

    #[rstest]
    #[actix_web::test]
    async fn bulk_treats_missing_ids_as_failures(store: InMemoryStore) {
        let clock = FixedClock(now());
        let workflow = workflow(&store, &clock);
        let first = pending_for(&workflow, 1).await;

        let summary = workflow
            .bulk_transition(&[first.id, 9_999], SUPERADMIN, OvertimeStatus::Approved, None)
            .await
            .unwrap();

        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.failures[0].id, 9_999);
    }

    #[rstest]
    #[actix_web::test]
    async fn bulk_rejection_without_remarks_is_refused_up_front(store: InMemoryStore) {
        let clock = FixedClock(now());
        let workflow = workflow(&store, &clock);
        let first = pending_for(&workflow, 1).await;

        let result = workflow
            .bulk_transition(&[first.id], SUPERADMIN, OvertimeStatus::Rejected, Some(" "))
            .await;

        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[rstest]
    #[actix_web::test]
    async fn listing_is_scoped_to_the_actor(store: InMemoryStore) {
        let clock = FixedClock(now());
        let workflow = workflow(&store, &clock);
        let eng = pending_for(&workflow, 1).await;
        let fin = pending_for(&workflow, 2).await;

        let all = workflow.list_visible(HRD_MANAGER).await.unwrap();
        assert_eq!(all.len(), 2);

        let finance_staff = workflow.list_visible(FIN_STAFF).await.unwrap();
        assert_eq!(finance_staff.iter().map(|r| r.id).collect::<Vec<_>>(), vec![fin.id]);

        let timekeeper = workflow.list_visible(TIMEKEEPER).await.unwrap();
        assert!(timekeeper.is_empty());
        workflow
            .transition(eng.id, ENG_MANAGER, OvertimeStatus::ManagerApproved, None)
            .await
            .unwrap();
        let timekeeper = workflow.list_visible(TIMEKEEPER).await.unwrap();
        assert_eq!(timekeeper.iter().map(|r| r.id).collect::<Vec<_>>(), vec![eng.id]);

        assert!(workflow.get_visible(eng.id, FIN_MANAGER).await.is_err());
        assert_eq!(workflow.get_visible(fin.id, FIN_MANAGER).await.unwrap().id, fin.id);
    }
}
