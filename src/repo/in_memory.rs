// In memory implementation of every storage port plus clock and device fakes.
//
// Purpose
// - Exercise the reconciliation engine and the overtime workflow without MySQL.
//
// Responsibilities
// - Honour the same keys as the schema: one daily row per (employee, date),
//   one punch per (employee, timestamp, device), version checks on overtime.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{
    attendance::{AttendanceFilter, DailyAttendance, DailyAttendanceUpsert, PunchEvent, RawPunch},
    department::DepartmentManagerAssignment,
    employee::Employee,
    overtime::{NewOvertimeRequest, OvertimeRequest, OvertimeStatus},
    role::Role,
    user::User,
};
use crate::service::{
    overtime::VisibilityScope,
    ports::{
        AttendanceStore, Clock, DeviceClient, DeviceError, EmployeeLookup, ManagerAssignments,
        OvertimeStore, PunchLogStore, RoleLookup, StoreError, UserDirectory,
    },
};

#[derive(Default)]
struct State {
    employees: BTreeMap<u64, Employee>,
    users: BTreeMap<u64, User>,
    roles: HashSet<(u64, Role)>,
    managers: Vec<DepartmentManagerAssignment>,
    daily: BTreeMap<(u64, NaiveDate), DailyAttendance>,
    next_daily_id: u64,
    punches: Vec<PunchEvent>,
    overtime: BTreeMap<u64, OvertimeRequest>,
    next_overtime_id: u64,
    failing_days: HashSet<(u64, NaiveDate)>,
    punch_log_down: bool,
}

impl State {
    fn department(&self, employee_id: u64) -> Option<String> {
        self.employees
            .get(&employee_id)
            .and_then(|e| e.department.clone())
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("in-memory store poisoned")
    }

    pub fn add_employee(
        &self,
        id: u64,
        badge: &str,
        first_name: &str,
        last_name: &str,
        department: Option<&str>,
    ) {
        self.state().employees.insert(
            id,
            Employee {
                id,
                employee_code: badge.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                department: department.map(str::to_string),
                status: "active".to_string(),
            },
        );
    }

    pub fn add_user(&self, user: User) {
        self.state().users.insert(user.id, user);
    }

    pub fn link_user(&self, user_id: u64, employee_id: u64) {
        let mut state = self.state();
        let user = state.users.entry(user_id).or_insert_with(|| User {
            id: user_id,
            username: format!("user{user_id}"),
            email: None,
            employee_id: None,
            is_active: true,
        });
        user.employee_id = Some(employee_id);
    }

    pub fn grant(&self, user_id: u64, role: Role) {
        self.state().roles.insert((user_id, role));
    }

    pub fn assign_manager(&self, manager_id: u64, department: &str) {
        self.state().managers.push(DepartmentManagerAssignment {
            manager_id,
            department: department.to_string(),
        });
    }

    /// Makes every upsert for this employee-day fail with a backend error.
    pub fn fail_upserts_for(&self, employee_id: u64, date: NaiveDate) {
        self.state().failing_days.insert((employee_id, date));
    }

    /// Makes every punch log write fail with a backend error.
    pub fn fail_punch_log(&self) {
        self.state().punch_log_down = true;
    }

    pub fn daily_rows(&self) -> Vec<DailyAttendance> {
        self.state().daily.values().cloned().collect()
    }

    pub fn punch_log_len(&self) -> usize {
        self.state().punches.len()
    }
}

#[async_trait]
impl EmployeeLookup for InMemoryStore {
    async fn resolve_by_badge_id(&self, badge_id: &str) -> Result<Option<Employee>, StoreError> {
        Ok(self
            .state()
            .employees
            .values()
            .find(|e| e.employee_code == badge_id)
            .cloned())
    }

    async fn resolve_by_internal_id(&self, id: u64) -> Result<Option<Employee>, StoreError> {
        Ok(self.state().employees.get(&id).cloned())
    }

    async fn resolve_by_user(&self, user_id: u64) -> Result<Option<Employee>, StoreError> {
        let state = self.state();
        Ok(state
            .users
            .get(&user_id)
            .and_then(|u| u.employee_id)
            .and_then(|id| state.employees.get(&id).cloned()))
    }
}

#[async_trait]
impl RoleLookup for InMemoryStore {
    async fn has_role(&self, actor_id: u64, role: Role) -> Result<bool, StoreError> {
        Ok(self.state().roles.contains(&(actor_id, role)))
    }

    async fn managed_departments(&self, actor_id: u64) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .state()
            .managers
            .iter()
            .filter(|a| a.manager_id == actor_id)
            .map(|a| a.department.clone())
            .collect())
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_user(&self, user_id: u64) -> Result<Option<User>, StoreError> {
        Ok(self.state().users.get(&user_id).cloned())
    }
}

#[async_trait]
impl ManagerAssignments for InMemoryStore {
    async fn managers_of(&self, department: &str) -> Result<Vec<u64>, StoreError> {
        let mut ids: Vec<u64> = self
            .state()
            .managers
            .iter()
            .filter(|a| a.department == department)
            .map(|a| a.manager_id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[async_trait]
impl AttendanceStore for InMemoryStore {
    async fn upsert_daily(&self, row: &DailyAttendanceUpsert) -> Result<DailyAttendance, StoreError> {
        let mut state = self.state();
        let key = (row.employee_id, row.date);
        if state.failing_days.contains(&key) {
            return Err(StoreError::Backend("simulated write failure".to_string()));
        }

        let existing = state.daily.get(&key).map(|e| (e.id, e.version));
        let (id, version) = match existing {
            Some((id, version)) => (id, version + 1),
            None => {
                state.next_daily_id += 1;
                (state.next_daily_id, 1)
            }
        };
        let saved = DailyAttendance {
            id,
            employee_id: row.employee_id,
            date: row.date,
            time_in: row.time_in,
            time_out: row.time_out,
            hours_worked: row.hours_worked,
            is_night_shift: row.is_night_shift,
            source: row.source,
            status: row.status,
            remarks: row.remarks.clone(),
            version,
        };
        state.daily.insert(key, saved.clone());
        Ok(saved)
    }

    async fn find_daily(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<DailyAttendance>, StoreError> {
        Ok(self.state().daily.get(&(employee_id, date)).cloned())
    }

    async fn list_daily(&self, filter: &AttendanceFilter) -> Result<Vec<DailyAttendance>, StoreError> {
        let rows = self
            .state()
            .daily
            .values()
            .filter(|r| filter.employee_id.is_none_or(|id| r.employee_id == id))
            .filter(|r| filter.from.is_none_or(|from| r.date >= from))
            .filter(|r| filter.to.is_none_or(|to| r.date <= to))
            .skip(filter.offset as usize)
            .take(if filter.limit == 0 { usize::MAX } else { filter.limit as usize })
            .cloned()
            .collect();
        Ok(rows)
    }
}

#[async_trait]
impl PunchLogStore for InMemoryStore {
    async fn record_punch(&self, punch: &PunchEvent) -> Result<bool, StoreError> {
        let mut state = self.state();
        if state.punch_log_down {
            return Err(StoreError::Backend("punch log unavailable".to_string()));
        }
        let duplicate = state.punches.iter().any(|p| {
            p.employee_id == punch.employee_id
                && p.timestamp == punch.timestamp
                && p.device_id == punch.device_id
        });
        if duplicate {
            return Ok(false);
        }
        state.punches.push(punch.clone());
        Ok(true)
    }

    async fn punches_between(
        &self,
        employee_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PunchEvent>, StoreError> {
        Ok(self
            .state()
            .punches
            .iter()
            .filter(|p| p.employee_id == employee_id)
            .filter(|p| (from..=to).contains(&p.timestamp.date()))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OvertimeStore for InMemoryStore {
    async fn insert_overtime(&self, new: &NewOvertimeRequest) -> Result<OvertimeRequest, StoreError> {
        let mut state = self.state();
        state.next_overtime_id += 1;
        let request = OvertimeRequest {
            id: state.next_overtime_id,
            employee_id: new.employee_id,
            date: new.date,
            start_time: new.start_time,
            end_time: new.end_time,
            total_hours: new.total_hours,
            rate_multiplier: new.rate_multiplier,
            reason: new.reason.clone(),
            status: OvertimeStatus::Pending,
            created_by: new.created_by,
            dept_manager_id: new.dept_manager_id,
            dept_approved_by: None,
            dept_approved_at: None,
            dept_remarks: None,
            hrd_approved_by: None,
            hrd_approved_at: None,
            hrd_remarks: None,
            employee_department: state.department(new.employee_id),
            version: 1,
        };
        state.overtime.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_overtime(&self, id: u64) -> Result<Option<OvertimeRequest>, StoreError> {
        Ok(self.state().overtime.get(&id).cloned())
    }

    async fn update_overtime(&self, request: &OvertimeRequest) -> Result<OvertimeRequest, StoreError> {
        let mut state = self.state();
        let stored = state
            .overtime
            .get_mut(&request.id)
            .ok_or_else(|| StoreError::Backend(format!("overtime request {} vanished", request.id)))?;
        if stored.version != request.version {
            return Err(StoreError::VersionMismatch {
                entity: "overtime request",
                id: request.id,
                expected: request.version,
            });
        }
        *stored = OvertimeRequest {
            version: request.version + 1,
            ..request.clone()
        };
        Ok(stored.clone())
    }

    async fn list_overtime(&self, scope: &VisibilityScope) -> Result<Vec<OvertimeRequest>, StoreError> {
        Ok(self
            .state()
            .overtime
            .values()
            .filter(|r| scope.admits(r))
            .cloned()
            .collect())
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Device fake that either returns a canned batch or fails with an HTTP status.
pub struct ScriptedDevice {
    outcome: Result<Vec<RawPunch>, u16>,
}

impl ScriptedDevice {
    pub fn returning(punches: Vec<RawPunch>) -> Self {
        Self {
            outcome: Ok(punches),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            outcome: Err(status),
        }
    }
}

#[async_trait]
impl DeviceClient for ScriptedDevice {
    async fn fetch_punch_events(&self, _device_id: &str) -> Result<Vec<RawPunch>, DeviceError> {
        match &self.outcome {
            Ok(punches) => Ok(punches.clone()),
            Err(status) => Err(DeviceError::Status { status: *status }),
        }
    }
}
