// Ports describe what the attendance and overtime core needs from the outside
// world. The MySQL adapter lives in `repo::mysql`, the device gateway in
// `device`, and tests use `repo::in_memory`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::model::{
    attendance::{AttendanceFilter, DailyAttendance, DailyAttendanceUpsert, PunchEvent, RawPunch},
    employee::Employee,
    overtime::{NewOvertimeRequest, OvertimeRequest},
    role::Role,
    user::User,
};
use crate::service::overtime::VisibilityScope;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("version mismatch on {entity} {id}: expected {expected}")]
    VersionMismatch {
        entity: &'static str,
        id: u64,
        expected: u32,
    },

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device gateway is not configured")]
    NotConfigured,

    #[error("request to device gateway failed: {0}")]
    Request(String),

    #[error("device gateway answered {status}")]
    Status { status: u16 },

    #[error("could not decode device payload: {0}")]
    Decode(String),
}

#[async_trait]
pub trait EmployeeLookup: Send + Sync {
    /// Resolve by the badge number enrolled on devices (`employees.employee_code`).
    async fn resolve_by_badge_id(&self, badge_id: &str) -> Result<Option<Employee>, StoreError>;
    async fn resolve_by_internal_id(&self, id: u64) -> Result<Option<Employee>, StoreError>;
    /// Employee record linked to a login account, if any.
    async fn resolve_by_user(&self, user_id: u64) -> Result<Option<Employee>, StoreError>;
}

#[async_trait]
pub trait RoleLookup: Send + Sync {
    async fn has_role(&self, actor_id: u64, role: Role) -> Result<bool, StoreError>;
    async fn managed_departments(&self, actor_id: u64) -> Result<BTreeSet<String>, StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: u64) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait ManagerAssignments: Send + Sync {
    /// Managers assigned to `department`, lowest user id first.
    async fn managers_of(&self, department: &str) -> Result<Vec<u64>, StoreError>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn upsert_daily(&self, row: &DailyAttendanceUpsert) -> Result<DailyAttendance, StoreError>;
    async fn find_daily(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<DailyAttendance>, StoreError>;
    async fn list_daily(&self, filter: &AttendanceFilter) -> Result<Vec<DailyAttendance>, StoreError>;
}

#[async_trait]
pub trait PunchLogStore: Send + Sync {
    /// Returns false when an identical punch (employee, timestamp, device) is already logged.
    async fn record_punch(&self, punch: &PunchEvent) -> Result<bool, StoreError>;
    /// Logged punches for one employee with a timestamp inside `[from, to]`, by date.
    async fn punches_between(
        &self,
        employee_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PunchEvent>, StoreError>;
}

#[async_trait]
pub trait OvertimeStore: Send + Sync {
    async fn insert_overtime(&self, new: &NewOvertimeRequest) -> Result<OvertimeRequest, StoreError>;
    async fn find_overtime(&self, id: u64) -> Result<Option<OvertimeRequest>, StoreError>;
    /// Writes status and audit fields if the stored version still equals `request.version`.
    async fn update_overtime(&self, request: &OvertimeRequest) -> Result<OvertimeRequest, StoreError>;
    async fn list_overtime(&self, scope: &VisibilityScope) -> Result<Vec<OvertimeRequest>, StoreError>;
}

#[async_trait]
pub trait DeviceClient: Send + Sync {
    async fn fetch_punch_events(&self, device_id: &str) -> Result<Vec<RawPunch>, DeviceError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
