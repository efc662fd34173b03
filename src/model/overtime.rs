use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OvertimeStatus {
    Pending,
    ManagerApproved,
    Approved,
    Rejected,
}

impl OvertimeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OvertimeStatus::Approved | OvertimeStatus::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OvertimeRequest {
    pub id: u64,
    pub employee_id: u64,
    #[schema(example = "2026-01-05", value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(example = "17:00:00", value_type = String)]
    pub start_time: NaiveTime,
    #[schema(example = "20:00:00", value_type = String)]
    pub end_time: NaiveTime,
    #[schema(example = "3.00", value_type = String)]
    pub total_hours: Decimal,
    #[schema(example = "1.25", value_type = String)]
    pub rate_multiplier: Decimal,
    pub reason: String,
    pub status: OvertimeStatus,
    pub created_by: u64,
    pub dept_manager_id: Option<u64>,

    pub dept_approved_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub dept_approved_at: Option<DateTime<Utc>>,
    pub dept_remarks: Option<String>,

    pub hrd_approved_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub hrd_approved_at: Option<DateTime<Utc>>,
    pub hrd_remarks: Option<String>,

    /// Department of the requesting employee, joined at read time.
    pub employee_department: Option<String>,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOvertimeRequest {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub total_hours: Decimal,
    pub rate_multiplier: Decimal,
    pub reason: String,
    pub created_by: u64,
    pub dept_manager_id: Option<u64>,
}
