use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Direction of a punch as reported by the device (`0` = in, `1` = out).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PunchDirection {
    In,
    Out,
    Unknown,
}

impl PunchDirection {
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => PunchDirection::In,
            Some(1) => PunchDirection::Out,
            _ => PunchDirection::Unknown,
        }
    }

    /// Secondary sort key, keeps an IN ahead of an OUT sharing its timestamp.
    pub fn sort_rank(self) -> u8 {
        match self {
            PunchDirection::In => 0,
            PunchDirection::Out => 1,
            PunchDirection::Unknown => 2,
        }
    }

    pub fn code(self) -> Option<i32> {
        match self {
            PunchDirection::In => Some(0),
            PunchDirection::Out => Some(1),
            PunchDirection::Unknown => None,
        }
    }
}

/// A punch exactly as received from a device or upload, before validation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RawPunch {
    #[schema(example = "1042")]
    pub subject_id: Option<String>,
    #[schema(example = "2026-01-05T08:00:00", value_type = Option<String>, format = "date-time")]
    pub timestamp: Option<NaiveDateTime>,
    /// 0 = in, 1 = out, anything else is treated as unknown
    #[schema(example = 0)]
    pub direction: Option<i32>,
    #[schema(example = "CKJY2100")]
    pub device_id: Option<String>,
}

/// A punch whose subject has been resolved to an employee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunchEvent {
    pub employee_id: u64,
    pub subject_id: String,
    pub timestamp: NaiveDateTime,
    pub direction: PunchDirection,
    pub device_id: Option<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceSource {
    Biometric,
    Manual,
    Csv,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    HalfDay,
    Leave,
}

/// One row per employee per calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DailyAttendance {
    pub id: u64,
    pub employee_id: u64,
    #[schema(example = "2026-01-05", value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub time_in: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub time_out: Option<NaiveDateTime>,
    #[schema(example = "8.00", value_type = String)]
    pub hours_worked: Decimal,
    pub is_night_shift: bool,
    pub source: AttendanceSource,
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
    pub version: u32,
}

/// Values written by an upsert keyed on `(employee_id, date)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyAttendanceUpsert {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub time_in: Option<NaiveDateTime>,
    pub time_out: Option<NaiveDateTime>,
    pub hours_worked: Decimal,
    pub is_night_shift: bool,
    pub source: AttendanceSource,
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub employee_id: Option<u64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: u32,
    pub offset: u32,
}
