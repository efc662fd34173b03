use std::env;

use anyhow::{Context, anyhow};
use chrono::{Duration, NaiveTime};
use rust_decimal::Decimal;

use crate::service::{reconcile::AttendancePolicy, roles::RoleStrategy};

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub api_prefix: String,
    pub log_level: tracing::Level,

    // Rate limiting
    pub rate_protected_per_min: u32,

    // Biometric gateway
    pub device_gateway_url: Option<String>,
    pub device_api_token: Option<String>,
    pub device_timeout_secs: u64,

    pub role_strategy: RoleStrategy,

    // Attendance policy
    pub work_start: NaiveTime,
    pub late_grace_minutes: i64,
    pub half_day_hours: Decimal,
    pub night_shift_max_span_hours: i64,

    pub default_ot_rate: Decimal,
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).with_context(|| format!("{} must be set", key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str, default: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("invalid {} '{}': {}", key, raw, e))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let work_start_raw = env::var("WORK_START").unwrap_or_else(|_| "08:00".to_string());
        let work_start = NaiveTime::parse_from_str(work_start_raw.trim(), "%H:%M")
            .with_context(|| format!("invalid WORK_START '{}'", work_start_raw))?;

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_level: parsed("LOG_LEVEL", "debug")?,

            rate_protected_per_min: parsed("RATE_PROTECTED_PER_MIN", "1000")?,

            device_gateway_url: optional("DEVICE_GATEWAY_URL"),
            device_api_token: optional("DEVICE_API_TOKEN"),
            device_timeout_secs: parsed("DEVICE_TIMEOUT_SECS", "30")?,

            role_strategy: parsed("ROLE_STRATEGY", "table")?,

            work_start,
            late_grace_minutes: parsed("LATE_GRACE_MINUTES", "15")?,
            half_day_hours: parsed("HALF_DAY_HOURS", "4")?,
            night_shift_max_span_hours: parsed("NIGHT_SHIFT_MAX_SPAN_HOURS", "16")?,

            default_ot_rate: parsed("DEFAULT_OT_RATE", "1.25")?,
        })
    }

    pub fn attendance_policy(&self) -> AttendancePolicy {
        AttendancePolicy {
            work_start: self.work_start,
            late_grace_minutes: self.late_grace_minutes,
            half_day_hours: self.half_day_hours,
            night_shift_max_span: Duration::hours(self.night_shift_max_span_hours),
        }
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            database_url: "mysql://localhost/hrm_test".to_string(),
            jwt_secret: "test-secret".to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            api_prefix: "/api".to_string(),
            log_level: tracing::Level::DEBUG,
            rate_protected_per_min: 1000,
            device_gateway_url: None,
            device_api_token: None,
            device_timeout_secs: 30,
            role_strategy: RoleStrategy::Table,
            work_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            late_grace_minutes: 15,
            half_day_hours: Decimal::from(4),
            night_shift_max_span_hours: 16,
            default_ot_rate: Decimal::new(125, 2),
        }
    }
}
