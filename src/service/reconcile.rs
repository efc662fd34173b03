use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::model::{
    attendance::{
        AttendanceFilter, AttendanceSource, AttendanceStatus, DailyAttendance,
        DailyAttendanceUpsert, PunchDirection, PunchEvent, RawPunch,
    },
    employee::Employee,
};
use crate::service::{
    csv_import::{CsvPunchRow, ImportError, parse_timestamp},
    error::ServiceError,
    ports::{AttendanceStore, DeviceClient, EmployeeLookup, PunchLogStore},
};

/// Thresholds used to derive the daily status and night-shift attribution.
#[derive(Debug, Clone)]
pub struct AttendancePolicy {
    pub work_start: NaiveTime,
    pub late_grace_minutes: i64,
    pub half_day_hours: Decimal,
    /// Longest IN→OUT span that may carry an OUT punch back onto the previous day.
    pub night_shift_max_span: Duration,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            work_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            late_grace_minutes: 15,
            half_day_hours: dec!(4),
            night_shift_max_span: Duration::hours(16),
        }
    }
}

impl AttendancePolicy {
    pub fn status_for(&self, time_in: Option<NaiveDateTime>, hours: Decimal) -> AttendanceStatus {
        let Some(time_in) = time_in else {
            return AttendanceStatus::Absent;
        };
        if hours < self.half_day_hours {
            return AttendanceStatus::HalfDay;
        }
        let cutoff = self.work_start + Duration::minutes(self.late_grace_minutes);
        if time_in.time() > cutoff {
            AttendanceStatus::Late
        } else {
            AttendanceStatus::Present
        }
    }
}

/// How a day's punches become one attendance row. Device sync pairs IN/OUT
/// sessions; CSV imports only look at the first and last punch of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationStrategy {
    PairedSessions,
    FirstLastSeen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySummary {
    pub time_in: NaiveDateTime,
    pub time_out: NaiveDateTime,
    pub worked_minutes: i64,
    pub hours_worked: Decimal,
    pub is_night_shift: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DayError {
    #[error("no punches for the day")]
    Empty,
}

pub fn minutes_to_hours(minutes: i64) -> Decimal {
    (Decimal::from(minutes) / dec!(60))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl ReconciliationStrategy {
    pub fn summarize(self, punches: &[PunchEvent]) -> Result<DaySummary, DayError> {
        let mut sorted: Vec<&PunchEvent> = punches.iter().collect();
        sorted.sort_by_key(|p| (p.timestamp, p.direction.sort_rank()));

        let (first, last) = match (sorted.first(), sorted.last()) {
            (Some(f), Some(l)) => (f.timestamp, l.timestamp),
            _ => return Err(DayError::Empty),
        };

        let worked_minutes = match self {
            ReconciliationStrategy::PairedSessions => {
                let mut open_in: Option<NaiveDateTime> = None;
                let mut total = 0i64;
                for punch in &sorted {
                    match punch.direction {
                        // a second IN replaces the pending one
                        PunchDirection::In => open_in = Some(punch.timestamp),
                        PunchDirection::Out => {
                            if let Some(start) = open_in.take() {
                                total += (punch.timestamp - start).num_minutes();
                            }
                        }
                        PunchDirection::Unknown => {}
                    }
                }
                total
            }
            ReconciliationStrategy::FirstLastSeen => (last - first).num_minutes(),
        };

        Ok(DaySummary {
            time_in: first,
            time_out: last,
            worked_minutes,
            hours_worked: minutes_to_hours(worked_minutes),
            is_night_shift: first.date() != last.date(),
        })
    }

    /// Buckets punches by `(employee, work day)`.
    ///
    /// For paired sessions, punches after midnight that belong to a shift
    /// started on an earlier day, within `max_span` of its IN, stay on the
    /// day the shift started. That covers the closing OUT, unknown-direction
    /// punches while the shift is open, and repeated OUTs once an overnight
    /// shift has closed. Every other punch belongs to its own calendar date.
    pub fn group(
        self,
        punches: Vec<PunchEvent>,
        max_span: Duration,
    ) -> BTreeMap<(u64, NaiveDate), Vec<PunchEvent>> {
        let mut by_employee: BTreeMap<u64, Vec<PunchEvent>> = BTreeMap::new();
        for punch in punches {
            by_employee.entry(punch.employee_id).or_default().push(punch);
        }

        let mut buckets: BTreeMap<(u64, NaiveDate), Vec<PunchEvent>> = BTreeMap::new();
        for (employee_id, mut punches) in by_employee {
            punches.sort_by_key(|p| (p.timestamp, p.direction.sort_rank()));

            // start of the open shift, or of an overnight shift that just closed
            let mut shift: Option<(NaiveDateTime, NaiveDate)> = None;
            for punch in punches {
                let own_day = punch.timestamp.date();
                let carried_to = match (self, punch.direction, shift) {
                    (
                        ReconciliationStrategy::PairedSessions,
                        PunchDirection::Out | PunchDirection::Unknown,
                        Some((started, start_day)),
                    ) if start_day < own_day && punch.timestamp - started <= max_span => {
                        Some(start_day)
                    }
                    _ => None,
                };
                let day = carried_to.unwrap_or(own_day);
                match punch.direction {
                    PunchDirection::In => shift = Some((punch.timestamp, day)),
                    PunchDirection::Out if carried_to.is_none() => shift = None,
                    PunchDirection::Out | PunchDirection::Unknown => {}
                }
                buckets.entry((employee_id, day)).or_default().push(punch);
            }
        }
        buckets
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SkippedEvent {
    pub subject_id: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub timestamp: Option<NaiveDateTime>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FailedDay {
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReconcileSummary {
    /// Punches that ended up in a saved attendance row.
    pub processed_count: usize,
    /// Punches dropped: malformed, unresolvable, or belonging to a day that failed.
    pub skipped_count: usize,
    /// Unresolvable badge ids, each listed once.
    pub skipped_employee_ids: Vec<String>,
    pub detailed_skipped: Vec<SkippedEvent>,
    pub failed_days: Vec<FailedDay>,
    pub days_saved: usize,
    /// Punches reconciled but missing from the punch audit log because the write failed.
    pub audit_log_failures: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct CsvImportSummary {
    /// Rows newly written to the punch log.
    pub saved_count: usize,
    /// Rows already present in the punch log.
    pub duplicate_count: usize,
    pub days_reconciled: usize,
    pub errors: Vec<ImportError>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ManualAttendance {
    #[schema(example = 12)]
    pub employee_id: u64,
    #[schema(example = "2026-01-05", value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(example = "08:00:00", value_type = String)]
    pub time_in: NaiveTime,
    #[schema(example = "17:00:00", value_type = String)]
    pub time_out: NaiveTime,
    #[schema(example = "Badge left at home")]
    pub remarks: Option<String>,
}

pub struct ReconciliationEngine<'a> {
    employees: &'a dyn EmployeeLookup,
    attendance: &'a dyn AttendanceStore,
    punch_log: &'a dyn PunchLogStore,
    policy: &'a AttendancePolicy,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(
        employees: &'a dyn EmployeeLookup,
        attendance: &'a dyn AttendanceStore,
        punch_log: &'a dyn PunchLogStore,
        policy: &'a AttendancePolicy,
    ) -> Self {
        Self {
            employees,
            attendance,
            punch_log,
            policy,
        }
    }

    /// Pulls the device's punch log once and reconciles it. A failed fetch
    /// aborts the run; nothing already stored is touched.
    pub async fn reconcile_from_device(
        &self,
        device: &dyn DeviceClient,
        device_id: &str,
    ) -> Result<ReconcileSummary, ServiceError> {
        let events = device.fetch_punch_events(device_id).await.map_err(|e| {
            error!(error = %e, device_id, "Fetching device punches failed");
            ServiceError::Upstream(e)
        })?;
        info!(device_id, fetched = events.len(), "Fetched device punches");
        self.reconcile_from_events(events, device_id).await
    }

    pub async fn reconcile_from_events(
        &self,
        events: Vec<RawPunch>,
        device_id: &str,
    ) -> Result<ReconcileSummary, ServiceError> {
        let mut summary = ReconcileSummary::default();
        let mut unresolved: HashSet<String> = HashSet::new();
        let mut cache: HashMap<String, Option<Employee>> = HashMap::new();
        let mut resolved = Vec::with_capacity(events.len());

        for raw in events {
            let subject = raw
                .subject_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let (subject_id, timestamp) = match (subject, raw.timestamp) {
                (Some(s), Some(ts)) => (s, ts),
                _ => {
                    warn!(device_id, subject_id = ?raw.subject_id, "Skipping malformed punch");
                    summary.skipped_count += 1;
                    summary.detailed_skipped.push(SkippedEvent {
                        subject_id: raw.subject_id,
                        timestamp: raw.timestamp,
                        reason: "missing subject id or timestamp".to_string(),
                    });
                    continue;
                }
            };

            let employee = match cache.get(&subject_id) {
                Some(hit) => hit.clone(),
                None => {
                    let found = self.employees.resolve_by_badge_id(&subject_id).await?;
                    cache.insert(subject_id.clone(), found.clone());
                    found
                }
            };

            let Some(employee) = employee else {
                summary.skipped_count += 1;
                if unresolved.insert(subject_id.clone()) {
                    warn!(device_id, subject_id = %subject_id, "No employee for badge id");
                    summary.skipped_employee_ids.push(subject_id.clone());
                }
                summary.detailed_skipped.push(SkippedEvent {
                    subject_id: Some(subject_id),
                    timestamp: Some(timestamp),
                    reason: "no employee with this badge id".to_string(),
                });
                continue;
            };

            resolved.push(PunchEvent {
                employee_id: employee.id,
                subject_id,
                timestamp,
                direction: PunchDirection::from_code(raw.direction),
                device_id: raw.device_id.or_else(|| Some(device_id.to_string())),
            });
        }

        for punch in &resolved {
            if let Err(e) = self.punch_log.record_punch(punch).await {
                warn!(error = %e, employee_id = punch.employee_id, "Could not write punch audit log");
                summary.audit_log_failures += 1;
            }
        }

        let strategy = ReconciliationStrategy::PairedSessions;
        for ((employee_id, date), punches) in
            strategy.group(resolved, self.policy.night_shift_max_span)
        {
            let outcome = match strategy.summarize(&punches) {
                Ok(day) => self.save_day(employee_id, date, &day, AttendanceSource::Biometric).await,
                Err(e) => Err(e.to_string()),
            };
            match outcome {
                Ok(_) => {
                    summary.processed_count += punches.len();
                    summary.days_saved += 1;
                }
                Err(reason) => {
                    error!(employee_id, %date, reason = %reason, "Skipping attendance day");
                    summary.skipped_count += punches.len();
                    summary.failed_days.push(FailedDay {
                        employee_id,
                        date,
                        reason,
                    });
                }
            }
        }

        info!(
            device_id,
            processed = summary.processed_count,
            skipped = summary.skipped_count,
            days = summary.days_saved,
            audit_log_failures = summary.audit_log_failures,
            "Device punches reconciled"
        );
        Ok(summary)
    }

    /// Logs every usable row, then rebuilds each affected employee's days over
    /// the span of their rows using the first and last punch of each day.
    pub async fn reconcile_from_csv_rows(
        &self,
        rows: Vec<CsvPunchRow>,
    ) -> Result<CsvImportSummary, ServiceError> {
        let mut summary = CsvImportSummary::default();
        let mut spans: BTreeMap<u64, (NaiveDate, NaiveDate)> = BTreeMap::new();
        let mut cache: HashMap<String, Option<Employee>> = HashMap::new();

        for row in rows {
            let Some(timestamp) = parse_timestamp(&row.timestamp_text) else {
                summary.errors.push(ImportError::at_line(
                    row.line,
                    format!("unrecognized timestamp '{}'", row.timestamp_text),
                ));
                continue;
            };

            let employee = match cache.get(&row.badge_id) {
                Some(hit) => hit.clone(),
                None => {
                    let found = self.employees.resolve_by_badge_id(&row.badge_id).await?;
                    cache.insert(row.badge_id.clone(), found.clone());
                    found
                }
            };
            let Some(employee) = employee else {
                summary.errors.push(ImportError::at_line(
                    row.line,
                    format!(
                        "no employee with badge id '{}' ({})",
                        row.badge_id, row.display_name
                    ),
                ));
                continue;
            };

            debug!(line = row.line, verify_type = ?row.type_code, employee_id = employee.id, "Importing punch");
            let punch = PunchEvent {
                employee_id: employee.id,
                subject_id: row.badge_id,
                timestamp,
                direction: PunchDirection::from_code(row.status_code),
                device_id: None,
            };
            match self.punch_log.record_punch(&punch).await {
                Ok(true) => summary.saved_count += 1,
                Ok(false) => summary.duplicate_count += 1,
                Err(e) => {
                    summary
                        .errors
                        .push(ImportError::at_line(row.line, format!("could not be saved ({})", e)));
                    continue;
                }
            }

            let day = timestamp.date();
            spans
                .entry(employee.id)
                .and_modify(|(from, to)| {
                    *from = (*from).min(day);
                    *to = (*to).max(day);
                })
                .or_insert((day, day));
        }

        let strategy = ReconciliationStrategy::FirstLastSeen;
        for (employee_id, (from, to)) in spans {
            let punches = match self.punch_log.punches_between(employee_id, from, to).await {
                Ok(p) => p,
                Err(e) => {
                    summary.errors.push(ImportError::general(format!(
                        "could not load punches for employee {} ({})",
                        employee_id, e
                    )));
                    continue;
                }
            };

            for ((_, date), day_punches) in strategy.group(punches, self.policy.night_shift_max_span) {
                let outcome = match strategy.summarize(&day_punches) {
                    Ok(day) => self.save_day(employee_id, date, &day, AttendanceSource::Csv).await,
                    Err(e) => Err(e.to_string()),
                };
                match outcome {
                    Ok(_) => summary.days_reconciled += 1,
                    Err(reason) => summary.errors.push(ImportError::general(format!(
                        "attendance for employee {} on {} was not saved ({})",
                        employee_id, date, reason
                    ))),
                }
            }
        }

        info!(
            saved = summary.saved_count,
            duplicates = summary.duplicate_count,
            days = summary.days_reconciled,
            errors = summary.errors.len(),
            "CSV attendance import finished"
        );
        Ok(summary)
    }

    pub async fn record_manual_attendance(
        &self,
        input: ManualAttendance,
    ) -> Result<DailyAttendance, ServiceError> {
        if input.time_out < input.time_in {
            return Err(ServiceError::Validation(
                "time_out cannot be before time_in".to_string(),
            ));
        }
        if self
            .employees
            .resolve_by_internal_id(input.employee_id)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!("employee {}", input.employee_id)));
        }

        let time_in = input.date.and_time(input.time_in);
        let time_out = input.date.and_time(input.time_out);
        let seconds = (time_out - time_in).num_seconds();
        let hours_worked = (Decimal::from(seconds) / dec!(3600))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        let row = DailyAttendanceUpsert {
            employee_id: input.employee_id,
            date: input.date,
            time_in: Some(time_in),
            time_out: Some(time_out),
            hours_worked,
            is_night_shift: false,
            source: AttendanceSource::Manual,
            status: self.policy.status_for(Some(time_in), hours_worked),
            remarks: input.remarks.filter(|r| !r.trim().is_empty()),
        };
        let saved = self.attendance.upsert_daily(&row).await?;
        info!(employee_id = saved.employee_id, date = %saved.date, "Manual attendance recorded");
        Ok(saved)
    }

    pub async fn list_attendance(
        &self,
        filter: &AttendanceFilter,
    ) -> Result<Vec<DailyAttendance>, ServiceError> {
        Ok(self.attendance.list_daily(filter).await?)
    }

    async fn save_day(
        &self,
        employee_id: u64,
        date: NaiveDate,
        day: &DaySummary,
        source: AttendanceSource,
    ) -> Result<DailyAttendance, String> {
        let row = DailyAttendanceUpsert {
            employee_id,
            date,
            time_in: Some(day.time_in),
            time_out: Some(day.time_out),
            hours_worked: day.hours_worked,
            is_night_shift: day.is_night_shift,
            source,
            status: self.policy.status_for(Some(day.time_in), day.hours_worked),
            remarks: None,
        };
        self.attendance
            .upsert_daily(&row)
            .await
            .map_err(|e| e.to_string())
    }
}
