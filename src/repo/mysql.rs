use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, MySqlPool};

use crate::model::{
    attendance::{
        AttendanceFilter, DailyAttendance, DailyAttendanceUpsert, PunchDirection, PunchEvent,
    },
    department::DepartmentManagerAssignment,
    employee::Employee,
    overtime::{NewOvertimeRequest, OvertimeRequest, OvertimeStatus},
    role::Role,
    user::User,
};
use crate::service::{
    overtime::VisibilityScope,
    ports::{
        AttendanceStore, EmployeeLookup, ManagerAssignments, OvertimeStore, PunchLogStore,
        RoleLookup, StoreError, UserDirectory,
    },
};

/// Every storage port backed by one MySQL pool.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Str(String),
    Date(NaiveDate),
}

const EMPLOYEE_SELECT: &str = r#"
    SELECT e.id, e.employee_code, e.first_name, e.last_name, d.name AS department, e.status
    FROM employees e
    LEFT JOIN departments d ON d.id = e.department_id
"#;

const DAILY_SELECT: &str = r#"
    SELECT id, employee_id, date, time_in, time_out, hours_worked, is_night_shift,
           source, status, remarks, version
    FROM daily_attendance
"#;

const OVERTIME_SELECT: &str = r#"
    SELECT o.id, o.employee_id, o.date, o.start_time, o.end_time, o.total_hours,
           o.rate_multiplier, o.reason, o.status, o.created_by, o.dept_manager_id,
           o.dept_approved_by, o.dept_approved_at, o.dept_remarks,
           o.hrd_approved_by, o.hrd_approved_at, o.hrd_remarks,
           d.name AS employee_department, o.version
    FROM overtime_requests o
    JOIN employees e ON e.id = o.employee_id
    LEFT JOIN departments d ON d.id = e.department_id
"#;

#[derive(FromRow)]
struct DailyAttendanceRow {
    id: u64,
    employee_id: u64,
    date: NaiveDate,
    time_in: Option<NaiveDateTime>,
    time_out: Option<NaiveDateTime>,
    hours_worked: Decimal,
    is_night_shift: bool,
    source: String,
    status: String,
    remarks: Option<String>,
    version: u32,
}

impl TryFrom<DailyAttendanceRow> for DailyAttendance {
    type Error = StoreError;

    fn try_from(row: DailyAttendanceRow) -> Result<Self, Self::Error> {
        Ok(DailyAttendance {
            id: row.id,
            employee_id: row.employee_id,
            date: row.date,
            time_in: row.time_in,
            time_out: row.time_out,
            hours_worked: row.hours_worked,
            is_night_shift: row.is_night_shift,
            source: row
                .source
                .parse()
                .map_err(|_| StoreError::Backend(format!("unknown attendance source '{}'", row.source)))?,
            status: row
                .status
                .parse()
                .map_err(|_| StoreError::Backend(format!("unknown attendance status '{}'", row.status)))?,
            remarks: row.remarks,
            version: row.version,
        })
    }
}

#[derive(FromRow)]
struct PunchRow {
    employee_id: u64,
    badge_id: String,
    punched_at: NaiveDateTime,
    direction: Option<i8>,
    device_id: String,
}

impl From<PunchRow> for PunchEvent {
    fn from(row: PunchRow) -> Self {
        PunchEvent {
            employee_id: row.employee_id,
            subject_id: row.badge_id,
            timestamp: row.punched_at,
            direction: PunchDirection::from_code(row.direction.map(i32::from)),
            device_id: Some(row.device_id).filter(|d| !d.is_empty()),
        }
    }
}

#[derive(FromRow)]
struct OvertimeRow {
    id: u64,
    employee_id: u64,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    total_hours: Decimal,
    rate_multiplier: Decimal,
    reason: String,
    status: String,
    created_by: u64,
    dept_manager_id: Option<u64>,
    dept_approved_by: Option<u64>,
    dept_approved_at: Option<DateTime<Utc>>,
    dept_remarks: Option<String>,
    hrd_approved_by: Option<u64>,
    hrd_approved_at: Option<DateTime<Utc>>,
    hrd_remarks: Option<String>,
    employee_department: Option<String>,
    version: u32,
}

impl TryFrom<OvertimeRow> for OvertimeRequest {
    type Error = StoreError;

    fn try_from(row: OvertimeRow) -> Result<Self, Self::Error> {
        let status: OvertimeStatus = row
            .status
            .parse()
            .map_err(|_| StoreError::Backend(format!("unknown overtime status '{}'", row.status)))?;
        Ok(OvertimeRequest {
            id: row.id,
            employee_id: row.employee_id,
            date: row.date,
            start_time: row.start_time,
            end_time: row.end_time,
            total_hours: row.total_hours,
            rate_multiplier: row.rate_multiplier,
            reason: row.reason,
            status,
            created_by: row.created_by,
            dept_manager_id: row.dept_manager_id,
            dept_approved_by: row.dept_approved_by,
            dept_approved_at: row.dept_approved_at,
            dept_remarks: row.dept_remarks,
            hrd_approved_by: row.hrd_approved_by,
            hrd_approved_at: row.hrd_approved_at,
            hrd_remarks: row.hrd_remarks,
            employee_department: row.employee_department,
            version: row.version,
        })
    }
}

#[async_trait]
impl EmployeeLookup for MySqlStore {
    async fn resolve_by_badge_id(&self, badge_id: &str) -> Result<Option<Employee>, StoreError> {
        let sql = format!("{} WHERE e.employee_code = ?", EMPLOYEE_SELECT);
        Ok(sqlx::query_as::<_, Employee>(&sql)
            .bind(badge_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn resolve_by_internal_id(&self, id: u64) -> Result<Option<Employee>, StoreError> {
        let sql = format!("{} WHERE e.id = ?", EMPLOYEE_SELECT);
        Ok(sqlx::query_as::<_, Employee>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn resolve_by_user(&self, user_id: u64) -> Result<Option<Employee>, StoreError> {
        let sql = format!(
            "{} JOIN users u ON u.employee_id = e.id WHERE u.id = ?",
            EMPLOYEE_SELECT
        );
        Ok(sqlx::query_as::<_, Employee>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl RoleLookup for MySqlStore {
    async fn has_role(&self, actor_id: u64, role: Role) -> Result<bool, StoreError> {
        let names = sqlx::query_scalar::<_, String>("SELECT role FROM user_roles WHERE user_id = ?")
            .bind(actor_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(names.iter().filter_map(|n| Role::from_name(n)).any(|r| r == role))
    }

    async fn managed_departments(&self, actor_id: u64) -> Result<BTreeSet<String>, StoreError> {
        let rows = sqlx::query_as::<_, DepartmentManagerAssignment>(
            "SELECT manager_id, department FROM department_managers WHERE manager_id = ?",
        )
        .bind(actor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|a| a.department).collect())
    }
}

#[async_trait]
impl UserDirectory for MySqlStore {
    async fn find_user(&self, user_id: u64) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, username, email, employee_id, is_active FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl ManagerAssignments for MySqlStore {
    async fn managers_of(&self, department: &str) -> Result<Vec<u64>, StoreError> {
        Ok(sqlx::query_scalar::<_, u64>(
            "SELECT manager_id FROM department_managers WHERE department = ? ORDER BY manager_id",
        )
        .bind(department)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn upsert_daily(&self, row: &DailyAttendanceUpsert) -> Result<DailyAttendance, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO daily_attendance
                (employee_id, date, time_in, time_out, hours_worked, is_night_shift,
                 source, status, remarks, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            ON DUPLICATE KEY UPDATE
                time_in = VALUES(time_in),
                time_out = VALUES(time_out),
                hours_worked = VALUES(hours_worked),
                is_night_shift = VALUES(is_night_shift),
                source = VALUES(source),
                status = VALUES(status),
                remarks = VALUES(remarks),
                version = version + 1
            "#,
        )
        .bind(row.employee_id)
        .bind(row.date)
        .bind(row.time_in)
        .bind(row.time_out)
        .bind(row.hours_worked)
        .bind(row.is_night_shift)
        .bind(row.source.as_ref())
        .bind(row.status.as_ref())
        .bind(row.remarks.as_deref())
        .execute(&mut *tx)
        .await?;

        let sql = format!("{} WHERE employee_id = ? AND date = ?", DAILY_SELECT);
        let saved = sqlx::query_as::<_, DailyAttendanceRow>(&sql)
            .bind(row.employee_id)
            .bind(row.date)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        saved.try_into()
    }

    async fn find_daily(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<DailyAttendance>, StoreError> {
        let sql = format!("{} WHERE employee_id = ? AND date = ?", DAILY_SELECT);
        sqlx::query_as::<_, DailyAttendanceRow>(&sql)
            .bind(employee_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?
            .map(DailyAttendance::try_from)
            .transpose()
    }

    async fn list_daily(&self, filter: &AttendanceFilter) -> Result<Vec<DailyAttendance>, StoreError> {
        let mut where_sql = String::from(" WHERE 1=1");
        let mut args: Vec<FilterValue> = Vec::new();

        if let Some(employee_id) = filter.employee_id {
            where_sql.push_str(" AND employee_id = ?");
            args.push(FilterValue::U64(employee_id));
        }
        if let Some(from) = filter.from {
            where_sql.push_str(" AND date >= ?");
            args.push(FilterValue::Date(from));
        }
        if let Some(to) = filter.to {
            where_sql.push_str(" AND date <= ?");
            args.push(FilterValue::Date(to));
        }

        let sql = format!(
            "{}{} ORDER BY date DESC, employee_id LIMIT ? OFFSET ?",
            DAILY_SELECT, where_sql
        );
        let mut q = sqlx::query_as::<_, DailyAttendanceRow>(&sql);
        for arg in args {
            q = match arg {
                FilterValue::U64(v) => q.bind(v),
                FilterValue::Str(s) => q.bind(s),
                FilterValue::Date(d) => q.bind(d),
            };
        }

        let limit = if filter.limit == 0 { u32::MAX } else { filter.limit };
        q.bind(limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(DailyAttendance::try_from)
            .collect()
    }
}

#[async_trait]
impl PunchLogStore for MySqlStore {
    async fn record_punch(&self, punch: &PunchEvent) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT IGNORE INTO attendance_logs
                (employee_id, badge_id, punched_at, direction, device_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(punch.employee_id)
        .bind(&punch.subject_id)
        .bind(punch.timestamp)
        .bind(punch.direction.code().map(|c| c as i8))
        .bind(punch.device_id.as_deref().unwrap_or(""))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn punches_between(
        &self,
        employee_id: u64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PunchEvent>, StoreError> {
        let start = from.and_time(NaiveTime::MIN);
        let end = (to + Duration::days(1)).and_time(NaiveTime::MIN);

        let rows = sqlx::query_as::<_, PunchRow>(
            r#"
            SELECT employee_id, badge_id, punched_at, direction, device_id
            FROM attendance_logs
            WHERE employee_id = ? AND punched_at >= ? AND punched_at < ?
            ORDER BY punched_at
            "#,
        )
        .bind(employee_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PunchEvent::from).collect())
    }
}

impl MySqlStore {
    async fn overtime_by_id(&self, id: u64) -> Result<Option<OvertimeRequest>, StoreError> {
        let sql = format!("{} WHERE o.id = ?", OVERTIME_SELECT);
        sqlx::query_as::<_, OvertimeRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(OvertimeRequest::try_from)
            .transpose()
    }
}

#[async_trait]
impl OvertimeStore for MySqlStore {
    async fn insert_overtime(&self, new: &NewOvertimeRequest) -> Result<OvertimeRequest, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO overtime_requests
                (employee_id, date, start_time, end_time, total_hours, rate_multiplier,
                 reason, status, created_by, dept_manager_id, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(new.employee_id)
        .bind(new.date)
        .bind(new.start_time)
        .bind(new.end_time)
        .bind(new.total_hours)
        .bind(new.rate_multiplier)
        .bind(&new.reason)
        .bind(OvertimeStatus::Pending.as_ref())
        .bind(new.created_by)
        .bind(new.dept_manager_id)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_id();
        self.overtime_by_id(id)
            .await?
            .ok_or_else(|| StoreError::Backend(format!("overtime request {} missing after insert", id)))
    }

    async fn find_overtime(&self, id: u64) -> Result<Option<OvertimeRequest>, StoreError> {
        self.overtime_by_id(id).await
    }

    async fn update_overtime(&self, request: &OvertimeRequest) -> Result<OvertimeRequest, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE overtime_requests
            SET status = ?,
                dept_approved_by = ?, dept_approved_at = ?, dept_remarks = ?,
                hrd_approved_by = ?, hrd_approved_at = ?, hrd_remarks = ?,
                version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(request.status.as_ref())
        .bind(request.dept_approved_by)
        .bind(request.dept_approved_at)
        .bind(request.dept_remarks.as_deref())
        .bind(request.hrd_approved_by)
        .bind(request.hrd_approved_at)
        .bind(request.hrd_remarks.as_deref())
        .bind(request.id)
        .bind(request.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionMismatch {
                entity: "overtime request",
                id: request.id,
                expected: request.version,
            });
        }

        self.overtime_by_id(request.id)
            .await?
            .ok_or_else(|| StoreError::Backend(format!("overtime request {} vanished", request.id)))
    }

    async fn list_overtime(&self, scope: &VisibilityScope) -> Result<Vec<OvertimeRequest>, StoreError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut args: Vec<FilterValue> = Vec::new();

        if !scope.all {
            conditions.push("o.created_by = ?".to_string());
            args.push(FilterValue::U64(scope.actor_id));

            if scope.include_manager_approved {
                conditions.push("o.status = ?".to_string());
                args.push(FilterValue::Str(
                    OvertimeStatus::ManagerApproved.as_ref().to_string(),
                ));
            }
            if scope.include_assigned {
                conditions.push("o.dept_manager_id = ?".to_string());
                args.push(FilterValue::U64(scope.actor_id));
            }
            if !scope.departments.is_empty() {
                let placeholders = vec!["?"; scope.departments.len()].join(", ");
                conditions.push(format!("d.name IN ({})", placeholders));
                args.extend(scope.departments.iter().cloned().map(FilterValue::Str));
            }
        }

        let where_sql = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" OR "))
        };
        let sql = format!("{}{} ORDER BY o.date DESC, o.id DESC", OVERTIME_SELECT, where_sql);

        let mut q = sqlx::query_as::<_, OvertimeRow>(&sql);
        for arg in args {
            q = match arg {
                FilterValue::U64(v) => q.bind(v),
                FilterValue::Str(s) => q.bind(s),
                FilterValue::Date(d) => q.bind(d),
            };
        }

        q.fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(OvertimeRequest::try_from)
            .collect()
    }
}
