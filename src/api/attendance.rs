use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::roles_for,
    auth::auth::AuthUser,
    config::Config,
    device::HttpDeviceClient,
    model::{
        attendance::{AttendanceFilter, DailyAttendance, RawPunch},
        role::Role,
    },
    repo::mysql::MySqlStore,
    service::{
        csv_import::read_rows,
        error::ServiceError,
        ports::{EmployeeLookup, RoleLookup},
        reconcile::{ManualAttendance, ReconciliationEngine},
        roles::{NameFallbackRoles, require_any},
    },
};

/// Roles allowed to push punches into the system.
const INGESTION_ROLES: [Role; 3] = [Role::Superadmin, Role::HrdManager, Role::HrdTimekeeper];

#[derive(Debug, Deserialize, ToSchema)]
pub struct PunchBatch {
    /// Recorded on every punch that does not name its own device.
    #[schema(example = "CKJY2100")]
    pub device_id: String,
    pub events: Vec<RawPunch>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AttendanceQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub employee_id: Option<u64>,
    #[param(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
}

impl AttendanceQuery {
    fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(20).clamp(1, 100)
    }

    fn to_filter(&self) -> Result<AttendanceFilter, ServiceError> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(ServiceError::Validation(
                    "from must not be after to".to_string(),
                ));
            }
        }
        Ok(AttendanceFilter {
            employee_id: self.employee_id,
            from: self.from,
            to: self.to,
            limit: self.per_page(),
            offset: (self.page() - 1) * self.per_page(),
        })
    }
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub data: Vec<DailyAttendance>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
}

/// HRD staff may list anyone. Everyone else is pinned to their own employee
/// record and may not ask for another one.
async fn scope_attendance_filter(
    roles: &dyn RoleLookup,
    employees: &dyn EmployeeLookup,
    actor_id: u64,
    mut filter: AttendanceFilter,
) -> Result<AttendanceFilter, ServiceError> {
    for role in INGESTION_ROLES {
        if roles.has_role(actor_id, role).await? {
            return Ok(filter);
        }
    }

    let own = employees
        .resolve_by_user(actor_id)
        .await?
        .ok_or_else(|| {
            ServiceError::Authorization("no employee record linked to this user".to_string())
        })?;
    match filter.employee_id {
        Some(requested) if requested != own.id => Err(ServiceError::Authorization(
            "may only list your own attendance".to_string(),
        )),
        _ => {
            filter.employee_id = Some(own.id);
            Ok(filter)
        }
    }
}

async fn require_ingestion_role(
    store: &MySqlStore,
    config: &Config,
    actor_id: u64,
) -> Result<(), ServiceError> {
    let fallback = NameFallbackRoles::new(store, store);
    let roles = roles_for(store, &fallback, config.role_strategy);
    require_any(roles, actor_id, &INGESTION_ROLES).await
}

/// Sync a biometric device
#[utoipa::path(
    post,
    path = "/api/attendance/devices/{device_id}/sync",
    params(("device_id", Path, description = "Device serial number")),
    responses(
        (status = 200, description = "Reconciliation summary", body = crate::service::reconcile::ReconcileSummary),
        (status = 403, description = "Caller may not ingest attendance"),
        (status = 502, description = "Device gateway unavailable", body = Object, example = json!({
            "message": "device gateway answered 503"
        }))
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn sync_device(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    device: web::Data<HttpDeviceClient>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let device_id = path.into_inner();
    let store = MySqlStore::new(pool.get_ref().clone());
    require_ingestion_role(&store, &config, auth.user_id).await?;

    info!(device_id, actor_id = auth.user_id, "Device sync requested");
    let policy = config.attendance_policy();
    let engine = ReconciliationEngine::new(&store, &store, &store, &policy);
    let summary = engine
        .reconcile_from_device(device.get_ref(), &device_id)
        .await?;

    Ok(HttpResponse::Ok().json(summary))
}

/// Reconcile pushed punch events
#[utoipa::path(
    post,
    path = "/api/attendance/events",
    request_body = PunchBatch,
    responses(
        (status = 200, description = "Reconciliation summary", body = crate::service::reconcile::ReconcileSummary),
        (status = 403, description = "Caller may not ingest attendance")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn ingest_events(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<PunchBatch>,
) -> Result<HttpResponse, ServiceError> {
    let store = MySqlStore::new(pool.get_ref().clone());
    require_ingestion_role(&store, &config, auth.user_id).await?;

    let batch = payload.into_inner();
    let policy = config.attendance_policy();
    let engine = ReconciliationEngine::new(&store, &store, &store, &policy);
    let summary = engine
        .reconcile_from_events(batch.events, &batch.device_id)
        .await?;

    Ok(HttpResponse::Ok().json(summary))
}

/// Import a device CSV export
#[utoipa::path(
    post,
    path = "/api/attendance/import",
    request_body(content = String, content_type = "text/csv",
        description = "Header line, then: badge id, name, timestamp, status, verify type"),
    responses(
        (status = 200, description = "Import summary", body = crate::service::reconcile::CsvImportSummary),
        (status = 400, description = "Empty upload"),
        (status = 403, description = "Caller may not ingest attendance")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn import_csv(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    body: web::Bytes,
) -> Result<HttpResponse, ServiceError> {
    let store = MySqlStore::new(pool.get_ref().clone());
    require_ingestion_role(&store, &config, auth.user_id).await?;

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ServiceError::Validation("uploaded file is empty".to_string()));
    }

    let (rows, read_errors) = read_rows(&body);
    debug!(rows = rows.len(), unreadable = read_errors.len(), "CSV upload parsed");

    let policy = config.attendance_policy();
    let engine = ReconciliationEngine::new(&store, &store, &store, &policy);
    let mut summary = engine.reconcile_from_csv_rows(rows).await?;

    let mut errors = read_errors;
    errors.append(&mut summary.errors);
    errors.sort_by_key(|e| e.line.unwrap_or(u64::MAX));
    summary.errors = errors;

    Ok(HttpResponse::Ok().json(summary))
}

/// Record attendance manually
#[utoipa::path(
    post,
    path = "/api/attendance/manual",
    request_body = ManualAttendance,
    responses(
        (status = 200, description = "Saved attendance row", body = DailyAttendance),
        (status = 400, description = "time_out before time_in"),
        (status = 403, description = "Caller may not ingest attendance"),
        (status = 404, description = "Unknown employee")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn record_manual(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<ManualAttendance>,
) -> Result<HttpResponse, ServiceError> {
    let store = MySqlStore::new(pool.get_ref().clone());
    require_ingestion_role(&store, &config, auth.user_id).await?;

    let policy = config.attendance_policy();
    let engine = ReconciliationEngine::new(&store, &store, &store, &policy);
    let saved = engine.record_manual_attendance(payload.into_inner()).await?;

    Ok(HttpResponse::Ok().json(saved))
}

/// List daily attendance
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Paginated attendance rows", body = AttendanceListResponse),
        (status = 403, description = "Caller may only list their own attendance")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn list_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    query: web::Query<AttendanceQuery>,
) -> Result<HttpResponse, ServiceError> {
    let filter = query.to_filter()?;
    let store = MySqlStore::new(pool.get_ref().clone());
    let fallback = NameFallbackRoles::new(&store, &store);
    let roles = roles_for(&store, &fallback, config.role_strategy);
    let filter = scope_attendance_filter(roles, &store, auth.user_id, filter).await?;
    debug!(actor_id = auth.user_id, employee_id = ?filter.employee_id, "Listing attendance");
    let policy = config.attendance_policy();
    let engine = ReconciliationEngine::new(&store, &store, &store, &policy);
    let data = engine.list_attendance(&filter).await?;

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        data,
        page: query.page(),
        per_page: query.per_page(),
    }))
}
