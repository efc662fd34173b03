use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::ToSchema;

use crate::{
    api::roles_for,
    auth::auth::AuthUser,
    config::Config,
    model::overtime::{OvertimeRequest, OvertimeStatus},
    repo::mysql::MySqlStore,
    service::{
        error::ServiceError,
        overtime::{CreateOvertime, OvertimeWorkflow},
        ports::SystemClock,
        roles::NameFallbackRoles,
    },
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusChange {
    #[schema(example = "manager_approved")]
    pub status: OvertimeStatus,
    /// Required when rejecting.
    #[schema(example = "Approved for quarter-end")]
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkStatusChange {
    #[schema(example = json!([4, 7, 9]))]
    pub ids: Vec<u64>,
    #[schema(example = "approved")]
    pub status: OvertimeStatus,
    pub remarks: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct OvertimeListResponse {
    pub data: Vec<OvertimeRequest>,
    #[schema(example = 3)]
    pub total: usize,
}

/// Evaluates `$body` with `$wf` bound to a workflow over MySQL and the configured role source.
macro_rules! with_workflow {
    ($pool:expr, $config:expr, |$wf:ident| $body:expr) => {{
        let store = MySqlStore::new($pool.get_ref().clone());
        let fallback = NameFallbackRoles::new(&store, &store);
        let roles = roles_for(&store, &fallback, $config.role_strategy);
        let clock = SystemClock;
        let $wf = OvertimeWorkflow::new(
            &store,
            roles,
            &store,
            &store,
            &clock,
            $config.default_ot_rate,
        );
        $body
    }};
}

/// Create Overtime Request
#[utoipa::path(
    post,
    path = "/api/overtime",
    request_body = CreateOvertime,
    responses(
        (status = 201, description = "Overtime request created", body = OvertimeRequest),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Unknown employee")
    ),
    tag = "Overtime",
    security(("bearer_auth" = []))
)]
pub async fn create_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<CreateOvertime>,
) -> Result<HttpResponse, ServiceError> {
    let created = with_workflow!(pool, config, |workflow| {
        workflow.create(auth.user_id, payload.into_inner()).await?
    });
    Ok(HttpResponse::Created().json(created))
}

/// List Overtime Requests visible to the caller
#[utoipa::path(
    get,
    path = "/api/overtime",
    responses(
        (status = 200, description = "Visible overtime requests", body = OvertimeListResponse)
    ),
    tag = "Overtime",
    security(("bearer_auth" = []))
)]
pub async fn list_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ServiceError> {
    let data = with_workflow!(pool, config, |workflow| {
        workflow.list_visible(auth.user_id).await?
    });
    Ok(HttpResponse::Ok().json(OvertimeListResponse {
        total: data.len(),
        data,
    }))
}

/// Get Overtime Request
#[utoipa::path(
    get,
    path = "/api/overtime/{id}",
    params(("id", Path, description = "Overtime request id")),
    responses(
        (status = 200, description = "Overtime request", body = OvertimeRequest),
        (status = 404, description = "Not found or not visible to the caller", body = Object, example = json!({
            "message": "overtime request 9 not found"
        }))
    ),
    tag = "Overtime",
    security(("bearer_auth" = []))
)]
pub async fn get_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ServiceError> {
    let id = path.into_inner();
    let request = with_workflow!(pool, config, |workflow| {
        workflow.get_visible(id, auth.user_id).await?
    });
    Ok(HttpResponse::Ok().json(request))
}

/// Approve or reject an Overtime Request
#[utoipa::path(
    put,
    path = "/api/overtime/{id}/status",
    params(("id", Path, description = "Overtime request id")),
    request_body = StatusChange,
    responses(
        (status = 200, description = "Updated overtime request", body = OvertimeRequest),
        (status = 400, description = "Rejection without remarks"),
        (status = 403, description = "Transition not allowed for the caller"),
        (status = 404, description = "Unknown request"),
        (status = 409, description = "Request changed concurrently")
    ),
    tag = "Overtime",
    security(("bearer_auth" = []))
)]
pub async fn transition_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
    payload: web::Json<StatusChange>,
) -> Result<HttpResponse, ServiceError> {
    let id = path.into_inner();
    let change = payload.into_inner();
    let updated = with_workflow!(pool, config, |workflow| {
        workflow
            .transition(id, auth.user_id, change.status, change.remarks.as_deref())
            .await?
    });
    Ok(HttpResponse::Ok().json(updated))
}

/// Approve or reject many Overtime Requests
#[utoipa::path(
    put,
    path = "/api/overtime/status",
    request_body = BulkStatusChange,
    responses(
        (status = 200, description = "Per-request outcome", body = crate::service::overtime::BulkTransitionSummary),
        (status = 400, description = "No ids, or rejection without remarks")
    ),
    tag = "Overtime",
    security(("bearer_auth" = []))
)]
pub async fn bulk_transition_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<BulkStatusChange>,
) -> Result<HttpResponse, ServiceError> {
    let change = payload.into_inner();
    if change.ids.is_empty() {
        return Err(ServiceError::Validation("ids must not be empty".to_string()));
    }
    let summary = with_workflow!(pool, config, |workflow| {
        workflow
            .bulk_transition(&change.ids, auth.user_id, change.status, change.remarks.as_deref())
            .await?
    });
    Ok(HttpResponse::Ok().json(summary))
}
