use crate::api::attendance::{AttendanceListResponse, PunchBatch};
use crate::api::overtime::{BulkStatusChange, OvertimeListResponse, StatusChange};
use crate::model::attendance::{AttendanceSource, AttendanceStatus, DailyAttendance, RawPunch};
use crate::model::overtime::{OvertimeRequest, OvertimeStatus};
use crate::service::csv_import::ImportError;
use crate::service::overtime::{BulkFailure, BulkTransitionSummary, CreateOvertime};
use crate::service::reconcile::{
    CsvImportSummary, FailedDay, ManualAttendance, ReconcileSummary, SkippedEvent,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Attendance API",
        version = "1.0.0",
        description = r#"
## Attendance & Overtime

This API turns raw clock-in/clock-out punches into **daily attendance** and runs the
**overtime approval** workflow.

### 🔹 Key Features
- **Attendance Reconciliation**
  - Pull punches from biometric devices, accept pushed punch batches, import CSV exports
  - Manual entry for missed punches, paginated daily attendance listing
- **Overtime Approval**
  - Two-level approval (department manager, then HRD), superadmin fast-track
  - Role-scoped listing and bulk approve/reject

### 🔐 Security
All endpoints require a **JWT Bearer** access token. Roles are resolved per request
from the role tables, so token contents never grant permissions on their own.

### 📦 Response Format
- Batch endpoints always answer with a summary; single failures never abort a batch
- Errors are `{"message": "..."}` with 400/403/404/409/502 status codes

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::sync_device,
        crate::api::attendance::ingest_events,
        crate::api::attendance::import_csv,
        crate::api::attendance::record_manual,
        crate::api::attendance::list_attendance,

        crate::api::overtime::create_overtime,
        crate::api::overtime::list_overtime,
        crate::api::overtime::get_overtime,
        crate::api::overtime::transition_overtime,
        crate::api::overtime::bulk_transition_overtime
    ),
    components(
        schemas(
            RawPunch,
            PunchBatch,
            AttendanceSource,
            AttendanceStatus,
            DailyAttendance,
            AttendanceListResponse,
            ManualAttendance,
            SkippedEvent,
            FailedDay,
            ReconcileSummary,
            ImportError,
            CsvImportSummary,
            OvertimeStatus,
            OvertimeRequest,
            CreateOvertime,
            StatusChange,
            BulkStatusChange,
            BulkFailure,
            BulkTransitionSummary,
            OvertimeListResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Punch reconciliation and daily attendance APIs"),
        (name = "Overtime", description = "Overtime request and approval APIs"),
    )
)]
pub struct ApiDoc;
