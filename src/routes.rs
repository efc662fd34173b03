use crate::{
    api::{attendance, overtime},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

fn build_limiter(requests_per_min: u32) -> anyhow::Result<Governor<PeerIpKeyExtractor, NoOpMiddleware>> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        (60_000 / requests_per_min as u64).max(1)
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("invalid rate limit of {} per minute", requests_per_min))?;
    Ok(Governor::new(&cfg))
}

/// Built once at startup and shared by every worker.
pub fn protected_limiter(config: &Config) -> anyhow::Result<Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>> {
    Ok(Arc::new(build_limiter(config.rate_protected_per_min)?))
}

pub fn configure(
    cfg: &mut web::ServiceConfig,
    config: &Config,
    limiter: Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>,
) {
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(limiter)
            .service(
                web::scope("/attendance")
                    // /attendance
                    .service(web::resource("").route(web::get().to(attendance::list_attendance)))
                    // /attendance/devices/{device_id}/sync
                    .service(
                        web::resource("/devices/{device_id}/sync")
                            .route(web::post().to(attendance::sync_device)),
                    )
                    .service(web::resource("/events").route(web::post().to(attendance::ingest_events)))
                    .service(web::resource("/import").route(web::post().to(attendance::import_csv)))
                    .service(web::resource("/manual").route(web::post().to(attendance::record_manual))),
            )
            .service(
                web::scope("/overtime")
                    // /overtime
                    .service(
                        web::resource("")
                            .route(web::post().to(overtime::create_overtime))
                            .route(web::get().to(overtime::list_overtime)),
                    )
                    // /overtime/status, registered before /{id} so it is not read as an id
                    .service(
                        web::resource("/status")
                            .route(web::put().to(overtime::bulk_transition_overtime)),
                    )
                    .service(web::resource("/{id}").route(web::get().to(overtime::get_overtime)))
                    .service(
                        web::resource("/{id}/status")
                            .route(web::put().to(overtime::transition_overtime)),
                    ),
            ),
    );
}
