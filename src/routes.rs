use crate::{
    api::attendance,
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let requests_per_min = requests_per_min.max(1);
        let per_ms = (60_000 / requests_per_min as u64).max(1);
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .expect("non-zero rate limit quota");
        Governor::new(&cfg)
    }

    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/attendance")
                    // /attendance
                    .service(web::resource("").route(web::get().to(attendance::list_records)))
                    .service(
                        web::resource("/check-in").route(web::post().to(attendance::check_in)),
                    )
                    .service(
                        web::resource("/check-out").route(web::post().to(attendance::check_out)),
                    )
                    .service(web::resource("/today").route(web::get().to(attendance::today)))
                    .service(web::resource("/stats").route(web::get().to(attendance::stats)))
                    .service(
                        web::resource("/absent-sweep")
                            .route(web::post().to(attendance::absent_sweep)),
                    ),
            ),
    );
}

// API REQUEST
//  └─ Authorization: Bearer access_token (issued by the HR auth service)
