use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;

mod api;
mod attendance;
mod auth;
mod config;
mod db;
mod directory;
mod docs;
mod model;
mod routes;

use attendance::AttendanceService;
use attendance::clock::SystemClock;
use attendance::store::{AttendanceStore, MemoryAttendanceStore, MySqlAttendanceStore};
use config::{Config, StoreBackend};
use db::init_db;
use directory::{CachedDirectory, MySqlEmployeeDirectory};

use crate::docs::ApiDoc;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Attendance service is running"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env().context("invalid configuration")?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url, config.db_max_connections)
        .await
        .context("failed to connect to database")?;

    let settings = config.attendance;
    let store: Arc<dyn AttendanceStore> = match settings.store {
        StoreBackend::MySql => Arc::new(MySqlAttendanceStore::new(pool.clone())),
        StoreBackend::Memory => {
            warn!("Attendance records are kept in memory and lost on restart");
            Arc::new(MemoryAttendanceStore::new())
        }
    };
    let directory = CachedDirectory::new(
        MySqlEmployeeDirectory::new(pool.clone()),
        settings.directory_cache_ttl,
    );
    let clock = SystemClock::new(settings.utc_offset);

    let service = Data::new(AttendanceService::new(
        store,
        Arc::new(directory),
        Arc::new(clock),
        settings.settings(),
    ));

    match settings.absent_sweep_at {
        Some(at) => attendance::sweep::spawn_daily_sweep(service.clone(), at),
        None => info!("Daily absent sweep disabled"),
    }

    // Clone values for the closure (avoid move issues)
    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    info!(%server_addr, store = %settings.store, "Listening");

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(config.clone()))
            .app_data(service.clone())
            .service(index)
            // Protected attendance routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
