mod codec;
mod config;
mod database;
mod errors;
mod services;

use crate::config::{Config, DatabaseConfig};
use crate::services::prices::UploadSettings;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use env_logger::Env;
use log::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env().context("invalid configuration")?;
    let backend = match &config.database {
        DatabaseConfig::Postgres(pg) => format!("postgres at {}:{}", pg.host, pg.port),
        DatabaseConfig::Sqlite(path) => format!("sqlite file {}", path.display()),
    };

    // Database clients block; keep them off the async runtime.
    let db_config = config.database.clone();
    let (gateway, stored) = tokio::task::spawn_blocking(move || {
        let gateway = database::open(&db_config)?;
        let stored = gateway.count()?;
        Ok::<_, errors::DatabaseError>((gateway, stored))
    })
    .await
    .context("database connect task failed")?
    .with_context(|| format!("cannot connect to {}", backend))?;
    info!(
        "Successfully connected to database ({}), prices table holds {} rows",
        backend, stored
    );

    let gateway = web::Data::from(gateway);
    let upload = UploadSettings {
        max_bytes: config.max_upload_bytes,
    };

    info!("Server running at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(gateway.clone())
            .app_data(web::Data::new(upload.clone()))
            .service(services::prices::configure_routes())
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
