//! Handler for `GET /api/v0/prices`: the whole table as `data.zip`.
//!
//! The CSV and the archive are built in memory and sent in one body, so a
//! failure at any stage yields a plain `500` and never a truncated download.

use crate::codec::{archive, rows};
use crate::database::Gateway;
use crate::errors::ServiceError;
use actix_web::http::header;
use actix_web::{web, HttpResponse, ResponseError};
use log::{error, info};

/// Name of the CSV file inside the exported archive.
pub const EXPORT_MEMBER: &str = "data.csv";

const ATTACHMENT: &str = "attachment; filename=\"data.zip\"";

pub async fn process(gateway: web::Data<dyn Gateway>) -> HttpResponse {
    match export_prices(gateway).await {
        Ok(bytes) => HttpResponse::Ok()
            .content_type("application/zip")
            .insert_header((header::CONTENT_DISPOSITION, ATTACHMENT))
            .body(bytes),
        Err(e) => {
            error!("Export failed: {}", e);
            e.error_response()
        }
    }
}

async fn export_prices(gateway: web::Data<dyn Gateway>) -> Result<Vec<u8>, ServiceError> {
    let gateway = gateway.into_inner();
    tokio::task::spawn_blocking(move || build_export(gateway.as_ref()))
        .await
        .map_err(|e| ServiceError::Internal(format!("export task failed: {}", e)))?
}

fn build_export(gateway: &dyn Gateway) -> Result<Vec<u8>, ServiceError> {
    let stored = gateway.rows()?;
    let csv = rows::write_csv(&stored)?;
    let bytes = archive::encode(EXPORT_MEMBER, &csv)?;
    info!("Exported {} rows ({} bytes zipped)", stored.len(), bytes.len());
    Ok(bytes)
}
