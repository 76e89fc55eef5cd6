//! Error types shared by the import and export pipelines.
//!
//! Every failure a request can hit is a `ServiceError` variant. The variant
//! decides the HTTP status; the message becomes the plain-text body, so no
//! handler ever builds an error response by hand.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Failures raised by a `database::Gateway` implementation.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("postgres: {0}")]
    Postgres(#[from] postgres::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database handle is poisoned after a panicked request")]
    Poisoned,
    #[error("database handle is closed")]
    Closed,
    #[error("column `{column}` holds an unexpected value: {value}")]
    Decode { column: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Cant read file: {0}")]
    BadUpload(String),
    #[error("Unable to read zip content: {0}")]
    ArchiveFormat(String),
    #[error("Unexpected archive contents: {0}")]
    UnexpectedArchiveContents(String),
    #[error("Malformed row at line {line}: {detail}")]
    RowShape { line: u64, detail: String },
    #[error("Cant format date at line {line}: `{value}` is not YYYY-MM-DD")]
    DateFormat { line: u64, value: String },
    #[error("Cant read price at line {line}: `{value}` is not a decimal number")]
    PriceFormat { line: u64, value: String },
    #[error("Database failure: {0}")]
    Database(#[from] DatabaseError),
    #[error("Cant build data.zip: {0}")]
    Encoding(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::BadUpload(_)
            | ServiceError::RowShape { .. }
            | ServiceError::DateFormat { .. }
            | ServiceError::PriceFormat { .. } => StatusCode::BAD_REQUEST,
            ServiceError::ArchiveFormat(_)
            | ServiceError::UnexpectedArchiveContents(_)
            | ServiceError::Database(_)
            | ServiceError::Encoding(_)
            | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(format!("Error: {}", self))
    }
}
