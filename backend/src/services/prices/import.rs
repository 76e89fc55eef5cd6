//! # Price Import
//!
//! Handler for `POST /api/v0/prices`.
//!
//! ## Workflow
//!
//! 1.  **Upload**: the multipart field named `file` is read fully into memory.
//!     Other fields are ignored. A missing field, a broken stream or an upload
//!     above `UploadSettings::max_bytes` is a `400 Bad Request`.
//!
//! 2.  **Unpacking**: the bytes are opened as a ZIP archive. Every member must
//!     be a `.csv` file; anything else rejects the whole upload before a
//!     single row is written.
//!
//! 3.  **Inserting**: one transaction covers every member. The header line of
//!     each file is skipped, then every record is parsed and inserted. The
//!     first bad record or failed insert rolls the transaction back.
//!
//! 4.  **Aggregates**: after commit, the response reports how many rows this
//!     request inserted plus the distinct category count and price sum of the
//!     whole table.
//!
//! Steps 2 to 4 run on a blocking thread, since both the archive reader and
//! the database client are synchronous.

use super::UploadSettings;
use crate::codec::archive::UploadedArchive;
use crate::codec::rows::{self, RowParser};
use crate::database::{Gateway, Transaction};
use crate::errors::ServiceError;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, ResponseError};
use common::model::summary::ImportSummary;
use csv::StringRecord;
use futures_util::StreamExt;
use log::{error, info, warn};

pub async fn process(
    gateway: web::Data<dyn Gateway>,
    settings: web::Data<UploadSettings>,
    payload: Multipart,
) -> HttpResponse {
    match import_prices(gateway, &settings, payload).await {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => {
            error!("Import failed: {}", e);
            e.error_response()
        }
    }
}

async fn import_prices(
    gateway: web::Data<dyn Gateway>,
    settings: &UploadSettings,
    payload: Multipart,
) -> Result<ImportSummary, ServiceError> {
    let bytes = read_upload(payload, settings.max_bytes).await?;
    let gateway = gateway.into_inner();

    tokio::task::spawn_blocking(move || import_archive(gateway.as_ref(), &bytes))
        .await
        .map_err(|e| ServiceError::Internal(format!("import task failed: {}", e)))?
}

/// Returns the contents of the `file` field.
async fn read_upload(mut payload: Multipart, max_bytes: usize) -> Result<Vec<u8>, ServiceError> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| ServiceError::BadUpload(e.to_string()))?;
        let field_name = field
            .content_disposition()
            .and_then(|cd| cd.get_name().map(|n| n.to_string()));

        if field_name.as_deref() != Some("file") {
            continue;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| ServiceError::BadUpload(e.to_string()))?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(ServiceError::BadUpload(format!(
                    "upload is larger than {} bytes",
                    max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        return Ok(bytes);
    }

    Err(ServiceError::BadUpload(
        "multipart field `file` is missing".to_string(),
    ))
}

/// Imports every CSV member of `bytes` in a single transaction.
pub(super) fn import_archive(
    gateway: &dyn Gateway,
    bytes: &[u8],
) -> Result<ImportSummary, ServiceError> {
    let mut archive = UploadedArchive::decode(bytes)?;
    archive.ensure_only_csv()?;
    let parser = RowParser::new()?;

    let mut tx = gateway.begin()?;
    let inserted = match insert_members(&mut archive, &parser, tx.as_mut()) {
        Ok(inserted) => inserted,
        Err(e) => {
            if let Err(rollback) = tx.rollback() {
                warn!("Rollback after failed import also failed: {}", rollback);
            }
            return Err(e);
        }
    };
    tx.commit()?;

    let totals = gateway.totals()?;
    info!(
        "Imported {} rows from {} file(s); table has {} categories",
        inserted,
        archive.len(),
        totals.categories
    );

    Ok(ImportSummary {
        total_items: inserted,
        total_categories: totals.categories,
        total_price: totals.price,
    })
}

fn insert_members(
    archive: &mut UploadedArchive<'_>,
    parser: &RowParser,
    tx: &mut dyn Transaction,
) -> Result<u64, ServiceError> {
    let mut inserted = 0u64;
    let mut record = StringRecord::new();

    for (index, name) in archive.names()?.into_iter().enumerate() {
        let member = archive.open(index)?;
        let mut reader = rows::reader(member);
        rows::skip_header(&mut reader, &name);

        while reader.read_record(&mut record).map_err(rows::read_error)? {
            let row = parser.parse(&record)?;
            tx.insert(&row)?;
            inserted += 1;
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::archive;
    use crate::database::SqliteGateway;
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn gateway() -> SqliteGateway {
        let gateway = SqliteGateway::open_in_memory().unwrap();
        gateway.ensure_schema().unwrap();
        gateway
    }

    #[test]
    fn header_only_file_imports_nothing() {
        let gateway = gateway();
        let bytes = archive::encode("data.csv", b"id,name,category,price,create_date\n").unwrap();

        let summary = import_archive(&gateway, &bytes).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                total_items: 0,
                total_categories: 0,
                total_price: 0.0
            }
        );
    }

    #[test]
    fn bad_price_late_in_the_file_rolls_back_earlier_rows() {
        let gateway = gateway();
        let csv = "id,name,category,price,create_date\n\
                   1,A,fruit,1.50,2023-01-01\n\
                   2,B,veg,2.00,2023-01-02\n\
                   3,C,fruit,free,2023-01-03\n";
        let bytes = archive::encode("data.csv", csv.as_bytes()).unwrap();

        let err = import_archive(&gateway, &bytes).unwrap_err();
        assert!(matches!(err, ServiceError::PriceFormat { line: 4, .. }), "{err}");
        assert_eq!(gateway.count().unwrap(), 0);
        // the connection was released by the rollback
        assert_eq!(gateway.totals().unwrap().categories, 0);
    }

    #[test]
    fn bad_date_in_second_file_rolls_back_the_first_file() {
        let gateway = gateway();
        let first = "id,name,category,price,create_date\n\
                     1,A,fruit,1.50,2023-01-01\n\
                     2,B,veg,2.00,2023-01-02\n";
        let second = "id,name,category,price,create_date\n\
                      3,C,fruit,3.00,2023-1-03\n";
        let mut buffer = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
            zip.start_file("a.csv", FileOptions::default()).unwrap();
            zip.write_all(first.as_bytes()).unwrap();
            zip.start_file("b.csv", FileOptions::default()).unwrap();
            zip.write_all(second.as_bytes()).unwrap();
            zip.finish().unwrap();
        }

        let err = import_archive(&gateway, &buffer).unwrap_err();
        assert!(matches!(err, ServiceError::DateFormat { line: 2, .. }), "{err}");
        assert_eq!(gateway.count().unwrap(), 0);
    }

    #[test]
    fn truncated_archive_is_an_archive_error() {
        let gateway = gateway();
        let bytes = archive::encode("data.csv", b"id,name,category,price,create_date\n").unwrap();

        let err = import_archive(&gateway, &bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, ServiceError::ArchiveFormat(_)), "{err}");
    }
}
