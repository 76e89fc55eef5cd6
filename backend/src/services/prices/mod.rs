//! # Prices Service Module
//!
//! Bulk import and export of the `prices` table, both served from a single
//! path:
//!
//! - `POST /api/v0/prices`: multipart upload whose `file` field is a ZIP
//!   archive of CSV files. Every row is inserted in one transaction and the
//!   response reports `total_items`, `total_categories` and `total_price`.
//! - `GET /api/v0/prices`: downloads the whole table as `data.zip`, holding a
//!   single `data.csv`.
//!
//! Any other method gets `405 Method Not Allowed`.

mod export;
mod import;

use actix_web::web::{get, post, resource, route};
use actix_web::{HttpResponse, Resource};

/// The path of the prices resource.
pub const API_PATH: &str = "/api/v0/prices";

/// Upload limits shared with the import handler as `web::Data`.
#[derive(Clone, Debug)]
pub struct UploadSettings {
    pub max_bytes: usize,
}

/// Configures and returns the Actix `Resource` for `/api/v0/prices`.
pub fn configure_routes() -> Resource {
    resource(API_PATH)
        .route(post().to(import::process))
        .route(get().to(export::process))
        .default_service(route().to(method_not_allowed))
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().body("Method not allowed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::archive::{self, UploadedArchive};
    use crate::database::{Gateway, SqliteGateway};
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, web, App};
    use common::model::price::PriceRow;
    use common::model::summary::ImportSummary;
    use std::io::{Cursor, Read, Write};
    use std::sync::Arc;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    const HEADER: &str = "id,name,category,price,create_date\n";
    const BOUNDARY: &str = "----prices-test-boundary";

    fn gateway() -> Arc<SqliteGateway> {
        let gateway = SqliteGateway::open_in_memory().unwrap();
        gateway.ensure_schema().unwrap();
        Arc::new(gateway)
    }

    macro_rules! prices_app {
        ($gateway:expr, $max_bytes:expr) => {{
            let shared: Arc<dyn Gateway> = $gateway;
            test::init_service(
                App::new()
                    .app_data(web::Data::from(shared))
                    .app_data(web::Data::new(UploadSettings {
                        max_bytes: $max_bytes,
                    }))
                    .service(configure_routes()),
            )
            .await
        }};
    }

    fn zip_of(members: &[(&str, &str)]) -> Vec<u8> {
        let mut buffer = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
            for (name, contents) in members {
                zip.start_file(*name, FileOptions::default()).unwrap();
                zip.write_all(contents.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buffer
    }

    fn multipart(field: &str, payload: &[u8]) -> (String, Vec<u8>) {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"{field}\"; filename=\"data.zip\"\r\n\
                 Content-Type: application/zip\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={BOUNDARY}"), body)
    }

    fn upload(field: &str, payload: &[u8]) -> test::TestRequest {
        let (content_type, body) = multipart(field, payload);
        test::TestRequest::post()
            .uri(API_PATH)
            .insert_header((header::CONTENT_TYPE, content_type))
            .set_payload(body)
    }

    fn three_rows() -> String {
        format!(
            "{HEADER}1,A,fruit,1.50,2023-01-01\n2,B,veg,2.00,2023-01-02\n3,C,fruit,3.00,2023-01-03\n"
        )
    }

    fn unzip_export(bytes: &[u8]) -> String {
        let mut archive = UploadedArchive::decode(bytes).unwrap();
        assert_eq!(archive.names().unwrap(), vec!["data.csv".to_string()]);
        let mut csv = String::new();
        archive.open(0).unwrap().read_to_string(&mut csv).unwrap();
        csv
    }

    fn sorted_without_ids(rows: Vec<PriceRow>) -> Vec<PriceRow> {
        let mut rows: Vec<PriceRow> = rows.iter().map(PriceRow::without_id).collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    #[actix_web::test]
    async fn import_reports_aggregates() {
        let gateway = gateway();
        let app = prices_app!(gateway.clone(), 1 << 20);

        let req = upload("file", &zip_of(&[("data.csv", &three_rows())])).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let summary: ImportSummary = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(summary.total_items, 3);
        assert_eq!(summary.total_categories, 2);
        assert!((summary.total_price - 6.5).abs() < 1e-9);
        assert_eq!(gateway.count().unwrap(), 3);
    }

    #[actix_web::test]
    async fn second_import_counts_its_own_rows_but_whole_table_totals() {
        let gateway = gateway();
        let app = prices_app!(gateway.clone(), 1 << 20);
        let req = upload("file", &zip_of(&[("data.csv", &three_rows())])).to_request();
        let first = test::call_service(&app, req).await;
        assert_eq!(first.status(), StatusCode::OK);

        let csv = format!("{HEADER}9,D,bakery,4.00,2023-02-01\n");
        let req = upload("file", &zip_of(&[("more.csv", &csv)])).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let summary: ImportSummary = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(summary.total_items, 1);
        assert_eq!(summary.total_categories, 3);
        assert!((summary.total_price - 10.5).abs() < 1e-9);
    }

    #[actix_web::test]
    async fn every_csv_member_is_imported() {
        let gateway = gateway();
        let app = prices_app!(gateway.clone(), 1 << 20);
        let first = format!("{HEADER}1,A,fruit,1.50,2023-01-01\n");
        let second = format!("{HEADER}1,B,veg,2.00,2023-01-02\n");

        let req = upload("file", &zip_of(&[("a.csv", &first), ("b.csv", &second)])).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(gateway.count().unwrap(), 2);
    }

    #[actix_web::test]
    async fn failing_row_rolls_back_the_whole_import() {
        let gateway = gateway();
        let app = prices_app!(gateway.clone(), 1 << 20);
        let csv = format!(
            "{HEADER}1,A,fruit,1.50,2023-01-01\n2,B,veg,2.00,02/01/2023\n3,C,fruit,3.00,2023-01-03\n"
        );

        let req = upload("file", &zip_of(&[("data.csv", &csv)])).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains("line 3"));
        assert_eq!(gateway.count().unwrap(), 0);
    }

    #[actix_web::test]
    async fn short_row_fails_and_leaves_table_unchanged() {
        let gateway = gateway();
        let app = prices_app!(gateway.clone(), 1 << 20);
        let req = upload("file", &zip_of(&[("data.csv", &three_rows())])).to_request();
        let seeded = test::call_service(&app, req).await;
        assert_eq!(seeded.status(), StatusCode::OK);

        let csv = format!("{HEADER}4,D,bakery,4.00,2023-02-01\nE,bakery,5.00,2023-02-02\n");
        let req = upload("file", &zip_of(&[("data.csv", &csv)])).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(gateway.count().unwrap(), 3);
    }

    #[actix_web::test]
    async fn non_zip_upload_is_an_archive_error() {
        let gateway = gateway();
        let app = prices_app!(gateway.clone(), 1 << 20);

        let req = upload("file", b"this is not a zip archive").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).starts_with("Error: Unable to read zip content"));
        assert_eq!(gateway.count().unwrap(), 0);
    }

    #[actix_web::test]
    async fn non_csv_member_aborts_before_any_insert() {
        let gateway = gateway();
        let app = prices_app!(gateway.clone(), 1 << 20);
        let archive = zip_of(&[("data.csv", &three_rows()), ("notes.txt", "hello")]);

        let req = upload("file", &archive).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(gateway.count().unwrap(), 0);
    }

    #[actix_web::test]
    async fn missing_file_field_is_a_bad_request() {
        let app = prices_app!(gateway(), 1 << 20);
        let req = upload("attachment", b"irrelevant").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn oversized_upload_is_a_bad_request() {
        let app = prices_app!(gateway(), 16);
        let req = upload("file", &zip_of(&[("data.csv", &three_rows())])).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn empty_table_exports_header_only() {
        let app = prices_app!(gateway(), 1 << 20);

        let req = test::TestRequest::get().uri(API_PATH).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/zip"
        );
        assert_eq!(
            resp.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"data.zip\""
        );
        let body = test::read_body(resp).await;
        assert_eq!(unzip_export(&body), HEADER);
    }

    #[actix_web::test]
    async fn export_then_reimport_reproduces_rows() {
        let source = gateway();
        let app = prices_app!(source.clone(), 1 << 20);
        let req = upload("file", &zip_of(&[("data.csv", &three_rows())])).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri(API_PATH).to_request();
        let exported = test::read_body(test::call_service(&app, req).await).await;
        assert_eq!(unzip_export(&exported).lines().count(), 4);

        let target = gateway();
        let other = prices_app!(target.clone(), 1 << 20);
        let req = upload("file", &exported).to_request();
        let resp = test::call_service(&other, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        assert_eq!(
            sorted_without_ids(source.rows().unwrap()),
            sorted_without_ids(target.rows().unwrap())
        );
    }

    #[actix_web::test]
    async fn export_archive_matches_stored_rows() {
        let gateway = gateway();
        let app = prices_app!(gateway.clone(), 1 << 20);
        let csv = format!("{HEADER}1,\"Pear, green\",fruit,2.25,2024-12-31\n");
        let req = upload("file", &zip_of(&[("data.csv", &csv)])).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let id = gateway.rows().unwrap()[0].id.unwrap();
        let req = test::TestRequest::get().uri(API_PATH).to_request();
        let body = test::read_body(test::call_service(&app, req).await).await;
        assert_eq!(
            unzip_export(&body),
            format!("{HEADER}{id},\"Pear, green\",fruit,2.25,2024-12-31\n")
        );
    }

    #[actix_web::test]
    async fn other_methods_are_not_allowed() {
        let app = prices_app!(gateway(), 1 << 20);
        for req in [
            test::TestRequest::put().uri(API_PATH).to_request(),
            test::TestRequest::delete().uri(API_PATH).to_request(),
        ] {
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        }
    }

    #[actix_web::test]
    async fn export_member_is_a_single_csv() {
        let bytes = archive::encode(export::EXPORT_MEMBER, HEADER.as_bytes()).unwrap();
        assert_eq!(unzip_export(&bytes), HEADER);
    }
}
