use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Column titles of the CSV files exchanged with the service, in file order.
pub const CSV_COLUMNS: [&str; 5] = ["id", "name", "category", "price", "create_date"];

/// Date layout used for `create_date` in CSV files.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single priced item as stored in the `prices` table.
///
/// Rows parsed from an upload carry no `id`: the database assigns one on
/// insert. Rows read back for an export always have it.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PriceRow {
    pub id: Option<i64>,
    pub name: String,
    pub category: String,
    /// Decimal text, kept verbatim so no precision is lost on the way to a
    /// `numeric` column.
    pub price: String,
    pub create_date: NaiveDate,
}

impl PriceRow {
    /// Same row without its database identity. Used to compare rows across
    /// an export/import cycle, where ids are renumbered.
    pub fn without_id(&self) -> PriceRow {
        PriceRow {
            id: None,
            ..self.clone()
        }
    }
}
