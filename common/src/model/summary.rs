use serde::{Deserialize, Serialize};

/// Response body of a successful import.
///
/// `total_items` counts the rows inserted by the request itself, while
/// `total_categories` and `total_price` are computed over the whole table
/// once the import has been committed.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ImportSummary {
    pub total_items: u64,
    pub total_categories: u64,
    pub total_price: f64,
}
