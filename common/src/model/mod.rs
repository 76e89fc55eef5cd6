pub mod price;
pub mod summary;
