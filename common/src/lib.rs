//! Data model shared by the prices service and its clients.

pub mod model;
