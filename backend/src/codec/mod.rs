//! Encoding and decoding of the files exchanged with clients: ZIP archives
//! (`archive`) wrapping CSV files of price rows (`rows`).

pub mod archive;
pub mod rows;
