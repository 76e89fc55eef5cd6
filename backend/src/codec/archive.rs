//! ZIP handling for uploads and exports. Everything stays in memory.

use crate::errors::ServiceError;
use std::io::{Cursor, Write};
use zip::read::ZipFile;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// A decoded upload. Members are decompressed lazily, one at a time, through
/// `open`.
pub struct UploadedArchive<'a> {
    zip: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> UploadedArchive<'a> {
    pub fn decode(bytes: &'a [u8]) -> Result<Self, ServiceError> {
        let zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ServiceError::ArchiveFormat(e.to_string()))?;
        Ok(UploadedArchive { zip })
    }

    pub fn len(&self) -> usize {
        self.zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zip.len() == 0
    }

    /// Member names in archive order.
    pub fn names(&mut self) -> Result<Vec<String>, ServiceError> {
        (0..self.zip.len())
            .map(|i| {
                self.zip
                    .by_index_raw(i)
                    .map(|entry| entry.name().to_string())
                    .map_err(|e| ServiceError::ArchiveFormat(e.to_string()))
            })
            .collect()
    }

    /// Rejects archives holding anything but `.csv` members, including
    /// directories and archives with no members at all.
    pub fn ensure_only_csv(&mut self) -> Result<(), ServiceError> {
        if self.is_empty() {
            return Err(ServiceError::UnexpectedArchiveContents(
                "archive holds no csv file".to_string(),
            ));
        }
        match self.names()?.iter().find(|name| !name.ends_with(".csv")) {
            Some(name) => Err(ServiceError::UnexpectedArchiveContents(format!(
                "`{}` is not a csv file",
                name
            ))),
            None => Ok(()),
        }
    }

    /// Opens the member at `index` for streaming reads.
    pub fn open(&mut self, index: usize) -> Result<ZipFile<'_>, ServiceError> {
        self.zip
            .by_index(index)
            .map_err(|e| ServiceError::ArchiveFormat(e.to_string()))
    }
}

/// Wraps `content` into a single-entry archive under `name`.
pub fn encode(name: &str, content: &[u8]) -> Result<Vec<u8>, ServiceError> {
    let mut buffer: Vec<u8> = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);
        zip.start_file(name, options).map_err(encoding_error)?;
        zip.write_all(content).map_err(encoding_error)?;
        zip.finish().map_err(encoding_error)?;
    }
    Ok(buffer)
}

fn encoding_error(e: impl std::fmt::Display) -> ServiceError {
    ServiceError::Encoding(e.to_string())
}
