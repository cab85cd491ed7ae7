//! Program image loading
//!
//! Reads an ELF file into memory and checks that it parses as an ELF
//! object. The bytes are kept so [`super::dwarf_reader`] can borrow its
//! debug sections without reading the file twice.

use crate::error::{DestraError, Result};
use object::{BinaryFormat, Object};
use std::fs;
use std::path::{Path, PathBuf};

/// An ELF file held in memory
#[derive(Debug, Clone)]
pub struct ElfImage {
    path: PathBuf,
    data: Vec<u8>,
}

impl ElfImage {
    /// Read and validate the image at `path`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DestraError::ImageNotFound(path.to_path_buf()));
        }

        let data = fs::read(path).map_err(|e| {
            DestraError::InvalidImage(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::from_bytes(path, data)
    }

    /// Validate bytes already in memory
    pub fn from_bytes(path: impl Into<PathBuf>, data: Vec<u8>) -> Result<Self> {
        let path = path.into();
        {
            let file = object::File::parse(data.as_slice())
                .map_err(|e| DestraError::InvalidImage(format!("failed to parse ELF: {}", e)))?;
            if file.format() != BinaryFormat::Elf {
                return Err(DestraError::InvalidImage(format!(
                    "{} is a {:?} object, not ELF",
                    path.display(),
                    file.format()
                )));
            }
            tracing::debug!(
                "Loaded {} ({} bytes, {:?}, {})",
                path.display(),
                data.len(),
                file.architecture(),
                if file.is_little_endian() { "little-endian" } else { "big-endian" }
            );
        }
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
