//! Program catalog.
//!
//! The catalog is built once at startup from a directory of program images.
//! Each image is loaded into a throwaway core to learn its embedded name.
//! Position in the catalog is the `index` clients pass to `SELECT_GAME`.

use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::core::CoreFactory;

/// Errors raised while building the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read program directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read program image {path}: {source}")]
    ReadImage {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A named program image.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub name: String,
    pub image: Arc<[u8]>,
}

/// Immutable, ordered list of loadable programs.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Loads every program image in `dir`, in file name order.
    ///
    /// Files the core cannot load are skipped with a warning. When two images
    /// share a name, the later one replaces the earlier image but keeps the
    /// earlier position.
    ///
    /// # Arguments
    ///
    /// * `dir` - Directory holding the program images.
    /// * `factory` - Source of throwaway cores used to read program names.
    pub fn load_dir(dir: impl AsRef<Path>, factory: &dyn CoreFactory) -> Result<Self, CatalogError> {
        let dir = dir.as_ref();
        let read_dir = fs::read_dir(dir).map_err(|source| CatalogError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|source| CatalogError::ReadDir {
                path: dir.to_path_buf(),
                source,
            })?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut catalog = Catalog::default();
        for path in paths {
            let image = fs::read(&path).map_err(|source| CatalogError::ReadImage {
                path: path.clone(),
                source,
            })?;

            let mut core = factory.create();
            match core.load(&image, None) {
                Ok(name) => catalog.insert(name, image),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        info!("Loaded {} roms: {:?}", catalog.len(), catalog.names());
        Ok(catalog)
    }

    /// Adds a program, replacing the image of an existing entry with the same name.
    pub fn insert(&mut self, name: String, image: Vec<u8>) {
        let image: Arc<[u8]> = image.into();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.name == name) {
            warn!("Duplicate program name {:?}, replacing earlier image", name);
            existing.image = image;
        } else {
            self.entries.push(CatalogEntry { name, image });
        }
    }

    pub fn get(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Program names in selection order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}
