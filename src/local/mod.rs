//! Local deployment state.
//!
//! Stores everything in a `.corpus/` directory within the project:
//! - `state.sqlite` - plans, tenants, quotas, projects, catalog rows
//! - `blobs/` - image bytes (content-addressed)

mod blobs;
mod config;
pub mod db;
mod documents;
mod images;
pub mod models;

pub use blobs::{BlobStorage, ImageStorage, StoredImage};
pub use config::LocalConfig;
pub use db::LocalDb;
pub use documents::{DocumentService, QueryResult};
pub use images::{ImageResult, ImageService, IngestedImage};

use std::path::{Path, PathBuf};

/// The name of the state directory.
pub const DATA_DIR_NAME: &str = ".corpus";

/// Find the `.corpus/` directory by walking up from the given path.
pub fn find_data_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let data_dir = current.join(DATA_DIR_NAME);
        if data_dir.is_dir() {
            return Some(data_dir);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Get the state directory for the current working directory.
pub fn get_data_dir() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| find_data_root(&cwd))
}
