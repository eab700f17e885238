use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Directory layout rooted at a single portable home directory.
///
/// ```text
/// <root>/data/          application data
/// <root>/data/db/       SQLite database
/// <root>/data/exports/  JSON and CSV exports
/// ```
#[derive(Debug, Clone)]
pub struct PortablePathManager {
    root: PathBuf,
}

impl PortablePathManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn db_dir(&self) -> PathBuf {
        self.data_dir().join("db")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir().join("exports")
    }

    /// Default SQLite file inside the db directory.
    pub fn db_file(&self) -> PathBuf {
        self.db_dir().join("intentforge.sqlite")
    }

    /// Creates the data, db and exports directories if they do not exist.
    pub fn init(&self) -> Result<(), std::io::Error> {
        for dir in [self.data_dir(), self.db_dir(), self.exports_dir()] {
            if !dir.exists() {
                info!("Creating directory: {:?}", dir);
                fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }

    /// Writes an export artifact into the exports directory and returns its path.
    pub fn write_export(&self, filename: &str, contents: &[u8]) -> Result<PathBuf, std::io::Error> {
        let path = self.exports_dir().join(filename);
        fs::write(&path, contents)?;
        info!("Wrote export {:?} ({} bytes)", path, contents.len());
        Ok(path)
    }
}
