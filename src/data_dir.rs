use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Directory holding the persisted index snapshot.
///
/// Layout:
/// - `vectors.redb`: the vector index artifact
/// - `chunks.json`: ordered chunk metadata
/// - `images.json`: page-keyed image descriptors
/// - `images/`: lazily extracted image bytes
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The MANUALRAG_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/manualrag/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var("MANUALRAG_DATA_DIR") {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("manualrag")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config("could not determine XDG data home directory".into())
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|e| Error::Config(format!("cannot create data dir {}: {e}", root.display())))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn vectors_db(&self) -> PathBuf {
        self.root.join("vectors.redb")
    }

    pub fn chunks_file(&self) -> PathBuf {
        self.root.join("chunks.json")
    }

    pub fn images_file(&self) -> PathBuf {
        self.root.join("images.json")
    }

    /// Directory for extracted image bytes; created on first use.
    pub fn images_dir(&self) -> Result<PathBuf> {
        let path = self.root.join("images");
        std::fs::create_dir_all(&path)
            .map_err(|e| Error::Config(format!("cannot create {}: {e}", path.display())))?;
        Ok(path)
    }
}
