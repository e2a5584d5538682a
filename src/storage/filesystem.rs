use crate::config::StorageAreaConfig;
use crate::storage::{FileNameGenerator, StorageError, StorageResult};
use std::path::{Path, PathBuf};

/// Names tried before giving up on finding an unused store file name
const MAX_NAME_ATTEMPTS: usize = 1024;

/// A storage area: the directory holding stored objects plus its index file
///
/// The index file lives inside the directory unless configured with an
/// absolute path.
#[derive(Debug, Clone)]
pub struct StorageArea {
    root_path: PathBuf,
    index_path: PathBuf,
}

impl StorageArea {
    /// Open a storage area, creating the directory if it doesn't exist
    pub fn new<P: AsRef<Path>>(root_path: P, index_file: &str) -> StorageResult<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        if index_file.trim().is_empty() {
            return Err(StorageError::Config("index file name is empty".to_string()));
        }

        if !root_path.exists() {
            std::fs::create_dir_all(&root_path).map_err(|e| {
                StorageError::Config(format!(
                    "Failed to create storage directory '{}': {}",
                    root_path.display(),
                    e
                ))
            })?;
        } else if !root_path.is_dir() {
            return Err(StorageError::Path(format!(
                "'{}' is not a directory",
                root_path.display()
            )));
        }

        // Paths are kept as given; canonicalizing would change the file names
        // recorded in the index.
        let index_path = root_path.join(index_file);
        Ok(Self {
            root_path,
            index_path,
        })
    }

    pub fn from_config(config: &StorageAreaConfig) -> StorageResult<Self> {
        Self::new(&config.path, &config.index_file)
    }

    pub fn base_path(&self) -> &Path {
        &self.root_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Whether `path` names a file somewhere under the storage directory
    pub fn contains(&self, path: &Path) -> bool {
        match (path.canonicalize(), self.root_path.canonicalize()) {
            (Ok(path), Ok(root)) => path.starts_with(root),
            _ => false,
        }
    }

    /// A path relative to the storage directory
    pub fn subpath_str(&self, path: &str) -> PathBuf {
        self.root_path.join(path)
    }

    pub fn exists_str(&self, path: &str) -> bool {
        self.subpath_str(path).exists()
    }

    /// Pick an unused file name for a new object of the given SOP class
    pub fn new_store_file_name(
        &self,
        sop_class_uid: &str,
        generator: &mut FileNameGenerator,
    ) -> StorageResult<PathBuf> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = generator.next_name(sop_class_uid);
            if !self.exists_str(&name) {
                return Ok(self.subpath_str(&name));
            }
            tracing::debug!(%name, "store file name already taken");
        }
        Err(StorageError::NameExhausted(self.root_path.clone()))
    }

    /// Every regular file in the storage directory except the index file
    pub fn stored_files(&self) -> StorageResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.root_path)? {
            let path = entry?.path();
            if path.is_file() && path != self.index_path {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}
