//! Persisted state behind an injected interface
//!
//! The catalog engine never touches paths directly: it reads and writes the
//! identity mapping and the catalog stores as text through `CatalogStorage`.
//! `FileStorage` keeps them as files in the root folder; `InMemoryStorage`
//! keeps them in a map.

use crate::error::{CatalogError, CatalogResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Identity mapping file name
pub const MAPPING_FILE: &str = "identity_mapping.json";
/// Main (template) store file name
pub const MAIN_STORE_FILE: &str = "catalog_main.csv";
const USER_STORE_PREFIX: &str = "catalog_user_";
const STORE_SUFFIX: &str = ".csv";
/// Hex digits of the name digest kept in a lossy user file name
const USER_DIGEST_LEN: usize = 16;

fn is_safe_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Which catalog store an operation addresses
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreTarget {
    /// Global template; labels always 0
    Main,
    /// One user's label overlay
    User(String),
}

impl StoreTarget {
    /// Overlay of `user`; rejects an empty identity
    pub fn user(user: &str) -> CatalogResult<Self> {
        let user = user.trim();
        if user.is_empty() {
            return Err(CatalogError::Validation("user identity must not be empty".to_string()));
        }
        Ok(StoreTarget::User(user.to_string()))
    }

    /// Persisted file name, distinct for every distinct target
    ///
    /// A user name made only of `[A-Za-z0-9_-]` is used as is. Any other
    /// name is sanitized and suffixed with `.` plus a digest of the raw
    /// name; safe names never contain `.`, so the two forms cannot meet.
    pub fn file_name(&self) -> String {
        match self {
            StoreTarget::Main => MAIN_STORE_FILE.to_string(),
            StoreTarget::User(user) => {
                if user.chars().all(is_safe_name_char) {
                    return format!("{}{}{}", USER_STORE_PREFIX, user, STORE_SUFFIX);
                }
                let safe: String = user
                    .chars()
                    .map(|c| if is_safe_name_char(c) { c } else { '_' })
                    .collect();
                let digest = format!("{:x}", Sha256::digest(user.as_bytes()));
                format!(
                    "{}{}.{}{}",
                    USER_STORE_PREFIX,
                    safe,
                    &digest[..USER_DIGEST_LEN],
                    STORE_SUFFIX
                )
            }
        }
    }
}

impl fmt::Display for StoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreTarget::Main => f.write_str("main"),
            StoreTarget::User(user) => write!(f, "user:{}", user),
        }
    }
}

/// True for every file name this crate persists
fn is_catalog_file(name: &str) -> bool {
    name == MAPPING_FILE
        || name == MAIN_STORE_FILE
        || (name.starts_with(USER_STORE_PREFIX) && name.ends_with(STORE_SUFFIX))
}

/// Text-level persistence of the mapping and the stores
///
/// Each write replaces the whole document. Implementations make a single
/// write atomic; nothing spans several documents.
pub trait CatalogStorage: Send + Sync {
    /// `Ok(None)` when no mapping has been persisted
    fn read_mapping(&self) -> io::Result<Option<String>>;

    fn write_mapping(&self, contents: &str) -> io::Result<()>;

    /// `Ok(None)` when the store has never been written
    fn read_store(&self, target: &StoreTarget) -> io::Result<Option<String>>;

    fn write_store(&self, target: &StoreTarget, contents: &str) -> io::Result<()>;

    fn store_exists(&self, target: &StoreTarget) -> io::Result<bool> {
        Ok(self.read_store(target)?.is_some())
    }

    /// Remove the mapping and every store, returning what was removed
    ///
    /// Not transactional: a failure part-way leaves the rest in place.
    fn clear_all(&self) -> io::Result<Vec<String>>;
}

/// Files in one root folder
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_file(&self, name: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.root.join(name)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write through a temp file in the same directory, then rename
    fn write_file(&self, name: &str, contents: &str) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.flush()?;
        tmp.persist(self.root.join(name)).map_err(|e| e.error)?;
        tracing::debug!(file = %name, bytes = contents.len(), "Persisted");
        Ok(())
    }
}

impl CatalogStorage for FileStorage {
    fn read_mapping(&self) -> io::Result<Option<String>> {
        self.read_file(MAPPING_FILE)
    }

    fn write_mapping(&self, contents: &str) -> io::Result<()> {
        self.write_file(MAPPING_FILE, contents)
    }

    fn read_store(&self, target: &StoreTarget) -> io::Result<Option<String>> {
        self.read_file(&target.file_name())
    }

    fn write_store(&self, target: &StoreTarget, contents: &str) -> io::Result<()> {
        self.write_file(&target.file_name(), contents)
    }

    fn clear_all(&self) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_file() && is_catalog_file(&name) {
                names.push(name);
            }
        }
        names.sort();

        let mut removed = Vec::with_capacity(names.len());
        for name in names {
            fs::remove_file(self.root.join(&name))?;
            tracing::info!(file = %name, "Removed");
            removed.push(name);
        }
        Ok(removed)
    }
}

/// Documents held in memory, keyed by file name
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    documents: Mutex<HashMap<String, String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.documents
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "in-memory storage poisoned"))
    }
}

impl CatalogStorage for InMemoryStorage {
    fn read_mapping(&self) -> io::Result<Option<String>> {
        Ok(self.lock()?.get(MAPPING_FILE).cloned())
    }

    fn write_mapping(&self, contents: &str) -> io::Result<()> {
        self.lock()?.insert(MAPPING_FILE.to_string(), contents.to_string());
        Ok(())
    }

    fn read_store(&self, target: &StoreTarget) -> io::Result<Option<String>> {
        Ok(self.lock()?.get(&target.file_name()).cloned())
    }

    fn write_store(&self, target: &StoreTarget, contents: &str) -> io::Result<()> {
        self.lock()?.insert(target.file_name(), contents.to_string());
        Ok(())
    }

    fn clear_all(&self) -> io::Result<Vec<String>> {
        let mut documents = self.lock()?;
        let mut removed: Vec<String> = documents.drain().map(|(name, _)| name).collect();
        removed.sort();
        Ok(removed)
    }
}
