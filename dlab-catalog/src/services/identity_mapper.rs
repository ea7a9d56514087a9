//! Anonymized patient identities
//!
//! Maps `source:originalName` to a display identifier "Patient N". The mapping
//! is append-only: once persisted an entry never changes. New entries are
//! numbered after a random shuffle so that numbering leaks nothing about
//! directory order.

use crate::error::{CatalogError, CatalogResult};
use crate::store::CatalogStorage;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

static FIRST_NUMBER: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"\d+").expect("static regex"));

/// First integer embedded in a patient identifier
pub fn patient_number(id: &str) -> Option<u64> {
    FIRST_NUMBER.find(id).and_then(|m| m.as_str().parse().ok())
}

/// Order identifiers by embedded number; identifiers without one sort last
pub fn compare_patient_ids(a: &str, b: &str) -> Ordering {
    match (patient_number(a), patient_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Persisted `source:originalName → "Patient N"` associations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityMapping {
    entries: BTreeMap<String, String>,
}

impl IdentityMapping {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number following the highest one in use
    fn next_number(&self) -> u64 {
        self.entries
            .values()
            .filter_map(|id| patient_number(id))
            .max()
            .map_or(1, |n| n + 1)
    }

    /// Number `keys` in the given order, starting after the highest in use
    fn append(&mut self, keys: Vec<String>) {
        let mut next = self.next_number();
        for key in keys {
            self.entries.insert(key, format!("Patient {}", next));
            next += 1;
        }
    }

    pub fn to_json(&self) -> CatalogResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CatalogError::Internal(format!("Failed to serialize identity mapping: {}", e)))
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Resolves and persists anonymized identities
pub struct IdentityMapper<'a> {
    storage: &'a dyn CatalogStorage,
}

impl<'a> IdentityMapper<'a> {
    pub fn new(storage: &'a dyn CatalogStorage) -> Self {
        Self { storage }
    }

    /// Persisted mapping, or `None` when absent or unparseable
    pub fn load(&self) -> CatalogResult<Option<IdentityMapping>> {
        let text = self
            .storage
            .read_mapping()
            .map_err(|e| CatalogError::Storage(format!("Failed to read identity mapping: {}", e)))?;

        let Some(text) = text else {
            return Ok(None);
        };

        match IdentityMapping::from_json(&text) {
            Ok(mapping) => Ok(Some(mapping)),
            Err(e) => {
                warn!("Identity mapping unreadable, regenerating: {}", e);
                Ok(None)
            }
        }
    }

    /// Mapping covering every key in `keys`
    pub fn resolve<'k, I>(&self, keys: I) -> CatalogResult<IdentityMapping>
    where
        I: IntoIterator<Item = &'k str>,
    {
        self.resolve_with_rng(keys, &mut rand::thread_rng())
    }

    /// As [`resolve`](Self::resolve), with an explicit random source
    ///
    /// Existing entries are returned untouched. Keys the mapping lacks are
    /// shuffled and appended after the highest number in use; the mapping is
    /// written only when something was added.
    pub fn resolve_with_rng<'k, I, R>(&self, keys: I, rng: &mut R) -> CatalogResult<IdentityMapping>
    where
        I: IntoIterator<Item = &'k str>,
        R: Rng + ?Sized,
    {
        let existing = self.load()?;
        let regenerated = existing.is_none();
        let mut mapping = existing.unwrap_or_default();

        let missing: BTreeSet<&str> = keys.into_iter().filter(|k| !mapping.contains(k)).collect();
        if missing.is_empty() {
            return Ok(mapping);
        }

        let mut missing: Vec<String> = missing.into_iter().map(str::to_string).collect();
        missing.shuffle(rng);
        let added = missing.len();
        mapping.append(missing);

        self.storage
            .write_mapping(&mapping.to_json()?)
            .map_err(|e| CatalogError::Storage(format!("Failed to write identity mapping: {}", e)))?;

        if regenerated {
            info!(patients = added, "Created identity mapping");
        } else {
            info!(added, total = mapping.len(), "Extended identity mapping");
        }

        Ok(mapping)
    }
}
