//! The object-storage seam.
//!
//! obsguard authorizes storage calls but does not implement a network
//! client. Anything that can list, transition, restore, download and delete
//! objects plugs in through [`StorageClient`].

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ObsGuardError;

/// Storage classes an object can be transitioned between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageClass {
    Standard,
    Warm,
    Cold,
}

impl StorageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Warm => "WARM",
            Self::Cold => "COLD",
        }
    }

    /// The gate operation that moves objects into this class.
    pub fn transition_operation(&self) -> &'static str {
        match self {
            Self::Cold => "archive",
            Self::Warm | Self::Standard => "warm",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StorageClass {
    type Err = ObsGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STANDARD" => Ok(Self::Standard),
            "WARM" => Ok(Self::Warm),
            "COLD" => Ok(Self::Cold),
            other => Err(ObsGuardError::Configuration(format!(
                "unknown storage class '{other}'"
            ))),
        }
    }
}

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub storage_class: StorageClass,
    pub last_modified: DateTime<Utc>,
}

/// One page of a listing. `next_marker` is set while more pages remain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub objects: Vec<ObjectSummary>,
    pub next_marker: Option<String>,
}

/// Operations the manager needs from a storage backend.
///
/// Failures should be reported as [`ObsGuardError::StorageOperation`].
pub trait StorageClient {
    fn list_buckets(&mut self) -> Result<Vec<String>, ObsGuardError>;

    fn list_objects(
        &mut self,
        bucket: &str,
        prefix: &str,
        marker: Option<&str>,
        max_keys: u32,
    ) -> Result<ObjectPage, ObsGuardError>;

    /// Rewrite an object in place with a new storage class.
    fn set_storage_class(
        &mut self,
        bucket: &str,
        key: &str,
        class: StorageClass,
    ) -> Result<(), ObsGuardError>;

    /// Start restoring an archived object for `days` using `tier`
    /// (e.g. `Expedited`, `Standard`).
    fn restore_object(
        &mut self,
        bucket: &str,
        key: &str,
        days: u32,
        tier: &str,
    ) -> Result<(), ObsGuardError>;

    fn download_object(&mut self, bucket: &str, key: &str, dest: &Path)
        -> Result<(), ObsGuardError>;

    fn delete_object(&mut self, bucket: &str, key: &str) -> Result<(), ObsGuardError>;
}
