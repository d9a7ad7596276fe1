//! The policy document: tiers, their operations, and global settings.
//!
//! This is the unit that gets sealed and persisted. It is a plain typed
//! aggregate; the engine that challenges the operator lives in `gate`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ObsGuardError;
use crate::hasher;

/// The four privilege tiers.
///
/// Ordered from least to most sensitive, but there is no inheritance: each
/// tier has its own operation set and its own password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityTier {
    ReadOnly,
    Standard,
    Destructive,
    Admin,
}

impl SecurityTier {
    pub const ALL: [SecurityTier; 4] = [
        SecurityTier::ReadOnly,
        SecurityTier::Standard,
        SecurityTier::Destructive,
        SecurityTier::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "read_only",
            Self::Standard => "standard",
            Self::Destructive => "destructive",
            Self::Admin => "admin",
        }
    }

    /// Whether a confirmation prompt applies to this tier.
    pub fn requires_confirmation(&self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

impl fmt::Display for SecurityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preset setup profiles. Each one names the tiers it puts behind a
/// password; every other tier is left unrestricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityProfile {
    Basic,
    Standard,
    Advanced,
    Admin,
    Enterprise,
}

impl SecurityProfile {
    pub const ALL: [SecurityProfile; 5] = [
        SecurityProfile::Basic,
        SecurityProfile::Standard,
        SecurityProfile::Advanced,
        SecurityProfile::Admin,
        SecurityProfile::Enterprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::Advanced => "advanced",
            Self::Admin => "admin",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn protected_tiers(&self) -> &'static [SecurityTier] {
        match self {
            Self::Basic => &[],
            Self::Standard => &[SecurityTier::Standard],
            Self::Advanced => &[SecurityTier::Standard, SecurityTier::Destructive],
            Self::Admin | Self::Enterprise => &[
                SecurityTier::Standard,
                SecurityTier::Destructive,
                SecurityTier::Admin,
            ],
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Basic => "read-only user, no tier passwords",
            Self::Standard => "archive and restore behind a password",
            Self::Advanced => "standard and destructive tiers protected",
            Self::Admin => "full management, every privileged tier protected",
            Self::Enterprise => "organisation-wide setup, every privileged tier protected",
        }
    }
}

impl fmt::Display for SecurityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityProfile {
    type Err = ObsGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| {
                ObsGuardError::Configuration(format!(
                    "unknown security profile '{s}' (expected basic, standard, advanced, admin or enterprise)"
                ))
            })
    }
}

/// Per-tier policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    /// SHA-256 hex of the tier password. `None` means unrestricted.
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub operations: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
}

impl TierPolicy {
    pub fn new<I, S>(operations: I, description: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            password_hash: None,
            operations: operations.into_iter().map(Into::into).collect(),
            description: description.into(),
        }
    }

    pub fn is_protected(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// Global gate settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    pub require_confirmation: bool,
    pub log_all_operations: bool,
    /// Seconds a loaded policy stays valid. `0` disables expiry.
    pub session_timeout: u64,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            require_confirmation: true,
            log_all_operations: true,
            session_timeout: 3600,
        }
    }
}

/// The complete, persisted policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub levels: BTreeMap<SecurityTier, TierPolicy>,
    #[serde(default)]
    pub settings: PolicySettings,
}

impl Default for PolicyDocument {
    /// Every tier unrestricted, with the stock operation sets.
    fn default() -> Self {
        let levels = BTreeMap::from([
            (
                SecurityTier::ReadOnly,
                TierPolicy::new(
                    ["list", "search", "download"],
                    "Read-only operations (list, search, download)",
                ),
            ),
            (
                SecurityTier::Standard,
                TierPolicy::new(
                    ["archive", "warm", "restore"],
                    "Standard operations (archive, restore, change storage class)",
                ),
            ),
            (
                SecurityTier::Destructive,
                TierPolicy::new(
                    ["delete", "purge"],
                    "Destructive operations (delete objects, purge buckets)",
                ),
            ),
            (
                SecurityTier::Admin,
                TierPolicy::new(
                    ["create_bucket", "delete_bucket", "manage_permissions"],
                    "Administrative operations (bucket management)",
                ),
            ),
        ]);
        Self {
            levels,
            settings: PolicySettings::default(),
        }
    }
}

impl PolicyDocument {
    /// A document with no tiers at all. Every operation resolves to an
    /// unrestricted `ReadOnly`.
    pub fn empty() -> Self {
        Self {
            levels: BTreeMap::new(),
            settings: PolicySettings::default(),
        }
    }

    /// Parse a document from JSON and check its invariants.
    pub fn from_json(json: &str) -> Result<Self, ObsGuardError> {
        let document: Self = serde_json::from_str(json)
            .map_err(|e| ObsGuardError::Configuration(format!("malformed policy document: {e}")))?;
        document.validate()?;
        Ok(document)
    }

    /// Reject documents where one operation is claimed by two tiers.
    pub fn validate(&self) -> Result<(), ObsGuardError> {
        let mut seen: BTreeMap<&str, SecurityTier> = BTreeMap::new();
        for (tier, policy) in &self.levels {
            for op in &policy.operations {
                if let Some(previous) = seen.insert(op.as_str(), *tier) {
                    return Err(ObsGuardError::Configuration(format!(
                        "operation '{op}' is assigned to both {previous} and {tier}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// The tier governing `operation`; unmapped operations are `ReadOnly`.
    pub fn resolve_tier(&self, operation: &str) -> SecurityTier {
        self.levels
            .iter()
            .find(|(_, policy)| policy.operations.contains(operation))
            .map(|(tier, _)| *tier)
            .unwrap_or(SecurityTier::ReadOnly)
    }

    /// The policy for `tier`, if the document configures it.
    pub fn tier(&self, tier: SecurityTier) -> Option<&TierPolicy> {
        self.levels.get(&tier)
    }

    /// The policy for `tier`, inserting an empty one if missing.
    pub fn tier_mut(&mut self, tier: SecurityTier) -> &mut TierPolicy {
        self.levels.entry(tier).or_default()
    }

    pub fn is_protected(&self, tier: SecurityTier) -> bool {
        self.tier(tier).is_some_and(TierPolicy::is_protected)
    }

    /// Hash and store `password` for `tier`, or clear it with `None`.
    pub fn set_password(&mut self, tier: SecurityTier, password: Option<&str>) {
        self.tier_mut(tier).password_hash = password.map(hasher::hash_password);
    }
}
