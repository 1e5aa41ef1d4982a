//! Fingerprints and the last-success manifest for incremental builds.
//!
//! A [`Fingerprint`] is the change-detection token for one source file:
//! SHA-256 of its bytes plus its size and modification time. Two fingerprints
//! are equal only when all three match, so touching a file is enough to mark
//! it changed even when its bytes are identical.
//!
//! ## Manifest
//!
//! The [`FingerprintManifest`] records, per source path, the fingerprint that
//! was last generated successfully and the output it produced. It is a JSON
//! file at `<deploy_path>/.hyde-manifest.json`, so it travels with the deploy
//! directory and a fresh `hyde gen` process picks up where the last one left
//! off.
//!
//! A resource is *current* when:
//! 1. The manifest holds an entry for its source path
//! 2. The recorded fingerprint equals the resource's fingerprint
//! 3. The recorded layout dependencies and output path equal the resource's
//! 4. Content and layouts only: it was generated under the same render
//!    settings (see [`Config::render_settings`](crate::config::Config::render_settings))
//! 5. The recorded output file (if any) still exists on disk
//!
//! Deleting the deploy directory, or the manifest file, forces a full rebuild.

use crate::tree::Resource;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Name of the manifest file within the deploy directory.
pub const MANIFEST_FILENAME: &str = ".hyde-manifest.json";

/// Version of the manifest format. Bump this to invalidate all existing
/// manifests when the format or fingerprint computation changes.
const MANIFEST_VERSION: u32 = 2;

/// Change-detection token for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// SHA-256 of the file contents, hex encoded.
    pub hash: String,
    pub size: u64,
    pub mtime_secs: u64,
    pub mtime_nanos: u32,
}

impl Fingerprint {
    /// Fingerprint from already-read bytes and the file's metadata.
    pub fn new(bytes: &[u8], metadata: &Metadata) -> Self {
        let (mtime_secs, mtime_nanos) = mtime_of(metadata);
        Self {
            hash: hash_bytes(bytes),
            size: metadata.len(),
            mtime_secs,
            mtime_nanos,
        }
    }

    /// Whether size and mtime still match, i.e. the hash can be reused
    /// without reading the file again.
    pub fn same_stat(&self, metadata: &Metadata) -> bool {
        let (secs, nanos) = mtime_of(metadata);
        self.size == metadata.len() && self.mtime_secs == secs && self.mtime_nanos == nanos
    }
}

fn mtime_of(metadata: &Metadata) -> (u64, u32) {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| (d.as_secs(), d.subsec_nanos()))
        .unwrap_or_default()
}

/// SHA-256 hash of a byte slice, returned as a hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// What the manifest remembers about one source path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub fingerprint: Fingerprint,
    /// Output path relative to the deploy directory; `None` for layouts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Render settings the output was produced under.
    #[serde(default)]
    pub settings: String,
}

/// On-disk record of the last successful generation, keyed by source path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintManifest {
    pub version: u32,
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl FingerprintManifest {
    /// Create an empty manifest (first build, or after a reset).
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Load from the deploy directory. Returns an empty manifest if the
    /// file doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn load(deploy_dir: &Path) -> Self {
        let content = match std::fs::read_to_string(manifest_path(deploy_dir)) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("Ignoring unreadable build manifest: {e}");
                return Self::empty();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            log::debug!(
                "Build manifest version {} != {}, starting fresh",
                manifest.version,
                MANIFEST_VERSION
            );
            return Self::empty();
        }
        manifest
    }

    /// Save to the deploy directory.
    pub fn save(&self, deploy_dir: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(manifest_path(deploy_dir), json)
    }

    pub fn get(&self, source: &str) -> Option<&ManifestEntry> {
        self.entries.get(source)
    }

    /// Whether `resource` was last generated from exactly its current
    /// fingerprint, dependencies, and output path under `settings`, and its
    /// output is still on disk.
    pub fn is_current(&self, resource: &Resource, settings: &str, deploy_dir: &Path) -> bool {
        let Some(entry) = self.entries.get(&resource.source) else {
            return false;
        };
        entry.fingerprint == resource.fingerprint
            && entry.output == resource.output
            && entry.depends_on == resource.depends_on
            && (!resource.requires_processing() || entry.settings == settings)
            && entry
                .output
                .as_ref()
                .is_none_or(|output| deploy_dir.join(output).is_file())
    }

    /// Record a successful generation, returning the entry it replaces.
    pub fn record(&mut self, resource: &Resource, settings: &str) -> Option<ManifestEntry> {
        self.entries.insert(
            resource.source.clone(),
            ManifestEntry {
                fingerprint: resource.fingerprint.clone(),
                output: resource.output.clone(),
                depends_on: resource.depends_on.clone(),
                settings: settings.to_string(),
            },
        )
    }

    /// Forget a source so the next run regenerates it.
    pub fn forget(&mut self, source: &str) -> Option<ManifestEntry> {
        self.entries.remove(source)
    }

    /// Drop every entry whose source no longer passes `keep`, returning the
    /// dropped entries.
    pub fn prune(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<ManifestEntry> {
        let gone: Vec<String> = self
            .entries
            .keys()
            .filter(|source| !keep(source))
            .cloned()
            .collect();
        gone.iter()
            .filter_map(|source| self.entries.remove(source))
            .collect()
    }
}

/// Resolve the manifest path for a deploy directory.
pub fn manifest_path(deploy_dir: &Path) -> PathBuf {
    deploy_dir.join(MANIFEST_FILENAME)
}
