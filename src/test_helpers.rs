//! Shared test utilities for the hyde unit tests.
//!
//! [`SiteFixture`] builds a throwaway site in a temp directory and offers the
//! filesystem mutations the incremental-build tests need (write, remove,
//! touch, rewrite without changing size or mtime).
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = SiteFixture::basic().file("content/about.md", "# About");
//! let generator = Generator::new(site.config());
//! generator.generate_all().unwrap();
//! assert!(site.output("about.html").is_some());
//! ```

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use crate::cache::Fingerprint;
use crate::config::{self, Config};
use crate::tree::{Resource, ResourceKind};

pub const BASE_LAYOUT: &str =
    "<html><head><title>{{ title }}</title></head><body>{{ content }}</body></html>\n";

// =========================================================================
// Site fixture
// =========================================================================

pub struct SiteFixture {
    tmp: TempDir,
    touches: Cell<u64>,
}

impl SiteFixture {
    /// An empty site with an empty `site.yaml`.
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(config::DEFAULT_CONFIG_FILE), "").unwrap();
        Self {
            tmp,
            touches: Cell::new(0),
        }
    }

    /// `layout/base.html`, `content/index.md` using it, and one stylesheet.
    pub fn basic() -> Self {
        Self::new()
            .file("layout/base.html", BASE_LAYOUT)
            .file(
                "content/index.md",
                "+++\nlayout = \"base.html\"\n+++\n# Welcome\n\nHello.\n",
            )
            .file("media/site.css", "a{}\n")
    }

    pub fn with_config(self, yaml: &str) -> Self {
        fs::write(self.root().join(config::DEFAULT_CONFIG_FILE), yaml).unwrap();
        self
    }

    pub fn file(self, rel: &str, content: &str) -> Self {
        self.write(rel, content);
        self
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn config(&self) -> Config {
        config::load_config(self.root(), Path::new(config::DEFAULT_CONFIG_FILE)).unwrap()
    }

    pub fn deploy_dir(&self) -> PathBuf {
        self.config().deploy_dir()
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.root().join(rel)).unwrap();
    }

    /// Move a file's mtime forward without changing its bytes.
    ///
    /// Each call lands on a distinct time so repeated touches always register.
    pub fn touch(&self, rel: &str) {
        let n = self.touches.get() + 1;
        self.touches.set(n);
        let when = SystemTime::now() + Duration::from_secs(60 * n);
        set_mtime(&self.root().join(rel), when);
    }

    /// Replace a file's bytes with same-length content and restore its mtime,
    /// so only a content hash could tell the difference.
    pub fn rewrite_keeping_stat(&self, rel: &str, content: &str) {
        let path = self.root().join(rel);
        let meta = fs::metadata(&path).unwrap();
        assert_eq!(meta.len(), content.len() as u64, "rewrite must keep the size");
        let mtime = meta.modified().unwrap();
        fs::write(&path, content).unwrap();
        set_mtime(&path, mtime);
    }

    /// Read a generated file from the deploy directory.
    pub fn output(&self, rel: &str) -> Option<String> {
        fs::read_to_string(self.deploy_dir().join(rel)).ok()
    }

    pub fn output_mtime(&self, rel: &str) -> SystemTime {
        fs::metadata(self.deploy_dir().join(rel))
            .unwrap()
            .modified()
            .unwrap()
    }
}

fn set_mtime(path: &Path, when: SystemTime) {
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(when)
        .unwrap();
}

// =========================================================================
// In-memory resources for plan tests
// =========================================================================

pub fn fingerprint(hash: &str) -> Fingerprint {
    Fingerprint {
        hash: hash.to_string(),
        size: hash.len() as u64,
        mtime_secs: 1_700_000_000,
        mtime_nanos: 0,
    }
}

pub fn resource(source: &str, kind: ResourceKind, output: Option<&str>, deps: &[&str]) -> Resource {
    Resource {
        source: source.to_string(),
        kind,
        output: output.map(str::to_string),
        fingerprint: fingerprint(source),
        depends_on: deps.iter().map(|d| d.to_string()).collect(),
    }
}
