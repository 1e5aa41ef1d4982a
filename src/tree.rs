//! Site source walking and resource classification.
//!
//! A [`SiteTree`] is the ordered set of source files the pipeline knows
//! about. It is produced by a depth-first walk of the site root with
//! entries visited in lexicographic file-name order, so the same site
//! always yields the same resource order.
//!
//! ## Classification
//!
//! ```text
//! site/
//! ├── site.yaml              # Config file (excluded)
//! ├── layout/
//! │   └── base.html          # Layout (never published)
//! ├── content/
//! │   ├── index.md           # Content → index.html
//! │   └── blog/post.html     # Content → blog/post.html
//! ├── media/css/site.css     # Static → media/css/site.css
//! └── deploy/                # Deploy path (excluded)
//! ```
//!
//! - Anything under the layout path is a **layout**.
//! - Files with a content extension (`md`, `markdown`, `html`, `htm`) are
//!   **content**.
//! - Everything else is **static** and copied verbatim.
//!
//! Hidden entries, the deploy path, the config file, and paths matching an
//! ignore glob are skipped entirely.
//!
//! ## Dependencies
//!
//! Content and layouts may name a layout in their front matter; the
//! resource then depends on that layout. Content that names none depends on
//! the configured `default_layout`, if any. Only direct dependencies are
//! stored here; transitive invalidation happens in [`crate::plan`].

use crate::cache::Fingerprint;
use crate::config::Config;
use crate::frontmatter;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Site root {path} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Duplicate source path: {0}")]
    DuplicateSource(String),
}

/// Extensions that mark a file as content.
const CONTENT_EXTENSIONS: &[&str] = &["md", "markdown", "html", "htm"];

/// Content extensions rendered from Markdown and published as `.html`.
const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Content,
    Layout,
    Static,
}

impl ResourceKind {
    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Content => "content",
            ResourceKind::Layout => "layout",
            ResourceKind::Static => "static",
        }
    }
}

/// One source file tracked by the site tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Path relative to the site root, `/`-separated.
    pub source: String,
    pub kind: ResourceKind,
    /// Path relative to the deploy directory; `None` for layouts.
    pub output: Option<String>,
    pub fingerprint: Fingerprint,
    /// Source paths of the layouts this resource names directly.
    pub depends_on: Vec<String>,
}

impl Resource {
    /// Content and layouts go through the render step; static files are copied.
    pub fn requires_processing(&self) -> bool {
        matches!(self.kind, ResourceKind::Content | ResourceKind::Layout)
    }

    pub fn is_markdown(&self) -> bool {
        has_extension(Path::new(&self.source), MARKDOWN_EXTENSIONS)
    }
}

/// Ordered, source-path-addressable set of resources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteTree {
    resources: Vec<Resource>,
    index: HashMap<String, usize>,
}

impl SiteTree {
    /// Walk the site root and build a fresh tree, hashing every file.
    pub fn build(config: &Config) -> Result<Self, TreeError> {
        walk(config, None)
    }

    /// Re-walk the site root, reusing fingerprints (and dependencies) from
    /// `previous` for files whose size and mtime are unchanged.
    ///
    /// Paths missing from the new walk are dropped; new paths are hashed.
    /// On error `previous` is untouched and no partial tree is returned.
    pub fn refresh(previous: &SiteTree, config: &Config) -> Result<Self, TreeError> {
        walk(config, Some(previous))
    }

    /// Build a tree from already-classified resources, keeping their order.
    pub fn from_resources(resources: Vec<Resource>) -> Result<Self, TreeError> {
        let mut index = HashMap::with_capacity(resources.len());
        for (i, resource) in resources.iter().enumerate() {
            if index.insert(resource.source.clone(), i).is_some() {
                return Err(TreeError::DuplicateSource(resource.source.clone()));
            }
        }
        Ok(Self { resources, index })
    }

    pub fn get(&self, source: &str) -> Option<&Resource> {
        self.index.get(source).map(|&i| &self.resources[i])
    }

    pub fn contains(&self, source: &str) -> bool {
        self.index.contains_key(source)
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

fn walk(config: &Config, previous: Option<&SiteTree>) -> Result<SiteTree, TreeError> {
    let root = &config.site_root;
    fs::read_dir(root).map_err(|source| TreeError::Unreadable {
        path: root.clone(),
        source,
    })?;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_excluded(entry.path(), root, config));

    let mut resources = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        resources.push(load_resource(entry.path(), rel, config, previous)?);
    }

    log::debug!("Walked {}: {} resources", root.display(), resources.len());
    SiteTree::from_resources(resources)
}

/// Whether a walk entry (and, for directories, everything below it) is skipped.
fn is_excluded(path: &Path, root: &Path, config: &Config) -> bool {
    let Ok(rel) = path.strip_prefix(root) else {
        return true;
    };
    let hidden = path
        .file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false);
    hidden
        || rel == config.deploy_path
        || rel == config.config_file
        || config.ignore.is_ignored(&to_slash(rel))
}

fn load_resource(
    path: &Path,
    rel: &Path,
    config: &Config,
    previous: Option<&SiteTree>,
) -> Result<Resource, TreeError> {
    let io_err = |source| TreeError::Io {
        path: path.to_path_buf(),
        source,
    };
    let source = to_slash(rel);
    let kind = classify(rel, config);
    let output = output_path(rel, kind, config);
    let metadata = fs::metadata(path).map_err(io_err)?;

    if let Some(old) = previous.and_then(|tree| tree.get(&source))
        && old.fingerprint.same_stat(&metadata)
    {
        return Ok(Resource {
            source,
            kind,
            output,
            fingerprint: old.fingerprint.clone(),
            depends_on: old.depends_on.clone(),
        });
    }

    let bytes = fs::read(path).map_err(io_err)?;
    let fingerprint = Fingerprint::new(&bytes, &metadata);
    let depends_on = dependencies(&source, kind, &bytes, config);

    Ok(Resource {
        source,
        kind,
        output,
        fingerprint,
        depends_on,
    })
}

fn classify(rel: &Path, config: &Config) -> ResourceKind {
    if rel.starts_with(&config.layout_path) {
        ResourceKind::Layout
    } else if has_extension(rel, CONTENT_EXTENSIONS) {
        ResourceKind::Content
    } else {
        ResourceKind::Static
    }
}

/// Deploy-relative output path: the content prefix is dropped and Markdown
/// is published as `.html`.
fn output_path(rel: &Path, kind: ResourceKind, config: &Config) -> Option<String> {
    if kind == ResourceKind::Layout {
        return None;
    }
    let base = rel.strip_prefix(&config.content_path).unwrap_or(rel);
    if kind == ResourceKind::Content && has_extension(base, MARKDOWN_EXTENSIONS) {
        Some(to_slash(&base.with_extension("html")))
    } else {
        Some(to_slash(base))
    }
}

/// Direct layout dependencies declared by front matter (or the default layout).
///
/// Front matter that doesn't parse yields no dependencies; the render step
/// reports the parse error.
fn dependencies(source: &str, kind: ResourceKind, bytes: &[u8], config: &Config) -> Vec<String> {
    if kind == ResourceKind::Static {
        return Vec::new();
    }
    let declared = match std::str::from_utf8(bytes).map(frontmatter::split) {
        Ok(Ok((front, _))) => front.layout,
        Ok(Err(e)) => {
            log::debug!("{source}: unreadable front matter: {e}");
            return Vec::new();
        }
        Err(_) => return Vec::new(),
    };
    let layout = match (declared, kind) {
        (Some(name), _) => Some(name),
        (None, ResourceKind::Content) => config.default_layout.clone(),
        (None, _) => None,
    };
    layout
        .map(|name| vec![layout_source(config, &name)])
        .unwrap_or_default()
}

/// Site-relative source path of a layout named relative to the layout path.
pub fn layout_source(config: &Config, name: &str) -> String {
    to_slash(&config.layout_path.join(name))
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| extensions.contains(&e.as_str()))
}

/// Render a relative path with `/` separators regardless of platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
