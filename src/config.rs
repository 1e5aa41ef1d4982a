//! Site configuration module.
//!
//! Turns the raw `site.yaml` mapping into a validated, immutable [`Config`].
//! Loading the file and resolving it are separate steps: [`load_raw_config`]
//! reads and parses YAML, [`resolve`] is a pure transform from the parsed
//! value to a [`Config`]. Resolving the same value twice yields equal configs.
//!
//! ## Configuration Options
//!
//! ```yaml
//! # All options are optional - defaults shown below
//! deploy_path: deploy          # Output root, must live inside the site root
//! layout_path: layout          # Templates; never published
//! content_path: content        # Published at the deploy root
//! ignore: []                   # Globs matched against site-relative paths
//! plugins: [markdown, layout]  # Render chain applied to content, in order
//! default_layout: ~            # Layout for content that names none
//! max_workers: ~               # Parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early. Plugin ids are checked
//! against the built-in plugins by [`resolve`], or against any registry's ids
//! by [`resolve_with_plugins`].

use crate::cache;
use crate::render;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use wax::{Glob, Pattern};

/// Configuration file looked up in the site root when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "site.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// The raw, user-facing shape of `site.yaml`.
///
/// Every field has a default, so a sparse (or empty) file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub deploy_path: String,
    pub layout_path: String,
    pub content_path: String,
    pub ignore: Vec<String>,
    pub plugins: Vec<String>,
    pub default_layout: Option<String>,
    pub max_workers: Option<usize>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            deploy_path: "deploy".to_string(),
            layout_path: "layout".to_string(),
            content_path: "content".to_string(),
            ignore: Vec::new(),
            plugins: render::BUILTIN_PLUGINS
                .iter()
                .map(|id| id.to_string())
                .collect(),
            default_layout: None,
            max_workers: None,
        }
    }
}

/// Resolved site configuration.
///
/// Directory fields other than `site_root` are relative to the site root and
/// already normalized, so they can be compared against walk paths directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Absolute, normalized site root.
    pub site_root: PathBuf,
    /// Config file name relative to the site root; excluded from the walk.
    pub config_file: PathBuf,
    pub deploy_path: PathBuf,
    pub layout_path: PathBuf,
    pub content_path: PathBuf,
    pub ignore: IgnoreSet,
    pub plugins: Vec<String>,
    pub default_layout: Option<String>,
    pub max_workers: Option<usize>,
}

impl Config {
    /// Absolute deploy directory.
    pub fn deploy_dir(&self) -> PathBuf {
        self.site_root.join(&self.deploy_path)
    }

    /// Return a copy writing to a different deploy path (the CLI `-d` flag).
    ///
    /// The override goes through the same validation as the config key.
    pub fn with_deploy_path(&self, deploy_path: &str) -> Result<Self, ConfigError> {
        let deploy = resolve_inside_root(&self.site_root, deploy_path, "deploy_path")?;
        check_disjoint(&deploy, &self.layout_path, "layout_path")?;
        check_disjoint(&deploy, &self.content_path, "content_path")?;
        Ok(Self {
            deploy_path: deploy,
            ..self.clone()
        })
    }

    /// Hash of the settings that change what a resource renders to, or
    /// where it lands.
    ///
    /// Outputs recorded under a different value are stale even when their
    /// sources did not change.
    pub fn render_settings(&self) -> String {
        let key = format!(
            "layout_path={}\ncontent_path={}\ndefault_layout={}\nplugins={}\n",
            self.layout_path.display(),
            self.content_path.display(),
            self.default_layout.as_deref().unwrap_or(""),
            self.plugins.join(","),
        );
        cache::hash_bytes(key.as_bytes())
    }
}

/// Compiled ignore globs, kept alongside their source text.
#[derive(Clone, Default)]
pub struct IgnoreSet {
    patterns: Vec<String>,
    globs: Arc<Vec<Glob<'static>>>,
}

impl IgnoreSet {
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let globs = patterns
            .iter()
            .map(|pattern| {
                Glob::new(pattern)
                    .map(Glob::into_owned)
                    .map_err(|e| {
                        ConfigError::Validation(format!("ignore pattern '{pattern}': {e}"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns: patterns.to_vec(),
            globs: Arc::new(globs),
        })
    }

    /// Whether a site-relative, `/`-separated path is ignored.
    pub fn is_ignored(&self, relative: &str) -> bool {
        self.globs.iter().any(|glob| glob.is_match(relative))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl PartialEq for IgnoreSet {
    fn eq(&self, other: &Self) -> bool {
        self.patterns == other.patterns
    }
}

impl fmt::Debug for IgnoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.patterns).finish()
    }
}

/// Read a YAML configuration file as a raw value.
///
/// An empty file parses to `Null`, which [`resolve`] treats as all defaults.
pub fn load_raw_config(path: &Path) -> Result<serde_yaml_ng::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    let value: serde_yaml_ng::Value = serde_yaml_ng::from_str(&content)?;
    Ok(value)
}

/// Load and resolve `config_file` (relative to `root`).
pub fn load_config(root: &Path, config_file: &Path) -> Result<Config, ConfigError> {
    load_config_with_plugins(root, config_file, render::BUILTIN_PLUGINS)
}

/// [`load_config`] for a site rendered with a custom plugin registry.
pub fn load_config_with_plugins(
    root: &Path,
    config_file: &Path,
    known_plugins: &[&str],
) -> Result<Config, ConfigError> {
    let raw = load_raw_config(&root.join(config_file))?;
    let mut config = resolve_with_plugins(root, &raw, known_plugins)?;
    // `./site.yaml`, `conf/../site.yaml` and an absolute path into the site
    // must all name the file the walk sees.
    let file = normalize(&config.site_root.join(config_file));
    config.config_file = match file.strip_prefix(&config.site_root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => file,
    };
    Ok(config)
}

/// Resolve a raw configuration value against a site root.
///
/// Fills defaults, rejects unknown keys, and validates paths and plugins.
/// Only the built-in plugins are accepted.
pub fn resolve(root: &Path, raw: &serde_yaml_ng::Value) -> Result<Config, ConfigError> {
    resolve_with_plugins(root, raw, render::BUILTIN_PLUGINS)
}

/// [`resolve`], accepting any plugin id in `known_plugins`.
pub fn resolve_with_plugins(
    root: &Path,
    raw: &serde_yaml_ng::Value,
    known_plugins: &[&str],
) -> Result<Config, ConfigError> {
    let raw: RawConfig = match raw {
        serde_yaml_ng::Value::Null => RawConfig::default(),
        serde_yaml_ng::Value::Mapping(_) => serde_yaml_ng::from_value(raw.clone())?,
        _ => {
            return Err(ConfigError::Validation(
                "configuration must be a mapping".into(),
            ));
        }
    };

    let site_root = normalize(&std::path::absolute(root)?);

    let deploy_path = resolve_inside_root(&site_root, &raw.deploy_path, "deploy_path")?;
    let layout_path = resolve_inside_root(&site_root, &raw.layout_path, "layout_path")?;
    let content_path = resolve_inside_root(&site_root, &raw.content_path, "content_path")?;
    check_disjoint(&deploy_path, &layout_path, "layout_path")?;
    check_disjoint(&deploy_path, &content_path, "content_path")?;

    for (i, id) in raw.plugins.iter().enumerate() {
        if !known_plugins.contains(&id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "unknown plugin '{id}' (known: {})",
                known_plugins.join(", ")
            )));
        }
        if raw.plugins[..i].contains(id) {
            return Err(ConfigError::Validation(format!(
                "plugin '{id}' listed more than once"
            )));
        }
    }

    if raw.max_workers == Some(0) {
        return Err(ConfigError::Validation(
            "max_workers must be at least 1".into(),
        ));
    }

    if let Some(name) = &raw.default_layout
        && name.trim().is_empty()
    {
        return Err(ConfigError::Validation(
            "default_layout must not be empty".into(),
        ));
    }

    Ok(Config {
        site_root,
        config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
        deploy_path,
        layout_path,
        content_path,
        ignore: IgnoreSet::new(&raw.ignore)?,
        plugins: raw.plugins,
        default_layout: raw.default_layout,
        max_workers: raw.max_workers,
    })
}

/// Resolve `value` against `root` and return it relative to the root.
///
/// Fails when the result escapes the root or is the root itself.
fn resolve_inside_root(root: &Path, value: &str, key: &str) -> Result<PathBuf, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{key} must not be empty")));
    }
    let joined = normalize(&root.join(value));
    match joined.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => Err(ConfigError::Validation(format!(
            "{key} '{value}' must not be the site root"
        ))),
        Ok(rel) => Ok(rel.to_path_buf()),
        Err(_) => Err(ConfigError::Validation(format!(
            "{key} '{value}' escapes the site root"
        ))),
    }
}

/// The deploy path may not contain, or live inside, a source directory.
fn check_disjoint(deploy: &Path, source: &Path, key: &str) -> Result<(), ConfigError> {
    if deploy.starts_with(source) || source.starts_with(deploy) {
        return Err(ConfigError::Validation(format!(
            "deploy_path '{}' overlaps {key} '{}'",
            deploy.display(),
            source.display()
        )));
    }
    Ok(())
}

/// Fold `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Resolve the effective worker count.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(max_workers: Option<usize>) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    max_workers.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Returns a fully-commented stock `site.yaml`.
///
/// Used by `gen-config` and written into freshly created sites.
pub fn stock_config_yaml() -> &'static str {
    r##"# Hyde site configuration
# =======================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# Where the generated site is written. Must be inside the site folder and
# must not overlap the layout or content folders.
deploy_path: deploy

# Templates. Files here are used by content but never published.
layout_path: layout

# Published content. Files under this folder land at the deploy root;
# markdown (.md, .markdown) becomes .html.
content_path: content

# Glob patterns, relative to the site folder, that are skipped entirely.
# Example: ["**/*.swp", "drafts/**"]
ignore: []

# Render chain applied to content, in order. Known plugins: markdown, layout.
plugins:
  - markdown
  - layout

# Layout (relative to layout_path) used by content without a `layout` key
# in its front matter. Leave unset to publish bare pages.
# default_layout: base.html

# Maximum number of parallel workers. Omit to use all CPU cores.
# max_workers: 4
"##
}
