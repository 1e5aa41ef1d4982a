//! New-site scaffolding for `hyde create`.
//!
//! A layout is a directory tree copied verbatim into the new site. Layouts
//! are looked up under `$HYDE_LAYOUTS/<name>` first; the `basic` layout is
//! also compiled into the binary so `hyde create` works out of the box.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming a directory of user layouts.
pub const LAYOUTS_ENV: &str = "HYDE_LAYOUTS";

pub const DEFAULT_LAYOUT: &str = "basic";

/// The embedded `basic` layout, as site-relative path and contents.
const BASIC_LAYOUT: &[(&str, &str)] = &[
    ("site.yaml", include_str!("../layouts/basic/site.yaml")),
    ("layout/base.html", include_str!("../layouts/basic/layout/base.html")),
    ("content/index.md", include_str!("../layouts/basic/content/index.md")),
    ("content/about.md", include_str!("../layouts/basic/content/about.md")),
    ("media/css/site.css", include_str!("../layouts/basic/media/css/site.css")),
];

#[derive(Error, Debug)]
pub enum ScaffoldError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("{0} already exists and is not empty (use --force to overwrite)")]
    NotEmpty(PathBuf),
    #[error("Unknown layout '{0}'; check $HYDE_LAYOUTS or use the built-in 'basic' layout")]
    UnknownLayout(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutSource {
    Directory(PathBuf),
    Embedded(&'static [(&'static str, &'static str)]),
}

/// Resolve a layout name against a user layouts directory, then the
/// embedded layouts.
pub fn find_layout(name: &str, layouts_root: Option<&Path>) -> Option<LayoutSource> {
    if let Some(root) = layouts_root {
        let dir = root.join(name);
        if dir.is_dir() {
            return Some(LayoutSource::Directory(dir));
        }
    }
    (name == DEFAULT_LAYOUT).then_some(LayoutSource::Embedded(BASIC_LAYOUT))
}

/// Create a site at `site_path` from the named layout, honouring
/// `$HYDE_LAYOUTS`. Returns the site-relative paths written.
pub fn create(site_path: &Path, layout: &str, force: bool) -> Result<Vec<String>, ScaffoldError> {
    let layouts_root = std::env::var_os(LAYOUTS_ENV).map(PathBuf::from);
    let source = find_layout(layout, layouts_root.as_deref())
        .ok_or_else(|| ScaffoldError::UnknownLayout(layout.to_string()))?;
    log::debug!("layout {layout} resolved to {source:?}");
    create_from(site_path, &source, force)
}

pub fn create_from(
    site_path: &Path,
    source: &LayoutSource,
    force: bool,
) -> Result<Vec<String>, ScaffoldError> {
    if !force && has_entries(site_path)? {
        return Err(ScaffoldError::NotEmpty(site_path.to_path_buf()));
    }
    fs::create_dir_all(site_path)?;

    let mut written = Vec::new();
    match source {
        LayoutSource::Directory(dir) => copy_dir_recursive(dir, site_path, "", &mut written)?,
        LayoutSource::Embedded(files) => {
            for (rel, contents) in files.iter() {
                let dst = site_path.join(rel);
                if let Some(parent) = dst.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(dst, contents)?;
                written.push(rel.to_string());
            }
        }
    }
    log::info!("Created site at {} ({} files)", site_path.display(), written.len());
    Ok(written)
}

fn has_entries(path: &Path) -> io::Result<bool> {
    match fs::read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn copy_dir_recursive(
    src: &Path,
    dst: &Path,
    prefix: &str,
    written: &mut Vec<String>,
) -> io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let dst_path = dst.join(&name);
        let rel = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };

        if src_path.is_dir() {
            fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path, &rel, written)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
            written.push(rel);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::generate::{Generator, RunStatus};
    use tempfile::TempDir;

    #[test]
    fn basic_layout_is_embedded() {
        assert_eq!(
            find_layout("basic", None),
            Some(LayoutSource::Embedded(BASIC_LAYOUT))
        );
        assert_eq!(find_layout("fancy", None), None);
    }

    #[test]
    fn user_layouts_take_precedence() {
        let layouts = TempDir::new().unwrap();
        fs::create_dir_all(layouts.path().join("basic")).unwrap();
        assert_eq!(
            find_layout("basic", Some(layouts.path())),
            Some(LayoutSource::Directory(layouts.path().join("basic")))
        );
        // Missing from the directory falls back to embedded.
        assert!(find_layout("fancy", Some(layouts.path())).is_none());
    }

    #[test]
    fn creates_into_new_directory() {
        let tmp = TempDir::new().unwrap();
        let site = tmp.path().join("my-site");
        let written = create_from(&site, &LayoutSource::Embedded(BASIC_LAYOUT), false).unwrap();

        assert_eq!(written.len(), BASIC_LAYOUT.len());
        assert!(site.join("site.yaml").is_file());
        assert!(site.join("media/css/site.css").is_file());
    }

    #[test]
    fn refuses_non_empty_directory_without_force() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("keep.txt"), "mine").unwrap();

        let err = create_from(tmp.path(), &LayoutSource::Embedded(BASIC_LAYOUT), false).unwrap_err();
        assert!(matches!(err, ScaffoldError::NotEmpty(_)));
        assert!(!tmp.path().join("site.yaml").exists());

        create_from(tmp.path(), &LayoutSource::Embedded(BASIC_LAYOUT), true).unwrap();
        assert!(tmp.path().join("site.yaml").is_file());
        assert!(tmp.path().join("keep.txt").is_file());
    }

    #[test]
    fn copies_directory_layouts() {
        let layouts = TempDir::new().unwrap();
        let dir = layouts.path().join("mini");
        fs::create_dir_all(dir.join("content/blog")).unwrap();
        fs::write(dir.join("site.yaml"), "").unwrap();
        fs::write(dir.join("content/blog/post.md"), "# Post").unwrap();

        let tmp = TempDir::new().unwrap();
        let mut written =
            create_from(tmp.path(), &LayoutSource::Directory(dir), false).unwrap();
        written.sort();
        assert_eq!(written, vec!["content/blog/post.md", "site.yaml"]);
        assert_eq!(
            fs::read_to_string(tmp.path().join("content/blog/post.md")).unwrap(),
            "# Post"
        );
    }

    #[test]
    fn basic_site_generates_cleanly() {
        let tmp = TempDir::new().unwrap();
        create_from(tmp.path(), &LayoutSource::Embedded(BASIC_LAYOUT), false).unwrap();

        let config =
            config::load_config(tmp.path(), Path::new(config::DEFAULT_CONFIG_FILE)).unwrap();
        let report = Generator::new(config).generate_all().unwrap();
        assert_eq!(report.status, RunStatus::Completed);

        let index = fs::read_to_string(tmp.path().join("deploy/index.html")).unwrap();
        assert!(index.contains("<title>Home</title>"));
        assert!(index.contains("<h1>Welcome to Hyde</h1>"));
        assert!(tmp.path().join("deploy/about.html").is_file());
        assert!(tmp.path().join("deploy/media/css/site.css").is_file());
    }
}
