//! Build planning: decide, per resource, whether to render, copy, or skip.
//!
//! Planning is pure with respect to the deploy directory apart from checking
//! that recorded outputs still exist. It runs to completion before anything
//! is written, so a [`PlanError`] leaves the deploy directory untouched.
//!
//! ## Dirty resources
//!
//! A resource is *dirty* when the [`FingerprintManifest`] doesn't consider it
//! current: it is new or changed, its layout dependencies or output path
//! moved, the render settings changed, or its output went missing. Dirtiness
//! then flows
//! along the dependency graph: every resource that transitively depends on a
//! dirty layout is dirty too, even when its own bytes are unchanged.
//! Depending on a layout that isn't in the tree also makes a resource dirty,
//! so the render step gets a chance to report the missing layout.
//!
//! ```text
//! layout/base.html  (touched)          → Render
//!  └─ layout/post.html  (unchanged)    → Render   (depends on base)
//!      └─ content/blog/a.md            → Render   (depends on post)
//! content/about.md  (no layout)        → Skip
//! media/site.css    (changed)          → Copy
//! ```

use crate::cache::FingerprintManifest;
use crate::tree::{ResourceKind, SiteTree};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum PlanError {
    #[error("Output {output} would be written by both {first} and {second}")]
    Conflict {
        output: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Render,
    Copy,
    Skip,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Render => "render",
            Action::Copy => "copy",
            Action::Skip => "skip",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    pub source: String,
    pub kind: ResourceKind,
    pub output: Option<String>,
    pub action: Action,
}

/// Ordered actions for one generation run, in site tree order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildPlan {
    entries: Vec<PlanEntry>,
}

impl BuildPlan {
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn entry(&self, source: &str) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.source == source)
    }

    pub fn action(&self, source: &str) -> Option<Action> {
        self.entry(source).map(|e| e.action)
    }

    /// Sources planned for `action`, in plan order.
    pub fn with_action(&self, action: Action) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.action == action)
            .map(|e| e.source.as_str())
            .collect()
    }

    pub fn has_work(&self) -> bool {
        self.entries.iter().any(|e| e.action != Action::Skip)
    }

    /// Keep only the requested sources and everything that depends on them.
    ///
    /// Requested paths that aren't in the tree are ignored.
    pub fn restrict(self, tree: &SiteTree, paths: &BTreeSet<String>) -> BuildPlan {
        for path in paths.iter().filter(|p| !tree.contains(p)) {
            log::warn!("Ignoring regeneration request for unknown source {path}");
        }
        let seeds = paths.iter().map(String::as_str).filter(|p| tree.contains(p));
        let closure = dependents_closure(tree, seeds);
        BuildPlan {
            entries: self
                .entries
                .into_iter()
                .filter(|e| closure.contains(e.source.as_str()))
                .collect(),
        }
    }
}

/// Compute the build plan for `tree` against the last successful run.
///
/// `settings` is the current [`Config::render_settings`](crate::config::Config::render_settings).
pub fn plan(
    tree: &SiteTree,
    previous: &FingerprintManifest,
    settings: &str,
    deploy_dir: &Path,
) -> Result<BuildPlan, PlanError> {
    check_conflicts(tree)?;

    let changed = tree.iter().filter(|r| {
        !previous.is_current(r, settings, deploy_dir)
            || r.depends_on.iter().any(|dep| !tree.contains(dep))
    });
    let dirty = dependents_closure(tree, changed.map(|r| r.source.as_str()));

    let entries = tree
        .iter()
        .map(|r| {
            let action = if !dirty.contains(r.source.as_str()) {
                Action::Skip
            } else if r.requires_processing() {
                Action::Render
            } else {
                Action::Copy
            };
            log::debug!("plan: {} {}", action, r.source);
            PlanEntry {
                source: r.source.clone(),
                kind: r.kind,
                output: r.output.clone(),
                action,
            }
        })
        .collect();

    Ok(BuildPlan { entries })
}

/// No two resources may write the same output path.
fn check_conflicts(tree: &SiteTree) -> Result<(), PlanError> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for resource in tree.iter() {
        let Some(output) = resource.output.as_deref() else {
            continue;
        };
        if let Some(first) = owners.insert(output, &resource.source) {
            return Err(PlanError::Conflict {
                output: output.to_string(),
                first: first.to_string(),
                second: resource.source.clone(),
            });
        }
    }
    Ok(())
}

/// `seeds` plus every resource that transitively depends on one of them.
///
/// Breadth-first over the reverse dependency graph; cycles terminate
/// because each source is visited once.
pub fn dependents_closure<'a>(
    tree: &'a SiteTree,
    seeds: impl IntoIterator<Item = &'a str>,
) -> HashSet<&'a str> {
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for resource in tree.iter() {
        for dep in &resource.depends_on {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(resource.source.as_str());
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = seeds.into_iter().collect();
    while let Some(source) = queue.pop_front() {
        if !seen.insert(source) {
            continue;
        }
        if let Some(children) = dependents.get(source) {
            queue.extend(children.iter().copied().filter(|c| !seen.contains(c)));
        }
    }
    seen
}
