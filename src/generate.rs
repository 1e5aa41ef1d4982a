//! Site generation: the orchestrating stage of the pipeline.
//!
//! A [`Generator`] owns everything that outlives a single run: the resolved
//! [`Config`], the plugin registry, and the last [`SiteTree`]. Each run
//! refreshes the tree, plans against the fingerprint manifest in the deploy
//! directory, executes the plan, and returns a [`GenerationReport`].
//!
//! ## Run lifecycle
//!
//! ```text
//! Idle → Planning → Executing → Completed
//!                             ↘ PartiallyFailed
//! ```
//!
//! Fatal errors (unreadable source tree, unwritable deploy directory, output
//! conflicts) abort during planning, before anything is written, and return
//! the generator to `Idle`. Per-resource render and copy failures never
//! abort a run; they are collected in the report.
//!
//! ## Stale outputs
//!
//! After execution the manifest is brought up to date. Outputs it recorded
//! for sources that left the tree, or that a source no longer writes (its
//! output path moved), are deleted from the deploy directory unless another
//! resource now owns the same path. Recorded paths that would leave the
//! deploy directory are never touched.
//!
//! ## Concurrency
//!
//! Runs are serialized per generator by a run lock, so a server may share one
//! `&Generator` between request handlers and a full rebuild without two runs
//! ever refreshing the tree or writing the deploy directory at once. Within a
//! run, plan entries execute in parallel on a [rayon](https://docs.rs/rayon)
//! pool bounded by `max_workers`; results come back in plan order.

use crate::cache::FingerprintManifest;
use crate::config::{self, Config};
use crate::plan::{self, Action, BuildPlan, PlanEntry, PlanError};
use crate::render::{self, LayoutSet, Plugin, PluginRegistry};
use crate::tree::{ResourceKind, SiteTree, TreeError};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Site tree error: {0}")]
    Tree(#[from] TreeError),
    #[error("Deploy path {path} is not writable: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Plan conflict: {0}")]
    Plan(#[from] PlanError),
    #[error("Render chain error: {0}")]
    Render(#[from] render::RenderError),
    #[error("Worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Where a generator is in its run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Planning,
    Executing,
    Completed,
    PartiallyFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Render,
    Copy,
}

/// What happened to one resource during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Rendered,
    Copied,
    Skipped,
    Failed { kind: FailureKind, cause: String },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Rendered => "Rendered",
            Outcome::Copied => "Copied",
            Outcome::Skipped => "Skipped",
            Outcome::Failed {
                kind: FailureKind::Render,
                ..
            } => "RenderError",
            Outcome::Failed {
                kind: FailureKind::Copy,
                ..
            } => "CopyError",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOutcome {
    pub source: String,
    pub output: Option<String>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    PartiallyFailed,
}

/// Per-resource outcomes of one run, in plan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    pub outcomes: Vec<ResourceOutcome>,
    pub status: RunStatus,
    /// Deploy-relative outputs deleted because nothing publishes them anymore.
    pub removed: Vec<String>,
}

impl GenerationReport {
    fn new(outcomes: Vec<ResourceOutcome>, removed: Vec<String>) -> Self {
        let status = if outcomes.iter().any(|o| o.outcome.is_failure()) {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Completed
        };
        Self {
            outcomes,
            status,
            removed,
        }
    }

    pub fn outcome(&self, source: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.source == source)
            .map(|o| &o.outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResourceOutcome> {
        self.outcomes.iter().filter(|o| o.outcome.is_failure())
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for o in &self.outcomes {
            match o.outcome {
                Outcome::Rendered => summary.rendered += 1,
                Outcome::Copied => summary.copied += 1,
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }
}

/// Outcome counts for a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReportSummary {
    pub rendered: usize,
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ReportSummary {
    pub fn total(&self) -> usize {
        self.rendered + self.copied + self.skipped + self.failed
    }
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rendered, {} copied, {} skipped",
            self.rendered, self.copied, self.skipped
        )?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        write!(f, " ({} total)", self.total())
    }
}

/// State carried between runs.
#[derive(Default)]
struct RunState {
    tree: Option<SiteTree>,
}

/// Generates one site. Share it by reference; runs are serialized.
pub struct Generator {
    config: Config,
    registry: PluginRegistry,
    state: Mutex<RunState>,
    phase: Mutex<RunPhase>,
}

impl Generator {
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, PluginRegistry::builtin())
    }

    /// Use a custom plugin registry (e.g. replacing a built-in render step).
    pub fn with_registry(config: Config, registry: PluginRegistry) -> Self {
        Self {
            config,
            registry,
            state: Mutex::new(RunState::default()),
            phase: Mutex::new(RunPhase::Idle),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the configuration and forget the cached site tree.
    pub fn reload(&mut self, config: Config) {
        self.config = config;
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .tree = None;
        *self.phase.get_mut().unwrap_or_else(PoisonError::into_inner) = RunPhase::Idle;
    }

    /// Phase of the current (or last) run.
    pub fn phase(&self) -> RunPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Regenerate every resource that changed since the last successful run.
    pub fn generate_all(&self) -> Result<GenerationReport, GenerateError> {
        self.run(None)
    }

    /// Regenerate only `paths` (site-relative source paths) and whatever
    /// depends on them. Unknown paths are ignored.
    pub fn generate(&self, paths: &BTreeSet<String>) -> Result<GenerationReport, GenerateError> {
        self.run(Some(paths))
    }

    fn set_phase(&self, phase: RunPhase) {
        log::debug!("run phase: {phase:?}");
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    fn run(&self, paths: Option<&BTreeSet<String>>) -> Result<GenerationReport, GenerateError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.set_phase(RunPhase::Planning);
        let result = self.run_locked(&mut state, paths);
        self.set_phase(match &result {
            Ok(report) if report.status == RunStatus::Completed => RunPhase::Completed,
            Ok(_) => RunPhase::PartiallyFailed,
            Err(_) => RunPhase::Idle,
        });
        result
    }

    fn run_locked(
        &self,
        state: &mut RunState,
        paths: Option<&BTreeSet<String>>,
    ) -> Result<GenerationReport, GenerateError> {
        let config = &self.config;
        let deploy_dir = config.deploy_dir();
        log::info!(
            "Generating {} → {}",
            config.site_root.display(),
            deploy_dir.display()
        );

        let tree = match &state.tree {
            Some(previous) => SiteTree::refresh(previous, config)?,
            None => SiteTree::build(config)?,
        };
        let settings = config.render_settings();
        let mut manifest = FingerprintManifest::load(&deploy_dir);
        let mut build_plan = plan::plan(&tree, &manifest, &settings, &deploy_dir)?;
        if let Some(paths) = paths {
            build_plan = build_plan.restrict(&tree, paths);
        }
        let chain = self.registry.chain(&config.plugins)?;
        ensure_writable(&deploy_dir)?;

        self.set_phase(RunPhase::Executing);
        let outcomes = execute(&build_plan, &tree, &chain, config, &deploy_dir)?;

        let mut stale = Vec::new();
        for o in &outcomes {
            let previous = match o.outcome {
                Outcome::Rendered | Outcome::Copied => tree
                    .get(&o.source)
                    .and_then(|resource| manifest.record(resource, &settings)),
                Outcome::Failed { .. } => manifest.forget(&o.source),
                Outcome::Skipped => None,
            };
            stale.extend(
                previous
                    .and_then(|entry| entry.output)
                    .filter(|old| o.output.as_ref() != Some(old)),
            );
        }
        stale.extend(
            manifest
                .prune(|source| tree.contains(source))
                .into_iter()
                .filter_map(|entry| entry.output),
        );
        let removed = remove_stale_outputs(&deploy_dir, &tree, stale);
        if let Err(e) = manifest.save(&deploy_dir) {
            log::warn!("Could not save build manifest: {e}");
        }
        state.tree = Some(tree);

        let report = GenerationReport::new(outcomes, removed);
        log::info!("Generation finished: {}", report.summary());
        Ok(report)
    }
}

/// Create the deploy directory if needed and prove it accepts writes.
fn ensure_writable(deploy_dir: &Path) -> Result<(), GenerateError> {
    let fs_err = |source| GenerateError::Filesystem {
        path: deploy_dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(deploy_dir).map_err(fs_err)?;
    let probe = deploy_dir.join(".hyde-write-probe");
    fs::write(&probe, b"").map_err(fs_err)?;
    fs::remove_file(&probe).map_err(fs_err)
}

/// Run every plan entry on a bounded worker pool, keeping plan order.
fn execute(
    build_plan: &BuildPlan,
    tree: &SiteTree,
    chain: &[&dyn Plugin],
    config: &Config,
    deploy_dir: &Path,
) -> Result<Vec<ResourceOutcome>, GenerateError> {
    let layouts = if build_plan.entries().iter().any(|e| e.action == Action::Render) {
        LayoutSet::load(tree, &config.site_root)
    } else {
        LayoutSet::default()
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config::effective_threads(config.max_workers))
        .build()?;

    Ok(pool.install(|| {
        build_plan
            .entries()
            .par_iter()
            .map(|entry| {
                let outcome = execute_entry(entry, tree, chain, &layouts, config, deploy_dir);
                if let Outcome::Failed { cause, .. } = &outcome {
                    log::warn!("{} failed: {cause}", entry.source);
                } else {
                    log::debug!("{}: {}", entry.source, outcome.label());
                }
                ResourceOutcome {
                    source: entry.source.clone(),
                    output: entry.output.clone(),
                    outcome,
                }
            })
            .collect()
    }))
}

fn execute_entry(
    entry: &PlanEntry,
    tree: &SiteTree,
    chain: &[&dyn Plugin],
    layouts: &LayoutSet,
    config: &Config,
    deploy_dir: &Path,
) -> Outcome {
    let failed = |kind, cause: String| Outcome::Failed { kind, cause };
    match entry.action {
        Action::Skip => Outcome::Skipped,
        // Layouts were compiled into the layout set; report how that went.
        Action::Render if entry.kind == ResourceKind::Layout => {
            match layouts.error(&entry.source) {
                Some(cause) => failed(FailureKind::Render, cause.to_string()),
                None => Outcome::Rendered,
            }
        }
        Action::Render => {
            let result = tree
                .get(&entry.source)
                .ok_or_else(|| format!("{} vanished from the site tree", entry.source))
                .and_then(|resource| {
                    render::render_resource(resource, chain, layouts, &config.site_root)
                        .map_err(|e| e.to_string())
                })
                .and_then(|bytes| write_output(deploy_dir, entry, &bytes).map_err(|e| e.to_string()));
            match result {
                Ok(()) => Outcome::Rendered,
                Err(cause) => failed(FailureKind::Render, cause),
            }
        }
        Action::Copy => {
            let result = fs::read(config.site_root.join(&entry.source))
                .and_then(|bytes| write_output(deploy_dir, entry, &bytes));
            match result {
                Ok(()) => Outcome::Copied,
                Err(e) => failed(FailureKind::Copy, e.to_string()),
            }
        }
    }
}

/// Delete outputs no resource in `tree` publishes, returning those removed.
fn remove_stale_outputs(deploy_dir: &Path, tree: &SiteTree, stale: Vec<String>) -> Vec<String> {
    let live: BTreeSet<&str> = tree.iter().filter_map(|r| r.output.as_deref()).collect();
    let mut removed = Vec::new();
    for output in stale.into_iter().collect::<BTreeSet<_>>() {
        if live.contains(output.as_str()) {
            continue;
        }
        match remove_output(deploy_dir, &output) {
            Ok(true) => {
                log::debug!("removed stale output {output}");
                removed.push(output);
            }
            Ok(false) => {}
            Err(e) => log::warn!("Could not remove stale output {output}: {e}"),
        }
    }
    removed
}

/// Remove one deploy-relative output and any directories it leaves empty.
///
/// Returns `Ok(false)` when there was nothing to remove or the path does not
/// stay inside `deploy_dir`.
fn remove_output(deploy_dir: &Path, output: &str) -> io::Result<bool> {
    let relative = Path::new(output);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        log::warn!("Refusing to remove {output}: not inside the deploy directory");
        return Ok(false);
    }
    let path = deploy_dir.join(relative);
    if !path.is_file() {
        return Ok(false);
    }
    fs::remove_file(&path)?;

    let mut dir = path.parent();
    while let Some(d) = dir {
        if d == deploy_dir || fs::remove_dir(d).is_err() {
            break;
        }
        dir = d.parent();
    }
    Ok(true)
}

fn write_output(deploy_dir: &Path, entry: &PlanEntry, bytes: &[u8]) -> io::Result<()> {
    let Some(output) = &entry.output else {
        return Ok(());
    };
    let path = deploy_dir.join(output);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)
}
