//! # Hyde
//!
//! An incremental static site generator. A site is a folder of content,
//! layouts, and static files described by `site.yaml`; `hyde gen` publishes
//! it into a deploy folder, re-rendering only what changed since last time.
//!
//! # Architecture: One Pipeline, Four Stages
//!
//! ```text
//! 1. Resolve   site.yaml       →  Config        (validated, paths inside the site)
//! 2. Walk      site folder     →  SiteTree      (classified, fingerprinted resources)
//! 3. Plan      tree + manifest →  BuildPlan     (render / copy / skip per resource)
//! 4. Execute   plan            →  deploy/ + GenerationReport
//! ```
//!
//! Each stage is a plain function of the previous stage's output, so planning
//! can be tested without rendering and rendering without walking a real
//! site. The [`generate::Generator`] ties them together and owns the state
//! that survives between runs: the resolved config and the last site tree.
//! Fingerprints of the last successful run are persisted in the deploy
//! folder, so a fresh process picks up where the previous one stopped.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `site.yaml` loading, defaults, and path/plugin validation |
//! | [`tree`] | Walks the site, classifies resources, derives output paths and layout dependencies |
//! | [`cache`] | Content fingerprints and the persisted fingerprint manifest |
//! | [`plan`] | Dirty detection, transitive invalidation, output conflict checks |
//! | [`render`] | Plugin chain: Markdown and layouts |
//! | [`generate`] | Run orchestration, worker pool, per-resource outcomes |
//! | [`frontmatter`] | `+++` TOML front matter |
//! | [`scaffold`] | `hyde create` layouts |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Fingerprints, Not Just Timestamps
//!
//! A resource is current when its fingerprint (content hash, size, mtime),
//! layout dependencies, output path, and render settings match the manifest
//! and its output still exists. Touching a file is
//! enough to rebuild it. In the other direction, a refresh only re-reads a
//! file when its size or mtime moved, so an unchanged site costs one `stat`
//! per file.
//!
//! ## Explicit Dependencies
//!
//! Pages declare their layout in front matter (or inherit `default_layout`),
//! and layouts may declare their own parent. Changing a layout invalidates
//! exactly the resources that reach it through that graph, rather than the
//! whole site.
//!
//! ## All-or-Nothing Planning
//!
//! Everything that can make a run pointless (an unreadable site, two
//! resources claiming one output, an unwritable deploy folder) is detected
//! before the first write. Once execution starts, failures are per resource
//! and end up in the report.

pub mod cache;
pub mod config;
pub mod frontmatter;
pub mod generate;
pub mod output;
pub mod plan;
pub mod render;
pub mod scaffold;
pub mod tree;

#[cfg(test)]
pub(crate) mod test_helpers;
