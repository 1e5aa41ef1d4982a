//! Content rendering through a chain of plugins.
//!
//! A [`Plugin`] turns bytes into bytes for one resource. The site config
//! lists plugin identifiers in order; the [`PluginRegistry`] resolves them
//! to implementations, and [`render_resource`] feeds the content body (front
//! matter stripped) through the chain.
//!
//! ## Built-in plugins
//!
//! - `markdown`: Markdown → HTML for `.md`/`.markdown` sources (pulldown-cmark);
//!   other sources pass through unchanged.
//! - `layout`: wraps the page in its layout, then in that layout's layout,
//!   and so on outward. `{{ content }}` and `{{ title }}` are substituted.
//!   Pages without a layout get a minimal HTML document.
//!
//! Layout files are loaded once per run into a [`LayoutSet`] before any
//! content renders.

use crate::frontmatter::{self, FrontMatter};
use crate::tree::{Resource, ResourceKind, SiteTree};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use pulldown_cmark::{Options, Parser, html as md_html};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Identifiers of the built-in plugins, in default chain order.
pub const BUILTIN_PLUGINS: &[&str] = &["markdown", "layout"];

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is not valid UTF-8")]
    NotUtf8(String),
    #[error("Front matter error: {0}")]
    FrontMatter(#[from] toml::de::Error),
    #[error("Layout not found: {0}")]
    MissingLayout(String),
    #[error("Layout {layout} failed to load: {cause}")]
    BrokenLayout { layout: String, cause: String },
    #[error("Layout cycle through {0}")]
    LayoutCycle(String),
    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),
    #[error("Plugin {plugin} failed: {message}")]
    Plugin { plugin: String, message: String },
}

/// Per-resource data handed to every plugin in the chain.
pub struct RenderContext<'a> {
    pub site_root: &'a Path,
    pub layouts: &'a LayoutSet,
    pub front_matter: &'a FrontMatter,
    pub title: &'a str,
}

/// A render step, registered by identifier.
pub trait Plugin: Send + Sync {
    fn id(&self) -> &'static str;

    fn render(
        &self,
        resource: &Resource,
        ctx: &RenderContext<'_>,
        input: Vec<u8>,
    ) -> Result<Vec<u8>, RenderError>;
}

/// Plugin implementations by identifier.
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    /// Registry holding the built-in `markdown` and `layout` plugins.
    pub fn builtin() -> Self {
        Self {
            plugins: vec![Box::new(MarkdownPlugin), Box::new(LayoutPlugin)],
        }
    }

    /// Register a plugin, replacing any existing one with the same id.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.retain(|p| p.id() != plugin.id());
        self.plugins.push(plugin);
    }

    /// Every registered identifier, for validating a site's `plugins` key.
    pub fn ids(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.id()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&dyn Plugin> {
        self.plugins.iter().find(|p| p.id() == id).map(|p| p.as_ref())
    }

    /// Resolve an ordered list of identifiers into a chain.
    pub fn chain(&self, ids: &[String]) -> Result<Vec<&dyn Plugin>, RenderError> {
        ids.iter()
            .map(|id| {
                self.get(id)
                    .ok_or_else(|| RenderError::UnknownPlugin(id.clone()))
            })
            .collect()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// Layouts
// ============================================================================

/// A loaded layout template.
#[derive(Debug, Clone)]
pub struct Layout {
    pub source: String,
    pub template: String,
    /// The layout this one is wrapped in, if any.
    pub parent: Option<String>,
}

impl Layout {
    fn apply(&self, content: &str, title: &str) -> String {
        let escaped_title = html! { (title) }.into_string();
        let titled = substitute(&self.template, "title", &escaped_title);
        substitute(&titled, "content", content)
    }
}

/// Replace `{{ name }}` (with or without inner spaces).
fn substitute(template: &str, name: &str, value: &str) -> String {
    template
        .replace(&format!("{{{{ {name} }}}}"), value)
        .replace(&format!("{{{{{name}}}}}"), value)
}

/// Every layout in the tree, loaded for one run.
///
/// Layouts that fail to load are kept as errors so both the layout itself
/// and the pages using it can report why.
#[derive(Debug, Default)]
pub struct LayoutSet {
    layouts: BTreeMap<String, Layout>,
    broken: BTreeMap<String, String>,
}

impl LayoutSet {
    pub fn load(tree: &SiteTree, site_root: &Path) -> Self {
        let mut set = Self::default();
        for resource in tree.iter().filter(|r| r.kind == ResourceKind::Layout) {
            match load_layout(resource, site_root) {
                Ok(layout) => {
                    set.layouts.insert(resource.source.clone(), layout);
                }
                Err(e) => {
                    log::debug!("layout {} failed to load: {e}", resource.source);
                    set.broken.insert(resource.source.clone(), e.to_string());
                }
            }
        }
        set
    }

    pub fn get(&self, source: &str) -> Result<&Layout, RenderError> {
        if let Some(layout) = self.layouts.get(source) {
            return Ok(layout);
        }
        match self.broken.get(source) {
            Some(cause) => Err(RenderError::BrokenLayout {
                layout: source.to_string(),
                cause: cause.clone(),
            }),
            None => Err(RenderError::MissingLayout(source.to_string())),
        }
    }

    /// The load error for a layout, if it failed.
    pub fn error(&self, source: &str) -> Option<&str> {
        self.broken.get(source).map(String::as_str)
    }
}

fn load_layout(resource: &Resource, site_root: &Path) -> Result<Layout, RenderError> {
    let bytes = std::fs::read(site_root.join(&resource.source))?;
    let text =
        String::from_utf8(bytes).map_err(|_| RenderError::NotUtf8(resource.source.clone()))?;
    let (_, template) = frontmatter::split(&text)?;
    Ok(Layout {
        source: resource.source.clone(),
        template: template.to_string(),
        parent: resource.depends_on.first().cloned(),
    })
}

// ============================================================================
// Rendering
// ============================================================================

/// Read a content resource and run it through `chain`.
pub fn render_resource(
    resource: &Resource,
    chain: &[&dyn Plugin],
    layouts: &LayoutSet,
    site_root: &Path,
) -> Result<Vec<u8>, RenderError> {
    let bytes = std::fs::read(site_root.join(&resource.source))?;
    let text = std::str::from_utf8(&bytes)
        .map_err(|_| RenderError::NotUtf8(resource.source.clone()))?;
    let (front_matter, body) = frontmatter::split(text)?;
    let title = page_title(&front_matter, body, &resource.source);

    let ctx = RenderContext {
        site_root,
        layouts,
        front_matter: &front_matter,
        title: &title,
    };
    chain
        .iter()
        .try_fold(body.as_bytes().to_vec(), |input, plugin| {
            plugin.render(resource, &ctx, input)
        })
}

/// Title from front matter, then the first `# heading`, then the file stem.
fn page_title(front_matter: &FrontMatter, body: &str, source: &str) -> String {
    if let Some(title) = &front_matter.title {
        return title.clone();
    }
    body.lines()
        .find(|line| line.starts_with("# "))
        .map(|line| line.trim_start_matches("# ").trim().to_string())
        .unwrap_or_else(|| {
            Path::new(source)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        })
}

fn utf8(resource: &Resource, input: Vec<u8>) -> Result<String, RenderError> {
    String::from_utf8(input).map_err(|_| RenderError::NotUtf8(resource.source.clone()))
}

pub struct MarkdownPlugin;

impl Plugin for MarkdownPlugin {
    fn id(&self) -> &'static str {
        "markdown"
    }

    fn render(
        &self,
        resource: &Resource,
        _ctx: &RenderContext<'_>,
        input: Vec<u8>,
    ) -> Result<Vec<u8>, RenderError> {
        if !resource.is_markdown() {
            return Ok(input);
        }
        let text = utf8(resource, input)?;
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_STRIKETHROUGH;
        let parser = Parser::new_ext(&text, options);
        let mut html = String::with_capacity(text.len() * 3 / 2);
        md_html::push_html(&mut html, parser);
        Ok(html.into_bytes())
    }
}

pub struct LayoutPlugin;

impl Plugin for LayoutPlugin {
    fn id(&self) -> &'static str {
        "layout"
    }

    fn render(
        &self,
        resource: &Resource,
        ctx: &RenderContext<'_>,
        input: Vec<u8>,
    ) -> Result<Vec<u8>, RenderError> {
        let mut page = utf8(resource, input)?;
        let Some(first) = resource.depends_on.first() else {
            return Ok(bare_document(ctx.title, &page).into_string().into_bytes());
        };

        let mut seen = HashSet::new();
        let mut next = Some(first.as_str());
        while let Some(source) = next {
            if !seen.insert(source) {
                return Err(RenderError::LayoutCycle(source.to_string()));
            }
            let layout = ctx.layouts.get(source)?;
            page = layout.apply(&page, ctx.title);
            next = layout.parent.as_deref();
        }
        Ok(page.into_bytes())
    }
}

/// Document shell for pages that name no layout.
fn bare_document(title: &str, content: &str) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
            }
            body {
                (PreEscaped(content))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    fn render(site: &SiteFixture, source: &str) -> Result<String, RenderError> {
        let config = site.config();
        let tree = SiteTree::build(&config).unwrap();
        let layouts = LayoutSet::load(&tree, &config.site_root);
        let registry = PluginRegistry::builtin();
        let chain = registry.chain(&config.plugins).unwrap();
        let bytes = render_resource(tree.get(source).unwrap(), &chain, &layouts, &config.site_root)?;
        Ok(String::from_utf8(bytes).unwrap())
    }

    #[test]
    fn markdown_is_wrapped_in_declared_layout() {
        let site = SiteFixture::basic();
        let html = render(&site, "content/index.md").unwrap();
        assert_eq!(
            html,
            "<html><head><title>Welcome</title></head><body><h1>Welcome</h1>\n<p>Hello.</p>\n</body></html>\n"
        );
    }

    #[test]
    fn nested_layouts_apply_outward() {
        let site = SiteFixture::basic()
            .file("layout/post.html", "+++\nlayout = \"base.html\"\n+++\n<article>{{content}}</article>")
            .file("content/post.md", "+++\nlayout = \"post.html\"\ntitle = \"A & B\"\n+++\nbody");
        let html = render(&site, "content/post.md").unwrap();
        assert_eq!(
            html,
            "<html><head><title>A &amp; B</title></head><body><article><p>body</p>\n</article></body></html>\n"
        );
    }

    #[test]
    fn page_without_layout_gets_bare_document() {
        let site = SiteFixture::new().file("content/plain.md", "Just text");
        let html = render(&site, "content/plain.md").unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>plain</title>"));
        assert!(html.contains("<p>Just text</p>"));
    }

    #[test]
    fn html_content_skips_markdown() {
        let site = SiteFixture::basic()
            .file("content/raw.html", "+++\nlayout = \"base.html\"\ntitle = \"Raw\"\n+++\n<b>*x*</b>");
        let html = render(&site, "content/raw.html").unwrap();
        assert!(html.contains("<body><b>*x*</b></body>"));
    }

    #[test]
    fn empty_chain_strips_front_matter_only() {
        let site = SiteFixture::basic().with_config("plugins: []");
        let html = render(&site, "content/index.md").unwrap();
        assert_eq!(html, "# Welcome\n\nHello.\n");
    }

    #[test]
    fn missing_layout_is_error() {
        let site = SiteFixture::new().file("content/x.md", "+++\nlayout = \"gone.html\"\n+++\nx");
        let err = render(&site, "content/x.md").unwrap_err();
        assert!(matches!(err, RenderError::MissingLayout(s) if s == "layout/gone.html"));
    }

    #[test]
    fn broken_layout_reports_cause() {
        let site = SiteFixture::new()
            .file("layout/bad.html", "+++\nlayout = \n+++\n{{ content }}")
            .file("content/x.md", "+++\nlayout = \"bad.html\"\n+++\nx");
        let err = render(&site, "content/x.md").unwrap_err();
        assert!(matches!(err, RenderError::BrokenLayout { ref layout, .. } if layout == "layout/bad.html"));
    }

    #[test]
    fn layout_cycle_is_error() {
        let site = SiteFixture::new()
            .file("layout/a.html", "+++\nlayout = \"b.html\"\n+++\n{{ content }}")
            .file("layout/b.html", "+++\nlayout = \"a.html\"\n+++\n{{ content }}")
            .file("content/x.md", "+++\nlayout = \"a.html\"\n+++\nx");
        let err = render(&site, "content/x.md").unwrap_err();
        assert!(matches!(err, RenderError::LayoutCycle(_)));
    }

    #[test]
    fn invalid_front_matter_is_error() {
        let site = SiteFixture::new().file("content/bad.md", "+++\ntitle = \n+++\nx");
        assert!(matches!(
            render(&site, "content/bad.md"),
            Err(RenderError::FrontMatter(_))
        ));
    }

    #[test]
    fn title_falls_back_to_heading_then_stem() {
        let front = FrontMatter::default();
        assert_eq!(page_title(&front, "intro\n# Heading\n", "content/a.md"), "Heading");
        assert_eq!(page_title(&front, "no heading", "content/about-me.md"), "about-me");
    }

    #[test]
    fn register_replaces_builtin() {
        struct Shout;
        impl Plugin for Shout {
            fn id(&self) -> &'static str {
                "markdown"
            }
            fn render(
                &self,
                _resource: &Resource,
                _ctx: &RenderContext<'_>,
                input: Vec<u8>,
            ) -> Result<Vec<u8>, RenderError> {
                Ok(input.to_ascii_uppercase())
            }
        }

        let mut registry = PluginRegistry::builtin();
        registry.register(Box::new(Shout));
        let chain = registry.chain(&["markdown".to_string()]).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(registry.ids(), vec!["layout", "markdown"]);
        assert!(registry.chain(&["sass".to_string()]).is_err());
    }
}
