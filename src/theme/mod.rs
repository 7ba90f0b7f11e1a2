//! Theme engine
//!
//! Template rendering with Tera. Built-in templates are embedded in the
//! binary; any `.html` file of the active theme directory with the same
//! relative name replaces the built-in one, and new names are added.
//!
//! Views never ask for a single template name. They pass a list of
//! candidates, most specific first, and the first one that exists is used.

use anyhow::{Context, Result};
use rust_embed::RustEmbed;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fs;
use std::path::Path;
use tera::{Context as TeraContext, Tera};

use crate::config::Config;
use crate::services::TemplateParts;

mod error;

pub use error::ThemeError;

/// Templates shipped with the binary
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct DefaultTemplates;

/// Directory prefix of the date-specific archive templates
pub const ARCHIVE_TEMPLATE_DIR: &str = "archives";

/// Theme engine for rendering templates
pub struct ThemeEngine {
    tera: Tera,
    /// Variables added to every rendered template
    globals: TeraContext,
}

impl ThemeEngine {
    /// Create an engine from the built-in templates overridden by `theme_dir`
    /// (when it exists).
    pub fn new(theme_dir: Option<&Path>, globals: TeraContext) -> Result<Self> {
        let mut templates = embedded_templates()?;

        if let Some(dir) = theme_dir {
            if dir.is_dir() {
                let mut overrides = BTreeMap::new();
                collect_templates_from_dir(dir, dir, &mut overrides)?;
                tracing::info!(
                    "Loaded {} template(s) from theme directory {:?}",
                    overrides.len(),
                    dir
                );
                templates.extend(overrides);
            } else {
                tracing::debug!("Theme directory {:?} not found, using built-in templates", dir);
            }
        }

        Self::from_templates(templates, globals)
    }

    /// Create an engine from the configuration: active theme directory and
    /// the standard template variables.
    pub fn from_config(config: &Config) -> Result<Self> {
        let dir = config.theme.active_dir();
        Self::new(Some(&dir), context_processor(config))
    }

    /// Create an engine from raw `(name, source)` pairs
    pub fn from_templates(
        templates: impl IntoIterator<Item = (String, String)>,
        globals: TeraContext,
    ) -> Result<Self> {
        let mut tera = Tera::default();
        tera.set_escape_fn(escape_text);
        tera.add_raw_templates(templates)
            .map_err(|e| ThemeError::TemplateError(error_chain(&e)))
            .context("Failed to load templates")?;
        Ok(Self { tera, globals })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    /// First candidate that exists
    pub fn resolve<'a>(&self, candidates: &'a [String]) -> Option<&'a str> {
        candidates
            .iter()
            .map(String::as_str)
            .find(|name| self.has_template(name))
    }

    /// Render one template with the global variables merged in
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String, ThemeError> {
        let mut full_context = self.globals.clone();
        full_context.extend(context.clone());

        self.tera
            .render(template, &full_context)
            .map_err(|e| ThemeError::TemplateError(format!("Failed to render '{}': {}", template, error_chain(&e))))
    }

    /// Render the first existing candidate
    pub fn render_first(&self, candidates: &[String], context: &TeraContext) -> Result<String, ThemeError> {
        let template = self
            .resolve(candidates)
            .ok_or_else(|| ThemeError::NotFound(candidates.join(", ")))?;
        tracing::debug!("Rendering template '{}'", template);
        self.render(template, context)
    }

    /// Render an error page, degrading to plain HTML when the template is
    /// missing or broken.
    pub fn render_error(&self, template: &str, status: u16, message: &str) -> String {
        let mut context = TeraContext::new();
        context.insert("status", &status);
        context.insert("message", message);

        match self.render(template, &context) {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("Failed to render error template '{}': {}", template, e);
                simple_error_page(status, message)
            }
        }
    }
}

/// Variables every template receives: the application version and the
/// analytics token, plus the site name.
pub fn context_processor(config: &Config) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("APP_VERSION", env!("CARGO_PKG_VERSION"));
    context.insert("ANALYTICS_TOKEN", &config.site.analytics_token);
    context.insert("site_name", &config.site.name);
    context
}

/// Candidate names for a date-based page, most specific first.
///
/// For `entry_archive_month.html` in March 2024 this yields
/// `archives/2024/03/entry_archive_month.html`,
/// `archives/2024/entry_archive_month.html`,
/// `archives/entry_archive_month.html` and `entry_archive_month.html`.
/// Weeks live under `archives/{year}/week/{week}/`.
pub fn archive_template_names(template: &str, parts: &TemplateParts) -> Vec<String> {
    let mut names = vec![
        template.to_string(),
        format!("{}/{}", ARCHIVE_TEMPLATE_DIR, template),
    ];

    let mut path = ARCHIVE_TEMPLATE_DIR.to_string();
    if let Some(year) = parts.year {
        path = format!("{}/{:04}", path, year);
        names.push(format!("{}/{}", path, template));
    }
    if let Some(month) = parts.month {
        path = format!("{}/{:02}", path, month);
        names.push(format!("{}/{}", path, template));
    }
    if let Some(week) = parts.week {
        path = format!("{}/week/{:02}", path, week);
        names.push(format!("{}/{}", path, template));
    }
    if let Some(day) = parts.day {
        path = format!("{}/{:02}", path, day);
        names.push(format!("{}/{}", path, template));
    }

    names.reverse();
    names
}

/// Candidate names for a category page: a template per category slug first
pub fn category_template_names(template: &str, slug: &str) -> Vec<String> {
    let stem = template.trim_end_matches(".html");
    vec![
        format!("categories/{}/{}", slug, template),
        format!("{}_{}.html", stem, slug),
        template.to_string(),
    ]
}

fn embedded_templates() -> Result<BTreeMap<String, String>> {
    let mut templates = BTreeMap::new();
    for name in DefaultTemplates::iter() {
        let file = DefaultTemplates::get(&name)
            .ok_or_else(|| ThemeError::NotFound(name.to_string()))?;
        let source = String::from_utf8(file.data.into_owned())
            .with_context(|| format!("Built-in template {} is not UTF-8", name))?;
        templates.insert(name.to_string(), source);
    }
    Ok(templates)
}

fn collect_templates_from_dir(
    base_path: &Path,
    current_path: &Path,
    templates: &mut BTreeMap<String, String>,
) -> Result<()> {
    for entry in fs::read_dir(current_path)
        .with_context(|| format!("Failed to read theme directory: {:?}", current_path))?
    {
        let path = entry?.path();

        if path.is_dir() {
            collect_templates_from_dir(base_path, &path, templates)?;
        } else if path.extension().map_or(false, |ext| ext == "html") {
            let relative_path = path
                .strip_prefix(base_path)
                .map_err(|_| ThemeError::TemplateError("Failed to get relative path".to_string()))?;
            let template_name = relative_path.to_string_lossy().replace('\\', "/");
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template: {:?}", path))?;
            templates.insert(template_name, content);
        }
    }
    Ok(())
}

fn error_chain(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}

/// HTML escaping used by autoescape and hand-built links. Same as
/// `tera::escape_html` except that `/` stays readable, so URLs in `href`
/// attributes keep their slashes.
pub fn escape_text(text: &str) -> String {
    tera::escape_html(text).replace("&#x2F;", "/")
}

/// Last-resort page when even the error template cannot be rendered
fn simple_error_page(status: u16, message: &str) -> String {
    let message = escape_text(message);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Error {status}</title>
</head>
<body>
    <h1>Error {status}</h1>
    <p>{message}</p>
</body>
</html>"#
    )
}
