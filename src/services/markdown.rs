//! Markdown rendering service
//!
//! Converts entry content to HTML with pulldown-cmark. Fenced code blocks are
//! highlighted with syntect when the `codehilite` extension is enabled, and
//! every heading gets an anchor so a table of contents can link to it.
//!
//! # Example
//!
//! ```
//! use marigold::services::markdown::MarkdownRenderer;
//!
//! let renderer = MarkdownRenderer::new();
//! let rendered = renderer.render("# Hello World\n\nThis is **bold** text.");
//! assert!(rendered.html.contains("<strong>"));
//! assert_eq!(rendered.toc.len(), 1);
//! ```

use pulldown_cmark::{html, CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

/// Extensions enabled when none are configured
pub const DEFAULT_EXTENSIONS: [&str; 4] = ["tables", "strikethrough", "footnotes", "codehilite"];

const DEFAULT_THEME: &str = "base16-ocean.dark";

/// One heading of a rendered document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    /// Heading level, 1 to 6
    pub level: u8,
    /// Anchor of the heading
    pub id: String,
    /// Plain text of the heading
    pub title: String,
}

/// Output of a markdown conversion
#[derive(Debug, Clone, Default)]
pub struct RenderedMarkdown {
    pub html: String,
    pub toc: Vec<TocEntry>,
}

impl RenderedMarkdown {
    /// Nested `<ul>` table of contents, or `None` when the document has no headings
    pub fn toc_html(&self) -> Option<String> {
        if self.toc.is_empty() {
            return None;
        }
        let mut out = String::from("<div class=\"toc\">\n");
        let mut depth = 0usize;
        let base = self.toc.iter().map(|e| e.level).min().unwrap_or(1);

        for entry in &self.toc {
            let target = usize::from(entry.level - base) + 1;
            if target > depth {
                while depth < target {
                    out.push_str("<ul>\n");
                    depth += 1;
                }
            } else {
                out.push_str("</li>\n");
                while depth > target {
                    out.push_str("</ul>\n</li>\n");
                    depth -= 1;
                }
            }
            out.push_str(&format!(
                "<li><a href=\"#{}\">{}</a>",
                html_escape(&entry.id),
                html_escape(&entry.title)
            ));
        }
        out.push_str("</li>\n");
        while depth > 1 {
            out.push_str("</ul>\n</li>\n");
            depth -= 1;
        }
        out.push_str("</ul>\n</div>\n");
        Some(out)
    }
}

/// A thread-safe Markdown renderer with syntax highlighting support.
#[derive(Clone)]
pub struct MarkdownRenderer {
    options: Options,
    highlight: bool,
    syntax_set: Arc<SyntaxSet>,
    theme_set: Arc<ThemeSet>,
    theme_name: String,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    /// Renderer with the default extensions
    pub fn new() -> Self {
        Self::with_extensions(&DEFAULT_EXTENSIONS)
    }

    /// Renderer enabling the named extensions.
    ///
    /// Known names: `tables`, `strikethrough`, `footnotes`, `tasklists`,
    /// `smarty` and `codehilite`. Unknown names are ignored with a warning.
    pub fn with_extensions<S: AsRef<str>>(extensions: &[S]) -> Self {
        let mut options = Options::empty();
        let mut highlight = false;

        for extension in extensions {
            match extension.as_ref().trim() {
                "tables" => options.insert(Options::ENABLE_TABLES),
                "strikethrough" => options.insert(Options::ENABLE_STRIKETHROUGH),
                "footnotes" => options.insert(Options::ENABLE_FOOTNOTES),
                "tasklists" => options.insert(Options::ENABLE_TASKLISTS),
                "smarty" => options.insert(Options::ENABLE_SMART_PUNCTUATION),
                "codehilite" => highlight = true,
                // headings always carry anchors
                "toc" => {}
                other => tracing::warn!("Unknown markdown extension '{}' ignored", other),
            }
        }

        Self {
            options,
            highlight,
            syntax_set: Arc::new(SyntaxSet::load_defaults_newlines()),
            theme_set: Arc::new(ThemeSet::load_defaults()),
            theme_name: DEFAULT_THEME.to_string(),
        }
    }

    /// Use another syntect theme. Falls back to the default one if unknown.
    pub fn with_theme(mut self, theme_name: &str) -> Self {
        self.theme_name = if self.theme_set.themes.contains_key(theme_name) {
            theme_name.to_string()
        } else {
            DEFAULT_THEME.to_string()
        };
        self
    }

    /// Renders Markdown text to HTML and collects its headings.
    pub fn render(&self, markdown: &str) -> RenderedMarkdown {
        let parser = Parser::new_ext(markdown, self.options);
        let mut toc = Vec::new();
        let events = self.process_events(parser, &mut toc);

        let mut html_output = String::new();
        html::push_html(&mut html_output, events.into_iter());

        RenderedMarkdown {
            html: html_output,
            toc,
        }
    }

    /// Processes parser events: highlights code blocks and anchors headings.
    fn process_events<'a>(&self, parser: Parser<'a>, toc: &mut Vec<TocEntry>) -> Vec<Event<'a>> {
        let mut events = Vec::new();
        let mut used_ids = HashSet::new();

        let mut in_code_block = false;
        let mut code_lang: Option<String> = None;
        let mut code_content = String::new();

        let mut heading: Option<(HeadingLevel, Option<String>)> = None;
        let mut heading_events: Vec<Event<'a>> = Vec::new();
        let mut heading_text = String::new();

        for event in parser {
            if heading.is_some() {
                match event {
                    Event::End(TagEnd::Heading(_)) => {
                        let (level, explicit_id) = heading.take().unwrap_or((HeadingLevel::H1, None));
                        let id = unique_id(
                            explicit_id.unwrap_or_else(|| slugify(&heading_text)),
                            &mut used_ids,
                        );
                        let mut inner = String::new();
                        html::push_html(&mut inner, heading_events.drain(..));
                        let n = level as u8;
                        events.push(Event::Html(
                            format!("<h{n} id=\"{}\">{}</h{n}>\n", html_escape(&id), inner).into(),
                        ));
                        toc.push(TocEntry {
                            level: n,
                            id,
                            title: heading_text.trim().to_string(),
                        });
                        heading_text.clear();
                    }
                    Event::Text(ref text) | Event::Code(ref text) => {
                        heading_text.push_str(text);
                        heading_events.push(event);
                    }
                    other => heading_events.push(other),
                }
                continue;
            }

            match event {
                Event::Start(Tag::Heading { level, id, .. }) => {
                    heading = Some((level, id.map(|i| i.to_string())));
                }
                Event::Start(Tag::CodeBlock(kind)) => {
                    in_code_block = true;
                    code_content.clear();
                    code_lang = match kind {
                        CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.to_string()),
                        _ => None,
                    };
                }
                Event::End(TagEnd::CodeBlock) => {
                    in_code_block = false;
                    let block = match code_lang.take() {
                        Some(lang) if self.highlight => self.highlight_code(&code_content, &lang),
                        Some(lang) => plain_code_block_with_lang(&code_content, &lang),
                        None => plain_code_block(&code_content),
                    };
                    events.push(Event::Html(block.into()));
                }
                Event::Text(text) if in_code_block => {
                    code_content.push_str(&text);
                }
                _ => events.push(event),
            }
        }

        events
    }

    /// Applies syntax highlighting to a code block, or renders it plain when
    /// the language is not recognized.
    fn highlight_code(&self, code: &str, lang: &str) -> String {
        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang));

        match (syntax, self.theme_set.themes.get(&self.theme_name)) {
            (Some(syntax), Some(theme)) => {
                highlighted_html_for_string(code, &self.syntax_set, syntax, theme)
                    .unwrap_or_else(|_| plain_code_block(code))
            }
            _ => plain_code_block_with_lang(code, lang),
        }
    }
}

fn plain_code_block(code: &str) -> String {
    format!("<pre><code>{}</code></pre>", html_escape(code))
}

fn plain_code_block_with_lang(code: &str, lang: &str) -> String {
    format!(
        "<pre><code class=\"language-{}\">{}</code></pre>",
        html_escape(lang),
        html_escape(code)
    )
}

/// Anchor for a heading: lowercase words joined by `-`
fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for c in text.trim().to_lowercase().chars() {
        if c.is_alphanumeric() || c == '_' {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-') && !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}

fn unique_id(base: String, used: &mut HashSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{}_{}", base, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Escapes HTML special characters in a string.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
