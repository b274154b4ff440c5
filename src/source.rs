//! Where template text comes from, and the cache of parsed templates.
//!
//! Inline text and SQL files share one keeper. The key is the source
//! identity (the inline text itself, or the absolute file path) together
//! with the sorted names of the bound parameters, so a file is read at most
//! once per distinct key and a template is never parsed twice for it.

use tracing::{debug, info};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::SharedKeeper;
use crate::context::OperationContext;
use crate::error::{Result, TwinsqlaError};
use crate::settings::Settings;
use crate::template::{Rendered, Template};
use crate::value::Params;

// ------------- SqlSource -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlSource<'a> {
    Inline(&'a str),
    File(&'a Path),
}

impl<'a> SqlSource<'a> {
    /// At most one origin may be given; none at all is valid and means the
    /// statement has to be synthesized.
    pub fn from_parts(query: Option<&'a str>, sql_path: Option<&'a Path>) -> Result<Option<Self>> {
        match (query, sql_path) {
            (Some(_), Some(_)) => Err(TwinsqlaError::DuplicatedQueryArgument),
            (Some(query), None) => Ok(Some(SqlSource::Inline(query))),
            (None, Some(path)) => Ok(Some(SqlSource::File(path))),
            (None, None) => Ok(None),
        }
    }
    pub fn from_context(context: &OperationContext<'a>) -> Result<Option<Self>> {
        Self::from_parts(context.query, context.sql_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceKey {
    Inline(String),
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    source: SourceKey,
    names: Vec<String>,
}

/// Removes the whitespace prefix shared by all non-blank lines.
///
/// Tabs and spaces are compared literally, so `"\t"` and `"    "` share no
/// prefix. Whitespace-only lines are emptied and line endings are kept.
pub fn dedent(text: &str) -> String {
    let mut margin: Option<&str> = None;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let indent = &line[..line.len() - line.trim_start().len()];
        margin = Some(margin.map_or(indent, |m| common_prefix(m, indent)));
    }
    let margin = margin.unwrap_or("");
    text.split_inclusive('\n')
        .map(|line| {
            if !line.trim().is_empty() {
                line.strip_prefix(margin).unwrap_or(line)
            } else if line.ends_with('\n') {
                "\n"
            } else {
                ""
            }
        })
        .collect()
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let len: usize = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len_utf8())
        .sum();
    &a[..len]
}

// ------------- SqlBuilder -------------
#[derive(Debug)]
pub struct SqlBuilder {
    available_dynamic_query: bool,
    validate_table_names: bool,
    sql_file_root: PathBuf,
    templates: SharedKeeper<TemplateKey, Template>,
}

impl SqlBuilder {
    pub fn new(settings: &Settings) -> Result<Self> {
        let root = settings.sql_file_root.clone().unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            available_dynamic_query: settings.available_dynamic_query,
            validate_table_names: settings.validate_table_names,
            sql_file_root: std::path::absolute(root)?,
            templates: SharedKeeper::new(settings.cache_size),
        })
    }
    pub fn available_dynamic_query(&self) -> bool {
        self.available_dynamic_query
    }
    pub fn validate_table_names(&self) -> bool {
        self.validate_table_names
    }
    pub fn sql_file_root(&self) -> &Path {
        &self.sql_file_root
    }
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.sql_file_root.join(path)
        }
    }

    /// Returns the cached template for `source` as seen with `params`,
    /// loading and parsing it on first use.
    pub fn template(&self, source: SqlSource, params: &Params) -> Result<Arc<Template>> {
        let mut names: Vec<String> = params.names().map(str::to_string).collect();
        names.sort_unstable();
        let key = TemplateKey {
            source: match source {
                SqlSource::Inline(text) => SourceKey::Inline(text.to_string()),
                SqlSource::File(path) => SourceKey::File(self.resolve_path(path)),
            },
            names,
        };
        let (template, cached) = self.templates.get_or_try_keep(&key, || {
            let text = match &key.source {
                SourceKey::Inline(text) => dedent(text),
                SourceKey::File(path) => {
                    info!(path = %path.display(), "loading sql file");
                    fs::read_to_string(path)?
                }
            };
            let names = key.names.iter().map(String::as_str);
            if self.available_dynamic_query {
                Template::parse(&text, names)
            } else {
                Ok(Template::verbatim(&text, names))
            }
        })?;
        debug!(cached, names = ?key.names, "template resolved");
        Ok(template)
    }

    /// Renders the context's template, or `None` when it names no SQL.
    pub fn render(&self, context: &OperationContext) -> Result<Option<Rendered>> {
        match SqlSource::from_context(context)? {
            Some(source) => {
                let template = self.template(source, &context.params)?;
                template.render(&context.params).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn cached_templates(&self) -> Result<usize> {
        self.templates.len()
    }
    pub fn clear_cache(&self) -> Result<()> {
        self.templates.clear()
    }
}
