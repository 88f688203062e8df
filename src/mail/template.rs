use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use askama::filters::{Escaper, Html};
use regex::Regex;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("placeholder regex is valid"));

static TEMPLATE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("template name regex is valid"));

#[derive(Debug)]
pub enum TemplateError {
    NotFound { name: String, tried: Vec<PathBuf> },
    InvalidName(String),
    Io { path: PathBuf, source: std::io::Error },
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateError::NotFound { name, tried } => {
                let tried = tried
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "Email template not found: {name} (tried: {tried})")
            }
            TemplateError::InvalidName(name) => write!(f, "Invalid template name: {name:?}"),
            TemplateError::Io { path, source } => {
                write!(f, "Failed to read template {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for TemplateError {}

/// HTML templates on disk, looked up as `{name}.html` in the primary
/// directory first and then in the fallback directory.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    primary: PathBuf,
    fallback: PathBuf,
}

impl TemplateStore {
    pub fn new(primary: impl Into<PathBuf>, fallback: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            fallback: fallback.into(),
        }
    }

    pub async fn load(&self, name: &str) -> Result<String, TemplateError> {
        if !TEMPLATE_NAME_RE.is_match(name) {
            return Err(TemplateError::InvalidName(name.to_string()));
        }

        let file = format!("{name}.html");
        let candidates = [self.primary.join(&file), self.fallback.join(&file)];

        for path in &candidates {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => return Ok(content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(TemplateError::Io {
                        path: path.clone(),
                        source,
                    });
                }
            }
        }

        Err(TemplateError::NotFound {
            name: name.to_string(),
            tried: candidates.to_vec(),
        })
    }
}

/// Replace `{{key}}` placeholders with values from `vars`.
///
/// Keys present with a `null` value render as an empty string. Keys missing
/// from `vars` are left in the output untouched.
pub fn render(template: &str, vars: &serde_json::Value) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures| match vars.get(&caps[1]) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) => String::new(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Escape text for interpolation into HTML, the same way the compiled
/// notification templates escape their fields.
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    // Writing into a String cannot fail.
    let _ = Html.write_escaped_str(&mut out, value);
    out
}
