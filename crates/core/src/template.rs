use crate::config::RenamerConfig;
use crate::date_format::format_millis;
use crate::error::RenameError;
use crate::metadata::Metadata;
use crate::path_info::normalize_path;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::path::{PathBuf, MAIN_SEPARATOR_STR};
use std::sync::Arc;
use thiserror::Error;

const DATE_FIELDS: &[&str] = &["datetime", "date", "time"];

pub type TemplateFn = dyn Fn(&Metadata) -> String + Send + Sync;

/// How a target path is produced: a `{{placeholder}}` pattern, or a caller
/// function returning the path (relative paths are joined to the source
/// directory).
#[derive(Clone)]
pub enum Template {
    Pattern(String),
    Custom(Arc<TemplateFn>),
}

impl Template {
    pub fn pattern(text: impl Into<String>) -> Self {
        Self::Pattern(text.into())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Metadata) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }
}

impl From<&str> for Template {
    fn from(value: &str) -> Self {
        Self::Pattern(value.to_string())
    }
}

impl From<String> for Template {
    fn from(value: String) -> Self {
        Self::Pattern(value)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(text) => f.write_str(text),
            Self::Custom(_) => f.write_str("<custom>"),
        }
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(text) => f.debug_tuple("Pattern").field(text).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub field: Vec<String>,
    pub format: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("プレースホルダが閉じられていません: {0}")]
    UnclosedPlaceholder(String),
    #[error("空のプレースホルダです")]
    EmptyPlaceholder,
    #[error("フィールド名が不正です: {0}")]
    InvalidField(String),
    #[error("引用符が閉じられていません: {0}")]
    UnterminatedQuote(String),
    #[error("{0} には書式引数を指定できません")]
    UnexpectedArgument(String),
}

pub fn validate_template(input: &str) -> Result<(), TemplateError> {
    parse_template(input).map(|_| ())
}

pub fn parse_template(input: &str) -> Result<Vec<TemplatePart>, TemplateError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        literal.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        let end = find_close(body).map_err(|err| match err {
            TemplateError::UnclosedPlaceholder(_) => {
                TemplateError::UnclosedPlaceholder(rest[start..].to_string())
            }
            other => other,
        })?;

        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
        }
        parts.push(TemplatePart::Placeholder(parse_placeholder(&body[..end])?));
        rest = &body[end + 2..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }

    Ok(parts)
}

/// Renders the absolute target path for `metadata`.
pub fn render_target(
    metadata: &Metadata,
    template: &Template,
    config: &RenamerConfig,
) -> Result<PathBuf, RenameError> {
    let text = match template {
        Template::Custom(f) => {
            let output = f(metadata);
            if output.trim().is_empty() {
                return Err(RenameError::EmptyCustomOutput(metadata.info.path.clone()));
            }
            return Ok(normalize_path(&metadata.info.dir.join(output)));
        }
        Template::Pattern(text) => normalize_separator(text, &config.path_separator),
    };

    let parts = parse_template(&text)?;
    let (dir_parts, file_parts) = split_at_last_colon(parts);
    let source_relative = match dir_parts.first() {
        None => true,
        Some(TemplatePart::Literal(text)) => text.starts_with('.'),
        Some(TemplatePart::Placeholder(_)) => false,
    };

    let context = metadata.to_context();
    let dir = render_parts(&dir_parts, &context, metadata, config);
    let file = render_parts(&file_parts, &context, metadata, config);

    let base = if source_relative {
        metadata.info.dir.join(dir)
    } else {
        let dir = PathBuf::from(dir);
        if dir.is_absolute() {
            dir
        } else {
            metadata.here.join(dir)
        }
    };

    Ok(normalize_path(&base.join(file)))
}

pub fn render_parts(
    parts: &[TemplatePart],
    context: &Value,
    metadata: &Metadata,
    config: &RenamerConfig,
) -> String {
    let mut output = String::new();
    for part in parts {
        match part {
            TemplatePart::Literal(text) => output.push_str(text),
            TemplatePart::Placeholder(placeholder) => {
                output.push_str(&render_placeholder(placeholder, context, metadata, config))
            }
        }
    }
    output
}

fn render_placeholder(
    placeholder: &Placeholder,
    context: &Value,
    metadata: &Metadata,
    config: &RenamerConfig,
) -> String {
    let mask = match (placeholder.field.as_slice(), placeholder.format.as_deref()) {
        ([_], Some(format)) => Some(format),
        ([field], None) if field == "datetime" => Some(config.formats.datetime.as_str()),
        _ => None,
    };
    if let Some(mask) = mask {
        return format_millis(metadata.datetime, mask).unwrap_or_default();
    }

    lookup(context, &placeholder.field)
        .map(value_to_string)
        .unwrap_or_default()
}

fn lookup<'a>(context: &'a Value, field: &[String]) -> Option<&'a Value> {
    field.iter().try_fold(context, |node, key| match node {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null | Value::Object(_) => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(","),
    }
}

fn normalize_separator(text: &str, separator: &str) -> String {
    if separator.is_empty() || separator == MAIN_SEPARATOR_STR {
        text.to_string()
    } else {
        text.replace(separator, MAIN_SEPARATOR_STR)
    }
}

/// Splits on the last `:` found in literal text. Placeholders are never
/// split, so `{{datetime "HH:MM"}}` stays intact.
fn split_at_last_colon(parts: Vec<TemplatePart>) -> (Vec<TemplatePart>, Vec<TemplatePart>) {
    let Some(index) = parts
        .iter()
        .rposition(|p| matches!(p, TemplatePart::Literal(text) if text.contains(':')))
    else {
        return (Vec::new(), parts);
    };

    let mut dir_parts = parts;
    let mut file_parts = dir_parts.split_off(index + 1);
    if let Some(TemplatePart::Literal(text)) = dir_parts.pop() {
        if let Some((before, after)) = text.rsplit_once(':') {
            if !before.is_empty() {
                dir_parts.push(TemplatePart::Literal(before.to_string()));
            }
            if !after.is_empty() {
                file_parts.insert(0, TemplatePart::Literal(after.to_string()));
            }
        }
    }
    (dir_parts, file_parts)
}

fn find_close(body: &str) -> Result<usize, TemplateError> {
    let mut quote: Option<char> = None;
    for (i, ch) in body.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch == '}' && body[i + 1..].starts_with('}') => return Ok(i),
            None => {}
        }
    }

    match quote {
        Some(_) => Err(TemplateError::UnterminatedQuote(body.to_string())),
        None => Err(TemplateError::UnclosedPlaceholder(body.to_string())),
    }
}

fn parse_placeholder(body: &str) -> Result<Placeholder, TemplateError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(TemplateError::EmptyPlaceholder);
    }

    let (field, argument) = match trimmed.find(char::is_whitespace) {
        Some(i) => (&trimmed[..i], trimmed[i..].trim_start()),
        None => (trimmed, ""),
    };

    let segments: Vec<String> = field.split('.').map(str::to_string).collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || s.contains(['"', '\'', '{', '}']))
    {
        return Err(TemplateError::InvalidField(field.to_string()));
    }

    let format = if argument.is_empty() {
        None
    } else {
        Some(parse_quoted(argument, field)?)
    };
    if format.is_some() && !(segments.len() == 1 && DATE_FIELDS.contains(&field)) {
        return Err(TemplateError::UnexpectedArgument(field.to_string()));
    }

    Ok(Placeholder {
        field: segments,
        format,
    })
}

fn parse_quoted(argument: &str, field: &str) -> Result<String, TemplateError> {
    let mut chars = argument.chars();
    let quote = match chars.next() {
        Some(q @ ('"' | '\'')) => q,
        _ => return Err(TemplateError::UnexpectedArgument(field.to_string())),
    };
    let inner = &argument[1..];
    let end = inner
        .find(quote)
        .ok_or_else(|| TemplateError::UnterminatedQuote(argument.to_string()))?;
    if !inner[end + 1..].trim().is_empty() {
        return Err(TemplateError::UnexpectedArgument(field.to_string()));
    }
    Ok(inner[..end].to_string())
}
