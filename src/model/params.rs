//! Parameter set and placeholder substitution.
//!
//! Placeholder syntax inside profile strings:
//! - `%name%` inserts the parameter value
//! - `%~name%` inserts a version parameter (see [`Context::Pattern`])
//! - `%%` inserts a literal `%`
//!
//! Any other `%` is kept as-is, so shell text such as `date +%Y-%m` survives
//! untouched. Names match `[A-Za-z_][A-Za-z0-9_]*`.

use crate::ConfigurationError;
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;

/// Generic dotted version pattern used by relaxed version placeholders.
pub const VERSION_PATTERN: &str = r"\d+(?:\.\d+)*";

/// A single input value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Scalar(String),
    List(Vec<String>),
}

/// Externally supplied named values.
///
/// Built once before a run and never mutated afterwards; every builder
/// method consumes the set and returns a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    values: BTreeMap<String, ParamValue>,
}

impl ParameterSet {
    pub fn new() -> Self {
        ParameterSet::default()
    }

    /// Parse a YAML (or JSON) mapping of inputs.
    ///
    /// Scalars may be strings, numbers, or booleans and are kept in their
    /// textual form. Sequences become lists of scalars.
    pub fn parse(text: &str, origin: &str) -> Result<Self, ConfigurationError> {
        if text.trim().is_empty() {
            return Ok(ParameterSet::new());
        }

        let raw: Option<BTreeMap<String, YamlValue>> =
            serde_yaml::from_str(text).map_err(|e| ConfigurationError::Parse {
                origin: origin.to_string(),
                message: e.to_string(),
            })?;

        let mut params = ParameterSet::new();
        for (name, value) in raw.unwrap_or_default() {
            let value = param_from_yaml(&name, &value)?;
            params = params.with_value(name, value)?;
        }
        Ok(params)
    }

    pub fn with_scalar(self, name: impl Into<String>, value: impl Into<String>) -> Result<Self, ConfigurationError> {
        self.with_value(name.into(), ParamValue::Scalar(value.into()))
    }

    pub fn with_list<I, S>(self, name: impl Into<String>, items: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = items.into_iter().map(Into::into).collect();
        self.with_value(name.into(), ParamValue::List(items))
    }

    /// Apply a `key=value` override.
    ///
    /// A value starting with `[` is read as a YAML flow sequence, so
    /// `plugins=[a, b]` yields a list. Anything else is a literal scalar.
    pub fn with_override(self, spec: &str) -> Result<Self, ConfigurationError> {
        let (name, raw) = spec.split_once('=').ok_or_else(|| ConfigurationError::InvalidParameter {
            name: spec.to_string(),
            reason: "expected KEY=VALUE".to_string(),
        })?;
        let name = name.trim();

        let value = if raw.trim_start().starts_with('[') {
            let parsed: YamlValue = serde_yaml::from_str(raw).map_err(|e| ConfigurationError::InvalidParameter {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            param_from_yaml(name, &parsed)?
        } else {
            ParamValue::Scalar(raw.to_string())
        };

        self.with_value(name.to_string(), value)
    }

    /// Union of two sets; keys in `other` win.
    pub fn merge(mut self, other: ParameterSet) -> Self {
        self.values.extend(other.values);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn with_value(mut self, name: String, value: ParamValue) -> Result<Self, ConfigurationError> {
        if !is_identifier(&name) {
            return Err(ConfigurationError::InvalidParameter {
                name,
                reason: "names must match [A-Za-z_][A-Za-z0-9_]*".to_string(),
            });
        }
        self.values.insert(name, value);
        Ok(self)
    }
}

fn param_from_yaml(name: &str, value: &YamlValue) -> Result<ParamValue, ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidParameter {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    match value {
        YamlValue::Sequence(items) => items
            .iter()
            .map(|item| scalar_text(item).ok_or_else(|| invalid("list items must be scalars")))
            .collect::<Result<Vec<_>, _>>()
            .map(ParamValue::List),
        other => scalar_text(other)
            .map(ParamValue::Scalar)
            .ok_or_else(|| invalid("value must be a string, number, boolean, or list")),
    }
}

/// Textual form of a YAML scalar; `None` for null, maps, and sequences.
pub(crate) fn scalar_text(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Where a substituted string ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Context {
    /// Command text, paths, env names and values: inserted verbatim
    Literal,
    /// Regular expression: values are escaped; `%~name%` expands to
    /// [`VERSION_PATTERN`] unless versions are strict
    Pattern { strict_versions: bool },
}

/// Parameter lookup, optionally with one extra binding layered on top.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scope<'a> {
    params: &'a ParameterSet,
    binding: Option<(&'a str, &'a str)>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(params: &'a ParameterSet) -> Self {
        Scope { params, binding: None }
    }

    /// Bind `name` to a scalar, shadowing any parameter of the same name
    pub(crate) fn bind(self, name: &'a str, value: &'a str) -> Self {
        Scope {
            params: self.params,
            binding: Some((name, value)),
        }
    }

    pub(crate) fn scalar(&self, name: &str) -> Result<&'a str, ConfigurationError> {
        if let Some((bound, value)) = self.binding {
            if bound == name {
                return Ok(value);
            }
        }

        match self.params.get(name) {
            Some(ParamValue::Scalar(value)) => Ok(value.as_str()),
            Some(ParamValue::List(_)) => Err(ConfigurationError::ListAsScalar { name: name.to_string() }),
            None => Err(ConfigurationError::UnknownParameter { name: name.to_string() }),
        }
    }

    pub(crate) fn list(&self, name: &str) -> Result<&'a [String], ConfigurationError> {
        match self.params.get(name) {
            Some(ParamValue::List(items)) => Ok(items.as_slice()),
            Some(ParamValue::Scalar(_)) => Err(ConfigurationError::NotAList { name: name.to_string() }),
            None => Err(ConfigurationError::UnknownParameter { name: name.to_string() }),
        }
    }
}

struct Placeholder<'t> {
    name: &'t str,
    version: bool,
    /// Bytes consumed after the opening `%`, closing `%` included
    len: usize,
}

fn parse_placeholder(after: &str) -> Option<Placeholder<'_>> {
    let (version, body) = match after.strip_prefix('~') {
        Some(body) => (true, body),
        None => (false, after),
    };

    let name_len = body
        .char_indices()
        .take_while(|&(i, c)| match i {
            0 => c.is_ascii_alphabetic() || c == '_',
            _ => c.is_ascii_alphanumeric() || c == '_',
        })
        .count();

    if name_len == 0 || !body[name_len..].starts_with('%') {
        return None;
    }

    Some(Placeholder {
        name: &body[..name_len],
        version,
        len: usize::from(version) + name_len + 1,
    })
}

/// Resolve every placeholder in `template`.
pub(crate) fn substitute(template: &str, scope: &Scope<'_>, context: Context) -> Result<String, ConfigurationError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(stripped) = after.strip_prefix('%') {
            out.push('%');
            rest = stripped;
            continue;
        }

        match parse_placeholder(after) {
            Some(placeholder) => {
                let value = scope.scalar(placeholder.name)?;
                match context {
                    Context::Literal => out.push_str(value),
                    Context::Pattern { strict_versions } if placeholder.version && !strict_versions => {
                        out.push_str(VERSION_PATTERN)
                    }
                    Context::Pattern { .. } => out.push_str(&regex::escape(value)),
                }
                rest = &after[placeholder.len..];
            }
            None => {
                out.push('%');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}
