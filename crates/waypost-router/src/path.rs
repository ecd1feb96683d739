//! Path normalization and compiled path patterns.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::{Result, RouterError};
use crate::param::{ParamSyntax, Segment};
use crate::request::PathParams;

/// Canonicalizes a path: leading slash, every non-blank segment followed by
/// a single slash, empty and whitespace-only segments dropped.
///
/// The table builder and the dispatcher both go through this function, so
/// a path declared as `users//42` and a request for `/users/42` meet on the
/// same key.
///
/// ```
/// use waypost_router::normalize;
///
/// assert_eq!(normalize("users//42"), "/users/42/");
/// assert_eq!(normalize(""), "/");
/// assert_eq!(normalize("/a/ /b/"), "/a/b/");
/// ```
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 2);
    out.push('/');
    for segment in path.split('/') {
        if segment.trim().is_empty() {
            continue;
        }
        out.push_str(segment);
        out.push('/');
    }
    out
}

/// Maps segment positions (after the literal prefix) to parameter names.
pub type ParamIndexMap = BTreeMap<usize, String>;

/// A compiled parameterized path.
#[derive(Debug, Clone)]
pub struct PathPattern {
    /// The normalized declared path, tokens included.
    full_name: String,
    /// Literal text before the first parameter segment.
    prefix: String,
    /// Anchored regex over the whole normalized path.
    regex: Regex,
    /// Parameter names by position after the prefix.
    params: ParamIndexMap,
}

impl PathPattern {
    /// Compiles a normalized path containing at least one parameter token.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidParam`] for empty or repeated
    /// parameter names, [`RouterError::OptionalNotTrailing`] when an
    /// optional parameter is followed by anything but another optional
    /// parameter, and [`RouterError::InvalidPattern`] if the regex fails to
    /// compile.
    pub fn compile(syntax: &ParamSyntax, full_name: &str) -> Result<Self> {
        let prefix = syntax.literal_prefix(full_name);
        let segments = syntax.segments(full_name);

        let mut pattern = String::from("^/");
        for segment in &segments {
            pattern.push_str(&segment.fragment());
        }
        pattern.push('$');

        let mut params = ParamIndexMap::new();
        let mut pending_optional: Option<&str> = None;
        let rest = segments_after_prefix(syntax, full_name, &prefix);
        for (index, segment) in rest.iter().enumerate() {
            if let Some(param) = pending_optional {
                if !segment.is_optional() {
                    return Err(RouterError::OptionalNotTrailing {
                        path: full_name.to_string(),
                        param: param.to_string(),
                    });
                }
            }
            let Some(name) = segment.param_name() else {
                continue;
            };
            if name.is_empty() {
                return Err(RouterError::InvalidParam {
                    path: full_name.to_string(),
                    reason: "parameter name is empty".to_string(),
                });
            }
            if params.values().any(|existing| existing == name) {
                return Err(RouterError::InvalidParam {
                    path: full_name.to_string(),
                    reason: format!("parameter `{name}` is declared twice"),
                });
            }
            if segment.is_optional() {
                pending_optional = Some(name);
            }
            params.insert(index, name.to_string());
        }

        Ok(Self {
            full_name: full_name.to_string(),
            prefix,
            regex: Regex::new(&pattern)?,
            params,
        })
    }

    /// Returns true if the normalized path matches this pattern.
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Reads parameter values out of a normalized path that matched.
    ///
    /// Positions beyond the number of segments are absent optional
    /// parameters and are skipped.
    pub fn extract(&self, path: &str) -> PathParams {
        let mut params = PathParams::new();
        let rest = path.get(self.prefix.len()..).unwrap_or_default();
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        for (index, name) in &self.params {
            if let Some(value) = segments.get(*index) {
                params.insert(name.clone(), (*value).to_string());
            }
        }
        params
    }

    /// Returns the normalized declared path.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Returns the literal prefix used as the bucket key.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the regex source.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Returns the parameter index map.
    pub fn params(&self) -> &ParamIndexMap {
        &self.params
    }
}

fn segments_after_prefix<'a>(
    syntax: &ParamSyntax,
    full_name: &'a str,
    prefix: &str,
) -> Vec<Segment<'a>> {
    syntax.segments(full_name.get(prefix.len()..).unwrap_or_default())
}
