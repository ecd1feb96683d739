//! Parameter token syntax.
//!
//! A path segment is either literal text, a required parameter written
//! `:name:`, or an optional parameter written `::name::`. A token always
//! spans the whole segment.

use regex::Regex;

/// Characters a parameter value may contain.
pub const PARAM_CLASS: &str = r"[\p{L}\p{N}\p{M}.@_-]";

/// A classified path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Literal text, matched exactly.
    Literal(&'a str),
    /// A parameter that must be present and non-empty.
    Required(&'a str),
    /// A parameter that may be absent.
    Optional(&'a str),
}

impl<'a> Segment<'a> {
    /// Returns the parameter name, if this segment is a parameter.
    pub fn param_name(&self) -> Option<&'a str> {
        match self {
            Self::Literal(_) => None,
            Self::Required(name) | Self::Optional(name) => Some(*name),
        }
    }

    /// Returns true for parameter segments.
    pub fn is_param(&self) -> bool {
        !matches!(self, Self::Literal(_))
    }

    /// Returns true for optional parameter segments.
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional(_))
    }

    /// Regex fragment matching this segment and its trailing slash.
    pub fn fragment(&self) -> String {
        match self {
            Self::Literal(text) => format!("{}/", regex::escape(text)),
            Self::Required(_) => format!("{PARAM_CLASS}+/"),
            Self::Optional(_) => format!("(?:{PARAM_CLASS}+/)?"),
        }
    }
}

/// Recognizes parameter tokens.
#[derive(Debug, Clone)]
pub struct ParamSyntax {
    required: Regex,
    optional: Regex,
}

impl Default for ParamSyntax {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamSyntax {
    /// Creates the token recognizer.
    ///
    /// # Panics
    ///
    /// Never in practice: both patterns are fixed and valid.
    pub fn new() -> Self {
        Self {
            required: Regex::new(r"^:([^:/]*):$").expect("required parameter regex"),
            optional: Regex::new(r"^::([^:/]*)::$").expect("optional parameter regex"),
        }
    }

    /// Classifies a single segment (no slashes).
    ///
    /// A token with an empty name, such as `::`, classifies as a parameter
    /// with an empty name; the table builder rejects it.
    pub fn classify<'a>(&self, segment: &'a str) -> Segment<'a> {
        if let Some(caps) = self.optional.captures(segment) {
            if let Some(name) = caps.get(1) {
                return Segment::Optional(name.as_str());
            }
        }
        if let Some(caps) = self.required.captures(segment) {
            if let Some(name) = caps.get(1) {
                return Segment::Required(name.as_str());
            }
        }
        Segment::Literal(segment)
    }

    /// Splits a normalized path into classified non-empty segments.
    pub fn segments<'a>(&self, path: &'a str) -> Vec<Segment<'a>> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .map(|s| self.classify(s))
            .collect()
    }

    /// Returns true if any segment of the path is a parameter token.
    pub fn is_param_path(&self, path: &str) -> bool {
        path.split('/').any(|s| self.classify(s).is_param())
    }

    /// Returns the literal prefix of a normalized path: everything before
    /// the first parameter segment. Always starts and ends with `/`.
    pub fn literal_prefix(&self, path: &str) -> String {
        let mut prefix = String::from("/");
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if self.classify(segment).is_param() {
                break;
            }
            prefix.push_str(segment);
            prefix.push('/');
        }
        prefix
    }
}
