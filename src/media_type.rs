//! Media-type parsing and comparison.
//!
//! A [`MediaType`] is the parsed form of a `Content-Type` string such as
//! `application/json-patch+json; charset=utf-8`. Two comparison modes are
//! provided and they are *not* the same thing:
//!
//! - [`MediaType::matches`] - exact base-type equality (parameters stripped),
//!   used when matching a response against a contract entry.
//! - [`MediaType::compatible`] - structural-syntax equality (the `+json` in
//!   `application/json-patch+json` routes to the JSON codec), used when
//!   picking an encoder for a declared request type.

use std::fmt;
use std::str::FromStr;

use crate::error::ContractError;

/// A parsed media type.
///
/// The type, subtype and suffix are lowercased at parse time so all
/// comparisons are case-insensitive. Parameters are kept verbatim.
///
/// ## Examples
///
/// ```
/// use api_contract::MediaType;
///
/// let mt: MediaType = "application/json-patch+json; charset=utf-8".parse().unwrap();
/// assert_eq!(mt.essence(), "application/json-patch+json");
/// assert!(mt.compatible(&"application/json".parse().unwrap()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    type_: String,
    subtype: String,
    suffix: Option<String>,
    parameters: Vec<(String, String)>,
}

impl MediaType {
    /// Parses a media-type string.
    ///
    /// Splits on `;` for parameters, then on the last `+` for the structural
    /// suffix, then on `/` for type and subtype.
    ///
    /// ## Errors
    ///
    /// Returns [`ContractError::InvalidMediaType`] if the string has no
    /// `type/subtype` part.
    pub fn parse(s: &str) -> Result<Self, ContractError> {
        let mut sections = s.split(';');
        let essence = sections
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        let (type_, full_subtype) = essence
            .split_once('/')
            .ok_or_else(|| ContractError::InvalidMediaType(s.to_string()))?;
        if type_.is_empty() || full_subtype.is_empty() {
            return Err(ContractError::InvalidMediaType(s.to_string()));
        }

        let (subtype, suffix) = match full_subtype.rsplit_once('+') {
            Some((base, suffix)) if !suffix.is_empty() => {
                (format!("{base}+{suffix}"), Some(suffix.to_string()))
            }
            _ => (full_subtype.to_string(), None),
        };

        let parameters = sections
            .filter_map(|p| {
                let p = p.trim();
                if p.is_empty() {
                    return None;
                }
                let (k, v) = p.split_once('=').unwrap_or((p, ""));
                Some((k.trim().to_string(), v.trim().to_string()))
            })
            .collect();

        Ok(Self {
            type_: type_.to_string(),
            subtype,
            suffix,
            parameters,
        })
    }

    /// Builds a parameterless media type from known-good parts. Used for the
    /// canonical wire-format table, which must not go through fallible
    /// parsing.
    pub(crate) fn from_parts(type_: &str, subtype: &str) -> Self {
        let suffix = subtype
            .rsplit_once('+')
            .map(|(_, suffix)| suffix.to_string());
        Self {
            type_: type_.to_string(),
            subtype: subtype.to_string(),
            suffix,
            parameters: Vec::new(),
        }
    }

    /// The top-level type, e.g. `application`.
    pub fn type_(&self) -> &str {
        &self.type_
    }

    /// The full subtype including any suffix, e.g. `json-patch+json`.
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// The structural suffix, e.g. `json` for `application/merge-patch+json`.
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// The parameters following the base type, in declaration order.
    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    /// The base `type/subtype` string with parameters stripped.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }

    /// The suffix if present, otherwise the subtype. This is what decides
    /// which wire format can represent the media type.
    fn effective_suffix(&self) -> &str {
        self.suffix.as_deref().unwrap_or(&self.subtype)
    }

    fn is_any(&self) -> bool {
        self.type_ == "*" && self.subtype == "*"
    }

    /// Returns whether the two media types share a wire syntax.
    ///
    /// True when the types are equal and either subtype is a wildcard, or
    /// the effective suffixes (suffix if present, else subtype) are equal.
    /// `application/json-patch+json` is compatible with `application/json`;
    /// `application/xml` is not compatible with `application/json`.
    pub fn compatible(&self, other: &MediaType) -> bool {
        if self.type_ != other.type_ {
            return false;
        }
        self.subtype == "*"
            || other.subtype == "*"
            || self.effective_suffix() == other.effective_suffix()
    }

    /// Returns whether the two media types have the same base type, ignoring
    /// parameters. `*/*` matches everything. Symmetric.
    pub fn matches(&self, other: &MediaType) -> bool {
        self.is_any() || other.is_any() || (self.type_ == other.type_ && self.subtype == other.subtype)
    }
}

impl FromStr for MediaType {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        for (k, v) in &self.parameters {
            if v.is_empty() {
                write!(f, "; {k}")?;
            } else {
                write!(f, "; {k}={v}")?;
            }
        }
        Ok(())
    }
}
