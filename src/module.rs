//! Module coordinates and selector notation
//!
//! Converts user-supplied `"group:name:version"` literals into typed
//! selectors and classifies version selectors as fixed or dynamic.

use crate::error::{TrestleError, TrestleResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A module identity without a version (`group:name`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleIdentifier {
    pub group: String,
    pub name: String,
}

impl ModuleIdentifier {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ModuleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

/// A module selector with a version (`group:name:version`)
///
/// The version may be a fixed version or a dynamic selector such as
/// `1.+`, `latest.release` or a range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleVersionSelector {
    pub group: String,
    pub name: String,
    pub version: String,
}

impl ModuleVersionSelector {
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    /// Parse a `"group:name:version"` notation
    pub fn parse(notation: &str) -> TrestleResult<Self> {
        let parts: Vec<&str> = notation.split(':').collect();
        if parts.len() != 3 {
            return Err(TrestleError::notation(
                notation,
                "expected group:name:version",
            ));
        }
        for part in &parts {
            if part.trim().is_empty() {
                return Err(TrestleError::notation(
                    notation,
                    "group, name and version must be non-empty",
                ));
            }
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }

    /// The versionless identity of this selector
    pub fn module(&self) -> ModuleIdentifier {
        ModuleIdentifier::new(self.group.clone(), self.name.clone())
    }

    /// Whether the selector matches the given coordinates, ignoring version
    pub fn matches_module(&self, other: &ModuleVersionSelector) -> bool {
        self.group == other.group && self.name == other.name
    }

    /// Whether the version part is a dynamic selector rather than a
    /// fixed version.
    ///
    /// Dynamic selectors are resolved against a repository listing:
    /// `latest.*`, prefix selectors (`1.+`), ranges (`[1.0,2.0)`), and
    /// semver requirement syntax (`^1.2`, `>=1.0`).
    pub fn is_dynamic(&self) -> bool {
        let v = self.version.as_str();
        if v == "latest" || v.starts_with("latest.") {
            return true;
        }
        if v.ends_with('+') || v.starts_with('[') || v.starts_with('(') {
            return true;
        }
        // Requirement syntax is only dynamic when it actually carries a
        // range operator; a bare "1.0" is a fixed version.
        if v.contains(['*', '^', '~', '>', '<', '=', ',']) {
            return semver::VersionReq::parse(v).is_ok();
        }
        false
    }
}

impl fmt::Display for ModuleVersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)
    }
}

/// Parse a batch of notations, preserving order
pub fn parse_selectors<'a, I>(notations: I) -> TrestleResult<Vec<ModuleVersionSelector>>
where
    I: IntoIterator<Item = &'a str>,
{
    notations
        .into_iter()
        .map(ModuleVersionSelector::parse)
        .collect()
}
