//! # Build-variable substitution.
//!
//! Configuration values (application names, version labels, environment names,
//! bucket keys) may reference variables of the surrounding CI build as `$NAME`
//! or `${NAME}`. Resolution is an injected [`Substitute`] implementation;
//! [`BuildVariables`] is the map-backed default.
//!
//! After substitution every value is **stripped** of leading/trailing `/` and
//! spaces, so `" my-app/ "` and `"my-app"` name the same thing.
//!
//! ```rust
//! use beanstalk_deployer::{BuildVariables, resolve_value};
//!
//! let vars = BuildVariables::new().with("BUILD_NUMBER", "42");
//! assert_eq!(resolve_value(&vars, " release-${BUILD_NUMBER}/ "), "release-42");
//! assert_eq!(resolve_value(&vars, "$UNKNOWN"), "$UNKNOWN");
//! ```

use std::collections::HashMap;

/// Expands build-variable references in a raw configuration string.
pub trait Substitute: Send + Sync {
    fn substitute(&self, raw: &str) -> String;
}

impl<F> Substitute for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn substitute(&self, raw: &str) -> String {
        self(raw)
    }
}

/// Variable map expanding `$NAME` and `${NAME}`; unknown references are kept verbatim.
#[derive(Clone, Debug, Default)]
pub struct BuildVariables {
    vars: HashMap<String, String>,
}

impl BuildVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the process environment.
    pub fn from_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Adds or replaces one variable.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

impl Substitute for BuildVariables {
    fn substitute(&self, raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            let (name, reference_len) = if let Some(braced) = after.strip_prefix('{') {
                match braced.find('}') {
                    Some(end) => (&braced[..end], end + 2),
                    None => ("", 0),
                }
            } else {
                let end = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                (&after[..end], end)
            };

            match self.vars.get(name) {
                Some(value) if !name.is_empty() => {
                    out.push_str(value);
                    rest = &after[reference_len..];
                }
                _ => {
                    out.push('$');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Substitutes variables and strips leading/trailing `/` and spaces.
pub fn resolve_value(vars: &dyn Substitute, raw: &str) -> String {
    strip(&vars.substitute(raw)).to_string()
}

/// Resolves every entry and drops the ones that end up blank.
pub fn resolve_list<S: AsRef<str>>(vars: &dyn Substitute, raw: &[S]) -> Vec<String> {
    raw.iter()
        .map(|item| resolve_value(vars, item.as_ref()))
        .filter(|item| !item.is_empty())
        .collect()
}

/// Trims `/` and space from both ends.
pub fn strip(value: &str) -> &str {
    value.trim_matches(|c| c == '/' || c == ' ')
}

/// Checks a (raw) environment name: 4 to 23 alphanumerics or hyphens, not
/// starting or ending with a hyphen, or a single `${...}` reference resolved later.
pub fn is_valid_environment_name(name: &str) -> bool {
    if name.starts_with("${") && name.ends_with('}') {
        return true;
    }
    let bytes = name.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    (4..=23).contains(&bytes.len())
        && first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
}
