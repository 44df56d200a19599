//! `${VAR}` / `${VAR:-default}` substitution
//!
//! Values come from the process environment first, then from scalar
//! entries of the YAML `globals` bank. Substituted values are inserted
//! literally; a value that itself contains `${...}` is not expanded again in
//! the same pass.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Handling of placeholders with no value and no default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Leave `${NAME}` in the text
    #[default]
    Keep,
    /// Replace with the empty string
    Empty,
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid placeholder regex")
    })
}

/// Variable source: environment, then the globals bank.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    globals: HashMap<String, String>,
    policy: UnresolvedPolicy,
}

impl Variables {
    pub fn new(policy: UnresolvedPolicy) -> Self {
        Self {
            globals: HashMap::new(),
            policy,
        }
    }

    /// Add scalar entries of a `globals` map as fallback values.
    /// Nested maps and lists (e.g. `icons_map`) are not variables.
    pub fn with_globals(mut self, globals: &serde_json::Map<String, Value>) -> Self {
        for (key, value) in globals {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            self.globals.insert(key.clone(), text);
        }
        self
    }

    pub fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .or_else(|| self.globals.get(name).cloned())
    }

    pub fn substitute_str(&self, input: &str) -> String {
        substitute_with(input, |name| self.lookup(name), self.policy)
    }

    /// Substitute every string leaf of `value` in place.
    pub fn substitute_value(&self, value: &mut Value) {
        match value {
            Value::String(s) => {
                if s.contains("${") {
                    *s = self.substitute_str(s);
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|v| self.substitute_value(v)),
            Value::Object(map) => map.values_mut().for_each(|v| self.substitute_value(v)),
            _ => {}
        }
    }
}

/// Core substitution over an arbitrary lookup function.
pub fn substitute_with<F>(input: &str, lookup: F, policy: UnresolvedPolicy) -> String
where
    F: Fn(&str) -> Option<String>,
{
    placeholder()
        .replace_all(input, |caps: &Captures| {
            let name = &caps[1];
            match (lookup(name), caps.get(2)) {
                (Some(value), _) => value,
                (None, Some(default)) => default.as_str().to_string(),
                (None, None) => match policy {
                    UnresolvedPolicy::Keep => caps[0].to_string(),
                    UnresolvedPolicy::Empty => String::new(),
                },
            }
        })
        .into_owned()
}

/// Substitute from the process environment, keeping unresolved placeholders.
pub fn process_variable_substitution(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok(), UnresolvedPolicy::Keep)
}
