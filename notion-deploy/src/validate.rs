//! Pre-flight checks over a loaded document
//!
//! Validation never blocks a deploy. The resolvers already degrade on every
//! problem reported here; the report exists so the operator sees the
//! problems before any request is made.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::model::{DatabaseDef, PageDef};
use crate::properties::{decode_properties, PropertySpec, RelationTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    pub subject: String,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {}: {}", level, self.subject, self.message)
    }
}

fn issue(severity: Severity, subject: &str, message: impl Into<String>) -> Issue {
    Issue {
        severity,
        subject: subject.to_string(),
        message: message.into(),
    }
}

/// Check pages and databases. `known_pages` / `known_databases` are titles
/// created by earlier runs.
pub fn validate(
    pages: &[PageDef],
    databases: &[DatabaseDef],
    known_pages: &BTreeMap<String, String>,
    known_databases: &BTreeMap<String, String>,
) -> Vec<Issue> {
    let mut issues = Vec::new();

    let mut page_titles = HashSet::new();
    let mut parents: HashMap<&str, &str> = HashMap::new();
    for page in pages {
        if !page_titles.insert(page.title.as_str()) {
            issues.push(issue(Severity::Warning, &page.title, "duplicate page title"));
            continue;
        }
        if let Some(parent) = page.parent.as_deref() {
            parents.insert(page.title.as_str(), parent);
        }
    }

    for (&title, &parent) in &parents {
        if !page_titles.contains(parent) && !known_pages.contains_key(parent) {
            issues.push(issue(
                Severity::Warning,
                title,
                format!("parent '{}' not found; the top-level parent will be used", parent),
            ));
        }
    }

    for title in cycle_members(&parents) {
        issues.push(issue(Severity::Error, title, "circular parent reference"));
    }

    let mut db_titles = HashSet::new();
    for db in databases {
        if !db_titles.insert(db.title.as_str()) {
            issues.push(issue(Severity::Warning, &db.title, "duplicate database title"));
        }
    }

    for db in databases {
        if let Some(parent) = db.parent.as_deref() {
            if !page_titles.contains(parent) && !known_pages.contains_key(parent) {
                issues.push(issue(
                    Severity::Error,
                    &db.title,
                    format!("parent page '{}' not found", parent),
                ));
            }
        }

        let properties = decode_properties(&db.properties);
        let relation_names: HashSet<&str> = properties
            .iter()
            .filter(|(_, def)| def.get("type").and_then(|t| t.as_str()) == Some("relation"))
            .map(|(name, _)| name.as_str())
            .collect();

        for (name, def) in &properties {
            let subject = format!("{}.{}", db.title, name);
            match PropertySpec::from_value(name, def) {
                PropertySpec::Relation {
                    target: RelationTarget::Name(target),
                    ..
                } => {
                    if !db_titles.contains(target.as_str())
                        && !known_databases.contains_key(&target)
                    {
                        issues.push(issue(
                            Severity::Error,
                            &subject,
                            format!("relation target database '{}' not defined", target),
                        ));
                    }
                }
                PropertySpec::Rollup {
                    relation_property, ..
                } => {
                    if !relation_names.contains(relation_property.as_str()) {
                        issues.push(issue(
                            Severity::Warning,
                            &subject,
                            format!(
                                "rollup refers to '{}', which is not a relation in this database",
                                relation_property
                            ),
                        ));
                    }
                }
                _ => {}
            }
        }
    }

    issues.sort_by(|a, b| a.subject.cmp(&b.subject).then(a.message.cmp(&b.message)));
    issues
}

/// Titles that sit on a parent cycle, sorted.
fn cycle_members<'a>(parents: &HashMap<&'a str, &'a str>) -> Vec<&'a str> {
    let mut on_cycle: HashSet<&str> = HashSet::new();
    for &start in parents.keys() {
        let mut seen = Vec::new();
        let mut current = start;
        while let Some(&next) = parents.get(current) {
            if let Some(pos) = seen.iter().position(|&s| s == current) {
                on_cycle.extend(seen[pos..].iter().copied());
                break;
            }
            seen.push(current);
            current = next;
        }
    }
    let mut members: Vec<&str> = on_cycle.into_iter().collect();
    members.sort_unstable();
    members
}
