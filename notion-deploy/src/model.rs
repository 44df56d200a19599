//! Typed view of the merged YAML document

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::text::scalar_text;

/// Accept strings, numbers and booleans where text is expected.
fn de_opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(scalar_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

fn de_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    de_opt_text(deserializer)?.ok_or_else(|| serde::de::Error::custom("expected non-empty text"))
}

/// A page to create
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageDef {
    #[serde(deserialize_with = "de_text", alias = "name")]
    pub title: String,
    /// Title of the parent page
    #[serde(default, deserialize_with = "de_opt_text")]
    pub parent: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub icon: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub cover: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub complexity: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub disclaimer: Option<String>,
    #[serde(default, alias = "content", alias = "children")]
    pub blocks: Vec<Value>,
    /// Title of a database to link from this page once it exists
    #[serde(default, deserialize_with = "de_opt_text")]
    pub database_link: Option<String>,
}

/// A letter; deployed as a page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LetterDef {
    #[serde(deserialize_with = "de_text", alias = "name")]
    pub title: String,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub parent: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub icon: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub from: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub body: Option<String>,
    #[serde(default, alias = "content")]
    pub blocks: Vec<Value>,
}

impl LetterDef {
    /// Convert into a page: header lines as a quote, body paragraphs, then
    /// any explicit blocks. `default_parent` applies when none is declared.
    pub fn into_page(self, default_parent: Option<&str>) -> PageDef {
        let mut blocks = Vec::new();

        let header: Vec<String> = [
            ("To", &self.to),
            ("From", &self.from),
            ("Date", &self.date),
            ("Subject", &self.subject),
        ]
        .iter()
        .filter_map(|(label, value)| value.as_ref().map(|v| format!("{}: {}", label, v)))
        .collect();
        if !header.is_empty() {
            blocks.push(serde_json::json!({"type": "quote", "content": header.join("\n")}));
        }

        if let Some(body) = &self.body {
            for paragraph in body.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
                blocks.push(serde_json::json!({"type": "paragraph", "content": paragraph}));
            }
        }
        blocks.extend(self.blocks);

        PageDef {
            title: self.title,
            parent: self.parent.or_else(|| default_parent.map(str::to_string)),
            icon: self.icon,
            blocks,
            ..Default::default()
        }
    }
}

/// A database with its schema and optional seed rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseDef {
    #[serde(deserialize_with = "de_text", alias = "name")]
    pub title: String,
    /// Title of the page to create the database under
    #[serde(default, deserialize_with = "de_opt_text")]
    pub parent: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub icon: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub description: Option<String>,
    /// Raw property definitions (map or list); decoded by `properties`
    #[serde(default, alias = "schema")]
    pub properties: Value,
    #[serde(default, alias = "rows", alias = "entries")]
    pub seed_rows: Vec<Map<String, Value>>,
}

/// One manual QA row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceRow {
    #[serde(deserialize_with = "de_text", alias = "item", alias = "title")]
    pub check: String,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub expected: Option<String>,
    #[serde(default)]
    pub done: bool,
}

/// Everything loaded from the YAML directory
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub pages: Vec<PageDef>,
    pub letters: Vec<LetterDef>,
    pub databases: Vec<DatabaseDef>,
    pub acceptance: Vec<AcceptanceRow>,
    pub globals: Map<String, Value>,
}

impl Document {
    /// Decode the merged YAML tree. Entries that fail to decode are skipped
    /// and reported in the returned warnings.
    pub fn from_merged(merged: &Map<String, Value>) -> (Document, Vec<String>) {
        let mut warnings = Vec::new();

        let pages = decode_list::<PageDef>(merged.get("pages"), "page", &mut warnings);
        let letters = decode_list::<LetterDef>(merged.get("letters"), "letter", &mut warnings);
        let mut databases =
            decode_list::<DatabaseDef>(merged.get("databases"), "database", &mut warnings);
        let acceptance =
            decode_list::<AcceptanceRow>(merged.get("acceptance"), "acceptance row", &mut warnings);

        // `db.schemas` may be a dotted key or nested under `db`
        let schemas = merged
            .get("db.schemas")
            .or_else(|| merged.get("db").and_then(|db| db.get("schemas")));
        if let Some(Value::Object(schemas)) = schemas {
            for (name, schema) in schemas {
                let mut entry = match schema {
                    Value::Object(m) => m.clone(),
                    _ => Map::new(),
                };
                entry
                    .entry("title".to_string())
                    .or_insert_with(|| Value::String(name.clone()));
                if !entry.contains_key("properties") && !entry.contains_key("schema") {
                    // Bare schema map: every key is a property
                    let properties = Value::Object(
                        entry
                            .iter()
                            .filter(|(k, _)| k.as_str() != "title")
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect(),
                    );
                    entry.retain(|k, _| k == "title");
                    entry.insert("properties".to_string(), properties);
                }
                match serde_json::from_value::<DatabaseDef>(Value::Object(entry)) {
                    Ok(db) => databases.push(db),
                    Err(e) => warnings.push(format!("Skipping schema '{}': {}", name, e)),
                }
            }
        }

        let globals = match merged.get("globals") {
            Some(Value::Object(g)) => g.clone(),
            _ => Map::new(),
        };

        for w in &warnings {
            warn!("{}", w);
        }

        (
            Document {
                pages,
                letters,
                databases,
                acceptance,
                globals,
            },
            warnings,
        )
    }

    /// `globals.icons_map[key]`, if present.
    pub fn icon_for(&self, key: &str) -> Option<String> {
        self.global_map_entry("icons_map", key)
    }

    /// `globals.covers_map[key]`, if present.
    pub fn cover_for(&self, key: &str) -> Option<String> {
        self.global_map_entry("covers_map", key)
    }

    fn global_map_entry(&self, map: &str, key: &str) -> Option<String> {
        self.globals
            .get(map)?
            .get(key)
            .and_then(scalar_text)
    }
}

fn decode_list<T: serde::de::DeserializeOwned>(
    raw: Option<&Value>,
    what: &str,
    warnings: &mut Vec<String>,
) -> Vec<T> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let Value::Array(items) = raw else {
        warnings.push(format!("Expected a list of {}s, found {}", what, kind_of(raw)));
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value::<T>(item.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                let label = item
                    .get("title")
                    .and_then(scalar_text)
                    .unwrap_or_else(|| format!("#{}", i + 1));
                warnings.push(format!("Skipping {} {}: {}", what, label, e));
                None
            }
        })
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "text",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
