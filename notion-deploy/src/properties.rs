//! Database property schema builder
//!
//! Property definitions come either as a shorthand string (`Status: select`)
//! or a map with `type` plus type-specific fields. Bad input degrades instead
//! of failing: unknown types become `rich_text`, invalid option colors are
//! dropped, rollups/relations missing their required fields become
//! `rich_text` with a warning.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::text::scalar_text;

/// Colors accepted for select / multi-select options
pub const OPTION_COLORS: [&str; 10] = [
    "default", "gray", "brown", "orange", "yellow", "green", "blue", "purple", "pink", "red",
];

/// Rollup aggregation functions accepted by the API
const ROLLUP_FUNCTIONS: &[&str] = &[
    "average", "checked", "count", "count_per_group", "count_values", "date_range",
    "earliest_date", "empty", "latest_date", "max", "median", "min", "not_empty",
    "percent_checked", "percent_empty", "percent_not_empty", "percent_per_group",
    "percent_unchecked", "range", "show_original", "show_unique", "sum", "unchecked",
    "unique",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SelectOption {
    pub name: String,
    pub color: Option<String>,
}

/// Which database a relation points at
#[derive(Debug, Clone, PartialEq)]
pub enum RelationTarget {
    Id(String),
    /// Title of a database in the same deployment
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationKind {
    Single,
    Dual { synced_property_name: Option<String> },
}

/// A decoded property definition
#[derive(Debug, Clone, PartialEq)]
pub enum PropertySpec {
    Title,
    RichText,
    Number { format: String },
    Select { options: Vec<SelectOption> },
    MultiSelect { options: Vec<SelectOption> },
    Date,
    People,
    Files,
    Checkbox,
    Url,
    Email,
    PhoneNumber,
    Formula { expression: String },
    Relation { target: RelationTarget, kind: RelationKind },
    Rollup { relation_property: String, rollup_property: String, function: String },
    CreatedTime,
    LastEditedTime,
}

/// A relation whose target database has not been created yet
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("relation target database '{0}' does not exist yet")]
pub struct UnresolvedRelation(pub String);

impl PropertySpec {
    /// Decode a property definition. `name` is only used for diagnostics.
    pub fn from_value(name: &str, def: &Value) -> PropertySpec {
        match def {
            Value::String(t) => decode_typed(name, t, &Map::new()),
            Value::Object(map) => match map.get("type").and_then(Value::as_str) {
                Some(t) => decode_typed(name, t, map),
                None => {
                    warn!(property = name, "Property has no type, using rich_text");
                    PropertySpec::RichText
                }
            },
            Value::Null => PropertySpec::RichText,
            other => {
                warn!(property = name, value = %other, "Unrecognized property definition, using rich_text");
                PropertySpec::RichText
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PropertySpec::Title => "title",
            PropertySpec::RichText => "rich_text",
            PropertySpec::Number { .. } => "number",
            PropertySpec::Select { .. } => "select",
            PropertySpec::MultiSelect { .. } => "multi_select",
            PropertySpec::Date => "date",
            PropertySpec::People => "people",
            PropertySpec::Files => "files",
            PropertySpec::Checkbox => "checkbox",
            PropertySpec::Url => "url",
            PropertySpec::Email => "email",
            PropertySpec::PhoneNumber => "phone_number",
            PropertySpec::Formula { .. } => "formula",
            PropertySpec::Relation { .. } => "relation",
            PropertySpec::Rollup { .. } => "rollup",
            PropertySpec::CreatedTime => "created_time",
            PropertySpec::LastEditedTime => "last_edited_time",
        }
    }

    pub fn is_rollup(&self) -> bool {
        matches!(self, PropertySpec::Rollup { .. })
    }

    /// Render the property schema. Relations by name resolve against
    /// `database_ids` (title → id).
    pub fn to_schema(
        &self,
        database_ids: &BTreeMap<String, String>,
    ) -> Result<Value, UnresolvedRelation> {
        let config = match self {
            PropertySpec::Number { format } => json!({"format": format}),
            PropertySpec::Select { options } | PropertySpec::MultiSelect { options } => {
                json!({"options": options.iter().map(option_json).collect::<Vec<_>>()})
            }
            PropertySpec::Formula { expression } => json!({"expression": expression}),
            PropertySpec::Relation { target, kind } => {
                let database_id = match target {
                    RelationTarget::Id(id) => id.clone(),
                    RelationTarget::Name(name) => database_ids
                        .get(name)
                        .cloned()
                        .ok_or_else(|| UnresolvedRelation(name.clone()))?,
                };
                match kind {
                    RelationKind::Single => json!({
                        "database_id": database_id,
                        "type": "single_property",
                        "single_property": {},
                    }),
                    RelationKind::Dual { synced_property_name } => {
                        let mut dual = Map::new();
                        if let Some(synced) = synced_property_name {
                            dual.insert("synced_property_name".to_string(), json!(synced));
                        }
                        json!({
                            "database_id": database_id,
                            "type": "dual_property",
                            "dual_property": dual,
                        })
                    }
                }
            }
            PropertySpec::Rollup { relation_property, rollup_property, function } => json!({
                "relation_property_name": relation_property,
                "rollup_property_name": rollup_property,
                "function": function,
            }),
            _ => json!({}),
        };

        let mut out = Map::new();
        out.insert(self.type_name().to_string(), config);
        Ok(Value::Object(out))
    }
}

/// Build the schema JSON for one property definition.
pub fn build_property_schema(
    def: &Value,
    database_ids: &BTreeMap<String, String>,
) -> Result<Value, UnresolvedRelation> {
    let name = def
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>");
    PropertySpec::from_value(name, def).to_schema(database_ids)
}

fn canonical_property_type(raw: &str) -> String {
    let key = raw.trim().to_lowercase().replace(['-', ' '], "_");
    let canonical = match key.as_str() {
        "text" | "richtext" | "string" => "rich_text",
        "multiselect" | "tags" => "multi_select",
        "status" => "select",
        "phone" => "phone_number",
        "person" | "user" | "users" => "people",
        "file" | "attachment" => "files",
        "bool" | "boolean" => "checkbox",
        "link" => "url",
        "created" => "created_time",
        "updated" | "last_edited" => "last_edited_time",
        other => return other.to_string(),
    };
    canonical.to_string()
}

fn decode_typed(name: &str, raw_type: &str, map: &Map<String, Value>) -> PropertySpec {
    let field = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|k| map.get(*k).and_then(scalar_text))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    match canonical_property_type(raw_type).as_str() {
        "title" => PropertySpec::Title,
        "rich_text" => PropertySpec::RichText,
        "number" => PropertySpec::Number {
            format: field(&["format"]).unwrap_or_else(|| "number".to_string()),
        },
        "select" => PropertySpec::Select { options: options_of(name, map) },
        "multi_select" => PropertySpec::MultiSelect { options: options_of(name, map) },
        "date" => PropertySpec::Date,
        "people" => PropertySpec::People,
        "files" => PropertySpec::Files,
        "checkbox" => PropertySpec::Checkbox,
        "url" => PropertySpec::Url,
        "email" => PropertySpec::Email,
        "phone_number" => PropertySpec::PhoneNumber,
        "created_time" => PropertySpec::CreatedTime,
        "last_edited_time" => PropertySpec::LastEditedTime,
        "formula" => match field(&["expression", "formula"]) {
            Some(expression) => PropertySpec::Formula { expression },
            None => {
                warn!(property = name, "Formula without expression, using rich_text");
                PropertySpec::RichText
            }
        },
        "relation" => {
            let target = field(&["database_id"])
                .map(RelationTarget::Id)
                .or_else(|| field(&["database", "target", "relation_database"]).map(RelationTarget::Name));
            match target {
                Some(target) => PropertySpec::Relation {
                    target,
                    kind: relation_kind(map),
                },
                None => {
                    warn!(property = name, "Relation without target database, using rich_text");
                    PropertySpec::RichText
                }
            }
        }
        "rollup" => {
            let relation = field(&["relation_property_name", "relation_property", "relation"]);
            let rollup = field(&["rollup_property_name", "rollup_property", "property"]);
            match (relation, rollup) {
                (Some(relation_property), Some(rollup_property)) => PropertySpec::Rollup {
                    relation_property,
                    rollup_property,
                    function: rollup_function(name, field(&["function"])),
                },
                _ => {
                    warn!(property = name, "Rollup missing relation or rollup property, using rich_text");
                    PropertySpec::RichText
                }
            }
        }
        other => {
            warn!(property = name, property_type = other, "Unknown property type, using rich_text");
            PropertySpec::RichText
        }
    }
}

fn relation_kind(map: &Map<String, Value>) -> RelationKind {
    let dual = map.get("dual_property").or_else(|| {
        // `relation_type: dual_property` is the long form
        map.get("relation_type")
            .filter(|v| v.as_str() == Some("dual_property"))
    });
    match dual {
        None | Some(Value::Bool(false)) | Some(Value::Null) => RelationKind::Single,
        Some(Value::String(s)) if s == "dual_property" => RelationKind::Dual {
            synced_property_name: map
                .get("synced_property_name")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        Some(Value::String(s)) => RelationKind::Dual {
            synced_property_name: Some(s.clone()),
        },
        Some(Value::Object(inner)) => RelationKind::Dual {
            synced_property_name: inner
                .get("synced_property_name")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        Some(_) => RelationKind::Dual {
            synced_property_name: None,
        },
    }
}

fn rollup_function(name: &str, raw: Option<String>) -> String {
    match raw {
        None => "count".to_string(),
        Some(f) => {
            let f = f.to_lowercase().replace(' ', "_");
            if ROLLUP_FUNCTIONS.contains(&f.as_str()) {
                f
            } else {
                warn!(property = name, function = %f, "Unknown rollup function, using count");
                "count".to_string()
            }
        }
    }
}

fn options_of(name: &str, map: &Map<String, Value>) -> Vec<SelectOption> {
    let Some(Value::Array(raw)) = map.get("options") else {
        return Vec::new();
    };

    raw.iter()
        .filter_map(|opt| match opt {
            Value::Object(o) => {
                let option_name = o.get("name").and_then(scalar_text)?;
                let color = o
                    .get("color")
                    .and_then(Value::as_str)
                    .map(|c| c.trim().to_lowercase())
                    .filter(|c| {
                        let valid = OPTION_COLORS.contains(&c.as_str());
                        if !valid {
                            warn!(property = name, option = %option_name, color = %c, "Dropping invalid option color");
                        }
                        valid
                    });
                Some(SelectOption {
                    name: option_name,
                    color,
                })
            }
            other => scalar_text(other).map(|n| SelectOption {
                name: n,
                color: None,
            }),
        })
        .filter(|o| !o.name.trim().is_empty())
        .collect()
}

fn option_json(option: &SelectOption) -> Value {
    // Option names may not contain commas
    let name = option.name.replace(',', " ");
    match &option.color {
        Some(color) => json!({"name": name, "color": color}),
        None => json!({"name": name}),
    }
}

/// Decode a database's `properties` into `(name, spec)` pairs.
///
/// Accepts a map `{Name: def}` or a list `[{name: Name, ...}]`.
pub fn decode_properties(raw: &Value) -> Vec<(String, Value)> {
    match raw {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let name = item.get("name").and_then(scalar_text)?;
                Some((name, item.clone()))
            })
            .collect(),
        _ => Vec::new(),
    }
}
