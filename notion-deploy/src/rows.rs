//! Seed-row encoding
//!
//! Rows are flat `property -> raw value` maps. Each value is encoded by the
//! type of the matching schema property at submission time. Values that
//! cannot be encoded are dropped with a warning; the row is still created.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::properties::{PropertySpec, RelationTarget};
use crate::text::{is_http_url, rich_text, scalar_text};

/// Context for resolving relation values to row IDs.
pub struct RowContext<'a> {
    /// Database title -> id
    pub databases: &'a BTreeMap<String, String>,
    /// Database title -> (row title -> row id)
    pub rows: &'a BTreeMap<String, BTreeMap<String, String>>,
    pub max_text_chars: usize,
}

/// An encoded row ready to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRow {
    pub title: String,
    pub properties: Map<String, Value>,
}

/// Encode one row against the database schema.
///
/// Returns `None` when the row has no value for the title property.
pub fn encode_row(
    row: &Map<String, Value>,
    schema: &[(String, PropertySpec)],
    ctx: &RowContext<'_>,
) -> Option<EncodedRow> {
    let mut properties = Map::new();
    let mut title = None;

    for (name, raw) in row {
        let Some((_, spec)) = schema.iter().find(|(n, _)| n == name) else {
            warn!(property = %name, "Row value for unknown property, skipping");
            continue;
        };
        if raw.is_null() {
            continue;
        }
        if let PropertySpec::Title = spec {
            title = scalar_text(raw);
        }
        match encode_value(spec, raw, ctx) {
            Some(value) => {
                properties.insert(name.clone(), value);
            }
            None => warn!(
                property = %name,
                property_type = spec.type_name(),
                "Row value could not be encoded, skipping"
            ),
        }
    }

    let title = title.filter(|t| !t.trim().is_empty())?;
    Some(EncodedRow { title, properties })
}

/// Encode a single value for a property of the given type.
pub fn encode_value(spec: &PropertySpec, raw: &Value, ctx: &RowContext<'_>) -> Option<Value> {
    match spec {
        PropertySpec::Title => Some(json!({"title": rich_text(&scalar_text(raw)?, ctx.max_text_chars)})),
        PropertySpec::RichText => {
            Some(json!({"rich_text": rich_text(&scalar_text(raw)?, ctx.max_text_chars)}))
        }
        PropertySpec::Number { .. } => {
            let number = match raw {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => s.trim().parse::<f64>().ok()?,
                _ => return None,
            };
            Some(json!({"number": number}))
        }
        PropertySpec::Checkbox => {
            let checked = match raw {
                Value::Bool(b) => *b,
                Value::String(s) => matches!(
                    s.trim().to_lowercase().as_str(),
                    "true" | "yes" | "y" | "x" | "1" | "done"
                ),
                Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
                _ => return None,
            };
            Some(json!({"checkbox": checked}))
        }
        PropertySpec::Select { .. } => {
            let name = scalar_text(raw)?;
            Some(json!({"select": {"name": name}}))
        }
        PropertySpec::MultiSelect { .. } => {
            let names: Vec<Value> = text_list(raw)
                .into_iter()
                .map(|name| json!({"name": name}))
                .collect();
            Some(json!({"multi_select": names}))
        }
        PropertySpec::Date => {
            let date = match raw {
                Value::Object(map) => {
                    let start = map.get("start").and_then(scalar_text)?;
                    let mut date = json!({"start": start});
                    if let Some(end) = map.get("end").and_then(scalar_text) {
                        date["end"] = json!(end);
                    }
                    date
                }
                other => json!({"start": scalar_text(other)?}),
            };
            Some(json!({"date": date}))
        }
        PropertySpec::Url => {
            let url = scalar_text(raw)?;
            is_http_url(&url).then(|| json!({"url": url}))
        }
        PropertySpec::Email => Some(json!({"email": scalar_text(raw)?})),
        PropertySpec::PhoneNumber => Some(json!({"phone_number": scalar_text(raw)?})),
        PropertySpec::Files => {
            let files: Vec<Value> = text_list(raw)
                .into_iter()
                .filter(|url| is_http_url(url))
                .map(|url| {
                    let name = url.rsplit('/').next().unwrap_or(&url).to_string();
                    json!({"type": "external", "name": name, "external": {"url": url}})
                })
                .collect();
            (!files.is_empty()).then(|| json!({"files": files}))
        }
        PropertySpec::Relation { target, .. } => {
            let target_rows = match target {
                RelationTarget::Name(db) => ctx.rows.get(db),
                RelationTarget::Id(id) => ctx
                    .databases
                    .iter()
                    .find(|(_, v)| *v == id)
                    .and_then(|(db, _)| ctx.rows.get(db)),
            };
            let ids: Vec<Value> = text_list(raw)
                .into_iter()
                .filter_map(|title| match target_rows.and_then(|rows| rows.get(&title)) {
                    Some(id) => Some(json!({"id": id})),
                    None => {
                        warn!(row = %title, "Related row not found, skipping reference");
                        None
                    }
                })
                .collect();
            (!ids.is_empty()).then(|| json!({"relation": ids}))
        }
        PropertySpec::People
        | PropertySpec::Formula { .. }
        | PropertySpec::Rollup { .. }
        | PropertySpec::CreatedTime
        | PropertySpec::LastEditedTime => None,
    }
}

/// A list value, or a comma-separated string.
fn text_list(raw: &Value) -> Vec<String> {
    match raw {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        other => scalar_text(other).into_iter().collect(),
    }
}

/// Creation body for a row in `database_id`.
pub fn row_body(database_id: &str, row: &EncodedRow) -> Value {
    json!({
        "parent": {"database_id": database_id},
        "properties": row.properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::RelationKind;

    fn schema() -> Vec<(String, PropertySpec)> {
        vec![
            ("Name".to_string(), PropertySpec::Title),
            ("Notes".to_string(), PropertySpec::RichText),
            ("Points".to_string(), PropertySpec::Number { format: "number".into() }),
            ("Done".to_string(), PropertySpec::Checkbox),
            ("Status".to_string(), PropertySpec::Select { options: vec![] }),
            ("Tags".to_string(), PropertySpec::MultiSelect { options: vec![] }),
            ("Due".to_string(), PropertySpec::Date),
            ("Link".to_string(), PropertySpec::Url),
            (
                "Project".to_string(),
                PropertySpec::Relation {
                    target: RelationTarget::Name("Projects".into()),
                    kind: RelationKind::Single,
                },
            ),
            ("Created".to_string(), PropertySpec::CreatedTime),
        ]
    }

    fn row(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_encode_row_by_type() {
        let databases = BTreeMap::new();
        let mut rows = BTreeMap::new();
        rows.insert(
            "Projects".to_string(),
            BTreeMap::from([("Apollo".to_string(), "row-7".to_string())]),
        );
        let ctx = RowContext { databases: &databases, rows: &rows, max_text_chars: 2000 };

        let encoded = encode_row(
            &row(json!({
                "Name": "Launch",
                "Notes": "Ship it",
                "Points": "5",
                "Done": "yes",
                "Status": "In progress",
                "Tags": "a, b",
                "Due": "2024-05-01",
                "Link": "https://example.com",
                "Project": ["Apollo", "Gemini"],
                "Created": "2024-01-01"
            })),
            &schema(),
            &ctx,
        )
        .unwrap();

        let p = &encoded.properties;
        assert_eq!(encoded.title, "Launch");
        assert_eq!(p["Name"]["title"][0]["text"]["content"], "Launch");
        assert_eq!(p["Points"], json!({"number": 5.0}));
        assert_eq!(p["Done"], json!({"checkbox": true}));
        assert_eq!(p["Status"], json!({"select": {"name": "In progress"}}));
        assert_eq!(p["Tags"], json!({"multi_select": [{"name": "a"}, {"name": "b"}]}));
        assert_eq!(p["Due"], json!({"date": {"start": "2024-05-01"}}));
        assert_eq!(p["Project"], json!({"relation": [{"id": "row-7"}]}));
        assert!(!p.contains_key("Created"));
    }

    #[test]
    fn test_row_without_title_is_rejected() {
        let databases = BTreeMap::new();
        let rows = BTreeMap::new();
        let ctx = RowContext { databases: &databases, rows: &rows, max_text_chars: 2000 };
        assert!(encode_row(&row(json!({"Notes": "orphan"})), &schema(), &ctx).is_none());
    }

    #[test]
    fn test_bad_values_are_dropped() {
        let databases = BTreeMap::new();
        let rows = BTreeMap::new();
        let ctx = RowContext { databases: &databases, rows: &rows, max_text_chars: 2000 };
        let encoded = encode_row(
            &row(json!({"Name": "X", "Points": "many", "Link": "not a url", "Bogus": 1})),
            &schema(),
            &ctx,
        )
        .unwrap();
        assert_eq!(encoded.properties.len(), 1);
    }
}
