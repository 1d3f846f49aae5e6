use std::collections::BTreeMap;

use ankisync_common::types::FieldMapping;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use super::models::PropertyValue;

pub const PAGE_SIZE: u32 = 100;

/// Build the body of a database query for pages edited after `since`, newest first.
///
/// Generates:
/// `{"filter": {"timestamp": "last_edited_time", "last_edited_time": {"after": "..."}},
///   "sorts": [{"timestamp": "last_edited_time", "direction": "descending"}], ...}`
pub fn build_changed_since_query(since: DateTime<Utc>, start_cursor: Option<&str>) -> Value {
    let mut body = json!({
        "filter": {
            "timestamp": "last_edited_time",
            "last_edited_time": {
                "after": since.to_rfc3339_opts(SecondsFormat::Millis, true)
            }
        },
        "sorts": [{
            "timestamp": "last_edited_time",
            "direction": "descending"
        }],
        "page_size": PAGE_SIZE
    });

    if let Some(cursor) = start_cursor {
        body["start_cursor"] = Value::String(cursor.to_string());
    }
    body
}

/// Build the `properties` object of a page update.
///
/// Each value is written in the shape of the page's existing property of the same
/// name. Returns the names that could not be written because the page has no
/// writable property by that name.
pub fn build_property_updates(
    fields: &FieldMapping,
    existing: &BTreeMap<String, PropertyValue>,
) -> (Map<String, Value>, Vec<String>) {
    let mut properties = Map::new();
    let mut skipped = Vec::new();

    for (name, value) in fields {
        match existing.get(name).and_then(|prop| typed_value(prop, value)) {
            Some(typed) => {
                properties.insert(name.clone(), typed);
            }
            None => skipped.push(name.clone()),
        }
    }

    (properties, skipped)
}

fn typed_value(prop: &PropertyValue, value: &str) -> Option<Value> {
    let typed = match prop {
        PropertyValue::Title { .. } => json!({ "title": [text_segment(value)] }),
        PropertyValue::RichText { .. } => json!({ "rich_text": [text_segment(value)] }),
        PropertyValue::Select { .. } => json!({ "select": { "name": value } }),
        PropertyValue::MultiSelect { .. } => {
            let options: Vec<Value> = value
                .split(", ")
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(|o| json!({ "name": o }))
                .collect();
            json!({ "multi_select": options })
        }
        PropertyValue::Url { .. } => json!({ "url": value }),
        PropertyValue::Unsupported => return None,
    };
    Some(typed)
}

fn text_segment(content: &str) -> Value {
    json!({ "text": { "content": content } })
}
