use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A database page from the Notion API (`/v1/databases/{id}/query`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub last_edited_time: DateTime<Utc>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

/// Typed property value. Types the syncer cannot flatten deserialize as
/// `Unsupported`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Title {
        #[serde(default)]
        title: Vec<RichText>,
    },
    RichText {
        #[serde(default)]
        rich_text: Vec<RichText>,
    },
    Select {
        #[serde(default)]
        select: Option<SelectOption>,
    },
    MultiSelect {
        #[serde(default)]
        multi_select: Vec<SelectOption>,
    },
    Url {
        #[serde(default)]
        url: Option<String>,
    },
    #[serde(other)]
    Unsupported,
}

impl PropertyValue {
    pub fn is_title(&self) -> bool {
        matches!(self, PropertyValue::Title { .. })
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, PropertyValue::Unsupported)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichText {
    #[serde(default)]
    pub plain_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<Page>,
    #[serde(default)]
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_page_with_mixed_properties() {
        let json = r#"{
            "object": "page",
            "id": "p1",
            "last_edited_time": "2026-02-20T15:00:00.000Z",
            "properties": {
                "Word": { "id": "title", "type": "title",
                          "title": [{ "type": "text", "plain_text": "Haus" }] },
                "Gender": { "id": "a", "type": "select", "select": { "id": "x", "name": "das" } },
                "Tags": { "id": "b", "type": "multi_select",
                          "multi_select": [{ "name": "A1" }, { "name": "home" }] },
                "Link": { "id": "c", "type": "url", "url": null },
                "Created": { "id": "d", "type": "created_time", "created_time": "2026-02-01T00:00:00.000Z" }
            }
        }"#;

        let page: Page = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(page.id, "p1");
        assert_eq!(page.properties.len(), 5);
        assert!(page.properties["Word"].is_title());
        assert_eq!(
            page.properties["Gender"],
            PropertyValue::Select {
                select: Some(SelectOption { name: "das".to_string() })
            }
        );
        assert_eq!(page.properties["Link"], PropertyValue::Url { url: None });
        assert!(!page.properties["Created"].is_supported());
    }

    #[test]
    fn deserialize_query_response_last_page() {
        let json = r#"{ "object": "list", "results": [], "has_more": false, "next_cursor": null }"#;
        let resp: QueryResponse = serde_json::from_str(json).unwrap();
        assert!(resp.results.is_empty());
        assert!(!resp.has_more);
        assert!(resp.next_cursor.is_none());
    }
}
