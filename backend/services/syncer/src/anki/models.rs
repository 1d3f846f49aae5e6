use ankisync_common::types::FieldMapping;
use serde::{Deserialize, Serialize};

pub const ANKI_CONNECT_VERSION: u32 = 6;

/// Tag attached to every note created by the syncer.
pub const PROVENANCE_TAG: &str = "notion";

#[derive(Debug, Serialize)]
pub struct AnkiRequest<'a, P: Serialize> {
    pub action: &'a str,
    pub version: u32,
    pub params: P,
}

#[derive(Debug, Deserialize)]
pub struct AnkiResponse<T> {
    pub result: Option<T>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnkiNote {
    pub deck_name: String,
    pub model_name: String,
    pub fields: FieldMapping,
    pub tags: Vec<String>,
}

impl AnkiNote {
    pub fn new(deck_name: &str, model_name: &str, fields: FieldMapping) -> Self {
        Self {
            deck_name: deck_name.to_string(),
            model_name: model_name.to_string(),
            fields,
            tags: vec![PROVENANCE_TAG.to_string()],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotesParams {
    pub notes: Vec<AnkiNote>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardTemplate {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Front")]
    pub front: String,
    #[serde(rename = "Back")]
    pub back: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateModelParams {
    pub model_name: String,
    pub in_order_fields: Vec<String>,
    pub card_templates: Vec<CardTemplate>,
}

/// Single card showing the first field on the front and the rest on the back.
pub fn default_card_template(fields: &[String]) -> CardTemplate {
    let front = fields
        .first()
        .map(|f| format!("{{{{{f}}}}}"))
        .unwrap_or_default();

    let mut back = String::from("{{FrontSide}}<hr id=answer>");
    let rest: Vec<String> = fields
        .iter()
        .skip(1)
        .map(|f| format!("{{{{{f}}}}}"))
        .collect();
    back.push_str(&rest.join("<br>"));

    CardTemplate {
        name: "Card 1".to_string(),
        front,
        back,
    }
}
