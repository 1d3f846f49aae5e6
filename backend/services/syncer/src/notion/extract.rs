use ankisync_common::types::{FieldMapping, PLACEHOLDER};

use super::models::{Page, PropertyValue, RichText, SelectOption};

/// Flatten a page's typed properties into plain text, one entry per supported
/// property. Empty values become [`PLACEHOLDER`]; unsupported types are skipped.
pub fn extract_fields(page: &Page) -> FieldMapping {
    page.properties
        .iter()
        .filter_map(|(name, value)| {
            property_text(value).map(|text| {
                let text = if text.is_empty() {
                    PLACEHOLDER.to_string()
                } else {
                    text
                };
                (name.clone(), text)
            })
        })
        .collect()
}

/// Field names used to seed a new note model: the title property first, then
/// the remaining supported properties in name order.
pub fn observed_field_names(page: &Page) -> Vec<String> {
    let mut names: Vec<(bool, &String)> = page
        .properties
        .iter()
        .filter(|(_, value)| value.is_supported())
        .map(|(name, value)| (!value.is_title(), name))
        .collect();
    names.sort();
    names.into_iter().map(|(_, name)| name.clone()).collect()
}

fn property_text(value: &PropertyValue) -> Option<String> {
    match value {
        PropertyValue::Title { title } => Some(concat_plain_text(title)),
        PropertyValue::RichText { rich_text } => Some(concat_plain_text(rich_text)),
        PropertyValue::Select { select } => Some(
            select
                .as_ref()
                .map(|opt| opt.name.clone())
                .unwrap_or_default(),
        ),
        PropertyValue::MultiSelect { multi_select } => Some(join_options(multi_select)),
        PropertyValue::Url { url } => Some(url.clone().unwrap_or_default()),
        PropertyValue::Unsupported => None,
    }
}

fn concat_plain_text(segments: &[RichText]) -> String {
    segments.iter().map(|s| s.plain_text.as_str()).collect()
}

fn join_options(options: &[SelectOption]) -> String {
    options
        .iter()
        .map(|o| o.name.as_str())
        .filter(|n| !n.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn text(s: &str) -> RichText {
        RichText {
            plain_text: s.to_string(),
        }
    }

    fn option(s: &str) -> SelectOption {
        SelectOption {
            name: s.to_string(),
        }
    }

    fn page(properties: Vec<(&str, PropertyValue)>) -> Page {
        Page {
            id: "p1".to_string(),
            last_edited_time: Utc::now(),
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn flattens_each_supported_type() {
        let page = page(vec![
            ("Word", PropertyValue::Title { title: vec![text("Haus")] }),
            (
                "Example",
                PropertyValue::RichText {
                    rich_text: vec![text("Das "), text("Haus"), text(" ist alt.")],
                },
            ),
            ("Gender", PropertyValue::Select { select: Some(option("das")) }),
            (
                "Tags",
                PropertyValue::MultiSelect {
                    multi_select: vec![option("A1"), option(""), option("home")],
                },
            ),
            (
                "Link",
                PropertyValue::Url {
                    url: Some("https://example.org/haus".to_string()),
                },
            ),
        ]);

        let fields = extract_fields(&page);
        assert_eq!(fields["Word"], "Haus");
        assert_eq!(fields["Example"], "Das Haus ist alt.");
        assert_eq!(fields["Gender"], "das");
        assert_eq!(fields["Tags"], "A1, home");
        assert_eq!(fields["Link"], "https://example.org/haus");
    }

    #[test]
    fn empty_values_map_to_placeholder() {
        let page = page(vec![
            ("Word", PropertyValue::Title { title: vec![] }),
            ("Example", PropertyValue::RichText { rich_text: vec![text("")] }),
            ("Gender", PropertyValue::Select { select: None }),
            ("Tags", PropertyValue::MultiSelect { multi_select: vec![] }),
            ("Audio", PropertyValue::Url { url: None }),
        ]);

        let fields = extract_fields(&page);
        assert_eq!(fields.len(), 5);
        assert!(fields.values().all(|v| v == PLACEHOLDER));
    }

    #[test]
    fn unsupported_properties_are_skipped() {
        let page = page(vec![
            ("Word", PropertyValue::Title { title: vec![text("Baum")] }),
            ("Created", PropertyValue::Unsupported),
        ]);

        let fields = extract_fields(&page);
        assert_eq!(fields.len(), 1);
        assert!(!fields.contains_key("Created"));
    }

    #[test]
    fn extraction_is_deterministic() {
        let page = page(vec![
            ("Word", PropertyValue::Title { title: vec![text("Tisch")] }),
            ("Tags", PropertyValue::MultiSelect { multi_select: vec![option("A2")] }),
        ]);
        assert_eq!(extract_fields(&page), extract_fields(&page));
    }

    #[test]
    fn observed_field_names_put_title_first() {
        let page = page(vec![
            ("Audio", PropertyValue::Url { url: None }),
            ("Word", PropertyValue::Title { title: vec![text("Haus")] }),
            ("Created", PropertyValue::Unsupported),
            ("Example", PropertyValue::RichText { rich_text: vec![] }),
        ]);

        assert_eq!(observed_field_names(&page), vec!["Word", "Audio", "Example"]);
    }
}
