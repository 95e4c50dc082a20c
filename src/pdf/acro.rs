//! AcroForm field flattening and value application.
//!
//! `/AcroForm/Fields` is walked into a flat, insertion-ordered map from full
//! field name to descriptor list. Radio-button groups surface as repeated
//! entries under one name, one descriptor per widget, each independently
//! addressable by its own id. Descriptor ids use the `<object-number>R` form.

use crate::error::Result;
use crate::pdf::{acroform_dict, acroform_dict_mut, resolve, string_value};
use indexmap::IndexMap;
use lopdf::{Document, Object, ObjectId, StringFormat};
use serde::Serialize;
use std::collections::HashMap;

// Field flag bits (ISO 32000-1 tables 226, 227, 230).
const FF_RADIO: i64 = 1 << 15;
const FF_PUSHBUTTON: i64 = 1 << 16;
const FF_COMBO: i64 = 1 << 17;

const MAX_FIELD_DEPTH: usize = 32;

/// One raw AcroForm field descriptor: a type/id/name triple plus the current
/// value. A descriptor with an empty `type` is not a renderable field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcroFieldDescriptor {
    #[serde(rename = "type")]
    pub field_type: String,
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// The flattened AcroForm field mapping plus the write targets needed to put
/// values back into the object graph.
#[derive(Debug, Clone, Default)]
pub struct AcroFormMap {
    fields: IndexMap<String, Vec<AcroFieldDescriptor>>,
    targets: HashMap<String, WriteTarget>,
}

#[derive(Debug, Clone)]
struct WriteTarget {
    /// Terminal field dictionary holding `/V`.
    field_id: ObjectId,
    /// Widget annotation holding `/AS` (same as `field_id` when the field is
    /// its own widget).
    widget_id: ObjectId,
    is_button: bool,
}

impl AcroFormMap {
    /// Field name -> descriptors, in document order.
    pub fn field_objects(&self) -> &IndexMap<String, Vec<AcroFieldDescriptor>> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Flatten the document's AcroForm field tree. A document without an AcroForm
/// (or without `/Fields`) yields an empty map.
pub fn collect(doc: &Document) -> Result<AcroFormMap> {
    let mut map = AcroFormMap::default();
    let Some(acro) = acroform_dict(doc)? else {
        return Ok(map);
    };
    let fields = match acro.get(b"Fields") {
        Ok(obj) => resolve(doc, obj)?.as_array()?,
        Err(_) => return Ok(map),
    };
    for entry in fields {
        if let Ok(id) = entry.as_reference() {
            walk_field(doc, id, "", None, None, 0, &mut map)?;
        }
    }
    Ok(map)
}

#[allow(clippy::too_many_arguments)]
fn walk_field(
    doc: &Document,
    id: ObjectId,
    parent_name: &str,
    inherited_ft: Option<String>,
    inherited_ff: Option<i64>,
    depth: usize,
    map: &mut AcroFormMap,
) -> Result<()> {
    if depth > MAX_FIELD_DEPTH {
        return Ok(());
    }
    let dict = match doc.get_object(id).and_then(|o| o.as_dict()) {
        Ok(dict) => dict,
        Err(_) => return Ok(()),
    };

    let partial = dict.get(b"T").ok().and_then(string_value);
    let full_name = match &partial {
        Some(t) if parent_name.is_empty() => t.clone(),
        Some(t) => format!("{}.{}", parent_name, t),
        None => parent_name.to_string(),
    };
    let ft = dict.get(b"FT").ok().and_then(string_value).or(inherited_ft);
    let ff = dict
        .get(b"Ff")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .or(inherited_ff);

    let kids: Vec<ObjectId> = dict
        .get(b"Kids")
        .ok()
        .and_then(|o| resolve(doc, o).ok())
        .and_then(|o| o.as_array().ok())
        .map(|arr| arr.iter().filter_map(|k| k.as_reference().ok()).collect())
        .unwrap_or_default();

    // A kid carrying its own /T is a child field; kids without /T are widget
    // annotations of this terminal field.
    let mut child_fields = Vec::new();
    let mut widgets = Vec::new();
    for kid in kids {
        let has_t = doc
            .get_object(kid)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .map(|d| d.has(b"T"))
            .unwrap_or(false);
        if has_t {
            child_fields.push(kid);
        } else {
            widgets.push(kid);
        }
    }

    if !child_fields.is_empty() {
        for kid in child_fields {
            walk_field(doc, kid, &full_name, ft.clone(), ff, depth + 1, map)?;
        }
        return Ok(());
    }

    let field_type = ft
        .as_deref()
        .map(|ft| map_field_type(ft, ff.unwrap_or(0)))
        .unwrap_or_default();
    let value = dict
        .get(b"V")
        .ok()
        .and_then(|o| resolve(doc, o).ok())
        .and_then(string_value);
    let is_button = ft.as_deref() == Some("Btn");

    let descriptors = map.fields.entry(full_name.clone()).or_default();
    let widget_ids = if widgets.is_empty() { vec![id] } else { widgets };
    for widget_id in widget_ids {
        let desc_id = format!("{}R", widget_id.0);
        descriptors.push(AcroFieldDescriptor {
            field_type: field_type.clone(),
            id: desc_id.clone(),
            name: full_name.clone(),
            value: value.clone(),
        });
        map.targets.insert(
            desc_id,
            WriteTarget {
                field_id: id,
                widget_id,
                is_button,
            },
        );
    }
    Ok(())
}

fn map_field_type(ft: &str, flags: i64) -> String {
    match ft {
        "Tx" => "text",
        "Ch" => {
            if flags & FF_COMBO != 0 {
                "combobox"
            } else {
                "listbox"
            }
        }
        "Btn" => {
            if flags & FF_PUSHBUTTON != 0 {
                "button"
            } else if flags & FF_RADIO != 0 {
                "radiobutton"
            } else {
                "checkbox"
            }
        }
        "Sig" => "signature",
        other => return other.to_ascii_lowercase(),
    }
    .to_string()
}

/// Write annotation values into the field dictionaries. Ids without a write
/// target are skipped silently; they were accepted by the value store but
/// address nothing in this document.
pub fn apply_values(
    doc: &mut Document,
    map: &AcroFormMap,
    values: &IndexMap<String, String>,
) -> Result<()> {
    let mut wrote = false;
    for (field_id, value) in values {
        let Some(target) = map.targets.get(field_id) else {
            continue;
        };
        if target.is_button {
            let state = Object::Name(value.clone().into_bytes());
            doc.get_object_mut(target.field_id)?
                .as_dict_mut()?
                .set("V", state.clone());
            doc.get_object_mut(target.widget_id)?
                .as_dict_mut()?
                .set("AS", state);
        } else {
            doc.get_object_mut(target.field_id)?.as_dict_mut()?.set(
                "V",
                Object::String(value.clone().into_bytes(), StringFormat::Literal),
            );
        }
        wrote = true;
    }
    if wrote {
        // Viewers must regenerate widget appearances for the new values.
        acroform_dict_mut(doc)?.set("NeedAppearances", Object::Boolean(true));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn field_doc() -> (Document, ObjectId, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let text_id = doc.add_object(dictionary! {
            "FT" => Object::Name(b"Tx".to_vec()),
            "T" => Object::String(b"first_name".to_vec(), StringFormat::Literal),
            "V" => Object::String(b"Ada".to_vec(), StringFormat::Literal),
        });
        let plain_id = doc.add_object(dictionary! {
            "T" => Object::String(b"no_type".to_vec(), StringFormat::Literal),
        });
        let acro_id = doc.add_object(dictionary! {
            "Fields" => vec![Object::Reference(text_id), Object::Reference(plain_id)],
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "AcroForm" => Object::Reference(acro_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        (doc, text_id, plain_id)
    }

    #[test]
    fn test_collect_flattens_fields_with_current_values() {
        let (doc, text_id, plain_id) = field_doc();
        let map = collect(&doc).unwrap();

        let descriptors = map.field_objects().get("first_name").unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].field_type, "text");
        assert_eq!(descriptors[0].id, format!("{}R", text_id.0));
        assert_eq!(descriptors[0].value.as_deref(), Some("Ada"));

        // A node with no /FT anywhere is kept with an empty type.
        let plain = map.field_objects().get("no_type").unwrap();
        assert_eq!(plain[0].field_type, "");
        assert_eq!(plain[0].id, format!("{}R", plain_id.0));
    }

    #[test]
    fn test_collect_without_acroform_is_empty() {
        let mut doc = Document::with_version("1.5");
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog" });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let map = collect(&doc).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_radio_group_yields_one_descriptor_per_widget() {
        let mut doc = Document::with_version("1.5");
        let widget_a = doc.add_object(dictionary! {
            "Subtype" => Object::Name(b"Widget".to_vec()),
        });
        let widget_b = doc.add_object(dictionary! {
            "Subtype" => Object::Name(b"Widget".to_vec()),
        });
        let group_id = doc.add_object(dictionary! {
            "FT" => Object::Name(b"Btn".to_vec()),
            "Ff" => Object::Integer(FF_RADIO),
            "T" => Object::String(b"color".to_vec(), StringFormat::Literal),
            "Kids" => vec![Object::Reference(widget_a), Object::Reference(widget_b)],
        });
        let acro_id = doc.add_object(dictionary! {
            "Fields" => vec![Object::Reference(group_id)],
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "AcroForm" => Object::Reference(acro_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let map = collect(&doc).unwrap();
        let descriptors = map.field_objects().get("color").unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].field_type, "radiobutton");
        assert_eq!(descriptors[0].id, format!("{}R", widget_a.0));
        assert_eq!(descriptors[1].id, format!("{}R", widget_b.0));
    }

    #[rstest]
    #[case("Tx", 0, "text")]
    #[case("Ch", FF_COMBO, "combobox")]
    #[case("Ch", 0, "listbox")]
    #[case("Btn", FF_PUSHBUTTON, "button")]
    #[case("Btn", FF_RADIO, "radiobutton")]
    #[case("Btn", 0, "checkbox")]
    #[case("Sig", 0, "signature")]
    fn test_field_type_mapping(#[case] ft: &str, #[case] flags: i64, #[case] expected: &str) {
        assert_eq!(map_field_type(ft, flags), expected);
    }

    #[test]
    fn test_apply_values_writes_v_and_sets_need_appearances() {
        let (mut doc, text_id, _) = field_doc();
        let map = collect(&doc).unwrap();

        let mut values = IndexMap::new();
        values.insert(format!("{}R", text_id.0), "Jane".to_string());
        values.insert("999R".to_string(), "ignored".to_string());
        apply_values(&mut doc, &map, &values).unwrap();

        let dict = doc.get_object(text_id).unwrap().as_dict().unwrap();
        assert_eq!(string_value(dict.get(b"V").unwrap()).as_deref(), Some("Jane"));

        let acro = acroform_dict(&doc).unwrap().unwrap();
        assert!(matches!(
            acro.get(b"NeedAppearances"),
            Ok(Object::Boolean(true))
        ));
    }
}
