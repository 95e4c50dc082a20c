//! Normalized form field model and the walkers that produce it.
//!
//! Both form technologies funnel into the same [`FormField`] list: the XFA
//! walker traverses the normalized template tree in pre-order, the AcroForm
//! walker iterates the flat descriptor map. Callers render or fill fields
//! without knowing which kind of form produced them.

use crate::pdf::acro::AcroFieldDescriptor;
use crate::pdf::XfaNode;
use indexmap::IndexMap;

/// Affordance a field should be rendered and edited as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    TextArea,
    Select,
    Toggle,
    /// Any other widget kind, carried through verbatim (button, signature,
    /// listbox, ...). Not directly fillable as free text.
    Other(String),
}

impl FieldKind {
    pub fn as_str(&self) -> &str {
        match self {
            FieldKind::Text => "text",
            FieldKind::TextArea => "textarea",
            FieldKind::Select => "select",
            FieldKind::Toggle => "toggle",
            FieldKind::Other(kind) => kind,
        }
    }

    fn from_acro_type(field_type: &str) -> Self {
        match field_type {
            "text" => FieldKind::Text,
            other => FieldKind::Other(other.to_string()),
        }
    }
}

/// One selectable choice of a [`FieldKind::Select`] field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOption {
    /// Display label.
    pub label: String,
    /// Export value written back on selection.
    pub value: String,
}

/// One fillable form field in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub kind: FieldKind,
    /// Identifier accepted by the value store.
    pub field_id: String,
    /// Best-effort human label.
    pub label: String,
    /// For toggles, the value that means "checked".
    pub toggle_group: Option<String>,
    /// Caption text, when the field carries one.
    pub display_text: Option<String>,
    pub current_value: Option<String>,
    pub options: Vec<FieldOption>,
}

/// Walk the normalized XFA tree in pre-order and collect every field node.
/// Container nodes contribute nothing themselves but are always descended
/// into, so nesting depth never affects field order.
pub fn extract_xfa_fields(root: &XfaNode) -> Vec<FormField> {
    let mut fields = Vec::new();
    collect_xfa(root, &mut fields);
    fields
}

fn collect_xfa(node: &XfaNode, out: &mut Vec<FormField>) {
    match node.name.as_str() {
        "input" => {
            let toggle = node.attributes.xfa_on.is_some();
            out.push(FormField {
                kind: if toggle { FieldKind::Toggle } else { FieldKind::Text },
                field_id: node.attributes.data_id.clone(),
                label: node.attributes.aria_label.clone(),
                toggle_group: node.attributes.xfa_on.clone(),
                display_text: node.attributes.text_content.clone(),
                current_value: node.attributes.value.clone(),
                options: Vec::new(),
            });
        }
        "textarea" => out.push(FormField {
            kind: FieldKind::TextArea,
            field_id: node.attributes.data_id.clone(),
            label: node.attributes.aria_label.clone(),
            toggle_group: None,
            display_text: node.attributes.text_content.clone(),
            current_value: node.attributes.value.clone(),
            options: Vec::new(),
        }),
        "select" => {
            let options = node
                .children
                .iter()
                .filter(|c| c.name == "option")
                .map(|c| {
                    let label = c.value.clone().unwrap_or_default();
                    FieldOption {
                        value: c.attributes.value.clone().unwrap_or_else(|| label.clone()),
                        label,
                    }
                })
                .collect();
            out.push(FormField {
                kind: FieldKind::Select,
                field_id: node.attributes.data_id.clone(),
                label: node.attributes.aria_label.clone(),
                toggle_group: None,
                display_text: node.attributes.text_content.clone(),
                current_value: node.attributes.value.clone(),
                options,
            });
        }
        _ => {}
    }
    for child in &node.children {
        collect_xfa(child, out);
    }
}

/// Flatten the AcroForm descriptor map into the field list. Descriptors with
/// an empty type are structural leftovers and are skipped.
pub fn extract_acro_fields(
    map: &IndexMap<String, Vec<AcroFieldDescriptor>>,
) -> Vec<FormField> {
    let mut fields = Vec::new();
    for descriptors in map.values() {
        for desc in descriptors {
            if desc.field_type.is_empty() {
                continue;
            }
            fields.push(FormField {
                kind: FieldKind::from_acro_type(&desc.field_type),
                field_id: desc.id.clone(),
                label: desc.name.clone(),
                toggle_group: None,
                display_text: None,
                current_value: desc.value.clone(),
                options: Vec::new(),
            });
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::xfa::XfaAttributes;
    use pretty_assertions::assert_eq;

    fn field_node(name: &str, data_id: &str) -> XfaNode {
        XfaNode {
            name: name.to_string(),
            value: None,
            attributes: XfaAttributes {
                data_id: data_id.to_string(),
                aria_label: data_id.to_string(),
                ..XfaAttributes::default()
            },
            children: Vec::new(),
        }
    }

    fn container(name: &str, children: Vec<XfaNode>) -> XfaNode {
        XfaNode {
            name: name.to_string(),
            value: None,
            attributes: XfaAttributes::default(),
            children,
        }
    }

    #[test]
    fn test_xfa_walk_is_preorder() {
        let tree = container(
            "template",
            vec![
                container("subform", vec![field_node("input", "a")]),
                field_node("input", "b"),
            ],
        );

        let fields = extract_xfa_fields(&tree);
        let ids: Vec<&str> = fields
            .iter()
            .map(|f| f.field_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_toggle_detection_via_on_value() {
        let mut node = field_node("input", "form1.subscribe");
        node.attributes.xfa_on = Some("1".to_string());
        let tree = container("template", vec![node]);

        let fields = extract_xfa_fields(&tree);
        assert_eq!(fields[0].kind, FieldKind::Toggle);
        assert_eq!(fields[0].toggle_group.as_deref(), Some("1"));
    }

    #[test]
    fn test_select_options_keep_label_value_pairing() {
        let mut select = field_node("select", "form1.state");
        select.children = vec![
            XfaNode {
                name: "option".to_string(),
                value: Some("California".to_string()),
                attributes: XfaAttributes {
                    value: Some("CA".to_string()),
                    ..XfaAttributes::default()
                },
                children: Vec::new(),
            },
            XfaNode {
                name: "option".to_string(),
                value: Some("Nevada".to_string()),
                attributes: XfaAttributes::default(),
                children: Vec::new(),
            },
        ];
        let tree = container("template", vec![select]);

        let fields = extract_xfa_fields(&tree);
        assert_eq!(fields[0].kind, FieldKind::Select);
        assert_eq!(
            fields[0].options,
            vec![
                FieldOption {
                    label: "California".to_string(),
                    value: "CA".to_string(),
                },
                // No explicit export value: the label doubles as one.
                FieldOption {
                    label: "Nevada".to_string(),
                    value: "Nevada".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_acro_walk_skips_untyped_descriptors() {
        let mut map: IndexMap<String, Vec<AcroFieldDescriptor>> = IndexMap::new();
        map.insert(
            "first_name".to_string(),
            vec![AcroFieldDescriptor {
                field_type: "text".to_string(),
                id: "3R".to_string(),
                name: "first_name".to_string(),
                value: Some("Ada".to_string()),
            }],
        );
        map.insert(
            "layout_only".to_string(),
            vec![AcroFieldDescriptor {
                field_type: String::new(),
                id: "4R".to_string(),
                name: "layout_only".to_string(),
                value: None,
            }],
        );
        map.insert(
            "approve".to_string(),
            vec![AcroFieldDescriptor {
                field_type: "checkbox".to_string(),
                id: "5R".to_string(),
                name: "approve".to_string(),
                value: None,
            }],
        );

        let fields = extract_acro_fields(&map);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].kind, FieldKind::Text);
        assert_eq!(fields[0].field_id, "3R");
        assert_eq!(fields[0].current_value.as_deref(), Some("Ada"));
        assert_eq!(fields[1].kind, FieldKind::Other("checkbox".to_string()));
        assert_eq!(fields[1].label, "approve");
    }
}
