//! XFA form support: packet extraction, template parsing, datasets round trip.
//!
//! XFA forms live in the `/XFA` entry of the AcroForm dictionary, either as a
//! single stream holding a complete XDP document or as an array of
//! name/stream pairs (template, datasets, config, ...). The template packet
//! describes the form structure; the datasets packet holds the filled values.
//!
//! The template is normalized into an [`XfaNode`] tree whose node names follow
//! the input affordance they represent (`input`, `textarea`, `select`), so the
//! field walker needs no knowledge of XFA widget vocabulary. Value writes are
//! serialized back by regenerating the datasets packet.

use crate::error::{Error, Result};
use crate::pdf::{acroform_dict, acroform_dict_mut, resolve, string_value};
use indexmap::IndexMap;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Cursor;

const XFA_DATA_NS: &str = "http://www.xfa.org/schema/xfa-data/1.0/";

/// Attributes of a normalized XFA tree node.
///
/// Field names mirror the attribute names the raw structure is serialized
/// under for diagnostic output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct XfaAttributes {
    /// Identifier used when writing values back; dotted path of named
    /// ancestors. Empty for container nodes.
    #[serde(rename = "dataId")]
    pub data_id: String,
    /// Human-readable caption (assist/speak, tooltip, or caption text).
    #[serde(rename = "aria-label")]
    pub aria_label: String,
    /// The "on" state value; present only on toggle-style inputs.
    #[serde(rename = "xfaOn", skip_serializing_if = "Option::is_none")]
    pub xfa_on: Option<String>,
    /// Current value (template default overlaid by the datasets packet).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Literal text associated with the node (caption text).
    #[serde(rename = "textContent", skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
}

/// One node of the normalized XFA tree.
///
/// A closed shape with an explicit (possibly empty) children vector: fields
/// are nodes named `input`/`textarea`/`select`, option leaves under a select
/// are named `option` with the display label in `value`, and every other
/// element keeps its own name and is traversed but never materialized as a
/// field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XfaNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub attributes: XfaAttributes,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<XfaNode>,
}

impl XfaNode {
    fn container(name: &str, children: Vec<XfaNode>) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            attributes: XfaAttributes::default(),
            children,
        }
    }
}

/// A parsed XFA form: the normalized template tree plus everything needed to
/// write values back into the document.
#[derive(Debug, Clone)]
pub struct XfaForm {
    tree: XfaNode,
    /// Values the document's datasets packet carried at load time, by dotted
    /// path. The regenerated packet starts from these so fields not written
    /// in this session keep their values.
    data_values: IndexMap<String, String>,
}

impl XfaForm {
    pub fn tree(&self) -> &XfaNode {
        &self.tree
    }

    /// Dotted paths of every fillable field in the template, in traversal
    /// order. These are the ids the datasets writer recognizes.
    pub fn field_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        collect_field_paths(&self.tree, &mut paths);
        paths
    }
}

fn collect_field_paths(node: &XfaNode, out: &mut Vec<String>) {
    if matches!(node.name.as_str(), "input" | "textarea" | "select") {
        out.push(node.attributes.data_id.clone());
    }
    for child in &node.children {
        collect_field_paths(child, out);
    }
}

// ============================================================================
// Packet extraction
// ============================================================================

/// Extract and parse the XFA form from a document, if it carries one.
pub fn extract(doc: &Document) -> Result<Option<XfaForm>> {
    let Some(acro) = acroform_dict(doc)? else {
        return Ok(None);
    };
    let xfa_obj = match acro.get(b"XFA") {
        Ok(obj) => resolve(doc, obj)?,
        Err(_) => return Ok(None),
    };

    let packets = read_packets(doc, xfa_obj)?;
    let template = packets
        .iter()
        .find(|(name, _)| name == "template")
        .map(|(_, data)| data.as_slice())
        .ok_or_else(|| Error::Xfa {
            reason: "XFA entry has no template packet".to_string(),
        })?;
    let datasets = packets
        .iter()
        .find(|(name, _)| name == "datasets")
        .map(|(_, data)| data.as_slice());

    let template_root = parse_xml_tree(template)?;
    let data_values = match datasets {
        Some(data) => parse_datasets(data)?,
        None => IndexMap::new(),
    };

    let tree = convert_container(&template_root, &mut Vec::new(), &data_values);
    Ok(Some(XfaForm { tree, data_values }))
}

/// Read XFA packets as (name, xml-bytes) pairs from either layout.
fn read_packets(doc: &Document, xfa_obj: &Object) -> Result<Vec<(String, Vec<u8>)>> {
    match xfa_obj {
        Object::Stream(stream) => split_xdp(&stream_bytes(stream)),
        Object::Array(entries) => {
            let mut packets = Vec::new();
            let mut pending_name: Option<String> = None;
            for entry in entries {
                let entry = resolve(doc, entry)?;
                match entry {
                    Object::String(_, _) => pending_name = string_value(entry),
                    Object::Stream(stream) => {
                        if let Some(name) = pending_name.take() {
                            packets.push((name, stream_bytes(stream)));
                        }
                    }
                    _ => pending_name = None,
                }
            }
            Ok(packets)
        }
        _ => Err(Error::Xfa {
            reason: "XFA entry is neither stream nor array".to_string(),
        }),
    }
}

fn stream_bytes(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

/// Split a single-stream XDP into template and datasets packets.
fn split_xdp(data: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let xml = String::from_utf8_lossy(data);
    let mut packets = Vec::new();

    if let (Some(start), Some(end)) = (xml.find("<template"), xml.find("</template>")) {
        let end = end + "</template>".len();
        packets.push(("template".to_string(), xml[start..end].as_bytes().to_vec()));
    }
    if let (Some(start), Some(end)) = (xml.find("<xfa:datasets"), xml.find("</xfa:datasets>")) {
        let end = end + "</xfa:datasets>".len();
        packets.push(("datasets".to_string(), xml[start..end].as_bytes().to_vec()));
    }

    if packets.is_empty() {
        return Err(Error::Xfa {
            reason: "XDP stream contains no template packet".to_string(),
        });
    }
    Ok(packets)
}

// ============================================================================
// Generic XML tree
// ============================================================================

#[derive(Debug, Default)]
struct XmlElement {
    name: String,
    attributes: HashMap<String, String>,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn element_from(e: &BytesStart<'_>) -> XmlElement {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut attributes = HashMap::new();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = String::from_utf8_lossy(&attr.value).into_owned();
        attributes.insert(key, value);
    }
    XmlElement {
        name,
        attributes,
        text: String::new(),
        children: Vec::new(),
    }
}

/// Parse an XML packet into an element tree rooted at the document element.
fn parse_xml_tree(data: &[u8]) -> Result<XmlElement> {
    let mut reader = Reader::from_reader(data);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = vec![XmlElement::default()];

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => stack.push(element_from(e)),
            Ok(Event::Empty(ref e)) => {
                let element = element_from(e);
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Ok(Event::Text(ref t)) => {
                let text = t.unescape().map_err(|e| Error::Xfa {
                    reason: format!("malformed XML text: {}", e),
                })?;
                if let Some(parent) = stack.last_mut() {
                    parent.text.push_str(&text);
                }
            }
            Ok(Event::CData(ref t)) => {
                if let Some(parent) = stack.last_mut() {
                    parent.text.push_str(&String::from_utf8_lossy(t));
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() > 1 {
                    let element = stack.pop().unwrap_or_default();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(element);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Error::Xfa {
                    reason: format!("malformed XML: {}", e),
                })
            }
        }
        buf.clear();
    }

    let mut root = stack.pop().unwrap_or_default();
    root.children.pop().ok_or_else(|| Error::Xfa {
        reason: "empty XML packet".to_string(),
    })
}

// ============================================================================
// Template -> normalized tree
// ============================================================================

fn convert_container(
    el: &XmlElement,
    path: &mut Vec<String>,
    values: &IndexMap<String, String>,
) -> XfaNode {
    let named = match el.attr("name") {
        Some(name) if !name.is_empty() => {
            path.push(name.to_string());
            true
        }
        _ => false,
    };

    let mut children = Vec::new();
    for child in &el.children {
        match child.name.as_str() {
            "subform" | "exclGroup" | "area" => {
                children.push(convert_container(child, path, values));
            }
            "field" => children.push(convert_field(child, path, values)),
            _ => {}
        }
    }

    if named {
        path.pop();
    }
    XfaNode::container(&el.name, children)
}

fn convert_field(
    el: &XmlElement,
    path: &mut Vec<String>,
    values: &IndexMap<String, String>,
) -> XfaNode {
    let field_name = el.attr("name").unwrap_or_default().to_string();
    let data_id = if path.is_empty() {
        field_name.clone()
    } else {
        format!("{}.{}", path.join("."), field_name)
    };

    let widget = el
        .child("ui")
        .and_then(|ui| ui.children.first())
        .map(|w| w.name.as_str())
        .unwrap_or("textEdit");
    let multiline = el
        .child("ui")
        .and_then(|ui| ui.child("textEdit"))
        .and_then(|t| t.attr("multiLine"))
        .map(|m| m == "1")
        .unwrap_or(false);

    let caption = el
        .child("caption")
        .and_then(|c| c.child("value"))
        .and_then(|v| v.child("text"))
        .map(|t| t.text.clone());
    let speak = el
        .child("assist")
        .and_then(|a| a.child("speak"))
        .map(|s| s.text.clone())
        .filter(|s| !s.is_empty());
    let tooltip = el
        .child("assist")
        .and_then(|a| a.child("toolTip"))
        .or_else(|| el.child("toolTip"))
        .map(|t| t.text.clone())
        .filter(|s| !s.is_empty());
    let aria_label = speak
        .or(tooltip)
        .or_else(|| caption.clone())
        .unwrap_or_else(|| field_name.clone());

    let template_default = el
        .child("value")
        .and_then(|v| v.children.first())
        .map(|t| t.text.clone())
        .filter(|s| !s.is_empty());
    let current = values.get(&data_id).cloned().or(template_default);

    let (display_items, save_items) = item_lists(el);

    let name = match widget {
        "choiceList" => "select",
        "textEdit" if multiline => "textarea",
        "checkButton" => "input",
        "button" => "button",
        "signature" => "signature",
        _ => "input",
    };
    let xfa_on = if widget == "checkButton" {
        Some(
            save_items
                .first()
                .or_else(|| display_items.first())
                .cloned()
                .unwrap_or_else(|| "1".to_string()),
        )
    } else {
        None
    };

    let children = if name == "select" {
        let export = if save_items.is_empty() {
            &display_items
        } else {
            &save_items
        };
        display_items
            .iter()
            .enumerate()
            .map(|(i, label)| XfaNode {
                name: "option".to_string(),
                value: Some(label.clone()),
                attributes: XfaAttributes {
                    value: Some(export.get(i).cloned().unwrap_or_else(|| label.clone())),
                    ..XfaAttributes::default()
                },
                children: Vec::new(),
            })
            .collect()
    } else {
        Vec::new()
    };

    XfaNode {
        name: name.to_string(),
        value: None,
        attributes: XfaAttributes {
            data_id,
            aria_label,
            xfa_on,
            value: current,
            text_content: caption,
        },
        children,
    }
}

/// Split a field's `<items>` arrays into display labels and export values.
/// XFA marks the export list with `save="1"`; a lone list serves as both.
fn item_lists(el: &XmlElement) -> (Vec<String>, Vec<String>) {
    let mut display = Vec::new();
    let mut save = Vec::new();
    for items in el.children_named("items") {
        let texts: Vec<String> = items.children.iter().map(|t| t.text.clone()).collect();
        if items.attr("save") == Some("1") {
            save = texts;
        } else if display.is_empty() {
            display = texts;
        } else if save.is_empty() {
            save = texts;
        }
    }
    if display.is_empty() {
        display = save.clone();
    }
    (display, save)
}

// ============================================================================
// Datasets packet
// ============================================================================

/// Flatten a datasets packet into dotted-path -> value pairs, in packet order.
fn parse_datasets(data: &[u8]) -> Result<IndexMap<String, String>> {
    let root = parse_xml_tree(data)?;
    let mut values = IndexMap::new();
    // Values live under <xfa:datasets><xfa:data>...; tolerate a bare data
    // element as the packet root.
    let data_el = root.child("data").unwrap_or(&root);
    for child in &data_el.children {
        flatten_data(child, &mut Vec::new(), &mut values);
    }
    Ok(values)
}

fn flatten_data(el: &XmlElement, path: &mut Vec<String>, out: &mut IndexMap<String, String>) {
    path.push(el.name.clone());
    if el.children.is_empty() {
        out.insert(path.join("."), el.text.clone());
    } else {
        for child in &el.children {
            flatten_data(child, path, out);
        }
    }
    path.pop();
}

#[derive(Default)]
struct DataTree {
    value: Option<String>,
    children: IndexMap<String, DataTree>,
}

/// Serialize the datasets packet: the values loaded from the document,
/// overlaid with the recognized subset of `values`.
fn build_datasets_xml(form: &XfaForm, values: &IndexMap<String, String>) -> Result<Vec<u8>> {
    let known: std::collections::HashSet<String> = form.field_paths().into_iter().collect();

    let mut root = DataTree::default();
    // Fields not written in this session keep the value the packet carried.
    for (field_id, value) in &form.data_values {
        set_data_value(&mut root, field_id, value);
    }
    for (field_id, value) in values {
        // Unknown ids are accepted upstream but have no effect on output.
        if !known.contains(field_id) {
            continue;
        }
        set_data_value(&mut root, field_id, value);
    }

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut datasets = BytesStart::new("xfa:datasets");
    datasets.push_attribute(("xmlns:xfa", XFA_DATA_NS));
    write_xml(&mut writer, Event::Start(datasets))?;
    write_xml(&mut writer, Event::Start(BytesStart::new("xfa:data")))?;
    write_data_tree(&mut writer, &root)?;
    write_xml(&mut writer, Event::End(BytesEnd::new("xfa:data")))?;
    write_xml(&mut writer, Event::End(BytesEnd::new("xfa:datasets")))?;

    Ok(writer.into_inner().into_inner())
}

fn set_data_value(root: &mut DataTree, field_id: &str, value: &str) {
    let mut node = root;
    for segment in field_id.split('.') {
        node = node.children.entry(segment.to_string()).or_default();
    }
    node.value = Some(value.to_string());
}

fn write_xml(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<()> {
    writer.write_event(event).map_err(|e| Error::Xfa {
        reason: format!("failed to write datasets packet: {}", e),
    })
}

fn write_data_tree(writer: &mut Writer<Cursor<Vec<u8>>>, node: &DataTree) -> Result<()> {
    for (name, child) in &node.children {
        write_xml(writer, Event::Start(BytesStart::new(name.as_str())))?;
        if let Some(ref value) = child.value {
            write_xml(writer, Event::Text(BytesText::new(value)))?;
        }
        write_data_tree(writer, child)?;
        write_xml(writer, Event::End(BytesEnd::new(name.as_str())))?;
    }
    Ok(())
}

/// Replace the datasets packet inside a single-stream XDP document.
fn splice_datasets(xdp: &[u8], datasets_xml: &[u8]) -> Result<Vec<u8>> {
    let xml = String::from_utf8_lossy(xdp).into_owned();
    let datasets = String::from_utf8_lossy(datasets_xml);

    if let (Some(start), Some(end)) = (xml.find("<xfa:datasets"), xml.find("</xfa:datasets>")) {
        let end = end + "</xfa:datasets>".len();
        let mut out = String::with_capacity(xml.len() + datasets.len());
        out.push_str(&xml[..start]);
        out.push_str(&datasets);
        out.push_str(&xml[end..]);
        return Ok(out.into_bytes());
    }
    if let Some(pos) = xml.find("</xdp:xdp>") {
        let mut out = String::with_capacity(xml.len() + datasets.len());
        out.push_str(&xml[..pos]);
        out.push_str(&datasets);
        out.push_str(&xml[pos..]);
        return Ok(out.into_bytes());
    }
    Err(Error::Xfa {
        reason: "XDP stream has no datasets packet and no xdp envelope".to_string(),
    })
}

// ============================================================================
// Value application
// ============================================================================

/// Write the annotation values back into the document's XFA entry by
/// regenerating the datasets packet. Both layouts are handled; unknown field
/// ids are dropped silently. The existing datasets stream object is rewritten
/// in place when the layout references one, so repeated exports never
/// accumulate superseded streams.
pub fn apply_values(
    form: &XfaForm,
    doc: &mut Document,
    values: &IndexMap<String, String>,
) -> Result<()> {
    let datasets_xml = build_datasets_xml(form, values)?;

    let update = {
        let acro = acroform_dict(doc)?.ok_or_else(|| Error::Xfa {
            reason: "document lost its AcroForm dictionary".to_string(),
        })?;
        let raw_entry = acro.get(b"XFA")?;
        let stream_id = match raw_entry {
            Object::Reference(id) => Some(*id),
            _ => None,
        };
        match resolve(doc, raw_entry)? {
            Object::Stream(stream) => {
                let spliced = splice_datasets(&stream_bytes(stream), &datasets_xml)?;
                match stream_id {
                    Some(id) => DatasetsUpdate::OverwriteStream(id, spliced),
                    None => DatasetsUpdate::SetEntry(Object::Stream(Stream::new(
                        Dictionary::new(),
                        spliced,
                    ))),
                }
            }
            Object::Array(entries) => plan_array_update(entries, datasets_xml),
            _ => {
                return Err(Error::Xfa {
                    reason: "XFA entry is neither stream nor array".to_string(),
                })
            }
        }
    };

    match update {
        DatasetsUpdate::OverwriteStream(id, bytes) => {
            doc.objects
                .insert(id, Object::Stream(Stream::new(Dictionary::new(), bytes)));
        }
        DatasetsUpdate::SetEntry(entry) => {
            acroform_dict_mut(doc)?.set("XFA", entry);
        }
        DatasetsUpdate::RebuildArray(mut kept, bytes) => {
            let id = doc.add_object(Object::Stream(Stream::new(Dictionary::new(), bytes)));
            kept.push(Object::String(
                b"datasets".to_vec(),
                lopdf::StringFormat::Literal,
            ));
            kept.push(Object::Reference(id));
            acroform_dict_mut(doc)?.set("XFA", Object::Array(kept));
        }
    }
    Ok(())
}

enum DatasetsUpdate {
    /// Rewrite an existing stream object, leaving the XFA entry untouched.
    OverwriteStream(ObjectId, Vec<u8>),
    /// Replace the XFA entry itself.
    SetEntry(Object),
    /// Rebuild the packet array: kept entries plus a fresh datasets pair.
    RebuildArray(Vec<Object>, Vec<u8>),
}

/// Decide how to update an array-layout XFA entry. When the datasets pair
/// references a stream object that object is overwritten; otherwise the pair
/// is rebuilt (also covering a missing datasets packet).
fn plan_array_update(entries: &[Object], datasets_xml: Vec<u8>) -> DatasetsUpdate {
    let mut pending_datasets = false;
    for entry in entries {
        match entry {
            Object::String(name, _) => {
                pending_datasets = String::from_utf8_lossy(name) == "datasets";
            }
            Object::Reference(id) if pending_datasets => {
                return DatasetsUpdate::OverwriteStream(*id, datasets_xml);
            }
            _ => pending_datasets = false,
        }
    }

    let mut kept = Vec::new();
    let mut skip_next_stream = false;
    for entry in entries {
        match entry {
            Object::String(name, _) if String::from_utf8_lossy(name) == "datasets" => {
                skip_next_stream = true;
            }
            Object::Stream(_) | Object::Reference(_) if skip_next_stream => {
                skip_next_stream = false;
            }
            other => kept.push(other.clone()),
        }
    }
    DatasetsUpdate::RebuildArray(kept, datasets_xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TEMPLATE: &str = r#"<template xmlns="http://www.xfa.org/schema/xfa-template/3.3/">
  <subform name="form1">
    <field name="firstName">
      <ui><textEdit/></ui>
      <assist><speak>First name</speak></assist>
      <caption><value><text>First Name</text></value></caption>
    </field>
    <subform name="address">
      <field name="notes">
        <ui><textEdit multiLine="1"/></ui>
      </field>
      <field name="state">
        <ui><choiceList/></ui>
        <items><text>California</text><text>Nevada</text></items>
        <items save="1"><text>CA</text><text>NV</text></items>
      </field>
    </subform>
    <field name="subscribe">
      <ui><checkButton/></ui>
      <items save="1"><text>1</text><text>0</text></items>
    </field>
  </subform>
</template>"#;

    fn parse_template(xml: &str) -> XfaNode {
        let root = parse_xml_tree(xml.as_bytes()).unwrap();
        convert_container(&root, &mut Vec::new(), &IndexMap::new())
    }

    #[test]
    fn test_template_field_classification() {
        let tree = parse_template(TEMPLATE);
        assert_eq!(tree.name, "template");

        let form1 = &tree.children[0];
        assert_eq!(form1.name, "subform");
        assert_eq!(form1.children[0].name, "input");
        assert_eq!(form1.children[0].attributes.data_id, "form1.firstName");
        assert_eq!(form1.children[0].attributes.aria_label, "First name");
        assert_eq!(
            form1.children[0].attributes.text_content.as_deref(),
            Some("First Name")
        );

        let address = &form1.children[1];
        assert_eq!(address.children[0].name, "textarea");
        assert_eq!(
            address.children[0].attributes.data_id,
            "form1.address.notes"
        );

        let toggle = &form1.children[2];
        assert_eq!(toggle.name, "input");
        assert_eq!(toggle.attributes.xfa_on.as_deref(), Some("1"));
    }

    #[test]
    fn test_select_options_pair_labels_with_export_values() {
        let tree = parse_template(TEMPLATE);
        let select = &tree.children[0].children[1].children[1];
        assert_eq!(select.name, "select");
        assert_eq!(select.children.len(), 2);
        assert_eq!(select.children[0].value.as_deref(), Some("California"));
        assert_eq!(select.children[0].attributes.value.as_deref(), Some("CA"));
        assert_eq!(select.children[1].value.as_deref(), Some("Nevada"));
        assert_eq!(select.children[1].attributes.value.as_deref(), Some("NV"));
    }

    #[test]
    fn test_datasets_overlay_sets_current_value() {
        let datasets = br#"<xfa:datasets xmlns:xfa="http://www.xfa.org/schema/xfa-data/1.0/">
  <xfa:data><form1><firstName>Jane</firstName></form1></xfa:data>
</xfa:datasets>"#;
        let values = parse_datasets(datasets).unwrap();
        assert_eq!(values.get("form1.firstName").map(String::as_str), Some("Jane"));

        let root = parse_xml_tree(TEMPLATE.as_bytes()).unwrap();
        let tree = convert_container(&root, &mut Vec::new(), &values);
        assert_eq!(
            tree.children[0].children[0].attributes.value.as_deref(),
            Some("Jane")
        );
    }

    #[test]
    fn test_datasets_writer_filters_unknown_ids_and_escapes() {
        let tree = parse_template(TEMPLATE);
        let form = XfaForm {
            tree,
            data_values: IndexMap::new(),
        };

        let mut values = IndexMap::new();
        values.insert("form1.firstName".to_string(), "Jane & Joe".to_string());
        values.insert("no.such.field".to_string(), "x".to_string());

        let xml = String::from_utf8(build_datasets_xml(&form, &values).unwrap()).unwrap();
        assert!(xml.contains("<firstName>Jane &amp; Joe</firstName>"));
        assert!(!xml.contains("no.such.field"));
        assert!(!xml.contains("such"));
    }

    #[test]
    fn test_datasets_writer_keeps_values_not_written_this_session() {
        let tree = parse_template(TEMPLATE);
        let mut data_values = IndexMap::new();
        data_values.insert("form1.firstName".to_string(), "Ada".to_string());
        data_values.insert("form1.address.state".to_string(), "CA".to_string());
        let form = XfaForm { tree, data_values };

        let mut values = IndexMap::new();
        values.insert("form1.address.notes".to_string(), "call back".to_string());

        let xml = String::from_utf8(build_datasets_xml(&form, &values).unwrap()).unwrap();
        // Loaded values survive a rewrite that never touched them.
        assert!(xml.contains("<firstName>Ada</firstName>"));
        assert!(xml.contains("<state>CA</state>"));
        assert!(xml.contains("<notes>call back</notes>"));
    }

    #[test]
    fn test_datasets_writer_overlays_session_writes_over_loaded_values() {
        let tree = parse_template(TEMPLATE);
        let mut data_values = IndexMap::new();
        data_values.insert("form1.firstName".to_string(), "Ada".to_string());
        let form = XfaForm { tree, data_values };

        let mut values = IndexMap::new();
        values.insert("form1.firstName".to_string(), "Jane".to_string());

        let xml = String::from_utf8(build_datasets_xml(&form, &values).unwrap()).unwrap();
        assert!(xml.contains("<firstName>Jane</firstName>"));
        assert!(!xml.contains("Ada"));
    }

    #[test]
    fn test_splice_datasets_replaces_existing_packet() {
        let xdp = br#"<xdp:xdp xmlns:xdp="http://ns.adobe.com/xdp/"><template/><xfa:datasets xmlns:xfa="ns"><xfa:data/></xfa:datasets></xdp:xdp>"#;
        let out = splice_datasets(xdp, b"<xfa:datasets>NEW</xfa:datasets>").unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("NEW"));
        assert!(!out.contains("<xfa:data/>"));
        assert!(out.ends_with("</xdp:xdp>"));
    }

    #[test]
    fn test_split_xdp_without_template_is_an_error() {
        let result = split_xdp(b"<xdp:xdp></xdp:xdp>");
        assert!(matches!(result, Err(Error::Xfa { .. })));
    }
}
