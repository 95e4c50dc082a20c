//! Loaded form document: object graph, parsed form, annotation value store.

use crate::error::{Error, Result};
use crate::pdf::acro::{self, AcroFieldDescriptor, AcroFormMap};
use crate::pdf::xfa::{self, XfaForm, XfaNode};
use indexmap::IndexMap;
use lopdf::Document;

/// A loaded PDF with its form parsed and a pending value store.
///
/// An XFA form takes precedence when present; the AcroForm map is only
/// consulted for documents without one. Written values accumulate in the
/// store and reach the object graph on [`serialize_to_bytes`].
///
/// [`serialize_to_bytes`]: FormDocument::serialize_to_bytes
pub struct FormDocument {
    doc: Document,
    xfa: Option<XfaForm>,
    acro: AcroFormMap,
    values: IndexMap<String, String>,
}

impl FormDocument {
    /// Load a PDF from memory and parse whichever form it carries.
    pub fn open_bytes(data: &[u8]) -> Result<Self> {
        if !data.starts_with(b"%PDF") {
            return Err(Error::InvalidPdf {
                reason: "missing %PDF header".to_string(),
            });
        }
        let doc = Document::load_mem(data).map_err(|e| Error::InvalidPdf {
            reason: format!("failed to parse document: {}", e),
        })?;

        let xfa = xfa::extract(&doc)?;
        let acro = if xfa.is_some() {
            AcroFormMap::default()
        } else {
            acro::collect(&doc)?
        };

        Ok(Self {
            doc,
            xfa,
            acro,
            values: IndexMap::new(),
        })
    }

    pub fn is_xfa(&self) -> bool {
        self.xfa.is_some()
    }

    /// Normalized XFA template tree, when the document is an XFA form.
    pub fn xfa_tree(&self) -> Option<&XfaNode> {
        self.xfa.as_ref().map(XfaForm::tree)
    }

    /// Flattened AcroForm descriptor map (empty for XFA documents).
    pub fn acro_field_objects(&self) -> &IndexMap<String, Vec<AcroFieldDescriptor>> {
        self.acro.field_objects()
    }

    /// Record a value for a field id. Ids that address nothing in the
    /// document are accepted; they simply have no effect on export.
    pub fn write_annotation_value(&mut self, field_id: &str, value: &str) {
        self.values.insert(field_id.to_string(), value.to_string());
    }

    pub fn annotation_values(&self) -> &IndexMap<String, String> {
        &self.values
    }

    /// Apply the pending values and re-encode the document.
    pub fn serialize_to_bytes(&mut self) -> Result<Vec<u8>> {
        if !self.values.is_empty() {
            let result = match &self.xfa {
                Some(form) => xfa::apply_values(form, &mut self.doc, &self.values),
                None => acro::apply_values(&mut self.doc, &self.acro, &self.values),
            };
            result.map_err(|e| Error::SerializationFailed {
                reason: format!("failed to apply form values: {}", e),
            })?;
        }

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| Error::SerializationFailed {
                reason: format!("failed to encode document: {}", e),
            })?;
        Ok(buffer)
    }
}
