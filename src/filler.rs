//! Form filling pipeline: load, extract, apply values, export.

use crate::error::{Error, Result};
use crate::fields::{self, FormField};
use crate::pdf::FormDocument;
use indexmap::IndexMap;
use serde::Serialize;

/// Which form technology the loaded document uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormKind {
    Xfa,
    Acro,
}

impl FormKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormKind::Xfa => "xfa",
            FormKind::Acro => "acro",
        }
    }
}

/// Result of a successful extraction: the normalized field list plus a JSON
/// rendering of the raw structure it came from, for diagnostics.
#[derive(Debug, Clone)]
pub struct ExtractedForm {
    pub form_kind: FormKind,
    pub fields: Vec<FormField>,
    pub raw_debug_json: String,
}

/// Stateful fill pipeline over one document at a time.
///
/// Loading a new document discards all prior state. Extraction results are
/// kept so repeated field listings need no re-parse, and values applied
/// before export survive a failed export attempt.
#[derive(Default)]
pub struct FormFiller {
    document: Option<FormDocument>,
    extracted: Option<ExtractedForm>,
}

impl FormFiller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.document.is_some()
    }

    /// Parse a PDF and extract its field list, replacing any prior document.
    pub fn load_and_extract(&mut self, data: &[u8]) -> Result<&ExtractedForm> {
        self.document = None;
        self.extracted = None;

        let document = FormDocument::open_bytes(data)?;
        let extracted = match document.xfa_tree() {
            Some(tree) => ExtractedForm {
                form_kind: FormKind::Xfa,
                fields: fields::extract_xfa_fields(tree),
                raw_debug_json: serde_json::to_string_pretty(tree)?,
            },
            None => {
                let map = document.acro_field_objects();
                ExtractedForm {
                    form_kind: FormKind::Acro,
                    fields: fields::extract_acro_fields(map),
                    raw_debug_json: serde_json::to_string_pretty(map)?,
                }
            }
        };

        self.document = Some(document);
        self.extracted = Some(extracted);
        self.extracted.as_ref().ok_or(Error::NoDocumentLoaded)
    }

    pub fn extracted(&self) -> Option<&ExtractedForm> {
        self.extracted.as_ref()
    }

    pub fn fields(&self) -> &[FormField] {
        self.extracted
            .as_ref()
            .map(|e| e.fields.as_slice())
            .unwrap_or(&[])
    }

    /// Record values into the annotation value store. Unknown field ids are
    /// accepted; they have no effect on the exported document.
    pub fn apply_values(&mut self, values: &IndexMap<String, String>) -> Result<()> {
        let document = self.document.as_mut().ok_or(Error::NoDocumentLoaded)?;
        for (field_id, value) in values {
            document.write_annotation_value(field_id, value);
        }
        Ok(())
    }

    /// Re-encode the document with all recorded values applied.
    pub fn export(&mut self) -> Result<Vec<u8>> {
        let document = self.document.as_mut().ok_or(Error::NoDocumentLoaded)?;
        document.serialize_to_bytes()
    }

    /// Apply `values` and export in one step.
    pub fn fill_and_export(&mut self, values: &IndexMap<String, String>) -> Result<Vec<u8>> {
        self.apply_values(values)?;
        self.export()
    }
}
