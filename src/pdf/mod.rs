//! PDF document handling built on lopdf

pub mod acro;
pub mod document;
pub mod xfa;

pub use acro::{AcroFieldDescriptor, AcroFormMap};
pub use document::FormDocument;
pub use xfa::{XfaAttributes, XfaForm, XfaNode};

use crate::error::{Error, Result};
use lopdf::{Dictionary, Document, Object, ObjectId};

const MAX_REF_DEPTH: usize = 16;

/// Follow a reference chain to the underlying object.
pub(crate) fn resolve<'a>(doc: &'a Document, mut obj: &'a Object) -> Result<&'a Object> {
    for _ in 0..MAX_REF_DEPTH {
        match obj {
            Object::Reference(id) => obj = doc.get_object(*id)?,
            _ => return Ok(obj),
        }
    }
    Err(Error::InvalidPdf {
        reason: "reference chain too deep".to_string(),
    })
}

pub(crate) fn catalog_id(doc: &Document) -> Result<ObjectId> {
    Ok(doc.trailer.get(b"Root")?.as_reference()?)
}

/// Immutable view of the AcroForm dictionary, if the document has one.
pub(crate) fn acroform_dict(doc: &Document) -> Result<Option<&Dictionary>> {
    let root = catalog_id(doc)?;
    let catalog = doc.get_object(root)?.as_dict()?;
    match catalog.get(b"AcroForm") {
        Ok(obj) => Ok(Some(resolve(doc, obj)?.as_dict()?)),
        Err(_) => Ok(None),
    }
}

/// Mutable access to the AcroForm dictionary, whether it is an indirect
/// object or inlined in the catalog.
pub(crate) fn acroform_dict_mut(doc: &mut Document) -> Result<&mut Dictionary> {
    let root = catalog_id(doc)?;
    let acro_ref = {
        let catalog = doc.get_object(root)?.as_dict()?;
        match catalog.get(b"AcroForm")? {
            Object::Reference(id) => Some(*id),
            _ => None,
        }
    };
    let dict = match acro_ref {
        Some(id) => doc.get_object_mut(id)?.as_dict_mut()?,
        None => doc
            .get_object_mut(root)?
            .as_dict_mut()?
            .get_mut(b"AcroForm")?
            .as_dict_mut()?,
    };
    Ok(dict)
}

/// Text content of a PDF string or name object.
pub(crate) fn string_value(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}
