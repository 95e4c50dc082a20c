//! PDF Form MCP Server Library
//!
//! This crate provides MCP tools for PDF form filling:
//! - `extract_form_fields`: List fillable fields of XFA and AcroForm PDFs
//! - `fill_form`: Apply field values and export the filled PDF

pub mod error;
pub mod fields;
pub mod filler;
pub mod pdf;
pub mod server;
pub mod session;
pub mod source;

pub use error::{Error, Result};
pub use fields::{FieldKind, FieldOption, FormField};
pub use filler::{ExtractedForm, FormFiller, FormKind};
pub use server::{
    run_server, run_server_with_config, run_server_with_dirs, FormServer, PdfSource, ServerConfig,
};
