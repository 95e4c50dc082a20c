//! MCP Server implementation using rmcp

use crate::fields::FormField;
use crate::filler::FormFiller;
use crate::session::SessionStore;
use crate::source::{resolve_base64, resolve_path, resolve_url};
use anyhow::Result;
use base64::Engine;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// PDF source specification
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum PdfSource {
    /// File path (absolute or relative)
    Path {
        /// Path to the PDF file
        path: String,
    },
    /// Base64 encoded PDF data
    Base64 {
        /// Base64 encoded PDF content
        base64: String,
    },
    /// URL to download PDF from
    Url {
        /// URL of the PDF file
        url: String,
    },
    /// Reference to an already-loaded form session
    SessionRef {
        /// Session key from a previous extract_form_fields call
        session_key: String,
    },
}

impl<'de> serde::Deserialize<'de> for PdfSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        if let Some(obj) = value.as_object() {
            if let Some(v) = obj.get("path") {
                if let Some(s) = v.as_str() {
                    return Ok(PdfSource::Path {
                        path: s.to_string(),
                    });
                }
                return Err(serde::de::Error::custom("\"path\" must be a string"));
            }
            if let Some(v) = obj.get("base64") {
                if let Some(s) = v.as_str() {
                    return Ok(PdfSource::Base64 {
                        base64: s.to_string(),
                    });
                }
                return Err(serde::de::Error::custom("\"base64\" must be a string"));
            }
            if let Some(v) = obj.get("url") {
                if let Some(s) = v.as_str() {
                    return Ok(PdfSource::Url { url: s.to_string() });
                }
                return Err(serde::de::Error::custom("\"url\" must be a string"));
            }
            if let Some(v) = obj.get("session_key") {
                if let Some(s) = v.as_str() {
                    return Ok(PdfSource::SessionRef {
                        session_key: s.to_string(),
                    });
                }
                return Err(serde::de::Error::custom("\"session_key\" must be a string"));
            }
            let keys: Vec<&String> = obj.keys().collect();
            Err(serde::de::Error::custom(format!(
                "Invalid source: expected an object with one of \"path\", \"base64\", \"url\", or \"session_key\", but got keys: {:?}",
                keys
            )))
        } else {
            Err(serde::de::Error::custom(format!(
                "Invalid source: expected an object with one of \"path\", \"base64\", \"url\", or \"session_key\", but got {}",
                match &value {
                    serde_json::Value::Array(_) => "an array",
                    serde_json::Value::String(_) => "a string",
                    serde_json::Value::Number(_) => "a number",
                    serde_json::Value::Bool(_) => "a boolean",
                    serde_json::Value::Null => "null",
                    _ => "unknown type",
                }
            )))
        }
    }
}

/// Security and resource configuration for the PDF Form MCP Server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directories file paths are restricted to (empty allows all paths)
    pub resource_dirs: Vec<String>,
    /// Allow URLs that resolve to private/reserved IPs (default: false)
    pub allow_private_urls: bool,
    /// Maximum download size in bytes for URL sources (default: 100MB)
    pub max_download_bytes: u64,
    /// Maximum number of live form sessions (default: 64)
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            allow_private_urls: false,
            max_download_bytes: 100 * 1024 * 1024, // 100MB
            max_sessions: 64,
        }
    }
}

/// PDF Form MCP Server
#[derive(Clone)]
pub struct FormServer {
    sessions: Arc<SessionStore>,
    tool_router: ToolRouter<Self>,
    config: Arc<ServerConfig>,
}

// ============================================================================
// Tool parameter and result types
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExtractFormFieldsParams {
    /// PDF sources to process
    pub sources: Vec<PdfSource>,
    /// Include a JSON rendering of the raw form structure (default: false)
    #[serde(default)]
    pub include_raw: bool,
}

/// One selectable choice of a select field
#[derive(Debug, Serialize, JsonSchema)]
pub struct FieldOptionInfo {
    pub label: String,
    pub value: String,
}

/// A normalized form field
#[derive(Debug, Serialize, JsonSchema)]
pub struct FormFieldInfo {
    /// Field kind: text, textarea, select, toggle, or a pass-through kind
    pub kind: String,
    /// Identifier accepted by fill_form
    pub field_id: String,
    /// Human-readable label
    pub label: String,
    /// For toggles, the value that means "checked"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toggle_group: Option<String>,
    /// Caption text, when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
    /// Current value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOptionInfo>,
}

impl From<&FormField> for FormFieldInfo {
    fn from(field: &FormField) -> Self {
        Self {
            kind: field.kind.as_str().to_string(),
            field_id: field.field_id.clone(),
            label: field.label.clone(),
            toggle_group: field.toggle_group.clone(),
            display_text: field.display_text.clone(),
            current_value: field.current_value.clone(),
            options: field
                .options
                .iter()
                .map(|o| FieldOptionInfo {
                    label: o.label.clone(),
                    value: o.value.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ExtractFormFieldsResult {
    pub source: String,
    /// Key for reusing the loaded document in later calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    /// "xfa" or "acro"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_kind: Option<String>,
    pub fields: Vec<FormFieldInfo>,
    pub total_fields: usize,
    /// Raw form structure as JSON, when include_raw was set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FillFormParams {
    /// PDF source to fill
    pub source: PdfSource,
    /// Field id -> value pairs to apply
    pub values: HashMap<String, String>,
    /// Where to write the filled PDF; omitted returns it as base64
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct FillFormResult {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    pub values_applied: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Filled PDF as base64, when no output_path was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Tools
// ============================================================================

#[tool_router]
impl FormServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a new FormServer with specified resource directories
    pub fn with_resource_dirs(dirs: Vec<String>) -> Self {
        Self::with_config(ServerConfig {
            resource_dirs: dirs,
            ..ServerConfig::default()
        })
    }

    /// Create a new FormServer with full configuration
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(config.max_sessions)),
            tool_router: Self::tool_router(),
            config: Arc::new(config),
        }
    }

    /// List fillable form fields in PDF files
    #[tool(
        description = "Extract fillable form fields from PDF files. Handles both XFA and AcroForm documents, returning a normalized field list (kind, field_id, label, current value, select options) plus a session_key for filling the same document later.

Source format: each element must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"session_key\": \"...\"}"
    )]
    async fn extract_form_fields(
        &self,
        Parameters(params): Parameters<ExtractFormFieldsParams>,
    ) -> String {
        let mut results = Vec::new();

        for source in &params.sources {
            let result = self
                .process_extract_form_fields(source, &params)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "extract_form_fields failed");
                    ExtractFormFieldsResult {
                        source: Self::source_name(source),
                        session_key: None,
                        form_kind: None,
                        fields: vec![],
                        total_fields: 0,
                        raw: None,
                        error: Some(e.client_message()),
                    }
                });
            results.push(result);
        }

        let response = serde_json::json!({ "results": results });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Fill form fields and export the PDF
    #[tool(
        description = "Fill PDF form fields with the given values and export the document. Accepts field_ids from extract_form_fields; unknown ids are ignored. Writes the filled PDF to output_path, or returns it base64-encoded when no path is given.

Source format: one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"session_key\": \"...\"}"
    )]
    async fn fill_form(&self, Parameters(params): Parameters<FillFormParams>) -> String {
        let result = self.process_fill_form(&params).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "fill_form failed");
            FillFormResult {
                source: Self::source_name(&params.source),
                session_key: None,
                values_applied: 0,
                output_path: None,
                data_base64: None,
                error: Some(e.client_message()),
            }
        });

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }
}

// ============================================================================
// Processing
// ============================================================================

impl FormServer {
    fn source_name(source: &PdfSource) -> String {
        match source {
            PdfSource::Path { path } => path.clone(),
            PdfSource::Base64 { .. } => "<base64>".to_string(),
            PdfSource::Url { url } => url.clone(),
            PdfSource::SessionRef { session_key } => format!("<session:{}>", session_key),
        }
    }

    /// Get a loaded pipeline for the source: an existing session, or a fresh
    /// load of resolved bytes. Returns the existing session key when the
    /// source was a session reference.
    async fn obtain_filler(
        &self,
        source: &PdfSource,
    ) -> crate::error::Result<(FormFiller, Option<String>, String)> {
        let resolved = match source {
            PdfSource::SessionRef { session_key } => {
                let filler = self.sessions.take(session_key).ok_or_else(|| {
                    crate::error::Error::SessionNotFound {
                        key: session_key.clone(),
                    }
                })?;
                return Ok((
                    filler,
                    Some(session_key.clone()),
                    Self::source_name(source),
                ));
            }
            PdfSource::Path { path } => {
                self.validate_path_access(path)?;
                resolve_path(path)?
            }
            PdfSource::Base64 { base64 } => resolve_base64(base64)?,
            PdfSource::Url { url } => {
                resolve_url(
                    url,
                    self.config.allow_private_urls,
                    self.config.max_download_bytes,
                )
                .await?
            }
        };
        let source_name = resolved.source_name;
        let data = resolved.data;

        // PDF parsing is CPU-bound; keep it off the async runtime.
        let filler = tokio::task::spawn_blocking(move || {
            let mut filler = FormFiller::new();
            filler.load_and_extract(&data)?;
            Ok::<_, crate::error::Error>(filler)
        })
        .await
        .map_err(|e| crate::error::Error::InvalidPdf {
            reason: format!("PDF processing task failed: {}", e),
        })??;

        Ok((filler, None, source_name))
    }

    async fn process_extract_form_fields(
        &self,
        source: &PdfSource,
        params: &ExtractFormFieldsParams,
    ) -> crate::error::Result<ExtractFormFieldsResult> {
        let (filler, existing_key, source_name) = self.obtain_filler(source).await?;

        let (form_kind, fields, raw) = {
            let extracted = filler
                .extracted()
                .ok_or(crate::error::Error::NoDocumentLoaded)?;
            let fields: Vec<FormFieldInfo> =
                extracted.fields.iter().map(FormFieldInfo::from).collect();
            let raw = params
                .include_raw
                .then(|| extracted.raw_debug_json.clone());
            (extracted.form_kind.as_str().to_string(), fields, raw)
        };

        let session_key = match existing_key {
            Some(key) => {
                self.sessions.put_back(&key, filler);
                key
            }
            None => self.sessions.insert(filler),
        };

        Ok(ExtractFormFieldsResult {
            source: source_name,
            session_key: Some(session_key),
            form_kind: Some(form_kind),
            total_fields: fields.len(),
            fields,
            raw,
            error: None,
        })
    }

    async fn process_fill_form(
        &self,
        params: &FillFormParams,
    ) -> crate::error::Result<FillFormResult> {
        let (mut filler, existing_key, source_name) = self.obtain_filler(&params.source).await?;

        let values: indexmap::IndexMap<String, String> = params
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let values_applied = values.len();

        let (filler, export) = tokio::task::spawn_blocking(move || {
            let export = filler
                .apply_values(&values)
                .and_then(|_| filler.export());
            (filler, export)
        })
        .await
        .map_err(|e| crate::error::Error::SerializationFailed {
            reason: format!("PDF processing task failed: {}", e),
        })?;

        // Applied values survive a failed export, so a session reference
        // stays live either way; a fresh load only becomes a session when
        // export succeeded.
        let session_key = match (&export, existing_key) {
            (_, Some(key)) => {
                self.sessions.put_back(&key, filler);
                Some(key)
            }
            (Ok(_), None) => Some(self.sessions.insert(filler)),
            (Err(_), None) => None,
        };
        let data = export?;

        let output_path = self.write_output(&params.output_path, &data)?;
        let data_base64 = if output_path.is_none() {
            Some(base64::engine::general_purpose::STANDARD.encode(&data))
        } else {
            None
        };

        Ok(FillFormResult {
            source: source_name,
            session_key,
            values_applied,
            output_path,
            data_base64,
            error: None,
        })
    }

    /// Validate that a path is within allowed resource directories.
    /// If no resource_dirs are configured, all paths are allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<std::path::PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(std::path::PathBuf::from(path));
        }

        let canonical =
            std::fs::canonicalize(path).map_err(|_| crate::error::Error::PathAccessDenied {
                path: path.to_string(),
            })?;

        for dir in &self.config.resource_dirs {
            if let Ok(canonical_dir) = std::fs::canonicalize(dir) {
                if canonical.starts_with(&canonical_dir) {
                    return Ok(canonical);
                }
            }
        }

        Err(crate::error::Error::PathAccessDenied {
            path: path.to_string(),
        })
    }

    /// Validate that an output path is within allowed resource directories.
    /// Canonicalizes the parent directory since the output file may not exist yet.
    fn validate_output_path_access(&self, path: &str) -> crate::error::Result<std::path::PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(std::path::PathBuf::from(path));
        }

        let path_obj = std::path::Path::new(path);
        let parent = path_obj.parent().unwrap_or(std::path::Path::new("."));

        let canonical_parent =
            std::fs::canonicalize(parent).map_err(|_| crate::error::Error::PathAccessDenied {
                path: path.to_string(),
            })?;

        let canonical_target =
            canonical_parent.join(path_obj.file_name().unwrap_or(std::ffi::OsStr::new("")));

        for dir in &self.config.resource_dirs {
            if let Ok(canonical_dir) = std::fs::canonicalize(dir) {
                if canonical_target.starts_with(&canonical_dir) {
                    return Ok(canonical_target);
                }
            }
        }

        Err(crate::error::Error::PathAccessDenied {
            path: path.to_string(),
        })
    }

    /// Write output data to a file path, with sandbox validation.
    fn write_output(
        &self,
        output_path: &Option<String>,
        data: &[u8],
    ) -> crate::error::Result<Option<String>> {
        if let Some(ref path_str) = output_path {
            self.validate_output_path_access(path_str)?;

            let path = Path::new(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            std::fs::write(path, data)?;
            Ok(Some(path_str.clone()))
        } else {
            Ok(None)
        }
    }
}

impl Default for FormServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for FormServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "PDF Form MCP Server fills PDF forms. extract_form_fields lists the fillable \
                 fields of an XFA or AcroForm document and returns a session key; fill_form \
                 applies values and exports the filled PDF."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server without resource directories
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::default()).await
}

/// Run the MCP server with specified resource directories
pub async fn run_server_with_dirs(resource_dirs: Vec<String>) -> Result<()> {
    run_server_with_config(ServerConfig {
        resource_dirs,
        ..ServerConfig::default()
    })
    .await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    let server = FormServer::with_config(config);

    tracing::info!("PDF Form MCP Server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_name() {
        assert_eq!(
            FormServer::source_name(&PdfSource::Path {
                path: "/test.pdf".to_string()
            }),
            "/test.pdf"
        );
        assert_eq!(
            FormServer::source_name(&PdfSource::Base64 {
                base64: "abc".to_string()
            }),
            "<base64>"
        );
        assert_eq!(
            FormServer::source_name(&PdfSource::SessionRef {
                session_key: "k1".to_string()
            }),
            "<session:k1>"
        );
    }

    #[test]
    fn test_pdf_source_deserialize_variants() {
        let source: PdfSource = serde_json::from_str(r#"{"path": "/a.pdf"}"#).unwrap();
        assert!(matches!(source, PdfSource::Path { .. }));

        let source: PdfSource = serde_json::from_str(r#"{"base64": "JVBERg=="}"#).unwrap();
        assert!(matches!(source, PdfSource::Base64 { .. }));

        let source: PdfSource = serde_json::from_str(r#"{"url": "https://x/y.pdf"}"#).unwrap();
        assert!(matches!(source, PdfSource::Url { .. }));

        let source: PdfSource = serde_json::from_str(r#"{"session_key": "abc"}"#).unwrap();
        assert!(matches!(source, PdfSource::SessionRef { .. }));
    }

    #[test]
    fn test_pdf_source_deserialize_rejects_bad_shapes() {
        assert!(serde_json::from_str::<PdfSource>(r#"{"path": 42}"#).is_err());
        assert!(serde_json::from_str::<PdfSource>(r#"{"unknown": "x"}"#).is_err());
        assert!(serde_json::from_str::<PdfSource>(r#""just a string""#).is_err());
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert!(config.resource_dirs.is_empty());
        assert!(!config.allow_private_urls);
        assert_eq!(config.max_download_bytes, 100 * 1024 * 1024);
        assert_eq!(config.max_sessions, 64);
    }

    #[tokio::test]
    async fn test_unknown_session_reference_fails() {
        let server = FormServer::new();
        let result = server
            .obtain_filler(&PdfSource::SessionRef {
                session_key: "missing".to_string(),
            })
            .await;
        assert!(matches!(
            result,
            Err(crate::error::Error::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_validate_path_access_outside_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let server = FormServer::with_config(ServerConfig {
            resource_dirs: vec![dir.path().display().to_string()],
            ..ServerConfig::default()
        });

        let result = server.validate_path_access("/etc/hosts");
        assert!(matches!(
            result,
            Err(crate::error::Error::PathAccessDenied { .. })
        ));

        let inside = dir.path().join("form.pdf");
        std::fs::write(&inside, b"%PDF-1.5").unwrap();
        assert!(server
            .validate_path_access(&inside.display().to_string())
            .is_ok());
    }
}
