//! Resolution of PDF input sources into raw bytes.
//!
//! Every resolver validates the `%PDF` header before handing bytes to the
//! parser. URL resolution guards against SSRF by resolving DNS first and
//! rejecting private or reserved addresses, and caps the download size while
//! streaming.

use crate::error::{Error, Result};
use base64::Engine;
use futures_util::StreamExt;
use std::net::IpAddr;
use std::path::Path;

/// Raw PDF bytes plus a human-readable name of where they came from.
pub struct ResolvedPdf {
    pub data: Vec<u8>,
    pub source_name: String,
}

fn ensure_pdf_header(data: &[u8], origin: &str) -> Result<()> {
    if data.len() < 4 || &data[0..4] != b"%PDF" {
        return Err(Error::InvalidPdf {
            reason: format!("{} is not a PDF (missing %PDF header)", origin),
        });
    }
    Ok(())
}

/// Read a PDF from the local filesystem.
pub fn resolve_path<P: AsRef<Path>>(path: P) -> Result<ResolvedPdf> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::PdfNotFound {
            path: path.display().to_string(),
        });
    }

    let data = std::fs::read(path).map_err(Error::Io)?;
    ensure_pdf_header(&data, "file content")?;

    Ok(ResolvedPdf {
        data,
        source_name: path.display().to_string(),
    })
}

/// Decode a base64-encoded PDF.
pub fn resolve_base64(base64_data: &str) -> Result<ResolvedPdf> {
    let data = base64::engine::general_purpose::STANDARD.decode(base64_data)?;
    ensure_pdf_header(&data, "decoded data")?;

    Ok(ResolvedPdf {
        data,
        source_name: "<base64>".to_string(),
    })
}

/// Private, reserved, or otherwise non-routable address.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local() // 169.254/16, cloud metadata lives here
                || v4.is_broadcast()
                || v4.is_unspecified()
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64) // CGNAT 100.64/10
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            v6.is_loopback()
                || v6.is_unspecified()
                || (segments[0] & 0xFE00) == 0xFC00 // fc00::/7 unique local
                || (segments[0] & 0xFFC0) == 0xFE80 // fe80::/10 link-local
        }
    }
}

/// Resolve the URL's host via DNS and reject it if any address is private.
async fn check_ssrf(url_str: &str) -> Result<()> {
    let parsed = url::Url::parse(url_str).map_err(|e| Error::SourceResolution {
        reason: format!("Invalid URL: {}", e),
    })?;
    let host = parsed.host_str().ok_or_else(|| Error::SourceResolution {
        reason: "URL has no host".to_string(),
    })?;
    let port = parsed.port_or_known_default().unwrap_or(443);

    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::SourceResolution {
            reason: format!("DNS resolution failed for {}: {}", host, e),
        })?;

    for addr in addrs {
        if is_private_ip(&addr.ip()) {
            return Err(Error::SsrfBlocked {
                url: url_str.to_string(),
            });
        }
    }
    Ok(())
}

/// Download a PDF over HTTP(S).
pub async fn resolve_url(
    url: &str,
    allow_private_urls: bool,
    max_download_bytes: u64,
) -> Result<ResolvedPdf> {
    if !allow_private_urls {
        check_ssrf(url).await?;
    }

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()
        .map_err(Error::HttpRequest)?;

    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(Error::SourceResolution {
            reason: format!("HTTP request failed with status: {}", response.status()),
        });
    }

    // Early rejection on a declared Content-Length; the streaming check below
    // still applies when the header lies or is absent.
    if let Some(content_length) = response.content_length() {
        if content_length > max_download_bytes {
            return Err(Error::DownloadTooLarge {
                size: content_length,
                max_size: max_download_bytes,
            });
        }
    }

    let mut data = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Error::HttpRequest)?;
        data.extend_from_slice(&chunk);
        if data.len() as u64 > max_download_bytes {
            return Err(Error::DownloadTooLarge {
                size: data.len() as u64,
                max_size: max_download_bytes,
            });
        }
    }

    ensure_pdf_header(&data, "downloaded data")?;

    Ok(ResolvedPdf {
        data,
        source_name: url.to_string(),
    })
}
