//! `data:<mime>;base64,<payload>` helpers for handing images to and from the
//! web layer.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::errors::{MatteError, Result};

pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

pub fn encode_png(bytes: &[u8]) -> String {
    encode("image/png", bytes)
}

/// Returns the MIME type and decoded payload of a base64 data URL.
pub fn decode(url: &str) -> Result<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:").ok_or_else(|| MatteError::DataUrl {
        reason: "missing `data:` scheme".to_string(),
    })?;
    let (header, payload) = rest.split_once(',').ok_or_else(|| MatteError::DataUrl {
        reason: "missing `,` separator".to_string(),
    })?;
    let mime = header.strip_suffix(";base64").ok_or_else(|| MatteError::DataUrl {
        reason: format!("`{header}` is not base64 encoded"),
    })?;
    Ok((mime.to_string(), STANDARD.decode(payload.trim())?))
}
