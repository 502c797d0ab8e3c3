//! File-reference validation for the ingestion path.

use crate::error::{PipelineError, Result};

/// Extensions accepted by the ingestion path.
const SUPPORTED_EXTENSIONS: [&str; 2] = ["jpeg", "png"];

/// Validate a file key by extension.
///
/// The extension is the substring after the final `.`, compared
/// case-insensitively against the supported list. A key without a `.`
/// has no extension at all; a key ending in `.` has an (empty, and thus
/// unsupported) extension. Returns the lowercased extension.
pub fn validate_image_key(key: &str) -> Result<String> {
    let ext = match key.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return Err(PipelineError::MissingExtension(key.to_string())),
    };

    if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(PipelineError::UnsupportedFileType(ext))
    }
}

/// Decode a raw object key: `+` becomes a space, percent-escapes are
/// decoded. Malformed escapes are passed through untouched.
pub fn decode_object_key(raw: &str) -> String {
    let plused = raw.replace('+', " ");
    let bytes = plused.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());

    let hex_val = |b: u8| (b as char).to_digit(16).map(|v| v as u8);

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                out.push(hi * 16 + lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
