const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decode plain text as UTF-8, falling back to Latin-1 for legacy encodings.
#[must_use]
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => {
            tracing::debug!("input is not valid UTF-8, decoding as Latin-1");
            bytes.iter().map(|&b| char::from(b)).collect()
        }
    }
}
