use crate::document::DocumentError;

/// # Errors
///
/// Returns [`DocumentError::Extraction`] if the PDF cannot be parsed.
pub fn extract_pdf(bytes: &[u8]) -> Result<String, DocumentError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| DocumentError::Extraction {
        format: "pdf",
        reason: e.to_string(),
    })
}
