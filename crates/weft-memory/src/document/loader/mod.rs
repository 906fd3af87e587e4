mod docx;
#[cfg(feature = "pdf")]
mod pdf;
mod text;

use std::path::Path;

pub use docx::extract_docx;
#[cfg(feature = "pdf")]
pub use pdf::extract_pdf;
pub use text::decode_text;

use super::{DEFAULT_MAX_FILE_SIZE, DocumentError, FileType};

/// Size and extension gate applied before any extraction work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionLimits {
    pub max_file_size: u64,
    pub allowed_extensions: Vec<String>,
}

impl Default for IngestionLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: ["pdf", "docx", "txt", "md"].map(String::from).to_vec(),
        }
    }
}

impl IngestionLimits {
    /// Validate a file name and size, returning its detected type.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::UnsupportedFormat`] for extensions outside the whitelist and
    /// [`DocumentError::FileTooLarge`] above the size limit.
    pub fn validate(&self, name: &str, size: u64) -> Result<FileType, DocumentError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !self.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
            return Err(DocumentError::UnsupportedFormat(if ext.is_empty() {
                name.to_owned()
            } else {
                ext
            }));
        }
        if size > self.max_file_size {
            return Err(DocumentError::FileTooLarge {
                size,
                limit: self.max_file_size,
            });
        }
        match FileType::from_extension(&ext) {
            FileType::Unknown => Err(DocumentError::UnsupportedFormat(ext)),
            file_type => Ok(file_type),
        }
    }
}

/// Raw text of a file on disk, before cleaning.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub title: String,
    pub file_type: FileType,
    pub text: String,
}

/// Extract raw text from file bytes by format.
///
/// # Errors
///
/// Returns [`DocumentError::UnsupportedFormat`] for unknown types (and PDF when the `pdf`
/// feature is disabled), or an extraction error for malformed input.
pub fn extract_text(file_type: FileType, bytes: &[u8]) -> Result<String, DocumentError> {
    match file_type {
        FileType::Txt | FileType::Md => Ok(decode_text(bytes)),
        FileType::Docx => extract_docx(bytes),
        #[cfg(feature = "pdf")]
        FileType::Pdf => extract_pdf(bytes),
        #[cfg(not(feature = "pdf"))]
        FileType::Pdf => Err(DocumentError::UnsupportedFormat(
            "pdf (built without the `pdf` feature)".into(),
        )),
        FileType::Unknown => Err(DocumentError::UnsupportedFormat("unknown".into())),
    }
}

/// Validate and read a file, extracting its text off the async runtime.
///
/// # Errors
///
/// Returns a validation error before reading, an IO error if the file cannot be read, or an
/// extraction error.
pub async fn load_file(path: &Path, limits: &IngestionLimits) -> Result<LoadedFile, DocumentError> {
    let meta = tokio::fs::metadata(path).await?;
    let title = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_owned();
    let file_type = limits.validate(&title, meta.len())?;
    let bytes = tokio::fs::read(path).await?;
    let text = tokio::task::spawn_blocking(move || extract_text(file_type, &bytes))
        .await
        .map_err(|e| DocumentError::Io(std::io::Error::other(e)))??;
    Ok(LoadedFile {
        title,
        file_type,
        text,
    })
}
