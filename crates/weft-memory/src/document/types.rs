use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::DocumentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Pdf,
    Docx,
    Txt,
    Md,
    Unknown,
}

impl FileType {
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "txt" | "text" => Self::Txt,
            "md" | "markdown" => Self::Md,
            _ => Self::Unknown,
        }
    }

    /// Detect from the extension of a path or file name.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map_or(Self::Unknown, Self::from_extension)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Txt => "txt",
            Self::Md => "md",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_extension(s))
    }
}

/// Ingestion lifecycle. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed | Self::Failed)
        )
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(DocumentError::InvalidStatus(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub checksum: String,
    pub file_type: FileType,
    pub status: ProcessingStatus,
    pub owner_id: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A fresh `pending` document with a random id.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        checksum: impl Into<String>,
        file_type: FileType,
        owner_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            checksum: checksum.into(),
            file_type,
            status: ProcessingStatus::Pending,
            owner_id: owner_id.into(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A contiguous span of a document, embedded and ready for retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub index: usize,
    pub content: String,
    pub token_count: usize,
    pub char_count: usize,
    pub embedding: Vec<f32>,
    pub checksum: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_from_path() {
        assert_eq!(FileType::from_path("a/b/Report.PDF"), FileType::Pdf);
        assert_eq!(FileType::from_path("notes.markdown"), FileType::Md);
        assert_eq!(FileType::from_path("data.csv"), FileType::Unknown);
        assert_eq!(FileType::from_path("no_extension"), FileType::Unknown);
    }

    #[test]
    fn status_transitions() {
        use ProcessingStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Failed));
        assert!(Completed.is_terminal() && Failed.is_terminal());
        assert!(!Processing.is_terminal());
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in ["pending", "processing", "completed", "failed"] {
            assert_eq!(s.parse::<ProcessingStatus>().unwrap().as_str(), s);
        }
        assert!("done".parse::<ProcessingStatus>().is_err());
    }

    #[test]
    fn new_document_is_pending() {
        let doc = Document::new("t", "c", "sum", FileType::Txt, "u1");
        assert_eq!(doc.status, ProcessingStatus::Pending);
        assert!(doc.error.is_none());
        assert_eq!(doc.created_at, doc.updated_at);
    }
}
