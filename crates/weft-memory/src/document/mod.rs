mod clean;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod types;

pub use clean::{checksum, clean_text};
pub use error::DocumentError;
pub use loader::{IngestionLimits, LoadedFile, extract_text, load_file};
pub use pipeline::{ChunkStrategy, DocumentIngestionPipeline, IngestionOutcome};
pub use types::{Chunk, Document, FileType, ProcessingStatus};

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
