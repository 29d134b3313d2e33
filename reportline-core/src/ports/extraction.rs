//! Extraction source port
//!
//! Upstream extractors (PDF and email parsing live outside this crate) hand
//! over daily figures as `ExtractionBatch` values. A source yields them.

use crate::domain::result::Result;
use crate::domain::ExtractionBatch;

/// A provider of extraction batches
pub trait ExtractionSource: Send + Sync {
    /// Source name for logs (e.g. a file path)
    fn name(&self) -> &str;

    /// Every batch the source currently holds, in a stable order
    fn fetch(&self) -> Result<Vec<ExtractionBatch>>;
}
