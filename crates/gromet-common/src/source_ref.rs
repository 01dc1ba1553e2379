use serde::{Deserialize, Serialize};

/// Source-location reference carried by every CAST node.
///
/// Rows and columns are 1-based positions in the original source file, as
/// reported by whichever front-end produced the CAST tree. The pipeline never
/// reads the source text itself; these references flow through unchanged into
/// graph metadata so downstream consumers can point back at the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub row_start: u32,
    pub row_end: u32,
    pub col_start: u32,
    pub col_end: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file_name: Option<String>,
}

impl SourceRef {
    /// Create a reference with no file name.
    pub fn new(row_start: u32, row_end: u32, col_start: u32, col_end: u32) -> Self {
        Self {
            row_start,
            row_end,
            col_start,
            col_end,
            source_file_name: None,
        }
    }

    /// Merge two references into one that covers both.
    pub fn merge(&self, other: &SourceRef) -> SourceRef {
        SourceRef {
            row_start: self.row_start.min(other.row_start),
            row_end: self.row_end.max(other.row_end),
            col_start: self.col_start.min(other.col_start),
            col_end: self.col_end.max(other.col_end),
            source_file_name: self
                .source_file_name
                .clone()
                .or_else(|| other.source_file_name.clone()),
        }
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source_file_name {
            Some(name) => write!(f, "{}:{}:{}", name, self.row_start, self.col_start),
            None => write!(f, "{}:{}", self.row_start, self.col_start),
        }
    }
}
