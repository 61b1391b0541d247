//! Shared-catalog data types.

use serde::{Deserialize, Serialize};

/// One entry of a user's shared catalog.
///
/// Clients serialize these with Go-style capitalized field names, so the
/// wire form is `{"Name": ..., "Size": ..., "IsDir": ...}`. Directories are
/// catalog-visible but excluded from search, top-N, and transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFile {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "IsDir")]
    pub is_dir: bool,
}

/// A search or top-N hit: a file plus the nickname advertising it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub file_name: String,
    pub size: u64,
    pub peer: String,
}
