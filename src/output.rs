//! Serializable views of the selection handed to observers and printed by
//! the CLI.

use crate::pipeline::pagecount::{PageCount, PageCountMethod};
use crate::pipeline::validate::FileKind;
use crate::quantity::total_page_count;
use crate::tracker::{FileId, FileStatus, SelectedFile};
use serde::{Deserialize, Serialize};

/// Per-file detail: everything about a selected file except its bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDetail {
    pub id: FileId,
    pub name: String,
    pub mime: String,
    pub kind: FileKind,
    /// Size in bytes.
    pub size: u64,
    pub page_count: u32,
    pub page_count_method: PageCountMethod,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_key: Option<String>,
    /// Display text of the last upload error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&SelectedFile> for FileDetail {
    fn from(f: &SelectedFile) -> Self {
        Self {
            id: f.id,
            name: f.name.clone(),
            mime: f.mime.clone(),
            kind: f.kind,
            size: f.size(),
            page_count: f.page_count,
            page_count_method: f.page_count_method,
            status: f.status,
            remote_key: f.remote_key.clone(),
            error: f.error.as_ref().map(ToString::to_string),
        }
    }
}

/// The whole selection at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionSnapshot {
    pub files: Vec<FileDetail>,
    pub total_page_count: u32,
}

impl SelectionSnapshot {
    pub fn from_files(files: &[SelectedFile]) -> Self {
        Self {
            files: files.iter().map(FileDetail::from).collect(),
            total_page_count: total_page_count(files),
        }
    }
}

/// Result of inspecting a single file without selecting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    pub name: String,
    pub mime: String,
    pub kind: FileKind,
    pub size: u64,
    pub page_count: PageCount,
}
