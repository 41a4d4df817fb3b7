use serde::Serialize;

use super::repo_types::Label;

/// Tag or ingredient as returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelOut {
    pub id: i64,
    pub name: String,
}

impl From<Label> for LabelOut {
    fn from(l: Label) -> Self {
        Self {
            id: l.id,
            name: l.name,
        }
    }
}
