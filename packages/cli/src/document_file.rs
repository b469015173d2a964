//! On-disk document: the persisted record and the hash it was saved at

use anyhow::{Context as _, Result};
use massing_document::{Document, DocumentConfig, DocumentRecord};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// User index of a document opened outside a sync session
const LOCAL_USER: u8 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFile {
    pub hash: u32,
    pub document: DocumentRecord,
}

impl DocumentFile {
    pub fn from_document(document: &Document) -> Self {
        Self {
            hash: document.hash(),
            document: document.to_record(),
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("{} is not a massing document", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("cannot write {}", path.display()))
    }

    /// Load into a live document, checking invariants
    pub fn open(&self, config: &DocumentConfig) -> Result<Document> {
        Ok(Document::from_record(&self.document, LOCAL_USER, config.clone(), self.hash)?)
    }
}
