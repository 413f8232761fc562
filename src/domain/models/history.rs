use std::collections::BTreeMap;

use chrono::Utc;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use strum::EnumIter;
use strum::EnumString;
use strum::EnumVariantNames;

use super::Capability;
use super::Conversation;
use super::Generation;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    EnumVariantNames,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HistoryKind {
    Text,
    Image,
    Code,
}

impl From<Capability> for HistoryKind {
    fn from(capability: Capability) -> HistoryKind {
        match capability {
            Capability::Text => return HistoryKind::Text,
            Capability::Image => return HistoryKind::Image,
            Capability::Code => return HistoryKind::Code,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub prompt: String,
    pub result: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub timestamp: String,
}

impl HistoryRecord {
    pub fn new(prompt: &str, generation: &Generation) -> HistoryRecord {
        return HistoryRecord {
            prompt: prompt.to_string(),
            result: generation.content().to_string(),
            provider: generation.provider.to_string(),
            model: generation.model.to_string(),
            metadata: BTreeMap::new(),
            timestamp: Utc::now().to_rfc3339(),
        };
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> HistoryRecord {
        self.metadata.insert(key.to_string(), value.to_string());
        return self;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMeta {
    pub exported_at: String,
    pub version: String,
}

/// Everything stored on disk, bundled into a single document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    pub meta: ExportMeta,
    pub history: BTreeMap<HistoryKind, Vec<HistoryRecord>>,
    pub conversations: Vec<Conversation>,
}
