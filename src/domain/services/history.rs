#[cfg(test)]
#[path = "history_test.rs"]
mod tests;

use std::collections::BTreeMap;
use std::path;

use anyhow::bail;
use anyhow::Result;
use chrono::Utc;
use strum::IntoEnumIterator;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::Conversations;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Export;
use crate::domain::models::ExportMeta;
use crate::domain::models::HistoryKind;
use crate::domain::models::HistoryRecord;

/// Capped, most recent first, JSON lists of past generations. One file per
/// kind.
pub struct History {
    pub dir: path::PathBuf,
    limit: usize,
}

impl Default for History {
    fn default() -> History {
        return History::new(
            path::PathBuf::from(Config::get(ConfigKey::HistoryDir)),
            Config::get_usize(ConfigKey::HistoryLimit),
        );
    }
}

impl History {
    pub fn new(dir: path::PathBuf, limit: usize) -> History {
        return History { dir, limit };
    }

    fn get_file_path(&self, kind: HistoryKind) -> path::PathBuf {
        return self.dir.join(format!("{kind}.json"));
    }

    pub async fn list(&self, kind: HistoryKind) -> Result<Vec<HistoryRecord>> {
        let file_path = self.get_file_path(kind);
        if !file_path.exists() {
            return Ok(vec![]);
        }

        let payload = fs::read_to_string(file_path).await?;
        let records: Vec<HistoryRecord> = serde_json::from_str(&payload)?;

        return Ok(records);
    }

    async fn write(&self, kind: HistoryKind, records: &[HistoryRecord]) -> Result<()> {
        let payload = serde_json::to_string(records)?;

        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await?;
        }

        let mut file = fs::File::create(self.get_file_path(kind)).await?;
        file.write_all(payload.as_bytes()).await?;

        return Ok(());
    }

    /// Stores `record` as the newest entry, evicting the oldest ones beyond
    /// the cap.
    pub async fn push(&self, kind: HistoryKind, record: HistoryRecord) -> Result<()> {
        let mut records = self.list(kind).await?;
        records.insert(0, record);
        records.truncate(self.limit);

        return self.write(kind, &records).await;
    }

    pub async fn delete(&self, kind: HistoryKind, index: usize) -> Result<HistoryRecord> {
        let mut records = self.list(kind).await?;
        if index >= records.len() {
            bail!(format!(
                "No {kind} history entry at index {index}, there are {} entries",
                records.len()
            ));
        }

        let removed = records.remove(index);
        self.write(kind, &records).await?;

        return Ok(removed);
    }

    pub async fn clear(&self, kind: HistoryKind) -> Result<()> {
        let file_path = self.get_file_path(kind);
        if !file_path.exists() {
            return Ok(());
        }

        fs::remove_file(file_path).await?;
        return Ok(());
    }

    pub async fn clear_all(&self) -> Result<()> {
        for kind in HistoryKind::iter() {
            self.clear(kind).await?;
        }

        return Ok(());
    }

    pub async fn export(&self, conversations: &Conversations) -> Result<Export> {
        let mut history = BTreeMap::new();
        for kind in HistoryKind::iter() {
            history.insert(kind, self.list(kind).await?);
        }

        return Ok(Export {
            meta: ExportMeta {
                exported_at: Utc::now().to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            history,
            conversations: conversations.list().await?,
        });
    }
}
