#[cfg(test)]
#[path = "conversations_test.rs"]
mod tests;

use std::path;

use anyhow::bail;
use anyhow::Result;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Conversation;

const FILE_NAME: &str = "conversations.json";

pub struct Conversations {
    pub dir: path::PathBuf,
    limit: usize,
    message_limit: usize,
}

impl Default for Conversations {
    fn default() -> Conversations {
        return Conversations::new(
            path::PathBuf::from(Config::get(ConfigKey::HistoryDir)),
            Config::get_usize(ConfigKey::ConversationLimit),
            Config::get_usize(ConfigKey::ConversationMessageLimit),
        );
    }
}

impl Conversations {
    pub fn new(dir: path::PathBuf, limit: usize, message_limit: usize) -> Conversations {
        return Conversations {
            dir,
            limit,
            message_limit,
        };
    }

    pub fn create_id() -> String {
        return Uuid::new_v4()
            .to_string()
            .split('-')
            .enumerate()
            .filter_map(|(idx, str)| {
                if idx > 1 {
                    return None;
                }
                return Some(str);
            })
            .collect::<Vec<&str>>()
            .join("-");
    }

    pub fn message_limit(&self) -> usize {
        return self.message_limit;
    }

    fn get_file_path(&self) -> path::PathBuf {
        return self.dir.join(FILE_NAME);
    }

    /// Most recently saved first.
    pub async fn list(&self) -> Result<Vec<Conversation>> {
        let file_path = self.get_file_path();
        if !file_path.exists() {
            return Ok(vec![]);
        }

        let payload = fs::read_to_string(file_path).await?;
        let conversations: Vec<Conversation> = serde_json::from_str(&payload)?;

        return Ok(conversations);
    }

    async fn write(&self, conversations: &[Conversation]) -> Result<()> {
        let payload = serde_json::to_string(conversations)?;

        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await?;
        }

        let mut file = fs::File::create(self.get_file_path()).await?;
        file.write_all(payload.as_bytes()).await?;

        return Ok(());
    }

    pub async fn load(&self, id: &str) -> Result<Conversation> {
        let conversations = self.list().await?;
        match conversations.into_iter().find(|e| return e.id == id) {
            Some(conversation) => return Ok(conversation),
            None => bail!(format!("No conversation found for id {id}")),
        }
    }

    pub async fn latest(&self) -> Result<Option<Conversation>> {
        return Ok(self.list().await?.into_iter().next());
    }

    /// Replaces any stored conversation with the same id and moves it to the
    /// front of the list.
    pub async fn save(&self, conversation: &Conversation) -> Result<()> {
        let mut conversation = conversation.clone();
        if conversation.messages.len() > self.message_limit {
            let overflow = conversation.messages.len() - self.message_limit;
            conversation.messages.drain(..overflow);
        }

        let mut conversations = self.list().await?;
        conversations.retain(|e| return e.id != conversation.id);
        conversations.insert(0, conversation);
        conversations.truncate(self.limit);

        return self.write(&conversations).await;
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut conversations = self.list().await?;
        let count = conversations.len();
        conversations.retain(|e| return e.id != id);
        if conversations.len() == count {
            return Ok(());
        }

        return self.write(&conversations).await;
    }

    pub async fn delete_all(&self) -> Result<()> {
        let file_path = self.get_file_path();
        if !file_path.exists() {
            return Ok(());
        }

        fs::remove_file(file_path).await?;
        return Ok(());
    }
}
