use anyhow::Result;
use test_utils::temp_store;

use super::History;
use crate::domain::models::Conversation;
use crate::domain::models::Generation;
use crate::domain::models::HistoryKind;
use crate::domain::models::HistoryRecord;
use crate::domain::models::Message;
use crate::domain::models::ProviderName;
use crate::domain::services::Conversations;

fn record(prompt: &str) -> HistoryRecord {
    let generation = Generation::text(ProviderName::Gemini, "gemini-pro", "result");
    return HistoryRecord::new(prompt, &generation);
}

#[tokio::test]
async fn it_lists_nothing_for_a_fresh_store() -> Result<()> {
    let dir = temp_store();
    let history = History::new(dir.path().join("history"), 50);

    assert!(history.list(HistoryKind::Text).await?.is_empty());

    return Ok(());
}

#[tokio::test]
async fn it_stores_newest_first() -> Result<()> {
    let dir = temp_store();
    let history = History::new(dir.path().to_path_buf(), 50);

    history.push(HistoryKind::Text, record("first")).await?;
    history.push(HistoryKind::Text, record("second")).await?;

    let records = history.list(HistoryKind::Text).await?;
    let prompts = records
        .iter()
        .map(|e| return e.prompt.as_str())
        .collect::<Vec<&str>>();
    assert_eq!(prompts, vec!["second", "first"]);

    return Ok(());
}

#[tokio::test]
async fn it_never_exceeds_the_cap() -> Result<()> {
    let dir = temp_store();
    let history = History::new(dir.path().to_path_buf(), 3);

    for idx in 0..10 {
        history
            .push(HistoryKind::Code, record(&format!("prompt {idx}")))
            .await?;
        assert!(history.list(HistoryKind::Code).await?.len() <= 3);
    }

    let records = history.list(HistoryKind::Code).await?;
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].prompt, "prompt 9");
    assert_eq!(records[2].prompt, "prompt 7");

    return Ok(());
}

#[tokio::test]
async fn it_keeps_kinds_separate() -> Result<()> {
    let dir = temp_store();
    let history = History::new(dir.path().to_path_buf(), 50);

    history.push(HistoryKind::Text, record("text")).await?;
    history.push(HistoryKind::Image, record("image")).await?;

    assert_eq!(history.list(HistoryKind::Text).await?.len(), 1);
    assert_eq!(history.list(HistoryKind::Image).await?.len(), 1);
    assert!(history.list(HistoryKind::Code).await?.is_empty());

    return Ok(());
}

#[tokio::test]
async fn it_round_trips_records_losslessly() -> Result<()> {
    let dir = temp_store();
    let history = History::new(dir.path().to_path_buf(), 50);

    let original = record("with metadata")
        .with_metadata("language", "rust")
        .with_metadata("size", "1024x1024");
    history.push(HistoryKind::Code, original.clone()).await?;

    let reopened = History::new(dir.path().to_path_buf(), 50);
    let records = reopened.list(HistoryKind::Code).await?;
    assert_eq!(records, vec![original]);

    return Ok(());
}

#[tokio::test]
async fn it_deletes_by_index() -> Result<()> {
    let dir = temp_store();
    let history = History::new(dir.path().to_path_buf(), 50);

    history.push(HistoryKind::Text, record("first")).await?;
    history.push(HistoryKind::Text, record("second")).await?;

    let removed = history.delete(HistoryKind::Text, 1).await?;
    assert_eq!(removed.prompt, "first");

    let records = history.list(HistoryKind::Text).await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].prompt, "second");

    assert!(history.delete(HistoryKind::Text, 5).await.is_err());

    return Ok(());
}

#[tokio::test]
async fn it_clears_one_or_all_kinds() -> Result<()> {
    let dir = temp_store();
    let history = History::new(dir.path().to_path_buf(), 50);

    history.push(HistoryKind::Text, record("text")).await?;
    history.push(HistoryKind::Image, record("image")).await?;
    history.push(HistoryKind::Code, record("code")).await?;

    history.clear(HistoryKind::Text).await?;
    assert!(history.list(HistoryKind::Text).await?.is_empty());
    assert_eq!(history.list(HistoryKind::Image).await?.len(), 1);

    history.clear_all().await?;
    assert!(history.list(HistoryKind::Image).await?.is_empty());
    assert!(history.list(HistoryKind::Code).await?.is_empty());

    return Ok(());
}

#[tokio::test]
async fn it_exports_everything() -> Result<()> {
    let dir = temp_store();
    let history = History::new(dir.path().to_path_buf(), 50);
    let conversations = Conversations::new(dir.path().to_path_buf(), 20, 50);

    history.push(HistoryKind::Image, record("a red fox")).await?;

    let mut conversation = Conversation::new("abc-123");
    conversation.push(Message::user("Hello"), 50);
    conversations.save(&conversation).await?;

    let export = history.export(&conversations).await?;
    assert_eq!(export.meta.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(export.history[&HistoryKind::Image].len(), 1);
    assert!(export.history[&HistoryKind::Text].is_empty());
    assert_eq!(export.conversations.len(), 1);

    let payload = serde_json::to_value(&export)?;
    assert_eq!(payload["history"]["image"][0]["prompt"], "a red fox");
    assert_eq!(payload["conversations"][0]["title"], "Hello");

    return Ok(());
}
