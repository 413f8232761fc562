#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;

use anyhow::Result;

use super::Conversations;
use super::Dispatcher;
use crate::domain::models::Conversation;
use crate::domain::models::GenerationOptions;
use crate::domain::models::GenerationRequest;
use crate::domain::models::Message;
use crate::domain::models::ProviderName;

pub struct ChatService<'a> {
    dispatcher: &'a Dispatcher,
    conversations: &'a Conversations,
}

impl<'a> ChatService<'a> {
    pub fn new(dispatcher: &'a Dispatcher, conversations: &'a Conversations) -> ChatService<'a> {
        return ChatService {
            dispatcher,
            conversations,
        };
    }

    /// Runs one chat turn. A failed generation is recorded in the
    /// conversation as an assistant apology rather than returned as an error,
    /// so only storage failures surface here.
    pub async fn send(
        &self,
        conversation: &mut Conversation,
        text: &str,
        options: &GenerationOptions,
        provider: Option<ProviderName>,
    ) -> Result<Message> {
        let limit = self.conversations.message_limit();
        let prior = conversation.messages.clone();
        conversation.push(Message::user(text), limit);

        let request = GenerationRequest::chat(text, &prior)
            .with_options(options.clone())
            .with_provider(provider);

        let reply = match self.dispatcher.dispatch(&request).await {
            Ok(generation) => {
                conversation.model = format!("{}/{}", generation.provider, generation.model);
                Message::assistant(generation.content())
            }
            Err(err) => {
                tracing::error!(conversation = %conversation.id, error = %err, "Chat turn failed");
                Message::assistant(&format!("Sorry, I encountered an error: {err}"))
            }
        };

        conversation.push(reply.clone(), limit);
        self.conversations.save(conversation).await?;

        return Ok(reply);
    }
}
