use log::info;
use thiserror::Error;

use crate::{
    LibraryContext, LibraryEvent, MessageData, NewMessage, PrimaryKey, Store, StoreError,
};

/// Carries direct messages between users.
pub struct Messaging<S> {
    context: LibraryContext<S>,
}

#[derive(Debug, Error)]
pub enum MessageError {
    /// Blank messages are not delivered
    #[error("Message content is empty")]
    EmptyMessage,
    /// Only the receiver may mark a message as read
    #[error("Caller is not the receiver of this message")]
    NotReceiver,
    /// Only the sender or receiver may delete a message
    #[error("Caller is not part of this conversation")]
    NotParticipant,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl<S> Messaging<S>
where
    S: Store,
{
    pub fn new(context: &LibraryContext<S>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Delivers a message between two existing users
    pub async fn send(&self, new_message: NewMessage) -> Result<MessageData, MessageError> {
        if new_message.content.trim().is_empty() {
            return Err(MessageError::EmptyMessage);
        }

        let store = &self.context.store;

        store.user_by_id(new_message.sender_id).await?;
        store.user_by_id(new_message.receiver_id).await?;

        let message = store.create_message(new_message).await?;

        info!(
            "Message {} sent from user {} to user {}",
            message.id, message.sender_id, message.receiver_id
        );
        self.context.emit(LibraryEvent::MessageSent {
            message: message.clone(),
        });

        Ok(message)
    }

    /// A user's received messages, newest first
    pub async fn inbox(&self, user_id: PrimaryKey) -> Result<Vec<MessageData>, MessageError> {
        let store = &self.context.store;

        store.user_by_id(user_id).await?;

        let mut messages = store.messages_by_receiver(user_id).await?;
        messages.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));

        Ok(messages)
    }

    /// A user's sent messages, newest first
    pub async fn outbox(&self, user_id: PrimaryKey) -> Result<Vec<MessageData>, MessageError> {
        let store = &self.context.store;

        store.user_by_id(user_id).await?;

        let mut messages = store.messages_by_sender(user_id).await?;
        messages.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));

        Ok(messages)
    }

    /// The unread slice of a user's inbox
    pub async fn unread(&self, user_id: PrimaryKey) -> Result<Vec<MessageData>, MessageError> {
        let inbox = self.inbox(user_id).await?;

        Ok(inbox.into_iter().filter(|m| !m.read).collect())
    }

    /// Marks a message as read on behalf of its receiver
    pub async fn mark_read(
        &self,
        message_id: PrimaryKey,
        caller_id: PrimaryKey,
    ) -> Result<MessageData, MessageError> {
        let store = &self.context.store;

        let message = store.message_by_id(message_id).await?;

        if message.receiver_id != caller_id {
            return Err(MessageError::NotReceiver);
        }

        Ok(store.mark_message_read(message_id).await?)
    }

    /// Deletes a message on behalf of either participant
    pub async fn delete(
        &self,
        message_id: PrimaryKey,
        caller_id: PrimaryKey,
    ) -> Result<(), MessageError> {
        let store = &self.context.store;

        let message = store.message_by_id(message_id).await?;

        if message.sender_id != caller_id && message.receiver_id != caller_id {
            return Err(MessageError::NotParticipant);
        }

        Ok(store.delete_message(message_id).await?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{MemoryStore, NewUser, UserRole};

    async fn seed_user(context: &LibraryContext<MemoryStore>, name: &str) -> PrimaryKey {
        context
            .store
            .create_user(NewUser {
                username: name.to_string(),
                email: format!("{name}@example.com"),
                password: "opaque".to_string(),
                role: UserRole::Reader,
            })
            .await
            .expect("user is created")
            .id
    }

    #[tokio::test]
    async fn test_send_and_read_flow() {
        let context = LibraryContext::mock();
        let messaging = Messaging::new(&context);

        let ada = seed_user(&context, "ada").await;
        let brian = seed_user(&context, "brian").await;

        let message = messaging
            .send(NewMessage {
                sender_id: ada,
                receiver_id: brian,
                content: "Have you read Dubliners yet?".to_string(),
            })
            .await
            .unwrap();

        assert!(!message.read);
        assert_eq!(messaging.inbox(brian).await.unwrap().len(), 1);
        assert_eq!(messaging.outbox(ada).await.unwrap().len(), 1);
        assert_eq!(messaging.unread(brian).await.unwrap().len(), 1);

        let read = messaging.mark_read(message.id, brian).await.unwrap();
        assert!(read.read);
        assert!(messaging.unread(brian).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_only_the_receiver_marks_read() {
        let context = LibraryContext::mock();
        let messaging = Messaging::new(&context);

        let ada = seed_user(&context, "ada").await;
        let brian = seed_user(&context, "brian").await;

        let message = messaging
            .send(NewMessage {
                sender_id: ada,
                receiver_id: brian,
                content: "ping".to_string(),
            })
            .await
            .unwrap();

        assert!(matches!(
            messaging.mark_read(message.id, ada).await,
            Err(MessageError::NotReceiver)
        ));
    }

    #[tokio::test]
    async fn test_only_participants_may_delete() {
        let context = LibraryContext::mock();
        let messaging = Messaging::new(&context);

        let ada = seed_user(&context, "ada").await;
        let brian = seed_user(&context, "brian").await;
        let carol = seed_user(&context, "carol").await;

        let message = messaging
            .send(NewMessage {
                sender_id: ada,
                receiver_id: brian,
                content: "ping".to_string(),
            })
            .await
            .unwrap();

        assert!(matches!(
            messaging.delete(message.id, carol).await,
            Err(MessageError::NotParticipant)
        ));

        messaging.delete(message.id, ada).await.unwrap();
        assert!(messaging.inbox(brian).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_messages_are_rejected() {
        let context = LibraryContext::mock();
        let messaging = Messaging::new(&context);

        let ada = seed_user(&context, "ada").await;
        let brian = seed_user(&context, "brian").await;

        let result = messaging
            .send(NewMessage {
                sender_id: ada,
                receiver_id: brian,
                content: "   ".to_string(),
            })
            .await;

        assert!(matches!(result, Err(MessageError::EmptyMessage)));
    }
}
