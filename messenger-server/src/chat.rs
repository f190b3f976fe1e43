use chrono::Utc;
use messenger_common::{Message, MessageId, UserId, UserPair};
use sled::transaction::{ConflictableTransactionResult, Transactional};
use sled::IVec;
use tracing::{debug, info};

use crate::connect::Connect;
use crate::error::{abort, AppError, Result};
use crate::store::{decode, encode, id_key, Store};

/// Direct messages between friends.
#[derive(Clone)]
pub struct Chat {
    store: Store,
    connect: Connect,
}

fn message_key(pair: UserPair, id: MessageId) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..16].copy_from_slice(&pair.to_key());
    key[16..].copy_from_slice(&id_key(id.0));
    key
}

impl Chat {
    pub fn new(store: Store, connect: Connect) -> Self {
        Self { store, connect }
    }

    pub fn authorize(&self, a: UserId, b: UserId) -> Result<bool> {
        self.connect.are_friends(a, b)
    }

    fn ensure_friends(&self, a: UserId, b: UserId) -> Result<()> {
        if self.authorize(a, b)? {
            Ok(())
        } else {
            Err(AppError::Forbidden("Not friends".into()))
        }
    }

    /// The whole conversation, earliest first, as it looked when read. The
    /// incoming messages in that snapshot are then marked read, and only those:
    /// a message that arrives meanwhile stays unread until a later view returns it.
    pub fn history(&self, viewer: UserId, friend: UserId) -> Result<Vec<Message>> {
        self.ensure_friends(viewer, friend)?;
        let entries = self.conversation(UserPair::new(viewer, friend))?;
        self.mark_read(viewer, friend, &entries)?;
        Ok(entries.into_iter().map(|(_, _, message)| message).collect())
    }

    /// Flips the read flag on every unread message `friend` sent to `viewer`.
    pub fn mark_incoming_read(&self, viewer: UserId, friend: UserId) -> Result<usize> {
        let entries = self.conversation(UserPair::new(viewer, friend))?;
        self.mark_read(viewer, friend, &entries)
    }

    fn mark_read(&self, viewer: UserId, friend: UserId, entries: &[(IVec, IVec, Message)]) -> Result<usize> {
        let mut marked = 0;
        for (key, bytes, message) in entries {
            if message.sender != friend || message.receiver != viewer || message.read {
                continue;
            }
            let updated = Message { read: true, ..message.clone() };
            // A lost swap means someone else already marked it; that is fine.
            if self
                .store
                .messages
                .compare_and_swap(key, Some(bytes), Some(encode(&updated)?))?
                .is_ok()
            {
                marked += 1;
            }
        }
        if marked > 0 {
            debug!(viewer = %viewer, friend = %friend, marked, "marked messages read");
        }
        Ok(marked)
    }

    /// Appends a message. The friendship is checked again in the same
    /// transaction as the insert, so nothing lands after a concurrent unfriend.
    pub fn send_message(&self, sender: UserId, receiver: UserId, content: &str) -> Result<Message> {
        self.ensure_friends(sender, receiver)?;
        if content.is_empty() {
            return Err(AppError::Validation("Message content is empty".into()));
        }
        let message = Message {
            id: MessageId(self.store.next_id()?),
            sender,
            receiver,
            content: content.to_string(),
            timestamp: Utc::now(),
            read: false,
        };
        let pair = UserPair::new(sender, receiver);
        let pair_key = pair.to_key();
        let key = message_key(pair, message.id);
        let record = encode(&message)?;
        (&self.store.friendships, &self.store.messages)
            .transaction(|(friendships, messages)| -> ConflictableTransactionResult<(), AppError> {
                if friendships.get(&pair_key[..])?.is_none() {
                    return Err(abort(AppError::Forbidden("Not friends".into())));
                }
                messages.insert(&key[..], record.clone())?;
                Ok(())
            })?;
        info!(sender = %sender, receiver = %receiver, message = message.id.0, "message sent");
        Ok(message)
    }

    /// Raw key and value alongside each decoded message, for compare-and-swap.
    fn conversation(&self, pair: UserPair) -> Result<Vec<(IVec, IVec, Message)>> {
        self.store
            .messages
            .scan_prefix(pair.to_key())
            .map(|entry| -> Result<(IVec, IVec, Message)> {
                let (key, bytes) = entry?;
                let message = decode(&bytes)?;
                Ok((key, bytes, message))
            })
            .collect()
    }
}
