pub mod non_api_structs;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header carrying the identity an upstream authentication layer resolved.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
pub struct Url(pub String);

impl Url {
    pub fn join(&self, path: impl AsRef<str>) -> String {
        self.0.trim_end_matches('/').to_string() + path.as_ref()
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Debug, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct UserId(pub u64);

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Debug, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct RequestId(pub u64);

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Debug, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unordered pair of users. The lower id is always stored first, so `(a, b)`
/// and `(b, a)` build the same value.
#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug)]
pub struct UserPair {
    low: UserId,
    high: UserId,
}

impl UserPair {
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }
    /// The member that is not `user`.
    pub fn other(&self, user: UserId) -> Option<UserId> {
        if self.low == user {
            Some(self.high)
        } else if self.high == user {
            Some(self.low)
        } else {
            None
        }
    }
    pub fn to_key(&self) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&self.low.0.to_be_bytes());
        key[8..].copy_from_slice(&self.high.0.to_be_bytes());
        key
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct FriendRequest {
    pub id: RequestId,
    pub from: UserId,
    pub to: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct Friendship {
    pub user1: UserId,
    pub user2: UserId,
    pub created_at: DateTime<Utc>,
}

impl Friendship {
    pub fn pair(&self) -> UserPair {
        UserPair::new(self.user1, self.user2)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender: UserId,
    pub receiver: UserId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

/// A pending request seen from one side: its id and the user on the other end.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct PendingRequest {
    pub id: RequestId,
    pub user: User,
}

/// Every other user, classified relative to one user.
#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct Partition {
    pub available: Vec<User>,
    pub sent: Vec<PendingRequest>,
    pub received: Vec<PendingRequest>,
    pub friends: Vec<User>,
}

impl Partition {
    pub fn is_friend(&self, user: UserId) -> bool {
        self.friends.iter().any(|u| u.id == user)
    }
    pub fn is_available(&self, user: UserId) -> bool {
        self.available.iter().any(|u| u.id == user)
    }
    pub fn sent_to(&self, user: UserId) -> Option<&PendingRequest> {
        self.sent.iter().find(|r| r.user.id == user)
    }
    pub fn received_from(&self, user: UserId) -> Option<&PendingRequest> {
        self.received.iter().find(|r| r.user.id == user)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Info,
}

/// What an action route reports back instead of a flash message.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct SignupForm {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct NewMessage {
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct ChatView {
    pub friend: User,
    pub messages: Vec<Message>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct PolledMessage {
    pub id: MessageId,
    pub content: String,
    pub sender_id: UserId,
    pub timestamp: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct PolledMessages {
    pub messages: Vec<PolledMessage>,
    pub current_user_id: UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_ignores_order() {
        let a = UserId(7);
        let b = UserId(3);
        assert_eq!(UserPair::new(a, b), UserPair::new(b, a));
        assert_eq!(UserPair::new(a, b).to_key(), UserPair::new(b, a).to_key());
        assert_eq!(UserPair::new(a, b).other(a), Some(b));
        assert_eq!(UserPair::new(a, b).other(UserId(9)), None);
    }

    #[test]
    fn pair_keys_sort_by_low_member() {
        let first = UserPair::new(UserId(2), UserId(1)).to_key();
        let second = UserPair::new(UserId(1), UserId(3)).to_key();
        assert!(first < second);
    }
}
