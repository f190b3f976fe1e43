use std::collections::{HashMap, HashSet};

use chrono::Utc;
use messenger_common::{FriendRequest, Friendship, Partition, PendingRequest, RequestId, UserId, UserPair};
use sled::transaction::{ConflictableTransactionResult, Transactional, TransactionalTree};
use sled::IVec;
use tracing::{info, warn};

use crate::error::{abort, AppError, Result};
use crate::store::{decode, encode, id_key, ordered_pair_key, Store};
use crate::users::Users;

/// Result of asking to befriend someone. Only `Sent` wrote anything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(FriendRequest),
    /// The same request was already pending; it is left untouched.
    AlreadyPending(FriendRequest),
    /// The target already asked the sender; that request should be answered instead.
    IncomingPending(FriendRequest),
    AlreadyFriends,
    SelfRequest,
}

/// Friend requests and friendships.
///
/// A pair of users is in at most one of: pending request (either direction),
/// friendship. Every transition that touches more than one record runs in a
/// single `sled` transaction, so racing accept/reject calls on one request see
/// exactly one winner and the loser gets `NotFound`.
#[derive(Clone)]
pub struct Connect {
    store: Store,
    users: Users,
}

fn request_not_found(id: RequestId) -> AppError {
    AppError::NotFound(format!("No pending friend request {id}"))
}

fn load_request(requests: &TransactionalTree, key: &[u8], id: RequestId) -> ConflictableTransactionResult<FriendRequest, AppError> {
    let bytes = requests.get(key)?.ok_or_else(|| abort(request_not_found(id)))?;
    decode(&bytes).map_err(abort)
}

fn request_id(bytes: &IVec) -> RequestId {
    RequestId(crate::store::id_from_key(bytes).unwrap_or_default())
}

impl Connect {
    pub fn new(store: Store, users: Users) -> Self {
        Self { store, users }
    }

    pub fn friendship(&self, a: UserId, b: UserId) -> Result<Option<Friendship>> {
        match self.store.friendships.get(UserPair::new(a, b).to_key())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn are_friends(&self, a: UserId, b: UserId) -> Result<bool> {
        Ok(self.store.friendships.contains_key(UserPair::new(a, b).to_key())?)
    }

    pub fn request(&self, id: RequestId) -> Result<Option<FriendRequest>> {
        match self.store.requests.get(id_key(id.0))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Sorts every other user into exactly one bucket, in user id order.
    pub fn list_partition(&self, user: UserId) -> Result<Partition> {
        let mut friend_ids = HashSet::new();
        for bytes in self.store.friendships.iter().values() {
            let friendship: Friendship = decode(&bytes?)?;
            if let Some(other) = friendship.pair().other(user) {
                friend_ids.insert(other);
            }
        }

        let mut sent = HashMap::new();
        let mut received = HashMap::new();
        for bytes in self.store.requests.iter().values() {
            let request: FriendRequest = decode(&bytes?)?;
            if request.from == user {
                sent.insert(request.to, request.id);
            } else if request.to == user {
                received.insert(request.from, request.id);
            }
        }

        let mut partition = Partition::default();
        for other in self.users.list()? {
            if other.id == user {
                continue;
            }
            if friend_ids.contains(&other.id) {
                partition.friends.push(other);
            } else if let Some(&id) = sent.get(&other.id) {
                partition.sent.push(PendingRequest { id, user: other });
            } else if let Some(&id) = received.get(&other.id) {
                partition.received.push(PendingRequest { id, user: other });
            } else {
                partition.available.push(other);
            }
        }
        Ok(partition)
    }

    /// Get-or-create a pending request from `from` to `to`.
    pub fn send_request(&self, from: UserId, to: UserId) -> Result<SendOutcome> {
        let target = self.users.get(to)?;
        if from == to {
            return Ok(SendOutcome::SelfRequest);
        }

        let candidate = FriendRequest {
            id: RequestId(self.store.next_id()?),
            from,
            to,
            created_at: Utc::now(),
        };
        let record = encode(&candidate)?;
        let forward = ordered_pair_key(from.0, to.0);
        let reverse = ordered_pair_key(to.0, from.0);
        let pair = UserPair::new(from, to).to_key();

        let outcome = (&self.store.requests, &self.store.request_pairs, &self.store.friendships)
            .transaction(|(requests, pairs, friendships)| -> ConflictableTransactionResult<SendOutcome, AppError> {
                if friendships.get(&pair[..])?.is_some() {
                    return Ok(SendOutcome::AlreadyFriends);
                }
                if let Some(existing) = pairs.get(&forward[..])? {
                    let request = load_request(requests, &existing, request_id(&existing))?;
                    return Ok(SendOutcome::AlreadyPending(request));
                }
                if let Some(existing) = pairs.get(&reverse[..])? {
                    let request = load_request(requests, &existing, request_id(&existing))?;
                    return Ok(SendOutcome::IncomingPending(request));
                }
                let key = id_key(candidate.id.0);
                pairs.insert(&forward[..], key.to_vec())?;
                requests.insert(&key[..], record.clone())?;
                Ok(SendOutcome::Sent(candidate.clone()))
            })?;

        match &outcome {
            SendOutcome::Sent(request) => {
                info!(from = %from, to = %to, request = %request.id, username = %target.username, "friend request sent")
            }
            other => info!(from = %from, to = %to, ?other, "friend request not created"),
        }
        Ok(outcome)
    }

    /// Turns a request addressed to `acting` into a friendship, deleting the
    /// request (and any request in the other direction) in the same transaction.
    pub fn accept_request(&self, id: RequestId, acting: UserId) -> Result<(FriendRequest, Friendship)> {
        let key = id_key(id.0);
        let (request, friendship) = (&self.store.requests, &self.store.request_pairs, &self.store.friendships)
            .transaction(|(requests, pairs, friendships)| -> ConflictableTransactionResult<(FriendRequest, Friendship), AppError> {
                let request = load_request(requests, &key, id)?;
                if request.to != acting {
                    return Err(abort(request_not_found(id)));
                }
                requests.remove(&key[..])?;
                pairs.remove(&ordered_pair_key(request.from.0, request.to.0)[..])?;
                if let Some(reverse) = pairs.remove(&ordered_pair_key(request.to.0, request.from.0)[..])? {
                    requests.remove(reverse)?;
                }

                let pair = UserPair::new(request.from, request.to).to_key();
                let friendship = match friendships.get(&pair[..])? {
                    Some(bytes) => decode(&bytes).map_err(abort)?,
                    None => {
                        let friendship = Friendship {
                            user1: request.from,
                            user2: request.to,
                            created_at: Utc::now(),
                        };
                        friendships.insert(&pair[..], encode(&friendship).map_err(abort)?)?;
                        friendship
                    }
                };
                Ok((request, friendship))
            })
            .map_err(|err| {
                let err = AppError::from(err);
                warn!(request = %id, user = %acting, error = %err, "accept failed");
                err
            })?;

        info!(request = %id, user1 = %friendship.user1, user2 = %friendship.user2, "friend request accepted");
        Ok((request, friendship))
    }

    /// Deletes a request addressed to `acting`. Nothing else changes.
    pub fn reject_request(&self, id: RequestId, acting: UserId) -> Result<FriendRequest> {
        let key = id_key(id.0);
        let request = (&self.store.requests, &self.store.request_pairs)
            .transaction(|(requests, pairs)| -> ConflictableTransactionResult<FriendRequest, AppError> {
                let request = load_request(requests, &key, id)?;
                if request.to != acting {
                    return Err(abort(request_not_found(id)));
                }
                requests.remove(&key[..])?;
                pairs.remove(&ordered_pair_key(request.from.0, request.to.0)[..])?;
                Ok(request)
            })
            .map_err(|err| {
                let err = AppError::from(err);
                warn!(request = %id, user = %acting, error = %err, "reject failed");
                err
            })?;

        info!(request = %id, from = %request.from, to = %request.to, "friend request rejected");
        Ok(request)
    }

    /// Ends a friendship. Conversation history is kept but can no longer be read.
    pub fn unfriend(&self, acting: UserId, friend: UserId) -> Result<Friendship> {
        let bytes = self
            .store
            .friendships
            .remove(UserPair::new(acting, friend).to_key())?
            .ok_or_else(|| AppError::NotFound("Not friends".into()))?;
        info!(user = %acting, friend = %friend, "unfriended");
        Ok(decode(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::tests::signup;
    use messenger_common::User;

    struct Fixture {
        connect: Connect,
        a: User,
        b: User,
        c: User,
    }

    fn fixture() -> Fixture {
        let store = Store::temporary().unwrap();
        let users = Users::new(store.clone(), 4);
        let a = users.register(&signup("a")).unwrap();
        let b = users.register(&signup("b")).unwrap();
        let c = users.register(&signup("c")).unwrap();
        Fixture { connect: Connect::new(store, users), a, b, c }
    }

    fn sent(outcome: SendOutcome) -> FriendRequest {
        match outcome {
            SendOutcome::Sent(request) => request,
            other => panic!("expected a new request, got {other:?}"),
        }
    }

    fn assert_disjoint_and_complete(partition: &Partition, all: &[&User], me: UserId) {
        let mut seen: Vec<UserId> = partition
            .available
            .iter()
            .chain(partition.friends.iter())
            .map(|u| u.id)
            .chain(partition.sent.iter().chain(partition.received.iter()).map(|r| r.user.id))
            .collect();
        seen.sort();
        let mut expected: Vec<UserId> = all.iter().map(|u| u.id).filter(|id| *id != me).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn fresh_users_are_all_available() {
        let f = fixture();
        let partition = f.connect.list_partition(f.a.id).unwrap();
        assert_eq!(partition.available, vec![f.b.clone(), f.c.clone()]);
        assert!(partition.sent.is_empty() && partition.received.is_empty() && partition.friends.is_empty());
    }

    #[test]
    fn sending_twice_keeps_one_request() {
        let f = fixture();
        let first = sent(f.connect.send_request(f.a.id, f.b.id).unwrap());
        let second = f.connect.send_request(f.a.id, f.b.id).unwrap();
        assert_eq!(second, SendOutcome::AlreadyPending(first.clone()));
        assert_eq!(f.connect.store.requests.len(), 1);
        assert_eq!(f.connect.request(first.id).unwrap(), Some(first));
    }

    #[test]
    fn self_request_creates_nothing() {
        let f = fixture();
        assert_eq!(f.connect.send_request(f.a.id, f.a.id).unwrap(), SendOutcome::SelfRequest);
        assert!(f.connect.store.requests.is_empty());
    }

    #[test]
    fn request_to_unknown_user_is_not_found() {
        let f = fixture();
        let err = f.connect.send_request(f.a.id, UserId(10_000)).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn pending_request_shows_on_both_sides() {
        let f = fixture();
        let request = sent(f.connect.send_request(f.a.id, f.b.id).unwrap());

        let mine = f.connect.list_partition(f.a.id).unwrap();
        assert_eq!(mine.sent_to(f.b.id).map(|r| r.id), Some(request.id));
        assert!(!mine.is_available(f.b.id));
        assert_disjoint_and_complete(&mine, &[&f.a, &f.b, &f.c], f.a.id);

        let theirs = f.connect.list_partition(f.b.id).unwrap();
        assert_eq!(theirs.received_from(f.a.id).map(|r| r.id), Some(request.id));
        assert_disjoint_and_complete(&theirs, &[&f.a, &f.b, &f.c], f.b.id);
    }

    #[test]
    fn accept_creates_friendship_and_removes_request() {
        let f = fixture();
        let request = sent(f.connect.send_request(f.a.id, f.b.id).unwrap());
        let (accepted, friendship) = f.connect.accept_request(request.id, f.b.id).unwrap();
        assert_eq!(accepted, request);
        assert_eq!(friendship.pair(), UserPair::new(f.a.id, f.b.id));

        assert_eq!(f.connect.request(request.id).unwrap(), None);
        assert!(f.connect.are_friends(f.a.id, f.b.id).unwrap());
        assert!(f.connect.are_friends(f.b.id, f.a.id).unwrap());
        assert_eq!(f.connect.friendship(f.b.id, f.a.id).unwrap(), Some(friendship));
        assert_eq!(f.connect.store.friendships.len(), 1);

        let partition = f.connect.list_partition(f.a.id).unwrap();
        assert!(partition.is_friend(f.b.id));
        assert!(partition.sent_to(f.b.id).is_none());
        assert_disjoint_and_complete(&partition, &[&f.a, &f.b, &f.c], f.a.id);
    }

    #[test]
    fn only_the_addressee_can_answer() {
        let f = fixture();
        let request = sent(f.connect.send_request(f.a.id, f.b.id).unwrap());
        assert!(matches!(f.connect.accept_request(request.id, f.a.id), Err(AppError::NotFound(_))));
        assert!(matches!(f.connect.reject_request(request.id, f.c.id), Err(AppError::NotFound(_))));
        assert!(f.connect.request(request.id).unwrap().is_some());
    }

    #[test]
    fn resolved_requests_are_not_found() {
        let f = fixture();
        let request = sent(f.connect.send_request(f.a.id, f.b.id).unwrap());
        f.connect.accept_request(request.id, f.b.id).unwrap();
        assert!(matches!(f.connect.accept_request(request.id, f.b.id), Err(AppError::NotFound(_))));
        assert!(matches!(f.connect.reject_request(request.id, f.b.id), Err(AppError::NotFound(_))));

        let other = sent(f.connect.send_request(f.c.id, f.b.id).unwrap());
        f.connect.reject_request(other.id, f.b.id).unwrap();
        assert!(matches!(f.connect.reject_request(other.id, f.b.id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn reject_returns_sender_to_available() {
        let f = fixture();
        let request = sent(f.connect.send_request(f.a.id, f.b.id).unwrap());
        f.connect.reject_request(request.id, f.b.id).unwrap();

        assert!(!f.connect.are_friends(f.a.id, f.b.id).unwrap());
        assert!(f.connect.store.requests.is_empty());
        assert!(f.connect.store.request_pairs.is_empty());
        assert!(f.connect.list_partition(f.a.id).unwrap().is_available(f.b.id));
        assert!(f.connect.list_partition(f.b.id).unwrap().is_available(f.a.id));

        // No cooldown: asking again right away works.
        sent(f.connect.send_request(f.a.id, f.b.id).unwrap());
    }

    #[test]
    fn request_between_friends_is_a_no_op() {
        let f = fixture();
        let request = sent(f.connect.send_request(f.a.id, f.b.id).unwrap());
        f.connect.accept_request(request.id, f.b.id).unwrap();
        assert_eq!(f.connect.send_request(f.b.id, f.a.id).unwrap(), SendOutcome::AlreadyFriends);
        assert!(f.connect.store.requests.is_empty());
    }

    #[test]
    fn crossing_request_points_at_the_incoming_one() {
        let f = fixture();
        let request = sent(f.connect.send_request(f.a.id, f.b.id).unwrap());
        assert_eq!(
            f.connect.send_request(f.b.id, f.a.id).unwrap(),
            SendOutcome::IncomingPending(request)
        );
        assert_eq!(f.connect.store.requests.len(), 1);
    }

    #[test]
    fn unfriend_is_terminal_and_reversible_by_new_request() {
        let f = fixture();
        let request = sent(f.connect.send_request(f.a.id, f.b.id).unwrap());
        f.connect.accept_request(request.id, f.b.id).unwrap();

        f.connect.unfriend(f.b.id, f.a.id).unwrap();
        assert!(!f.connect.are_friends(f.a.id, f.b.id).unwrap());
        assert!(matches!(f.connect.unfriend(f.a.id, f.b.id), Err(AppError::NotFound(_))));
        assert!(f.connect.list_partition(f.a.id).unwrap().is_available(f.b.id));
        sent(f.connect.send_request(f.b.id, f.a.id).unwrap());
    }

    #[test]
    fn racing_accept_and_reject_have_one_winner() {
        let f = fixture();
        let request = sent(f.connect.send_request(f.a.id, f.b.id).unwrap());
        let (accept, reject) = std::thread::scope(|s| {
            let accept = s.spawn(|| f.connect.accept_request(request.id, f.b.id).is_ok());
            let reject = s.spawn(|| f.connect.reject_request(request.id, f.b.id).is_ok());
            (accept.join().unwrap(), reject.join().unwrap())
        });
        assert!(accept ^ reject);
        assert_eq!(f.connect.are_friends(f.a.id, f.b.id).unwrap(), accept);
        assert!(f.connect.store.requests.is_empty());
    }

    #[test]
    fn racing_sends_create_one_request() {
        let f = fixture();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| f.connect.send_request(f.a.id, f.b.id).unwrap());
            }
        });
        assert_eq!(f.connect.store.requests.len(), 1);
        assert_eq!(f.connect.store.request_pairs.len(), 1);
    }
}
