use serde::{Deserialize, Serialize};
use crate::User;

/// Directory record as persisted. The credential hash never leaves the server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredUser {
    pub user: User,
    pub credential_hash: String,
}
