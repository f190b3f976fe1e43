use messenger_common::non_api_structs::StoredUser;
use messenger_common::{SignupForm, User, UserId};
use sled::transaction::{ConflictableTransactionResult, Transactional};
use tracing::{info, warn};

use crate::error::{abort, AppError, Result};
use crate::store::{decode, encode, id_from_key, id_key, Store};

/// The user directory: identity records and credential checks.
#[derive(Clone)]
pub struct Users {
    store: Store,
    bcrypt_cost: u32,
}

impl Users {
    pub fn new(store: Store, bcrypt_cost: u32) -> Self {
        Self { store, bcrypt_cost }
    }

    pub fn register(&self, form: &SignupForm) -> Result<User> {
        for (field, value) in [
            ("username", &form.username),
            ("name", &form.name),
            ("email", &form.email),
            ("password", &form.password1),
        ] {
            if value.is_empty() {
                return Err(AppError::Validation(format!("Missing {field}")));
            }
        }
        if form.password1 != form.password2 {
            return Err(AppError::Validation("Passwords do not match".into()));
        }

        let credential_hash = bcrypt::hash(&form.password1, self.bcrypt_cost).map_err(anyhow::Error::from)?;
        let user = User {
            id: UserId(self.store.next_id()?),
            username: form.username.clone(),
            email: form.email.clone(),
            name: form.name.clone(),
        };
        let record = encode(&StoredUser { user: user.clone(), credential_hash })?;
        let key = id_key(user.id.0);

        (&self.store.users, &self.store.usernames, &self.store.emails)
            .transaction(|(users, usernames, emails)| -> ConflictableTransactionResult<(), AppError> {
                if usernames.get(user.username.as_bytes())?.is_some() {
                    return Err(abort(AppError::Conflict("Username already exists".into())));
                }
                if emails.get(user.email.as_bytes())?.is_some() {
                    return Err(abort(AppError::Conflict("Email already exists".into())));
                }
                usernames.insert(user.username.as_bytes(), key.to_vec())?;
                emails.insert(user.email.as_bytes(), key.to_vec())?;
                users.insert(&key[..], record.clone())?;
                Ok(())
            })?;

        info!(user = %user.id, username = %user.username, "registered user");
        Ok(user)
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let invalid = || AppError::Unauthorized("Invalid Username or Password".into());
        let id = self
            .store
            .usernames
            .get(username.as_bytes())?
            .and_then(|key| id_from_key(&key))
            .ok_or_else(invalid)?;
        let record = self.stored(UserId(id))?;
        if !bcrypt::verify(password, &record.credential_hash).map_err(anyhow::Error::from)? {
            warn!(username, "rejected login");
            return Err(invalid());
        }
        Ok(record.user)
    }

    pub fn get(&self, id: UserId) -> Result<User> {
        Ok(self.stored(id)?.user)
    }

    pub fn find(&self, id: UserId) -> Result<Option<User>> {
        match self.store.users.get(id_key(id.0))? {
            Some(bytes) => Ok(Some(decode::<StoredUser>(&bytes)?.user)),
            None => Ok(None),
        }
    }

    /// All users in id order.
    pub fn list(&self) -> Result<Vec<User>> {
        self.store
            .users
            .iter()
            .values()
            .map(|bytes| -> Result<User> { Ok(decode::<StoredUser>(&bytes?)?.user) })
            .collect()
    }

    fn stored(&self, id: UserId) -> Result<StoredUser> {
        let bytes = self
            .store
            .users
            .get(id_key(id.0))?
            .ok_or_else(|| AppError::NotFound(format!("No user with id {id}")))?;
        Ok(decode(&bytes)?)
    }
}
