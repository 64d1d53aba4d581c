//! User directory client trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::UserId;

use crate::error::ClientError;

/// A user known to the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: UserId,
}

/// Trait for user directory lookups.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolves a user by ID. `None` means the directory does not know the user.
    async fn fetch_user(&self, user_id: UserId) -> Result<Option<UserRef>, ClientError>;

    /// Returns the user's stored addresses in directory order.
    ///
    /// The first entry is the one callers adopt as the default shipping
    /// address when none is supplied.
    async fn fetch_addresses(&self, user_id: UserId)
    -> Result<Vec<serde_json::Value>, ClientError>;
}

#[derive(Debug, Default)]
struct InMemoryUserState {
    users: HashMap<UserId, Vec<serde_json::Value>>,
    unreachable: bool,
}

/// In-memory user directory for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    state: Arc<RwLock<InMemoryUserState>>,
}

impl InMemoryUserDirectory {
    /// Creates a new empty in-memory user directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user with no stored addresses.
    pub fn add_user(&self, user_id: UserId) {
        self.state.write().unwrap().users.insert(user_id, Vec::new());
    }

    /// Registers a user with the given addresses, first entry first.
    pub fn add_user_with_addresses(&self, user_id: UserId, addresses: Vec<serde_json::Value>) {
        self.state.write().unwrap().users.insert(user_id, addresses);
    }

    /// Simulates the directory becoming unreachable.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.write().unwrap().unreachable = unreachable;
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn fetch_user(&self, user_id: UserId) -> Result<Option<UserRef>, ClientError> {
        let state = self.state.read().unwrap();
        if state.unreachable {
            return Err(ClientError::Unavailable(
                "user directory unreachable".to_string(),
            ));
        }
        Ok(state
            .users
            .contains_key(&user_id)
            .then_some(UserRef { id: user_id }))
    }

    async fn fetch_addresses(
        &self,
        user_id: UserId,
    ) -> Result<Vec<serde_json::Value>, ClientError> {
        let state = self.state.read().unwrap();
        if state.unreachable {
            return Err(ClientError::Unavailable(
                "user directory unreachable".to_string(),
            ));
        }
        Ok(state.users.get(&user_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_known_and_unknown_user() {
        let directory = InMemoryUserDirectory::new();
        let user = UserId::new();
        directory.add_user(user);

        assert!(directory.fetch_user(user).await.unwrap().is_some());
        assert!(directory.fetch_user(UserId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn addresses_preserve_order() {
        let directory = InMemoryUserDirectory::new();
        let user = UserId::new();
        directory.add_user_with_addresses(
            user,
            vec![
                serde_json::json!({"street": "1 First Ave"}),
                serde_json::json!({"street": "2 Second Ave"}),
            ],
        );

        let addresses = directory.fetch_addresses(user).await.unwrap();
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses[0]["street"], "1 First Ave");
    }

    #[tokio::test]
    async fn unreachable_surfaces_unavailable() {
        let directory = InMemoryUserDirectory::new();
        let user = UserId::new();
        directory.add_user(user);
        directory.set_unreachable(true);

        assert!(matches!(
            directory.fetch_user(user).await,
            Err(ClientError::Unavailable(_))
        ));
    }
}
