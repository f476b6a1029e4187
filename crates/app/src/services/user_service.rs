//! User service: use-cases for accounts.

use polystore_domain::accounts::User;
use polystore_domain::error::{NotFoundError, PolystoreError};

use crate::ports::Repository;

/// Application service for user operations.
pub struct UserService<R> {
    repo: R,
}

impl<R: Repository<Entity = User>> UserService<R> {
    /// Create a new service backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Register a new user; the returned user carries its generated id.
    ///
    /// # Errors
    ///
    /// Returns [`PolystoreError::Validation`] if invariants fail, or a
    /// storage error propagated from the repository.
    #[tracing::instrument(skip(self, user), fields(user_name = %user.name))]
    pub async fn register_user(&self, user: User) -> Result<User, PolystoreError> {
        user.validate()?;
        let saved = self.repo.save(user).await?;
        tracing::debug!(user_id = ?saved.id, "user registered");
        Ok(saved)
    }

    /// Look up a user by id, returning an error if not found.
    ///
    /// # Errors
    ///
    /// Returns [`PolystoreError::NotFound`] when no user with `id` exists,
    /// or a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn get_user(&self, id: i64) -> Result<User, PolystoreError> {
        self.repo.find_by_id(id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "User",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// List all users, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_users(&self) -> Result<Vec<User>, PolystoreError> {
        self.repo.find_all().await
    }

    /// Number of registered users.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn count_users(&self) -> Result<u64, PolystoreError> {
        self.repo.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_domain::error::ValidationError;
    use std::collections::BTreeMap;
    use std::future::Future;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryUserRepo {
        store: Mutex<BTreeMap<i64, User>>,
    }

    impl Repository for InMemoryUserRepo {
        type Entity = User;

        fn find_all(&self) -> impl Future<Output = Result<Vec<User>, PolystoreError>> + Send {
            let store = self.store.lock().unwrap();
            let result: Vec<User> = store.values().cloned().collect();
            async { Ok(result) }
        }

        fn find_by_id(
            &self,
            id: i64,
        ) -> impl Future<Output = Result<Option<User>, PolystoreError>> + Send {
            let store = self.store.lock().unwrap();
            let result = store.get(&id).cloned();
            async { Ok(result) }
        }

        fn save(&self, mut user: User) -> impl Future<Output = Result<User, PolystoreError>> + Send {
            let mut store = self.store.lock().unwrap();
            let id = user
                .id
                .unwrap_or_else(|| store.keys().next_back().map_or(1, |last| last + 1));
            user.id = Some(id);
            store.insert(id, user.clone());
            async { Ok(user) }
        }

        fn delete_by_id(&self, id: i64) -> impl Future<Output = Result<bool, PolystoreError>> + Send {
            let mut store = self.store.lock().unwrap();
            let removed = store.remove(&id).is_some();
            async move { Ok(removed) }
        }

        fn count(&self) -> impl Future<Output = Result<u64, PolystoreError>> + Send {
            let store = self.store.lock().unwrap();
            let count = store.len() as u64;
            async move { Ok(count) }
        }
    }

    fn make_service() -> UserService<InMemoryUserRepo> {
        UserService::new(InMemoryUserRepo::default())
    }

    #[tokio::test]
    async fn should_assign_id_when_registering() {
        let svc = make_service();
        let saved = svc.register_user(User::new("小A", 18)).await.unwrap();
        assert_eq!(saved.id, Some(1));

        let fetched = svc.get_user(1).await.unwrap();
        assert_eq!(fetched.name, "小A");
        assert_eq!(fetched.age, 18);
    }

    #[tokio::test]
    async fn should_reject_user_with_negative_age() {
        let svc = make_service();
        let result = svc.register_user(User::new("Bob", -3)).await;
        assert!(matches!(
            result,
            Err(PolystoreError::Validation(ValidationError::NegativeAge))
        ));
        assert_eq!(svc.count_users().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn should_list_users_in_id_order() {
        let svc = make_service();
        svc.register_user(User::new("Ann", 30)).await.unwrap();
        svc.register_user(User::new("Bea", 25)).await.unwrap();

        let names: Vec<String> = svc
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["Ann".to_string(), "Bea".to_string()]);
    }

    #[tokio::test]
    async fn should_return_not_found_when_user_missing() {
        let svc = make_service();
        assert!(matches!(
            svc.get_user(7).await,
            Err(PolystoreError::NotFound(_))
        ));
    }
}
