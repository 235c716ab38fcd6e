//! Request-scoped memoisation of identity lookups.
//!
//! A single HTTP request can ask "what roles does this user have?" or "which
//! agency does this user belong to?" from several places (middleware, guards,
//! handlers). `AuthCache` makes each distinct lookup hit the backing store at
//! most once for the lifetime of the cache, which is one request.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use agencyhub_core::{AgencyId, UserId};

use crate::Role;

/// Lazily-filled map of single-assignment cells.
///
/// The map lock is only held to find/insert the cell; the loader runs
/// outside it so concurrent lookups for different keys never serialise.
struct Memo<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Memo<K, V>
where
    K: Eq + Hash + Copy,
    V: Clone,
{
    fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn cell(&self, key: K) -> Arc<OnceCell<V>> {
        let mut cells = match self.cells.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cells.entry(key).or_default().clone()
    }

    async fn get_or_try_load<F, Fut, E>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cell(key);
        cell.get_or_try_init(load).await.cloned()
    }

    fn len(&self) -> usize {
        match self.cells.lock() {
            Ok(cells) => cells.values().filter(|c| c.initialized()).count(),
            Err(poisoned) => poisoned
                .into_inner()
                .values()
                .filter(|c| c.initialized())
                .count(),
        }
    }
}

/// Per-request auth lookup cache.
///
/// Failed loads are not memoised: the next caller retries the loader.
pub struct AuthCache {
    roles: Memo<UserId, Vec<Role>>,
    agencies: Memo<UserId, Option<AgencyId>>,
}

impl AuthCache {
    pub fn new() -> Self {
        Self {
            roles: Memo::new(),
            agencies: Memo::new(),
        }
    }

    /// Roles of `user`, loading them with `load` on first use.
    pub async fn roles_for<F, Fut, E>(&self, user: UserId, load: F) -> Result<Vec<Role>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Role>, E>>,
    {
        self.roles.get_or_try_load(user, load).await
    }

    /// Agency `user` belongs to (`None` for users without a profile).
    pub async fn agency_for<F, Fut, E>(&self, user: UserId, load: F) -> Result<Option<AgencyId>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<AgencyId>, E>>,
    {
        self.agencies.get_or_try_load(user, load).await
    }

    /// Whether `user` holds the super admin role (shares the roles memo).
    pub async fn is_super_admin<F, Fut, E>(&self, user: UserId, load: F) -> Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Role>, E>>,
    {
        let roles = self.roles_for(user, load).await?;
        Ok(roles.iter().any(|r| r.is_super_admin()))
    }

    /// Number of lookups resolved so far.
    pub fn resolved(&self) -> usize {
        self.roles.len() + self.agencies.len()
    }
}

impl Default for AuthCache {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for AuthCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthCache")
            .field("resolved", &self.resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn loader_runs_once_per_user() {
        let cache = AuthCache::new();
        let calls = AtomicUsize::new(0);
        let user = UserId::new();

        for _ in 0..3 {
            let roles = cache
                .roles_for(user, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(vec![Role::FINANCE])
                })
                .await
                .unwrap();
            assert_eq!(roles, vec![Role::FINANCE]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.resolved(), 1);
    }

    #[tokio::test]
    async fn super_admin_check_reuses_roles() {
        let cache = AuthCache::new();
        let calls = AtomicUsize::new(0);
        let user = UserId::new();
        let load = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(vec![Role::SUPER_ADMIN])
        };

        assert!(cache.is_super_admin(user, load).await.unwrap());
        let roles = cache
            .roles_for(user, || async { Ok::<_, ()>(vec![]) })
            .await
            .unwrap();
        assert_eq!(roles, vec![Role::SUPER_ADMIN]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_retried() {
        let cache = AuthCache::new();
        let user = UserId::new();

        let first = cache
            .agency_for(user, || async { Err::<Option<AgencyId>, _>("store down") })
            .await;
        assert_eq!(first, Err("store down"));

        let agency = AgencyId::new();
        let second = cache
            .agency_for(user, || async { Ok::<_, &str>(Some(agency)) })
            .await;
        assert_eq!(second, Ok(Some(agency)));
    }

    #[tokio::test]
    async fn users_are_cached_independently() {
        let cache = AuthCache::new();
        let a = UserId::new();
        let b = UserId::new();

        let ra = cache
            .roles_for(a, || async { Ok::<_, ()>(vec![Role::HR]) })
            .await
            .unwrap();
        let rb = cache
            .roles_for(b, || async { Ok::<_, ()>(vec![Role::SALES]) })
            .await
            .unwrap();
        assert_eq!(ra, vec![Role::HR]);
        assert_eq!(rb, vec![Role::SALES]);
    }
}
