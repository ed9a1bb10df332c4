//! The active persistence configuration of one worker.
//!
//! A context is owned by exactly one worker. Workers spawned through
//! [`ConfigurationContext::spawn`] or
//! [`ConfigurationContext::spawn_blocking_thread`] receive a snapshot of the
//! parent's binding taken at spawn time; from then on parent and child are
//! independent.

use crate::error::{DbError, DbResult};
use crate::models::PersistenceConfiguration;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct ConfigurationContext {
    current: Option<Arc<PersistenceConfiguration>>,
}

impl ConfigurationContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context already bound to `config`.
    pub fn with_configuration(config: impl Into<Arc<PersistenceConfiguration>>) -> Self {
        Self {
            current: Some(config.into()),
        }
    }

    /// Bind `config`, replacing any previous binding of this context.
    pub fn set(&mut self, config: impl Into<Arc<PersistenceConfiguration>>) {
        self.current = Some(config.into());
        debug!("Persistence configuration set");
    }

    /// The bound configuration; `None` when unset.
    pub fn get(&self) -> Option<Arc<PersistenceConfiguration>> {
        if self.current.is_none() {
            warn!("Persistence configuration requested but none is set");
        }
        self.current.clone()
    }

    /// The bound configuration, or a configuration error when unset.
    pub fn require(&self) -> DbResult<Arc<PersistenceConfiguration>> {
        self.current.clone().ok_or_else(|| {
            DbError::configuration(
                "No persistence configuration is set for this context; call set() first",
            )
        })
    }

    pub fn is_set(&self) -> bool {
        self.current.is_some()
    }

    /// Remove this context's binding. Forked contexts keep theirs.
    pub fn close(&mut self) {
        if self.current.take().is_some() {
            debug!("Persistence configuration closed");
        }
    }

    /// Snapshot the current binding into a new, independent context.
    pub fn fork(&self) -> ConfigurationContext {
        self.clone()
    }

    /// Run `f` as a tokio task with a snapshot of this context.
    pub fn spawn<F, Fut, T>(&self, f: F) -> tokio::task::JoinHandle<T>
    where
        F: FnOnce(ConfigurationContext) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let child = self.fork();
        tokio::spawn(async move { f(child).await })
    }

    /// Run `f` on a new OS thread with a snapshot of this context.
    pub fn spawn_blocking_thread<F, T>(&self, f: F) -> std::thread::JoinHandle<T>
    where
        F: FnOnce(ConfigurationContext) -> T + Send + 'static,
        T: Send + 'static,
    {
        let child = self.fork();
        std::thread::spawn(move || f(child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataSourceConfig;

    fn config(url: &str) -> PersistenceConfiguration {
        PersistenceConfiguration::new(DataSourceConfig::new(url))
    }

    #[test]
    fn test_unset_is_not_an_error() {
        let ctx = ConfigurationContext::new();
        assert!(ctx.get().is_none());
        assert!(matches!(
            ctx.require().unwrap_err(),
            DbError::Configuration { .. }
        ));
    }

    #[test]
    fn test_set_replaces_and_close_clears() {
        let mut ctx = ConfigurationContext::new();
        ctx.set(config("sqlite:/tmp/a.db"));
        ctx.set(config("sqlite:/tmp/b.db"));
        assert_eq!(ctx.get().unwrap().data_source.url, "sqlite:/tmp/b.db");
        ctx.close();
        assert!(!ctx.is_set());
    }

    #[test]
    fn test_fork_is_independent() {
        let mut parent = ConfigurationContext::with_configuration(config("sqlite:/tmp/a.db"));
        let mut child = parent.fork();

        parent.set(config("sqlite:/tmp/b.db"));
        assert_eq!(child.get().unwrap().data_source.url, "sqlite:/tmp/a.db");

        child.close();
        assert!(parent.is_set());
    }

    #[tokio::test]
    async fn test_spawned_task_sees_snapshot() {
        let mut parent = ConfigurationContext::with_configuration(config("sqlite:/tmp/a.db"));
        let handle = parent.spawn(|ctx| async move {
            tokio::task::yield_now().await;
            ctx.get().map(|c| c.data_source.url.clone())
        });
        parent.close();
        assert_eq!(handle.await.unwrap().as_deref(), Some("sqlite:/tmp/a.db"));
    }

    #[test]
    fn test_thread_sees_snapshot() {
        let parent = ConfigurationContext::with_configuration(config("sqlite:/tmp/a.db"));
        let shared = parent.get().unwrap();
        let handle = parent.spawn_blocking_thread(move |ctx| {
            Arc::ptr_eq(&ctx.get().unwrap(), &shared)
        });
        assert!(handle.join().unwrap());
    }
}
