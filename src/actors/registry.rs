//! MonitoredSet - the applications that currently have a live monitor
//!
//! Discovery inserts, the monitor removes itself as its last act. The lock
//! is never held across a network call.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::metric::ApplicationIdentity;

/// Shared `guid → identity` map
#[derive(Clone, Default)]
pub struct MonitoredSet {
    inner: Arc<Mutex<HashMap<String, ApplicationIdentity>>>,
}

impl MonitoredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert every application not yet monitored and call `spawn` for it.
    ///
    /// Insert and spawn happen under a single acquisition of the lock, so a
    /// concurrent scan can never spawn a second monitor for the same guid.
    /// Returns the number of applications inserted.
    pub async fn insert_new<I, F>(&self, apps: I, mut spawn: F) -> usize
    where
        I: IntoIterator<Item = ApplicationIdentity>,
        F: FnMut(ApplicationIdentity),
    {
        let mut monitored = self.inner.lock().await;
        let mut inserted = 0;

        for app in apps {
            if monitored.contains_key(&app.guid) {
                continue;
            }
            monitored.insert(app.guid.clone(), app.clone());
            spawn(app);
            inserted += 1;
        }

        inserted
    }

    pub async fn remove(&self, guid: &str) -> Option<ApplicationIdentity> {
        self.inner.lock().await.remove(guid)
    }

    pub async fn contains(&self, guid: &str) -> bool {
        self.inner.lock().await.contains_key(guid)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Currently monitored applications, sorted by name
    pub async fn snapshot(&self) -> Vec<ApplicationIdentity> {
        let mut apps: Vec<_> = self.inner.lock().await.values().cloned().collect();
        apps.sort_by(|a, b| a.name.cmp(&b.name));
        apps
    }
}
