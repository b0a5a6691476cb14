//! Application state shared across request handlers.

use std::sync::Arc;

use crate::db::{Database, PgJobQueue};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    db: Database,
    queue: PgJobQueue,
}

impl AppState {
    pub fn new(db: Database, queue: PgJobQueue) -> Self {
        Self {
            inner: Arc::new(AppStateInner { db, queue }),
        }
    }

    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    pub fn queue(&self) -> &PgJobQueue {
        &self.inner.queue
    }
}
