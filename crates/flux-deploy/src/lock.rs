//! Per-app deployment lock.
//!
//! At most one pipeline may be in flight per app name; a second deploy
//! for the same app fails fast instead of queueing. Each entry owns a
//! cancellation token scoped to the whole pipeline; `end` cancels it, so
//! an aborted pipeline unwinds at its next suspension point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::error::DeployError;

/// Map of app name → cancel handle for the in-flight pipeline.
#[derive(Clone, Default)]
pub struct DeploymentLock {
    inner: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl DeploymentLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the lock for `name`. Returns the pipeline's cancellation
    /// token, derived from `parent` so daemon shutdown propagates too.
    pub fn begin(
        &self,
        name: &str,
        parent: &CancellationToken,
    ) -> Result<CancellationToken, DeployError> {
        let mut entries = self.inner.lock().expect("lock entries");
        if entries.contains_key(name) {
            return Err(DeployError::InProgress(name.to_string()));
        }

        let token = parent.child_token();
        entries.insert(name.to_string(), token.clone());
        Ok(token)
    }

    /// Release the lock for `name`, cancelling its token.
    pub fn end(&self, name: &str) {
        let mut entries = self.inner.lock().expect("lock entries");
        if let Some(token) = entries.remove(name) {
            token.cancel();
        }
    }

    /// Whether a pipeline is currently in flight for `name`.
    pub fn is_held(&self, name: &str) -> bool {
        self.inner.lock().expect("lock entries").contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_conflicts() {
        let lock = DeploymentLock::new();
        let parent = CancellationToken::new();

        let _token = lock.begin("web", &parent).unwrap();
        assert!(matches!(
            lock.begin("web", &parent),
            Err(DeployError::InProgress(_))
        ));
        // Other apps are unaffected.
        assert!(lock.begin("api", &parent).is_ok());
    }

    #[test]
    fn end_releases_and_cancels() {
        let lock = DeploymentLock::new();
        let parent = CancellationToken::new();

        let token = lock.begin("web", &parent).unwrap();
        assert!(lock.is_held("web"));

        lock.end("web");
        assert!(!lock.is_held("web"));
        assert!(token.is_cancelled());
        // The name is claimable again.
        assert!(lock.begin("web", &parent).is_ok());
    }

    #[test]
    fn parent_cancellation_propagates() {
        let lock = DeploymentLock::new();
        let parent = CancellationToken::new();

        let token = lock.begin("web", &parent).unwrap();
        parent.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn end_of_unknown_name_is_a_no_op() {
        let lock = DeploymentLock::new();
        lock.end("ghost");
    }
}
