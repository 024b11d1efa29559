//! Deferred actions that run only once a unit of work commits.

use std::fmt;

type Action = Box<dyn FnOnce() + Send>;

/// Queue of actions flushed at a commit boundary.
///
/// Actions run in registration order on `commit`. Rolling back, or dropping
/// the scope without committing, discards them.
#[derive(Default)]
pub struct CommitScope {
    actions: Vec<Action>,
}

impl CommitScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_commit<F>(&mut self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.actions.push(Box::new(action));
    }

    pub fn pending(&self) -> usize {
        self.actions.len()
    }

    /// Runs all registered actions. Returns how many ran.
    pub fn commit(mut self) -> usize {
        let actions = std::mem::take(&mut self.actions);
        let count = actions.len();
        for action in actions {
            action();
        }
        count
    }

    /// Discards all registered actions.
    pub fn rollback(mut self) {
        let discarded = std::mem::take(&mut self.actions).len();
        if discarded > 0 {
            log::debug!("Rolled back {} post-commit actions", discarded);
        }
    }
}

impl Drop for CommitScope {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            log::debug!(
                "Commit scope dropped without commit; discarding {} actions",
                self.actions.len()
            );
        }
    }
}

impl fmt::Debug for CommitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitScope")
            .field("pending", &self.actions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Box<dyn FnOnce() + Send>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = Arc::clone(&log);
        let make = move |n: u32| -> Box<dyn FnOnce() + Send> {
            let log = Arc::clone(&handle);
            Box::new(move || log.lock().unwrap().push(n))
        };
        (log, make)
    }

    #[test]
    fn test_commit_runs_in_order() {
        let (log, make) = recorder();
        let mut scope = CommitScope::new();
        scope.on_commit(make(1));
        scope.on_commit(make(2));
        assert_eq!(scope.pending(), 2);
        assert!(log.lock().unwrap().is_empty());

        assert_eq!(scope.commit(), 2);
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_rollback_discards() {
        let (log, make) = recorder();
        let mut scope = CommitScope::new();
        scope.on_commit(make(1));
        scope.rollback();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drop_discards() {
        let (log, make) = recorder();
        {
            let mut scope = CommitScope::new();
            scope.on_commit(make(7));
        }
        assert!(log.lock().unwrap().is_empty());
    }
}
