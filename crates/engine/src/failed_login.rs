//! The process-global record of recent connect failures, driving the
//! reconnect backoff.

use protocol::Server;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct FailedLogin {
    server: Server,
    time: Instant,
    critical: bool,
}

/// Recent connect failures with the pruning rules of the retry policy.
#[derive(Default)]
pub struct FailedLoginList {
    entries: Mutex<Vec<FailedLogin>>,
}

impl FailedLoginList {
    /// Records a connect failure.
    pub fn record(&self, server: &Server, critical: bool) {
        self.lock().push(FailedLogin {
            server: server.clone(),
            time: Instant::now(),
            critical,
        });
    }

    /// Prunes stale and superseded entries, then returns the delay still
    /// to wait before reconnecting to `server`. `None` means no matching
    /// failure is on record.
    ///
    /// Matching is exact on the server identity; non-critical entries
    /// additionally match on `(host, port)` alone, so changing the
    /// credentials does not accumulate penalties.
    #[must_use]
    pub fn remaining_delay(&self, server: &Server, configured: Duration) -> Option<Duration> {
        let mut entries = self.lock();
        entries.retain(|entry| entry.time.elapsed() < configured);

        let newest = entries
            .iter()
            .filter(|entry| {
                entry.server == *server
                    || (!entry.critical && entry.server.same_endpoint(server))
            })
            .map(|entry| entry.time)
            .max()?;
        Some(configured.saturating_sub(newest.elapsed()))
    }

    /// Clears entries for `server` after a successful login (exact
    /// match always, `(host, port)` match for non-critical entries).
    pub fn clear(&self, server: &Server) {
        self.lock().retain(|entry| {
            !(entry.server == *server
                || (!entry.critical && entry.server.same_endpoint(server)))
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<FailedLogin>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(host: &str, user: &str) -> Server {
        Server {
            host: host.into(),
            port: 21,
            user: user.into(),
            ..Server::default()
        }
    }

    #[test]
    fn no_record_means_no_delay() {
        let list = FailedLoginList::default();
        assert!(list
            .remaining_delay(&server("a", "u"), Duration::from_secs(5))
            .is_none());
    }

    #[test]
    fn recent_failure_yields_a_remaining_delay() {
        let list = FailedLoginList::default();
        let s = server("a", "u");
        list.record(&s, false);
        let delay = list
            .remaining_delay(&s, Duration::from_secs(5))
            .expect("entry matches");
        assert!(delay <= Duration::from_secs(5));
        assert!(delay > Duration::from_secs(4));
    }

    #[test]
    fn noncritical_failures_match_on_endpoint_only() {
        let list = FailedLoginList::default();
        list.record(&server("a", "alice"), false);
        assert!(list
            .remaining_delay(&server("a", "bob"), Duration::from_secs(5))
            .is_some());
    }

    #[test]
    fn critical_failures_require_an_exact_match() {
        let list = FailedLoginList::default();
        list.record(&server("a", "alice"), true);
        assert!(list
            .remaining_delay(&server("a", "bob"), Duration::from_secs(5))
            .is_none());
        assert!(list
            .remaining_delay(&server("a", "alice"), Duration::from_secs(5))
            .is_some());
    }

    #[test]
    fn clear_removes_matching_entries() {
        let list = FailedLoginList::default();
        let s = server("a", "u");
        list.record(&s, false);
        list.clear(&s);
        assert!(list.remaining_delay(&s, Duration::from_secs(5)).is_none());
    }
}
