//! The process-singleton context shared by every engine.

use crate::cache::{DirectoryCache, ServerKey};
use crate::engine::EngineShared;
use crate::event::EngineEvent;
use crate::failed_login::FailedLoginList;
use crate::lock::LockTable;
use crate::options::EngineOptions;
use bandwidth::RateLimiter;
use crossbeam_channel::Sender;
use logging::{LogSink, NullSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Registry entry for one live engine, used for cross-engine
/// notifications.
pub(crate) struct EngineHandle {
    pub engine_id: u64,
    pub shared: Weak<EngineShared>,
    pub events: Sender<EngineEvent>,
}

struct ContextInner {
    options: EngineOptions,
    limiter: RateLimiter,
    cache: DirectoryCache,
    locks: LockTable,
    failed_logins: FailedLoginList,
    engines: Mutex<Vec<EngineHandle>>,
    log: Arc<dyn LogSink>,
    trusted_certs: Mutex<rustc_hash::FxHashMap<(String, u16), Vec<u8>>>,
    next_engine_id: AtomicU64,
    next_request_id: AtomicU64,
}

/// Verdict of the trust-on-first-use certificate store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CertTrust {
    /// The presented leaf matches the pinned one.
    Trusted,
    /// No certificate pinned yet; ask the user.
    Unknown,
    /// A different certificate was pinned before; ask loudly.
    Changed,
}

/// Shared handle to the process-wide engine services: options, rate
/// limiter, directory cache, lock table, failed-login list, engine
/// registry and the log sink. Clones are cheap and share state.
#[derive(Clone)]
pub struct EngineContext {
    inner: Arc<ContextInner>,
}

impl EngineContext {
    /// Builds a context from options, wiring the configured speed limits
    /// into the rate limiter and opening the log sink.
    #[must_use]
    pub fn new(options: EngineOptions) -> Self {
        let log: Arc<dyn LogSink> = match options.log_file.as_ref() {
            Some(path) => match logging::LogFile::open(path.clone(), options.log_file_size_cap) {
                Ok(file) => Arc::new(file),
                Err(error) => {
                    tracing::warn!(%error, "cannot open engine log, logging disabled");
                    Arc::new(NullSink)
                }
            },
            None => Arc::new(NullSink),
        };
        Self::with_log_sink(options, log)
    }

    /// Like [`EngineContext::new`] but with a caller-supplied sink;
    /// tests use a capture sink.
    #[must_use]
    pub fn with_log_sink(options: EngineOptions, log: Arc<dyn LogSink>) -> Self {
        let limiter = RateLimiter::new();
        limiter.configure(
            options.inbound_limit_bytes(),
            options.outbound_limit_bytes(),
            options.burst_tolerance,
        );
        Self {
            inner: Arc::new(ContextInner {
                options,
                limiter,
                cache: DirectoryCache::default(),
                locks: LockTable::default(),
                failed_logins: FailedLoginList::default(),
                engines: Mutex::new(Vec::new()),
                log,
                trusted_certs: Mutex::new(rustc_hash::FxHashMap::default()),
                next_engine_id: AtomicU64::new(1),
                next_request_id: AtomicU64::new(1),
            }),
        }
    }

    /// Compares a presented leaf certificate against the pinned one.
    #[must_use]
    pub fn check_certificate(&self, host: &str, port: u16, leaf: &[u8]) -> CertTrust {
        let store = self
            .inner
            .trusted_certs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match store.get(&(host.to_owned(), port)) {
            Some(pinned) if pinned == leaf => CertTrust::Trusted,
            Some(_) => CertTrust::Changed,
            None => CertTrust::Unknown,
        }
    }

    /// Pins a leaf certificate after the user accepted it.
    pub fn pin_certificate(&self, host: &str, port: u16, leaf: Vec<u8>) {
        self.inner
            .trusted_certs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert((host.to_owned(), port), leaf);
    }

    /// Engine configuration (read-only).
    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    /// The process-wide rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    /// The shared directory cache.
    #[must_use]
    pub fn cache(&self) -> &DirectoryCache {
        &self.inner.cache
    }

    /// The cache-lock table.
    #[must_use]
    pub fn locks(&self) -> &LockTable {
        &self.inner.locks
    }

    /// The failed-login backoff list.
    #[must_use]
    pub fn failed_logins(&self) -> &FailedLoginList {
        &self.inner.failed_logins
    }

    /// The user-facing log sink.
    #[must_use]
    pub fn log(&self) -> &Arc<dyn LogSink> {
        &self.inner.log
    }

    pub(crate) fn allocate_engine_id(&self) -> u64 {
        self.inner.next_engine_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn allocate_request_id(&self) -> u64 {
        self.inner.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register_engine(&self, handle: EngineHandle) {
        self.lock_engines().push(handle);
    }

    pub(crate) fn deregister_engine(&self, engine_id: u64) {
        self.lock_engines().retain(|h| h.engine_id != engine_id);
        self.inner.locks.release_all(engine_id);
    }

    /// Dispatches a queued event to every live peer of `origin` that is
    /// connected to `server`. The callback decides per peer whether an
    /// event is due, keeping iteration under the registry mutex and the
    /// delivery on the peer's own thread.
    pub(crate) fn for_each_peer(
        &self,
        origin: u64,
        server: &ServerKey,
        mut dispatch: impl FnMut(&EngineHandle) -> Option<EngineEvent>,
    ) {
        let engines = self.lock_engines();
        for handle in engines.iter() {
            if handle.engine_id == origin {
                continue;
            }
            let Some(shared) = handle.shared.upgrade() else {
                continue;
            };
            if shared.server_key() != Some(server.clone()) {
                continue;
            }
            if let Some(event) = dispatch(handle) {
                let _ = handle.events.send(event);
            }
        }
    }

    fn lock_engines(&self) -> std::sync::MutexGuard<'_, Vec<EngineHandle>> {
        self.inner
            .engines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
