//! Advisory `(server, path, reason)` locks preventing peer engines from
//! issuing duplicate LIST or MKD traffic for the same directory.

use crate::cache::ServerKey;
use crate::event::EngineEvent;
use crossbeam_channel::Sender;
use protocol::ServerPath;
use std::sync::Mutex;

/// Why a directory is locked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockReason {
    /// A listing fetch is in flight.
    List,
    /// A directory-creation walk is in flight.
    Mkdir,
}

struct LockEntry {
    server: ServerKey,
    path: String,
    reason: LockReason,
    engine_id: u64,
    waiting: bool,
    lock_count: u32,
    notify: Sender<EngineEvent>,
}

/// Process-wide lock table. FIFO per `(server, path, reason)` triple;
/// the first recorded entry holds, later ones wait for a
/// lock-granted event.
#[derive(Default)]
pub struct LockTable {
    entries: Mutex<Vec<LockEntry>>,
}

impl LockTable {
    /// Tries to take the lock for `engine_id`. Returns `true` when the
    /// lock is held; `false` enqueues the engine, which will receive
    /// [`EngineEvent::LockGranted`] once the holder releases.
    /// Re-acquisition by the current holder increments a count.
    pub(crate) fn try_lock(
        &self,
        server: &ServerKey,
        path: &ServerPath,
        reason: LockReason,
        engine_id: u64,
        notify: Sender<EngineEvent>,
    ) -> bool {
        let path_key = path.to_string();
        let mut entries = self.lock();

        if let Some(own) = entries.iter_mut().find(|e| {
            e.engine_id == engine_id
                && e.reason == reason
                && e.server == *server
                && e.path == path_key
        }) {
            if own.waiting {
                return false;
            }
            own.lock_count += 1;
            return true;
        }

        let contended = entries
            .iter()
            .any(|e| e.reason == reason && e.server == *server && e.path == path_key);
        entries.push(LockEntry {
            server: server.clone(),
            path: path_key,
            reason,
            engine_id,
            waiting: contended,
            lock_count: u32::from(!contended),
            notify,
        });
        !contended
    }

    /// Releases one acquisition. When the count reaches zero, the next
    /// waiter in FIFO order is promoted and signalled.
    pub(crate) fn unlock(
        &self,
        server: &ServerKey,
        path: &ServerPath,
        reason: LockReason,
        engine_id: u64,
    ) {
        let path_key = path.to_string();
        let mut entries = self.lock();
        let Some(position) = entries.iter().position(|e| {
            e.engine_id == engine_id
                && e.reason == reason
                && e.server == *server
                && e.path == path_key
                && !e.waiting
        }) else {
            return;
        };
        entries[position].lock_count -= 1;
        if entries[position].lock_count > 0 {
            return;
        }
        entries.remove(position);

        if let Some(next) = entries.iter_mut().find(|e| {
            e.reason == reason && e.server == *server && e.path == path_key && e.waiting
        }) {
            next.waiting = false;
            next.lock_count = 1;
            let event = EngineEvent::LockGranted {
                reason,
                path: path.clone(),
            };
            if next.notify.send(event).is_err() {
                // The waiter's engine is gone; drop its entry and retry.
                let dead = next.engine_id;
                entries.retain(|e| e.engine_id != dead);
                drop(entries);
                self.unlock_orphan(server, path, reason);
            }
        }
    }

    /// Removes every entry of a departing engine, promoting waiters.
    pub(crate) fn release_all(&self, engine_id: u64) {
        let triples: Vec<(ServerKey, String, LockReason, bool)> = {
            let entries = self.lock();
            entries
                .iter()
                .filter(|e| e.engine_id == engine_id)
                .map(|e| (e.server.clone(), e.path.clone(), e.reason, e.waiting))
                .collect()
        };
        for (server, path_key, reason, waiting) in triples {
            if waiting {
                let mut entries = self.lock();
                entries.retain(|e| {
                    !(e.engine_id == engine_id
                        && e.reason == reason
                        && e.server == server
                        && e.path == path_key)
                });
            } else if let Some(path) = parse_key(&path_key) {
                // Force the count to one so the release below frees it.
                {
                    let mut entries = self.lock();
                    if let Some(own) = entries.iter_mut().find(|e| {
                        e.engine_id == engine_id
                            && e.reason == reason
                            && e.server == server
                            && e.path == path_key
                    }) {
                        own.lock_count = 1;
                    }
                }
                self.unlock(&server, &path, reason, engine_id);
            }
        }
    }

    fn unlock_orphan(&self, server: &ServerKey, path: &ServerPath, reason: LockReason) {
        // Promote the next live waiter after a dead one was dropped.
        let mut entries = self.lock();
        if let Some(next) = entries.iter_mut().find(|e| {
            e.reason == reason && e.server == *server && e.path == path.to_string() && e.waiting
        }) {
            next.waiting = false;
            next.lock_count = 1;
            let _ = next.notify.send(EngineEvent::LockGranted {
                reason,
                path: path.clone(),
            });
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LockEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn parse_key(path_key: &str) -> Option<ServerPath> {
    use protocol::PathSyntax;
    // Lock paths round-trip through their display form; trying the
    // syntaxes in order recovers the original.
    [
        PathSyntax::Unix,
        PathSyntax::Vms,
        PathSyntax::Dos,
        PathSyntax::Mvs,
        PathSyntax::HpNonStop,
        PathSyntax::VxWorks,
        PathSyntax::DosFwdSlashes,
    ]
    .into_iter()
    .find_map(|syntax| ServerPath::parse(syntax, path_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{PathSyntax, Server};

    fn key() -> ServerKey {
        ServerKey::of(&Server {
            host: "example.com".into(),
            port: 21,
            ..Server::default()
        })
    }

    fn path() -> ServerPath {
        ServerPath::parse(PathSyntax::Unix, "/locked").expect("valid path")
    }

    #[test]
    fn second_engine_waits_and_is_promoted_fifo() {
        let table = LockTable::default();
        let (tx1, _rx1) = crossbeam_channel::unbounded();
        let (tx2, rx2) = crossbeam_channel::unbounded();
        let (tx3, rx3) = crossbeam_channel::unbounded();

        assert!(table.try_lock(&key(), &path(), LockReason::List, 1, tx1));
        assert!(!table.try_lock(&key(), &path(), LockReason::List, 2, tx2));
        assert!(!table.try_lock(&key(), &path(), LockReason::List, 3, tx3));

        table.unlock(&key(), &path(), LockReason::List, 1);
        // Engine 2 was first in line.
        assert!(matches!(
            rx2.try_recv(),
            Ok(EngineEvent::LockGranted { .. })
        ));
        assert!(rx3.try_recv().is_err());

        table.unlock(&key(), &path(), LockReason::List, 2);
        assert!(matches!(
            rx3.try_recv(),
            Ok(EngineEvent::LockGranted { .. })
        ));
    }

    #[test]
    fn reasons_do_not_contend() {
        let table = LockTable::default();
        let (tx, _rx) = crossbeam_channel::unbounded();
        assert!(table.try_lock(&key(), &path(), LockReason::List, 1, tx.clone()));
        assert!(table.try_lock(&key(), &path(), LockReason::Mkdir, 2, tx));
    }

    #[test]
    fn recursive_acquisition_needs_matching_releases() {
        let table = LockTable::default();
        let (tx1, _rx1) = crossbeam_channel::unbounded();
        let (tx2, rx2) = crossbeam_channel::unbounded();

        assert!(table.try_lock(&key(), &path(), LockReason::List, 1, tx1.clone()));
        assert!(table.try_lock(&key(), &path(), LockReason::List, 1, tx1));
        assert!(!table.try_lock(&key(), &path(), LockReason::List, 2, tx2));

        table.unlock(&key(), &path(), LockReason::List, 1);
        assert!(rx2.try_recv().is_err(), "still held once");
        table.unlock(&key(), &path(), LockReason::List, 1);
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn release_all_frees_held_and_waiting_entries() {
        let table = LockTable::default();
        let (tx1, _rx1) = crossbeam_channel::unbounded();
        let (tx2, rx2) = crossbeam_channel::unbounded();
        assert!(table.try_lock(&key(), &path(), LockReason::List, 1, tx1));
        assert!(!table.try_lock(&key(), &path(), LockReason::List, 2, tx2));

        table.release_all(1);
        assert!(rx2.try_recv().is_ok());
    }
}
