//! Transfer progress snapshots shared between the I/O path and the
//! embedding application's refresh timer.

use std::sync::Mutex;
use std::time::Instant;

/// Value-type snapshot of one transfer's progress.
#[derive(Clone, Debug)]
pub struct TransferStatus {
    /// Total bytes, `-1` when unknown.
    pub total_size: i64,
    /// Offset the transfer started at (resume).
    pub start_offset: i64,
    /// Current offset.
    pub current_offset: i64,
    /// When the transfer started.
    pub started: Instant,
    /// At least one byte moved past the start offset; makes the
    /// transfer eligible for automatic retry accounting.
    pub made_progress: bool,
    /// This is a listing transfer, not a file.
    pub is_listing: bool,
}

impl TransferStatus {
    fn new(total_size: i64, start_offset: i64, is_listing: bool) -> Self {
        Self {
            total_size,
            start_offset,
            current_offset: start_offset,
            started: Instant::now(),
            made_progress: false,
            is_listing,
        }
    }
}

#[derive(Default)]
struct Cell {
    status: Option<TransferStatus>,
    changed: bool,
}

/// Interior-mutable holder; writers are the I/O path, readers the UI.
#[derive(Default)]
pub struct TransferStatusCell {
    cell: Mutex<Cell>,
}

impl TransferStatusCell {
    /// Installs a fresh status at transfer start.
    pub fn start(&self, total_size: i64, start_offset: i64, is_listing: bool) {
        let mut cell = self.lock();
        cell.status = Some(TransferStatus::new(total_size, start_offset, is_listing));
        cell.changed = true;
    }

    /// Advances the current offset.
    pub fn advance(&self, bytes: u64) {
        let mut cell = self.lock();
        if let Some(status) = cell.status.as_mut() {
            status.current_offset = status
                .current_offset
                .saturating_add(i64::try_from(bytes).unwrap_or(i64::MAX));
            if status.current_offset > status.start_offset {
                status.made_progress = true;
            }
            cell.changed = true;
        }
    }

    /// Clears the status when the transfer ends.
    pub fn finish(&self) {
        let mut cell = self.lock();
        cell.status = None;
        cell.changed = true;
    }

    /// Returns the snapshot and whether it changed since the last call.
    #[must_use]
    pub fn snapshot(&self) -> (Option<TransferStatus>, bool) {
        let mut cell = self.lock();
        let changed = cell.changed;
        cell.changed = false;
        (cell.status.clone(), changed)
    }

    /// The transfer made progress past its start offset.
    #[must_use]
    pub fn made_progress(&self) -> bool {
        self.lock()
            .status
            .as_ref()
            .is_some_and(|status| status.made_progress)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Cell> {
        self.cell
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_flag_is_consumed_by_snapshot() {
        let cell = TransferStatusCell::default();
        cell.start(100, 0, false);
        let (status, changed) = cell.snapshot();
        assert!(changed);
        assert_eq!(status.expect("status present").total_size, 100);
        let (_, changed) = cell.snapshot();
        assert!(!changed);
    }

    #[test]
    fn progress_past_start_offset_sets_made_progress() {
        let cell = TransferStatusCell::default();
        cell.start(100, 50, false);
        assert!(!cell.made_progress());
        cell.advance(10);
        assert!(cell.made_progress());
        let (status, _) = cell.snapshot();
        assert_eq!(status.expect("status present").current_offset, 60);
    }
}
