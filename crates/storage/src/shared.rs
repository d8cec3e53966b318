//! The shared-state buffer connecting the foreground and the background
//! compaction worker.
//!
//! Eight `u32` cells at fixed offsets, mirroring the on-the-wire layout of a
//! 64-byte shared buffer:
//!
//! ```text
//! 0  FILE_SIZE        8  DOC_COUNT       16 GC_PROGRESS      24 LOCK
//! 4  LIVE_DATA_SIZE   12 GC_STATUS       20 GC_BYTES_FREED   28 COMMAND
//! ```
//!
//! Every access is an atomic load or store; the `Mutex`/`Condvar` pair
//! exists purely so the worker can sleep on `COMMAND` with a timeout and be
//! woken by [`SharedState::notify_command`] — it guards no data.
//!
//! `FILE_SIZE` and `LIVE_DATA_SIZE` publish as saturating `u32` (the header
//! keeps the true `u64` values); databases past 4 GiB simply pin the cell at
//! `u32::MAX`, which still trips the GC ratio check correctly.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Number of `u32` cells in the shared buffer.
pub const CELL_COUNT: usize = 8;

/// Cell indexes into the shared buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    /// Current data-file size of the most recently flushed collection.
    FileSize = 0,
    /// Live payload bytes of the most recently flushed collection.
    LiveDataSize = 1,
    /// Document count of the most recently flushed collection.
    DocCount = 2,
    /// Worker status: [`GC_IDLE`] / [`GC_RUNNING`] / [`GC_COMPLETE`].
    GcStatus = 3,
    /// Worker progress, 0–100.
    GcProgress = 4,
    /// Bytes freed by the last garbage-collection run.
    GcBytesFreed = 5,
    /// Reserved.
    Lock = 6,
    /// Command mailbox: [`CMD_NONE`] / [`CMD_TRIGGER_GC`] / [`CMD_SHUTDOWN`].
    Command = 7,
}

/// `GC_STATUS`: worker idle.
pub const GC_IDLE: u32 = 0;
/// `GC_STATUS`: worker running a collection pass.
pub const GC_RUNNING: u32 = 1;
/// `GC_STATUS`: last pass finished (transitional; the worker settles on
/// [`GC_IDLE`]).
pub const GC_COMPLETE: u32 = 2;

/// `COMMAND`: nothing requested.
pub const CMD_NONE: u32 = 0;
/// `COMMAND`: run a garbage-collection pass now.
pub const CMD_TRIGGER_GC: u32 = 1;
/// `COMMAND`: worker should exit its loop.
pub const CMD_SHUTDOWN: u32 = 2;

/// The 64-byte shared buffer: eight atomic `u32` cells plus a wakeup pair.
#[derive(Debug)]
pub struct SharedState {
    cells: [AtomicU32; CELL_COUNT],
    wake: Mutex<()>,
    wake_cv: Condvar,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    /// Creates a zeroed shared buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cells: Default::default(),
            wake: Mutex::new(()),
            wake_cv: Condvar::new(),
        }
    }

    /// Atomically loads a cell.
    #[must_use]
    pub fn load(&self, cell: Cell) -> u32 {
        self.cells[cell as usize].load(Ordering::SeqCst)
    }

    /// Atomically stores into a cell.
    pub fn store(&self, cell: Cell, value: u32) {
        self.cells[cell as usize].store(value, Ordering::SeqCst);
    }

    /// Publishes the foreground counters after a write-path flush.
    ///
    /// Byte sizes saturate at `u32::MAX`.
    pub fn publish_counters(&self, file_size: u64, live_data_size: u64, document_count: u64) {
        self.store(Cell::FileSize, saturate(file_size));
        self.store(Cell::LiveDataSize, saturate(live_data_size));
        self.store(Cell::DocCount, saturate(document_count));
    }

    /// Stores a command and wakes the worker.
    pub fn notify_command(&self, command: u32) {
        self.store(Cell::Command, command);
        let _guard = self.wake.lock().unwrap_or_else(|e| e.into_inner());
        self.wake_cv.notify_all();
    }

    /// Blocks until a command is pending or `timeout` elapses, then returns
    /// the current `COMMAND` value (which may be [`CMD_NONE`] on timeout —
    /// the worker uses that as its polling cadence for the auto-trigger
    /// check).
    #[must_use]
    pub fn wait_for_command(&self, timeout: Duration) -> u32 {
        let guard = self.wake.lock().unwrap_or_else(|e| e.into_inner());
        if self.load(Cell::Command) != CMD_NONE {
            return self.load(Cell::Command);
        }
        // Spurious wakeups are fine: the caller re-reads COMMAND and treats
        // CMD_NONE exactly like a timeout.
        let _ = self
            .wake_cv
            .wait_timeout(guard, timeout)
            .unwrap_or_else(|e| e.into_inner());
        self.load(Cell::Command)
    }
}

fn saturate(v: u64) -> u32 {
    v.min(u64::from(u32::MAX)) as u32
}
