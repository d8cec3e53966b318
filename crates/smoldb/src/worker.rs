//! The background compaction worker.
//!
//! A dedicated thread sharing only the eight-cell atomic buffer with the
//! foreground. State machine:
//!
//! ```text
//! IDLE --wait(COMMAND, 5s)--> TRIGGER_GC  -> run a pass, COMMAND = NONE
//!                         --> SHUTDOWN    -> exit
//!                         --> timeout     -> ratio check, maybe run a pass
//! ```
//!
//! The ratio check fires a pass when `FILE_SIZE / LIVE_DATA_SIZE` exceeds
//! the configured trigger ratio and the worker is idle; the 5-second wait
//! timeout doubles as the polling cadence (strictly more frequent than a
//! separate ~60 s scheduler would be).
//!
//! Each pass snapshots the collection registry and compacts every
//! collection **through the foreground instance**, under that collection's
//! write lock — the worker never opens a second storage engine for a file
//! the foreground is mutating. Failures are reported as strings on the
//! event channel and never panic the thread.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use storage::{
    Cell, SharedState, CMD_NONE, CMD_SHUTDOWN, CMD_TRIGGER_GC, GC_IDLE, GC_RUNNING,
};

use crate::Registry;

pub(crate) struct GcWorker {
    handle: Option<JoinHandle<()>>,
}

impl GcWorker {
    /// Spawns the worker thread. `poll_interval` is the command-wait
    /// timeout (5 s in production; tests shorten it).
    pub(crate) fn spawn(
        shared: Arc<SharedState>,
        registry: Registry,
        trigger_ratio: f64,
        poll_interval: Duration,
        events: Sender<String>,
    ) -> std::io::Result<Self> {
        let handle = std::thread::Builder::new()
            .name("smoldb-gc".to_string())
            .spawn(move || run(&shared, &registry, trigger_ratio, poll_interval, &events))?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Signals `SHUTDOWN` and joins the thread.
    pub(crate) fn shutdown(&mut self, shared: &SharedState) {
        shared.notify_command(CMD_SHUTDOWN);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    shared: &SharedState,
    registry: &Registry,
    trigger_ratio: f64,
    poll_interval: Duration,
    events: &Sender<String>,
) {
    loop {
        match shared.wait_for_command(poll_interval) {
            CMD_SHUTDOWN => {
                log::debug!("gc worker shutting down");
                break;
            }
            CMD_TRIGGER_GC => {
                run_pass(shared, registry, events);
                shared.store(Cell::Command, CMD_NONE);
            }
            _ => {
                // Timeout (or a spurious wake): auto-trigger on the waste
                // ratio of the most recently flushed collection.
                let file_size = shared.load(Cell::FileSize);
                let live = shared.load(Cell::LiveDataSize);
                let idle = shared.load(Cell::GcStatus) == GC_IDLE;
                if live > 0 && f64::from(file_size) / f64::from(live) > trigger_ratio && idle {
                    log::debug!(
                        "auto-triggering gc: file_size={} live={} ratio>{}",
                        file_size,
                        live,
                        trigger_ratio
                    );
                    run_pass(shared, registry, events);
                }
            }
        }
    }
}

/// One garbage-collection pass over every registered collection.
fn run_pass(shared: &SharedState, registry: &Registry, events: &Sender<String>) {
    shared.store(Cell::GcStatus, GC_RUNNING);
    shared.store(Cell::GcProgress, 0);

    let snapshot: Vec<(String, crate::CollectionHandle)> = registry
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .map(|(name, handle)| (name.clone(), Arc::clone(handle)))
        .collect();

    let total = snapshot.len().max(1);
    let mut freed = 0u64;
    for (done, (name, handle)) in snapshot.into_iter().enumerate() {
        let result = handle
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .compact();
        match result {
            Ok(bytes) => freed += bytes,
            Err(e) => {
                log::warn!("gc pass failed for collection {}: {}", name, e);
                let _ = events.send(format!("compaction failed for {}: {}", name, e));
            }
        }
        shared.store(Cell::GcProgress, ((done + 1) * 100 / total) as u32);
    }

    shared.store(
        Cell::GcBytesFreed,
        freed.min(u64::from(u32::MAX)) as u32,
    );
    shared.store(Cell::GcStatus, GC_IDLE);
    shared.store(Cell::GcProgress, 100);
    log::debug!("gc pass complete: {} bytes freed", freed);
}
