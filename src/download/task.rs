//! Shared state of the download pipeline.
//!
//! Two threads alternate over this state through a two-phase handshake:
//! during `HandleRequests` the transport thread may mutate the queue and
//! task buffers; during `ProcessQueues` the writer thread may. The condition
//! variable flips the phase; the non-owning thread blocks until the flip.
//! The invariant that keeps the output sorted without a post-pass: tasks
//! enter the queue in prefix order and the writer only ever pops completed
//! tasks from the front.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// One unit of work: a 5-hex-digit range shard.
#[derive(Debug)]
pub struct DownloadTask {
    pub prefix: u32,
    pub buffer: Vec<u8>,
    pub complete: bool,
}

impl DownloadTask {
    pub fn new(prefix: u32) -> Self {
        Self {
            prefix,
            buffer: Vec::new(),
            complete: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The transport thread owns the queue and task buffers.
    HandleRequests,
    /// The writer thread owns the queue.
    ProcessQueues,
}

#[derive(Debug)]
pub struct PipelineState {
    pub phase: Phase,
    pub download_queue: VecDeque<DownloadTask>,
    pub next_prefix: u32,
    pub prefix_limit: u32,
    /// Set by whichever thread fails first; the other drains and exits.
    pub failed: bool,
    /// Graceful stop: no new tasks, finish what is already complete.
    pub shutdown: bool,
}

impl PipelineState {
    /// Top up the queue to `parallel_max` in-flight shards. Only the writer
    /// calls this, during `ProcessQueues`.
    pub fn fill_queue(&mut self, parallel_max: usize) {
        if self.shutdown {
            return;
        }
        while self.download_queue.len() < parallel_max && self.next_prefix < self.prefix_limit {
            self.download_queue
                .push_back(DownloadTask::new(self.next_prefix));
            self.next_prefix += 1;
        }
    }
}

pub struct Handshake {
    pub state: Mutex<PipelineState>,
    pub cv: Condvar,
}

impl Handshake {
    pub fn new(start_prefix: u32, prefix_limit: u32) -> Self {
        Self {
            state: Mutex::new(PipelineState {
                phase: Phase::HandleRequests,
                download_queue: VecDeque::new(),
                next_prefix: start_prefix,
                prefix_limit,
                failed: false,
                shutdown: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Mark the pipeline failed and wake the other thread so it can exit.
    pub fn fail(&self) {
        let mut st = self.state.lock().unwrap();
        st.failed = true;
        drop(st);
        self.cv.notify_all();
    }

    /// Request a graceful stop at a shard boundary.
    pub fn request_shutdown(&self) {
        let mut st = self.state.lock().unwrap();
        st.shutdown = true;
        drop(st);
        self.cv.notify_all();
    }
}
