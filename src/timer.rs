//! GPU Timer-Query Scheduler
//!
//! Pools hardware timer queries and attributes elapsed GPU time to many
//! concurrently open, overlapping profiling scopes as queries resolve out of
//! order.
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              TimerQueryScheduler                     │
//! │                                                      │
//! │  free:    [TimerQuery]       ←── recycled handles    │
//! │  pending: [TimerQuery]       ←── in submission order │
//! │  records: [PendingStatsRecord]  half-open ranges     │
//! │                                 into `pending`       │
//! │                                                      │
//! │  begin_query()/end_query()   (around GPU work)       │
//! │  update()                    (once per frame)        │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! `update()` makes a single pass over pending queries: resolved ones feed a
//! running prefix sum and go back to the free pool, unresolved ones compact
//! forward in order, and the resulting index remap rewrites every open
//! record's range. A record whose range collapses to empty has fully
//! resolved; its accumulated time lands in the target stats. The pass is
//! O(pending queries + pending records) no matter how long a record has been
//! waiting.
//!
//! Query state machine: Free → Allocated (begin marked) → Ended (awaiting
//! availability) → Available (read) → Free.

use std::cell::RefCell;
use std::rc::Rc;

// ─── Backend seam ────────────────────────────────────────────────────────────

/// Opaque handle to one hardware timer query, issued by the backend.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TimerQuery(u32);

impl TimerQuery {
    /// Wraps a backend-chosen raw id.
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The backend-chosen raw id.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// The hardware capability the scheduler drives.
///
/// Implementations bracket spans of GPU commands with begin/end marks and
/// answer availability polls; results are reported in nanoseconds. A missing
/// capability is expressed by constructing the scheduler with `None`, never
/// by erroring at use time.
pub trait TimerBackend {
    fn create_query(&mut self) -> TimerQuery;
    fn delete_query(&mut self, query: TimerQuery);
    /// Marks the begin of `query` at the current command-stream position.
    fn begin_query(&mut self, query: TimerQuery);
    /// Marks the end of the most recently begun query.
    fn end_query(&mut self);
    /// Polls (never awaits) whether the result has landed.
    fn result_available(&mut self, query: TimerQuery) -> bool;
    /// Reads the elapsed time of an available query, in nanoseconds.
    fn result_ns(&mut self, query: TimerQuery) -> u64;
}

// ─── Stats targets ───────────────────────────────────────────────────────────

/// Accumulated profiling output for one command or scope.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ProfilingStats {
    /// Total measured GPU time, in milliseconds.
    pub gpu_time_ms: f64,
}

/// Shared handle to a stats target; held by the caller and by any records
/// still waiting on queries.
pub type StatsHandle = Rc<RefCell<ProfilingStats>>;

/// One unresolved profiling scope: a half-open range into the pending-query
/// sequence plus the time already accounted for. Ranges only shrink under
/// remapping; an empty range means the scope has fully resolved.
struct PendingStatsRecord {
    start: usize,
    end: usize,
    sum_ns: u64,
    stats: StatsHandle,
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

/// Owner of the query pool and the open profiling-scope records.
///
/// Driven once per frame via [`update`](Self::update), strictly after that
/// frame's graphics commands are flushed. Callers must pair `begin_query`
/// with `end_query` and must not interleave pairs across independently
/// progressing scopes.
pub struct TimerQueryScheduler<B: TimerBackend> {
    backend: B,
    free: Vec<TimerQuery>,
    pending: Vec<TimerQuery>,
    records: Vec<PendingStatsRecord>,
    // Scratch prefix tables reused across frames: prefix_ns[i] is the summed
    // time of resolved queries before index i, remap[i] the post-compaction
    // index of pending query i.
    prefix_ns: Vec<u64>,
    remap: Vec<usize>,
}

impl<B: TimerBackend> TimerQueryScheduler<B> {
    /// Creates a scheduler over the given backend, or `None` when the
    /// capability is absent — profiling silently disabled, not an error.
    pub fn create(backend: Option<B>) -> Option<Self> {
        Some(Self {
            backend: backend?,
            free: Vec::new(),
            pending: Vec::new(),
            records: Vec::new(),
            prefix_ns: Vec::new(),
            remap: Vec::new(),
        })
    }

    /// Opens a profiling scope covering exactly the next begin/end span and
    /// attributes it to `stats`.
    pub fn begin_query(&mut self, stats: &StatsHandle) {
        let query = self
            .free
            .pop()
            .unwrap_or_else(|| self.backend.create_query());
        self.backend.begin_query(query);
        self.pending.push(query);
        let end = self.pending.len();
        self.push_scope_stats(end - 1, end, stats);
    }

    /// Marks the end of the most recently begun query.
    pub fn end_query(&mut self) {
        self.backend.end_query();
    }

    /// Opens a record spanning `[start, end)` of the pending-query sequence.
    ///
    /// Used by scope profiling to attribute a run of already-submitted
    /// queries to one aggregate stats target; `begin_query` is the
    /// single-query special case.
    pub fn push_scope_stats(&mut self, start: usize, end: usize, stats: &StatsHandle) {
        debug_assert!(start <= end && end <= self.pending.len());
        self.records.push(PendingStatsRecord {
            start,
            end,
            sum_ns: 0,
            stats: Rc::clone(stats),
        });
    }

    /// Number of queries still awaiting results.
    #[must_use]
    pub fn pending_query_count(&self) -> usize {
        self.pending.len()
    }

    /// Polls pending queries once and settles every record whose range has
    /// fully resolved. Call once per frame, after the frame's commands are
    /// flushed.
    pub fn update(&mut self) {
        let n = self.pending.len();
        if n == 0 {
            return;
        }

        self.prefix_ns.clear();
        self.prefix_ns.resize(n + 1, 0);
        self.remap.clear();
        self.remap.resize(n + 1, 0);

        // Pass 1: resolved queries feed the prefix sum and return to the
        // free pool; unresolved ones compact forward, preserving order.
        let mut resolved_ns = 0u64;
        let mut write_ptr = 0usize;
        for i in 0..n {
            let query = self.pending[i];
            if self.backend.result_available(query) {
                resolved_ns += self.backend.result_ns(query);
                self.free.push(query);
            } else {
                self.pending[write_ptr] = query;
                write_ptr += 1;
            }
            self.prefix_ns[i + 1] = resolved_ns;
            self.remap[i + 1] = write_ptr;
        }
        self.pending.truncate(write_ptr);

        // Pass 2: each record absorbs the prefix-sum delta over its range,
        // then rewrites the range through the remap. An empty range means
        // every covered query has resolved.
        let mut keep = 0usize;
        for i in 0..self.records.len() {
            let (start, end) = (self.records[i].start, self.records[i].end);
            self.records[i].sum_ns += self.prefix_ns[end] - self.prefix_ns[start];
            let (new_start, new_end) = (self.remap[start], self.remap[end]);
            if new_start == new_end {
                let record = &self.records[i];
                record.stats.borrow_mut().gpu_time_ms += record.sum_ns as f64 / 1e6;
            } else {
                self.records[i].start = new_start;
                self.records[i].end = new_end;
                self.records.swap(keep, i);
                keep += 1;
            }
        }
        self.records.truncate(keep);
    }

    /// Context-loss teardown: deletes every pooled and in-flight query and
    /// drops all open records unresolved. Profiling data for the discarded
    /// span is lost, not reported as an error.
    pub fn clear(&mut self) {
        if !self.pending.is_empty() || !self.records.is_empty() {
            log::debug!(
                "discarding {} pending query(ies) and {} open record(s)",
                self.pending.len(),
                self.records.len()
            );
        }
        let pending = std::mem::take(&mut self.pending);
        self.free.extend(pending);
        for query in self.free.drain(..) {
            self.backend.delete_query(query);
        }
        self.records.clear();
    }

    /// Context-restore recovery: forgets all handles without touching the
    /// backend (the old context owned them) and drops open records.
    pub fn restore(&mut self) {
        if !self.pending.is_empty() || !self.records.is_empty() {
            log::debug!(
                "forgetting {} pending query(ies) and {} open record(s) after context loss",
                self.pending.len(),
                self.records.len()
            );
        }
        self.pending.clear();
        self.free.clear();
        self.records.clear();
    }
}
