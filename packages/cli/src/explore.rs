//! Parallel Reachability
//!
//! ```text
//!            ┌────────────── shared queue (Mutex) ──────────────┐
//!            │  items: [ref, ref, ...]   busy: workers expanding │
//!            └───────┬──────────────────────────────▲───────────┘
//!                pop │                              │ push unseen successors
//!                    ▼                              │
//!   worker: unfold_tree(ref) ──► fold_projected(successor, group) per group
//! ```
//!
//! Only the fold that inserts a state (`seen == false`) enqueues it, so each
//! state is expanded once. With satellite bits available, bit 0 marks a state
//! as claimed before its expansion. Workers stop once the queue is empty and
//! no worker is still expanding.

use anyhow::{Context, Result};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};
use treedbs::{Stats, StoreResult, Tree, TreeDbs, TreeRef};

use crate::model::Counters;

/// Outcome of one exploration
#[derive(Debug)]
pub struct Report {
    /// Distinct states stored
    pub states: u64,
    /// States the model should have, if the count fits a u64
    pub expected: Option<u64>,
    /// Statistics of each worker thread
    pub per_thread: Vec<Stats>,
}

#[derive(Default)]
struct Queue {
    items: Vec<TreeRef>,
    busy: usize,
    aborted: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    ready: Condvar,
}

impl Shared {
    /// Next state to expand, or `None` when the search is over
    fn pop(&self) -> Option<TreeRef> {
        let mut queue = self.queue.lock();
        loop {
            if queue.aborted {
                return None;
            }
            if let Some(reference) = queue.items.pop() {
                queue.busy += 1;
                return Some(reference);
            }
            if queue.busy == 0 {
                return None;
            }
            self.ready.wait(&mut queue);
        }
    }

    fn finish(&self, found: &mut Vec<TreeRef>) {
        let mut queue = self.queue.lock();
        queue.busy -= 1;
        queue.items.append(found);
        if queue.busy == 0 || !queue.items.is_empty() {
            self.ready.notify_all();
        }
    }

    fn abort(&self) {
        self.queue.lock().aborted = true;
        self.ready.notify_all();
    }
}

/// Explore every state of `model` reachable from its initial state
pub fn explore(dbs: &TreeDbs, model: &Counters, threads: usize) -> Result<Report> {
    let threads = threads.max(1);
    let initial = dbs
        .fold(&model.initial())
        .context("storing the initial state")?;
    info!(threads, width = model.width(), "exploring");

    let shared = Shared {
        queue: Mutex::new(Queue {
            items: vec![initial.reference],
            ..Queue::default()
        }),
        ready: Condvar::new(),
    };

    let per_thread = std::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|id| {
                let shared = &shared;
                s.spawn(move || {
                    let outcome = worker(dbs, model, shared);
                    if outcome.is_err() {
                        shared.abort();
                    }
                    debug!(worker = id, "worker done");
                    outcome.map(|()| dbs.local_stats())
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(outcome) => outcome.context("worker failed"),
                Err(_) => Err(anyhow::anyhow!("worker panicked")),
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let report = Report {
        states: dbs.len(),
        expected: model.expected_states(),
        per_thread,
    };
    match report.expected {
        Some(expected) if expected != report.states => {
            warn!(states = report.states, expected, "state count differs from model")
        }
        _ => info!(states = report.states, "exploration complete"),
    }
    Ok(report)
}

fn worker(dbs: &TreeDbs, model: &Counters, shared: &Shared) -> StoreResult<()> {
    let n = dbs.vector_len();
    let mut prev = Tree::new(n);
    let mut next = Tree::new(n);
    let mut successor = Vec::with_capacity(n);
    let mut found = Vec::new();

    while let Some(reference) = shared.pop() {
        let expanded = expand(
            dbs,
            model,
            reference,
            &mut prev,
            &mut next,
            &mut successor,
            &mut found,
        );
        shared.finish(&mut found);
        expanded?;
    }
    Ok(())
}

fn expand(
    dbs: &TreeDbs,
    model: &Counters,
    reference: TreeRef,
    prev: &mut Tree,
    next: &mut Tree,
    successor: &mut Vec<i32>,
    found: &mut Vec<TreeRef>,
) -> StoreResult<()> {
    if dbs.sat_bits() > 0 && !dbs.try_set_sat_bit(reference, 0)? {
        return Ok(());
    }
    dbs.unfold_tree(reference, prev)?;
    for group in 0..model.groups() {
        model.successor(prev.state(), group, successor);
        let folded = dbs.fold_projected(successor, prev, next, group)?;
        if !folded.seen {
            found.push(folded.reference);
        }
    }
    Ok(())
}
