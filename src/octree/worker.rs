//! Parallel adaptive subdivision driver
//!
//! `build` spawns a fixed set of OS worker threads over a shared
//! bounded task ring. Each worker drains its own LIFO stack before the
//! shared ring (keeping subtrees hot in one thread), classifies cells
//! by interval evaluation, expands ambiguous cells, evaluates leaves,
//! and bubbles completion upward through `collect_children`. The worker
//! that bubbles past the root flips the shared `done` flag; everyone
//! else observes it at the loop head and exits, handing their cell
//! pool to the root under a single mutex.
//!
//! Author: Moroya Sakamoto

use super::cell::{Cell, CellKind};
use super::neighbors::Neighbors;
use super::pool::{BuildStats, CellPool, Root};
use super::progress::{subtree_ticks, ProgressCallback, ProgressHandler};
use super::queue::TaskRing;
use super::region::Region3;
use crate::tape::{CompileError, FieldEvaluator, Tape};
use crate::types::SdfNode;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Shared ring slots per worker
const RING_SLOTS_PER_WORKER: usize = 64;

/// Settings for an octree build
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Smallest desired cell edge; sets the root subdivision level
    pub min_feature: f32,
    /// Merge tolerance for parent collection (QEF residual)
    pub max_err: f32,
    /// Number of worker threads
    pub workers: usize,
    /// Epsilon for central-difference normals
    pub gradient_epsilon: f32,
    /// Bisection iterations for edge crossings
    pub bisection_iterations: u32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            min_feature: 0.1,
            max_err: 1e-8,
            workers: rayon::current_num_threads().max(1),
            gradient_epsilon: 1e-3,
            bisection_iterations: 8,
        }
    }
}

/// Hook for donating idle worker time to an external scheduler
pub trait FreeThreadHandler {
    /// Called whenever a worker finds no pending task; may block until
    /// external work completes.
    fn offer_wait(&self);
}

/// One pending cell expansion
struct Task {
    target: Arc<Cell>,
    tape: Arc<Tape>,
    region: Region3,
    parent_neighbors: Neighbors,
}

/// Build an adaptive octree of the field over `region`.
///
/// Constructs one evaluator per worker and runs to completion; not
/// cancellable. See [`build_cancellable`] for the full surface.
///
/// # Panics
///
/// Panics if the expression is too deep to compile (see
/// [`Tape::try_compile`]); use [`try_build`] to handle that case.
pub fn build(node: &SdfNode, region: Region3, config: &BuildConfig) -> Root {
    let cancel = Arc::new(AtomicBool::new(false));
    build_cancellable(node, region, config, &cancel, None)
}

/// Fallible variant of [`build`]
pub fn try_build(
    node: &SdfNode,
    region: Region3,
    config: &BuildConfig,
) -> Result<Root, CompileError> {
    let tape = Tape::try_compile(node)?;
    let cancel = Arc::new(AtomicBool::new(false));
    let mut evaluators = make_evaluators(tape, config.workers);
    Ok(build_with_evaluators(
        &mut evaluators,
        region,
        config,
        &cancel,
        None,
        0.0,
        None,
    ))
}

/// Build with an externally settable cancellation flag and an optional
/// progress callback (reported as phase 0 of a pipeline).
pub fn build_cancellable(
    node: &SdfNode,
    region: Region3,
    config: &BuildConfig,
    cancel: &Arc<AtomicBool>,
    progress: Option<ProgressCallback>,
) -> Root {
    let tape = Tape::compile(node);
    let mut evaluators = make_evaluators(tape, config.workers);
    let handler = progress.map(ProgressHandler::new);
    build_with_evaluators(
        &mut evaluators,
        region,
        config,
        cancel,
        handler.as_ref(),
        0.0,
        None,
    )
}

/// One evaluator per worker, all sharing the compiled root tape
pub fn make_evaluators(tape: Arc<Tape>, workers: usize) -> Vec<FieldEvaluator> {
    (0..workers.max(1))
        .map(|_| FieldEvaluator::from_tape(tape.clone()))
        .collect()
}

/// Build with borrowed evaluators — the full surface.
///
/// The worker count is the evaluator count. `phase_offset` positions
/// this build's progress window inside a multi-phase pipeline.
/// Cancellation yields an empty root; nothing partial escapes.
pub fn build_with_evaluators(
    evaluators: &mut [FieldEvaluator],
    region: Region3,
    config: &BuildConfig,
    cancel: &Arc<AtomicBool>,
    progress: Option<&ProgressHandler>,
    phase_offset: f32,
    free_thread_handler: Option<&(dyn FreeThreadHandler + Sync)>,
) -> Root {
    assert!(!evaluators.is_empty(), "at least one evaluator required");

    let region = region.with_resolution(config.min_feature);
    let root_cell = Cell::new_root(region);

    let done = AtomicBool::new(false);
    let tasks: TaskRing<Task> = TaskRing::with_capacity(evaluators.len() * RING_SLOTS_PER_WORKER);
    let root_tape = evaluators[0].root_tape().clone();
    if tasks
        .bounded_push(Task {
            target: root_cell.clone(),
            tape: root_tape,
            region,
            parent_neighbors: Neighbors::empty(),
        })
        .is_err()
    {
        unreachable!("fresh ring rejected the root task");
    }

    let ticks = Arc::new(AtomicU64::new(0));
    let ticks_total = subtree_ticks(region.level);
    let watcher = progress.map(|h| h.watch(ticks.clone(), ticks_total, phase_offset, cancel));

    let pools: Mutex<Vec<CellPool>> = Mutex::new(Vec::with_capacity(evaluators.len()));

    std::thread::scope(|scope| {
        let handles: Vec<_> = evaluators
            .iter_mut()
            .map(|evaluator| {
                let tasks = &tasks;
                let done = &done;
                let ticks = &ticks;
                let pools = &pools;
                let cancel = cancel.as_ref();
                scope.spawn(move || {
                    run_worker(
                        evaluator,
                        tasks,
                        config,
                        done,
                        cancel,
                        ticks,
                        pools,
                        free_thread_handler,
                    )
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread panicked");
        }
    });

    debug_assert!(done.load(Ordering::Acquire) || cancel.load(Ordering::Acquire));

    if let Some(watcher) = watcher {
        watcher.finish();
    }

    if cancel.load(Ordering::Acquire) {
        return Root::empty();
    }

    let pools = pools.into_inner().unwrap_or_else(|e| e.into_inner());
    let stats = compute_stats(&root_cell, &pools, ticks.load(Ordering::Acquire), ticks_total);
    Root::assemble(root_cell, pools, stats)
}

/// The worker loop: pop, classify, expand or leaf-evaluate, then
/// bubble completion upward.
#[allow(clippy::too_many_arguments)]
fn run_worker(
    evaluator: &mut FieldEvaluator,
    tasks: &TaskRing<Task>,
    config: &BuildConfig,
    done: &AtomicBool,
    cancel: &AtomicBool,
    ticks: &AtomicU64,
    pools: &Mutex<Vec<CellPool>>,
    free_thread_handler: Option<&(dyn FreeThreadHandler + Sync)>,
) {
    // Tasks kept local when the shared ring is full; drained first to
    // stay depth-first within this thread.
    let mut local: Vec<Task> = Vec::new();
    let mut pool = CellPool::new();

    while !done.load(Ordering::Acquire) && !cancel.load(Ordering::Acquire) {
        let Some(task) = local.pop().or_else(|| tasks.pop()) else {
            if let Some(handler) = free_thread_handler {
                handler.offer_wait();
            }
            std::thread::yield_now();
            continue;
        };

        let Task {
            target,
            mut tape,
            region,
            parent_neighbors,
        } = task;

        // Resolve neighbors at the last minute, giving siblings time to
        // publish their own children.
        let neighbors = match target.parent_arc() {
            Some(parent) => parent_neighbors.push(
                target.parent_index(),
                parent.children().expect("parent published before queueing"),
            ),
            None => Neighbors::empty(),
        };

        if region.level > 0 {
            tape = target.eval_interval(evaluator, &tape, &region);

            if target.kind() == CellKind::Ambiguous {
                // Publish all eight children before queueing any task,
                // so sibling tasks can look them up.
                let child_regions = region.subdivide();
                let children: [Arc<Cell>; 8] =
                    std::array::from_fn(|i| pool.alloc(&target, i as u8, child_regions[i]));
                target.set_children(children.clone());

                for (i, child) in children.into_iter().enumerate() {
                    let next = Task {
                        target: child,
                        tape: tape.clone(),
                        region: child_regions[i],
                        parent_neighbors: neighbors.clone(),
                    };
                    if let Err(next) = tasks.bounded_push(next) {
                        local.push(next);
                    }
                }
                continue;
            }

            // Homogeneous: the whole would-be subtree completes at once
            ticks.fetch_add(subtree_ticks(region.level), Ordering::Relaxed);
        } else {
            target.eval_leaf(evaluator, &tape, &region, &neighbors, config);
            ticks.fetch_add(1, Ordering::Relaxed);
        }

        // Bubble up: ask each ancestor in turn to collect its children,
        // restoring the wider tape on the way.
        let mut current = target;
        let mut current_region = region;
        let mut current_tape = tape;
        loop {
            let Some(parent) = current.parent_arc() else {
                // Walked past the root: the tree is complete
                done.store(true, Ordering::Release);
                break;
            };
            current_region = current_region.parent_region(current.parent_index());
            current_tape = Tape::get_base(&current_tape, &current_region.aabb());
            if !parent.collect_children(evaluator, &current_tape, &current_region, config) {
                break;
            }
            ticks.fetch_add(1, Ordering::Relaxed);
            current = parent;
        }
    }

    // Hand this thread's cells to the root
    pools
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(pool);
}

/// Classify the finished tree in parallel for the root's statistics
fn compute_stats(
    root_cell: &Arc<Cell>,
    pools: &[CellPool],
    ticks_emitted: u64,
    ticks_total: u64,
) -> BuildStats {
    let (leaf_count, branch_count, collapsed_count) = pools
        .par_iter()
        .flat_map(|p| p.cells().par_iter())
        .chain(rayon::iter::once(root_cell))
        .map(|cell| {
            (
                cell.is_leaf() as usize,
                cell.is_branch() as usize,
                cell.is_collapsed() as usize,
            )
        })
        .reduce(
            || (0, 0, 0),
            |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2),
        );

    BuildStats {
        cell_count: 1 + pools.iter().map(CellPool::len).sum::<usize>(),
        leaf_count,
        branch_count,
        collapsed_count,
        ticks_emitted,
        ticks_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::sync::atomic::AtomicUsize;

    fn unit_region() -> Region3 {
        Region3::from_bounds(Vec3::splat(-1.0), Vec3::splat(1.0))
    }

    #[test]
    fn test_build_sphere_classifies_everything() {
        let shape = SdfNode::sphere(0.6);
        let config = BuildConfig {
            min_feature: 0.25,
            workers: 2,
            ..Default::default()
        };
        let root = build(&shape, unit_region(), &config);
        assert!(!root.is_empty());

        for cell in root.iter_cells() {
            assert_ne!(cell.kind(), CellKind::Unknown);
            // Live children exist only under ambiguous cells above leaf level
            if cell.is_branch() {
                assert_eq!(cell.kind(), CellKind::Ambiguous);
                assert!(cell.region().level > 0);
            }
        }
    }

    #[test]
    fn test_tick_conservation() {
        let shape = SdfNode::sphere(0.6);
        for workers in [1, 2, 4] {
            let config = BuildConfig {
                min_feature: 0.2,
                workers,
                ..Default::default()
            };
            let root = build(&shape, unit_region(), &config);
            let stats = root.stats();
            assert_eq!(
                stats.ticks_emitted, stats.ticks_total,
                "workers={}: emitted {} of {}",
                workers, stats.ticks_emitted, stats.ticks_total
            );
        }
    }

    #[test]
    fn test_empty_field_completes_immediately() {
        let shape = SdfNode::sphere(0.1).translate(50.0, 0.0, 0.0);
        let config = BuildConfig {
            min_feature: 0.05,
            workers: 4,
            ..Default::default()
        };
        let root = build(&shape, unit_region(), &config);
        let cell = root.cell().unwrap();
        assert_eq!(cell.kind(), CellKind::Empty);
        assert!(cell.is_leaf());
        assert_eq!(root.stats().ticks_emitted, root.stats().ticks_total);
    }

    #[test]
    fn test_level_zero_root() {
        // min_feature larger than the region: a single leaf cell
        let shape = SdfNode::sphere(0.6);
        let config = BuildConfig {
            min_feature: 5.0,
            workers: 1,
            ..Default::default()
        };
        let root = build(&shape, unit_region(), &config);
        let stats = *root.stats();
        assert_eq!(stats.cell_count, 1);
        assert_eq!(stats.ticks_total, 1);
        assert_eq!(stats.ticks_emitted, 1);
    }

    #[test]
    fn test_free_thread_handler_sees_idle_workers() {
        struct Counter(AtomicUsize);
        impl FreeThreadHandler for Counter {
            fn offer_wait(&self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let shape = SdfNode::sphere(0.6);
        let config = BuildConfig {
            min_feature: 0.1,
            workers: 4,
            ..Default::default()
        };
        let tape = Tape::compile(&shape);
        let mut evaluators = make_evaluators(tape, config.workers);
        let cancel = Arc::new(AtomicBool::new(false));
        let handler = Counter(AtomicUsize::new(0));

        let root = build_with_evaluators(
            &mut evaluators,
            unit_region(),
            &config,
            &cancel,
            None,
            0.0,
            Some(&handler),
        );
        assert!(!root.is_empty());
        // With 4 workers and a single root task, somebody idled
        assert!(handler.0.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_cancel_before_start_yields_empty_root() {
        let shape = SdfNode::sphere(0.6);
        let config = BuildConfig {
            min_feature: 0.1,
            workers: 2,
            ..Default::default()
        };
        let cancel = Arc::new(AtomicBool::new(true));
        let root = build_cancellable(&shape, unit_region(), &config, &cancel, None);
        assert!(root.is_empty());
    }
}
