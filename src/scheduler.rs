//! Tick-driven task scheduler
//!
//! Jobs are plain data (job id, interval, callback) registered into one
//! table. The host's tick loop calls [`TaskScheduler::tick`]; the scheduler
//! itself never spawns threads. Callbacks run with the table unlocked so
//! they may schedule, reschedule or cancel tasks, including their own.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

/// Name of a registered job
pub type JobId = &'static str;

/// Well-known job ids
pub mod jobs {
    use super::JobId;

    pub const MAP_OVERLAY: JobId = "map_overlay";
    pub const STATUS_BAR: JobId = "status_bar";
    pub const LOAD_MONITOR: JobId = "load_monitor";
    pub const STALE_SWEEP: JobId = "stale_sweep";
    pub const TELEPORT: JobId = "teleport";
    pub const DEFERRED: JobId = "deferred";
}

/// Callback invoked with the current tick number
pub type TaskCallback = Arc<dyn Fn(u64) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Task {task_id} ({job}) is not scheduled")]
    UnknownTask { task_id: u64, job: JobId },
}

/// Handle to one registration of a job.
///
/// A reschedule invalidates the handle and issues a new one; task ids are
/// never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    task_id: u64,
    job: JobId,
    interval_ticks: u32,
    repeating: bool,
}

impl TaskHandle {
    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn interval_ticks(&self) -> u32 {
        self.interval_ticks
    }

    pub fn is_repeating(&self) -> bool {
        self.repeating
    }
}

struct ScheduledTask {
    handle: TaskHandle,
    next_run: u64,
    callback: TaskCallback,
}

#[derive(Default)]
struct SchedulerInner {
    current_tick: u64,
    next_task_id: u64,
    tasks: FxHashMap<u64, ScheduledTask>,
}

impl SchedulerInner {
    fn insert(&mut self, job: JobId, interval_ticks: u32, repeating: bool, callback: TaskCallback) -> TaskHandle {
        self.next_task_id += 1;
        let interval_ticks = interval_ticks.max(1);
        let handle = TaskHandle {
            task_id: self.next_task_id,
            job,
            interval_ticks,
            repeating,
        };
        self.tasks.insert(
            handle.task_id,
            ScheduledTask {
                handle: handle.clone(),
                next_run: self.current_tick + interval_ticks as u64,
                callback,
            },
        );
        handle
    }
}

/// Runs named repeating and one-shot jobs on the host tick
#[derive(Default)]
pub struct TaskScheduler {
    inner: Mutex<SchedulerInner>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job that first runs `interval_ticks` from now.
    ///
    /// Intervals of zero are treated as one tick.
    pub fn schedule<F>(&self, job: JobId, interval_ticks: u32, repeating: bool, callback: F) -> TaskHandle
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let handle = self
            .inner
            .lock()
            .insert(job, interval_ticks, repeating, Arc::new(callback));
        debug!(
            "Scheduled {} as task {} every {} ticks (repeating={})",
            job, handle.task_id, handle.interval_ticks, repeating
        );
        handle
    }

    /// Run `callback` once after `delay_ticks`
    pub fn schedule_once<F>(&self, delay_ticks: u32, callback: F) -> TaskHandle
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.schedule_once_as(jobs::DEFERRED, delay_ticks, callback)
    }

    /// Run `callback` once after `delay_ticks`, labelled with `job`
    pub fn schedule_once_as<F>(&self, job: JobId, delay_ticks: u32, callback: F) -> TaskHandle
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.inner
            .lock()
            .insert(job, delay_ticks, false, Arc::new(callback))
    }

    /// Cancel `handle` and register the same callback with a new interval.
    ///
    /// Once this returns the old registration can no longer start a run,
    /// even if it was due in the tick currently executing.
    pub fn reschedule(&self, handle: &TaskHandle, new_interval_ticks: u32) -> Result<TaskHandle, SchedulerError> {
        let mut inner = self.inner.lock();
        let old = inner
            .tasks
            .remove(&handle.task_id)
            .ok_or(SchedulerError::UnknownTask {
                task_id: handle.task_id,
                job: handle.job,
            })?;

        let new_handle = inner.insert(
            old.handle.job,
            new_interval_ticks,
            old.handle.repeating,
            old.callback,
        );
        debug!(
            "Rescheduled {} from task {} ({} ticks) to task {} ({} ticks)",
            new_handle.job,
            old.handle.task_id,
            old.handle.interval_ticks,
            new_handle.task_id,
            new_handle.interval_ticks
        );
        Ok(new_handle)
    }

    /// Returns false if the handle was not scheduled
    pub fn cancel(&self, handle: &TaskHandle) -> bool {
        self.inner.lock().tasks.remove(&handle.task_id).is_some()
    }

    /// Drop every registration. Returns how many were removed.
    pub fn cancel_all(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.tasks.len();
        inner.tasks.clear();
        count
    }

    pub fn is_scheduled(&self, handle: &TaskHandle) -> bool {
        self.inner.lock().tasks.contains_key(&handle.task_id)
    }

    /// Interval of a live registration
    pub fn interval_of(&self, handle: &TaskHandle) -> Option<u32> {
        self.inner
            .lock()
            .tasks
            .get(&handle.task_id)
            .map(|task| task.handle.interval_ticks)
    }

    pub fn current_tick(&self) -> u64 {
        self.inner.lock().current_tick
    }

    pub fn task_count(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    /// Advance one tick and run every due task.
    ///
    /// Returns the number of callbacks invoked.
    pub fn tick(&self) -> usize {
        let (tick, mut due) = {
            let mut inner = self.inner.lock();
            inner.current_tick += 1;
            let tick = inner.current_tick;
            let due: Vec<(u64, u64)> = inner
                .tasks
                .values()
                .filter(|task| task.next_run <= tick)
                .map(|task| (task.next_run, task.handle.task_id))
                .collect();
            (tick, due)
        };
        due.sort_unstable();

        let mut ran = 0;
        for (_, task_id) in due {
            // Re-check under the lock: an earlier callback in this tick may
            // have cancelled or rescheduled this task.
            let callback = {
                let mut inner = self.inner.lock();
                let Some(task) = inner.tasks.get_mut(&task_id) else {
                    trace!("Task {} vanished before running", task_id);
                    continue;
                };
                let callback = Arc::clone(&task.callback);
                if task.handle.repeating {
                    task.next_run = tick + task.handle.interval_ticks as u64;
                } else {
                    inner.tasks.remove(&task_id);
                }
                callback
            };

            callback(tick);
            ran += 1;
        }

        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn(u64) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn run_ticks(scheduler: &TaskScheduler, n: usize) {
        for _ in 0..n {
            scheduler.tick();
        }
    }

    #[test]
    fn test_repeating_task_fires_every_interval() {
        let scheduler = TaskScheduler::new();
        let (count, cb) = counter();
        scheduler.schedule(jobs::MAP_OVERLAY, 5, true, cb);

        run_ticks(&scheduler, 4);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        run_ticks(&scheduler, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        run_ticks(&scheduler, 10);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_one_shot_fires_once() {
        let scheduler = TaskScheduler::new();
        let (count, cb) = counter();
        let handle = scheduler.schedule_once(3, cb);

        run_ticks(&scheduler, 10);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_scheduled(&handle));
        assert_eq!(scheduler.task_count(), 0);
    }

    #[test]
    fn test_callback_receives_tick() {
        let scheduler = TaskScheduler::new();
        let seen = Arc::new(AtomicU64::new(0));
        let s = Arc::clone(&seen);
        scheduler.schedule_once(7, move |tick| s.store(tick, Ordering::SeqCst));

        run_ticks(&scheduler, 7);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_zero_interval_clamped() {
        let scheduler = TaskScheduler::new();
        let (count, cb) = counter();
        let handle = scheduler.schedule(jobs::STATUS_BAR, 0, true, cb);

        assert_eq!(handle.interval_ticks(), 1);
        run_ticks(&scheduler, 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cancel() {
        let scheduler = TaskScheduler::new();
        let (count, cb) = counter();
        let handle = scheduler.schedule(jobs::MAP_OVERLAY, 1, true, cb);

        run_ticks(&scheduler, 2);
        assert!(scheduler.cancel(&handle));
        assert!(!scheduler.cancel(&handle));
        run_ticks(&scheduler, 5);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reschedule_changes_interval() {
        let scheduler = TaskScheduler::new();
        let (count, cb) = counter();
        let old = scheduler.schedule(jobs::MAP_OVERLAY, 5, true, cb);

        run_ticks(&scheduler, 5);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let new = scheduler.reschedule(&old, 10).unwrap();
        assert_ne!(new.task_id(), old.task_id());
        assert_eq!(new.job(), jobs::MAP_OVERLAY);
        assert!(new.is_repeating());
        assert!(!scheduler.is_scheduled(&old));
        assert_eq!(scheduler.interval_of(&new), Some(10));

        run_ticks(&scheduler, 9);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        run_ticks(&scheduler, 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reschedule_unknown_handle() {
        let scheduler = TaskScheduler::new();
        let (_, cb) = counter();
        let handle = scheduler.schedule(jobs::STATUS_BAR, 5, true, cb);
        let new = scheduler.reschedule(&handle, 10).unwrap();

        // The old handle is spent
        assert_eq!(
            scheduler.reschedule(&handle, 20),
            Err(SchedulerError::UnknownTask {
                task_id: handle.task_id(),
                job: jobs::STATUS_BAR,
            })
        );
        assert_eq!(scheduler.interval_of(&new), Some(10));
    }

    #[test]
    fn test_reschedule_during_tick_blocks_old_run() {
        let scheduler = Arc::new(TaskScheduler::new());
        let (count, cb) = counter();

        // Controller registered first so it runs before the target in the same tick
        let target_slot: Arc<PlMutex<Option<TaskHandle>>> = Arc::new(PlMutex::new(None));
        let slot = Arc::clone(&target_slot);
        let sched = Arc::clone(&scheduler);
        scheduler.schedule(jobs::LOAD_MONITOR, 4, false, move |_| {
            let mut slot = slot.lock();
            if let Some(handle) = slot.take() {
                *slot = sched.reschedule(&handle, 8).ok();
            }
        });
        let target = scheduler.schedule(jobs::MAP_OVERLAY, 4, true, cb);
        *target_slot.lock() = Some(target);

        run_ticks(&scheduler, 4);
        // Both were due at tick 4; the reschedule must suppress the old run
        assert_eq!(count.load(Ordering::SeqCst), 0);

        run_ticks(&scheduler, 8);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_can_schedule_from_inside_tick() {
        let scheduler = Arc::new(TaskScheduler::new());
        let (count, cb) = counter();
        let cb = Arc::new(cb);
        let sched = Arc::clone(&scheduler);
        scheduler.schedule(jobs::LOAD_MONITOR, 2, false, move |_| {
            let cb = Arc::clone(&cb);
            sched.schedule_once(1, move |tick| cb(tick));
        });

        run_ticks(&scheduler, 2);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        run_ticks(&scheduler, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_all() {
        let scheduler = TaskScheduler::new();
        let (count, cb) = counter();
        let cb = Arc::new(cb);
        for job in [jobs::MAP_OVERLAY, jobs::STATUS_BAR] {
            let cb = Arc::clone(&cb);
            scheduler.schedule(job, 1, true, move |tick| cb(tick));
        }

        assert_eq!(scheduler.cancel_all(), 2);
        run_ticks(&scheduler, 3);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.current_tick(), 3);
    }
}
