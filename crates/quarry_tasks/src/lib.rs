//! # Quarry Task Scheduler
//!
//! Tick-anchored scheduling for plugin work. Tasks are plain closures over
//! the game context, owned by a [`PluginId`], and run strictly inside the
//! tick's task phase on the tick thread, never concurrently with the
//! simulation and never interleaved with each other.
//!
//! A repeating task runs at most once per tick. When the tick loop stalls
//! and resumes late, the task fires once and its schedule continues from
//! the tick it actually ran in; there is no retroactive catch-up burst.
//!
//! The scheduler handle is `Clone` and callable from inside a running task,
//! so a task may schedule or cancel other tasks (or itself) mid-phase.
//! Cancellation is effective before the task would next run: a task
//! cancelled during the phase it is due in does not run.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, error};

pub use quarry_events::PluginId;

/// What a task's closure tells the scheduler after running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskControl {
    /// Keep the schedule (no-op for one-shot tasks).
    Continue,
    /// Drop the task; a repeating task will not fire again.
    Cancel,
}

/// Handle to a scheduled task, usable for targeted cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("repeating task {0:?} must have a non-zero period")]
    InvalidPeriod(String),
}

/// Summary of one task phase.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskPhaseReport {
    pub executed: usize,
    pub failures: usize,
}

/// Scheduler counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchedulerStats {
    pub pending_tasks: usize,
    pub tasks_executed: u64,
    pub task_failures: u64,
}

type TaskFn<Ctx> = Box<dyn FnMut(&mut Ctx) -> TaskControl + Send>;

struct ScheduledTask<Ctx> {
    handle: TaskHandle,
    owner: PluginId,
    name: String,
    due_tick: u64,
    period: Option<u32>,
    work: TaskFn<Ctx>,
}

struct SchedulerState<Ctx> {
    tasks: HashMap<u64, ScheduledTask<Ctx>>,
    next_handle: u64,
    /// Tick the scheduler last ran (or is running) a phase for; new
    /// delays are anchored to it.
    current_tick: u64,
    /// Set while `run_due` is extracting and executing.
    in_phase: bool,
    /// Handles extracted for the running phase, so `cancel` can tell a
    /// due-but-not-yet-run task from an unknown handle.
    extracted: HashSet<u64>,
    /// Cancellations arriving mid-phase, honored before each task runs
    /// and before a repeating task is rescheduled.
    cancelled_mid_phase: HashSet<u64>,
    owners_cancelled_mid_phase: HashSet<PluginId>,
    tasks_executed: u64,
    task_failures: u64,
}

/// Tick-anchored task scheduler over a context type `Ctx`.
///
/// Cloning is cheap and shares the underlying task table. The lock is never
/// held while task code runs, so tasks may call back into the scheduler.
pub struct TaskScheduler<Ctx> {
    state: Arc<Mutex<SchedulerState<Ctx>>>,
}

impl<Ctx> Clone for TaskScheduler<Ctx> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<Ctx: 'static> Default for TaskScheduler<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Ctx: 'static> TaskScheduler<Ctx> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState {
                tasks: HashMap::new(),
                next_handle: 0,
                current_tick: 0,
                in_phase: false,
                extracted: HashSet::new(),
                cancelled_mid_phase: HashSet::new(),
                owners_cancelled_mid_phase: HashSet::new(),
                tasks_executed: 0,
                task_failures: 0,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState<Ctx>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedules `work` to run once, `delay_ticks` ticks from now.
    ///
    /// Delay 0 means the next task phase (the current one, if scheduling
    /// happens between ticks).
    pub fn schedule_once<F>(
        &self,
        owner: PluginId,
        name: &str,
        delay_ticks: u64,
        work: F,
    ) -> TaskHandle
    where
        F: FnMut(&mut Ctx) -> TaskControl + Send + 'static,
    {
        self.insert(owner, name, delay_ticks, None, Box::new(work))
    }

    /// Schedules `work` to run every `period_ticks`, starting after
    /// `delay_ticks`. The period must be non-zero.
    pub fn schedule_repeating<F>(
        &self,
        owner: PluginId,
        name: &str,
        delay_ticks: u64,
        period_ticks: u32,
        work: F,
    ) -> Result<TaskHandle, TaskError>
    where
        F: FnMut(&mut Ctx) -> TaskControl + Send + 'static,
    {
        if period_ticks == 0 {
            return Err(TaskError::InvalidPeriod(name.to_string()));
        }
        Ok(self.insert(owner, name, delay_ticks, Some(period_ticks), Box::new(work)))
    }

    fn insert(
        &self,
        owner: PluginId,
        name: &str,
        delay_ticks: u64,
        period: Option<u32>,
        work: TaskFn<Ctx>,
    ) -> TaskHandle {
        let mut state = self.lock();
        let handle = TaskHandle(state.next_handle);
        state.next_handle += 1;
        let due_tick = state.current_tick + delay_ticks;
        state.tasks.insert(
            handle.0,
            ScheduledTask {
                handle,
                owner,
                name: name.to_string(),
                due_tick,
                period,
                work,
            },
        );
        debug!(
            "Scheduled task {:?} for {owner}: due tick {due_tick}, period {period:?}",
            name
        );
        handle
    }

    /// Cancels one task. Returns whether a pending task was found.
    ///
    /// If the task is due in the currently running phase but has not run
    /// yet, it will not run.
    pub fn cancel(&self, handle: TaskHandle) -> bool {
        let mut state = self.lock();
        if state.tasks.remove(&handle.0).is_some() {
            return true;
        }
        if state.in_phase && state.extracted.contains(&handle.0) {
            state.cancelled_mid_phase.insert(handle.0);
            return true;
        }
        false
    }

    /// Removes every task owned by `owner`, including ones due but not yet
    /// run in the current phase. Called automatically on plugin unload.
    pub fn cancel_all(&self, owner: PluginId) -> usize {
        let mut state = self.lock();
        let before = state.tasks.len();
        state.tasks.retain(|_, t| t.owner != owner);
        let removed = before - state.tasks.len();
        if state.in_phase {
            state.owners_cancelled_mid_phase.insert(owner);
        }
        if removed > 0 {
            debug!("Cancelled {removed} pending tasks owned by {owner}");
        }
        removed
    }

    /// Runs every task due at `current_tick`, in due-tick then scheduling
    /// order. Panics are isolated: the failure is logged and, for a
    /// repeating task, the schedule continues.
    pub fn run_due(&self, current_tick: u64, ctx: &mut Ctx) -> TaskPhaseReport {
        let mut due = {
            let mut state = self.lock();
            state.current_tick = current_tick;
            state.in_phase = true;
            state.cancelled_mid_phase.clear();
            state.owners_cancelled_mid_phase.clear();

            let due_handles: Vec<u64> = state
                .tasks
                .values()
                .filter(|t| t.due_tick <= current_tick)
                .map(|t| t.handle.0)
                .collect();
            let mut due: Vec<ScheduledTask<Ctx>> = due_handles
                .iter()
                .filter_map(|h| state.tasks.remove(h))
                .collect();
            due.sort_by_key(|t| (t.due_tick, t.handle.0));
            state.extracted = due.iter().map(|t| t.handle.0).collect();
            due
        };

        let mut report = TaskPhaseReport::default();
        for mut task in due.drain(..) {
            {
                let state = self.lock();
                if state.cancelled_mid_phase.contains(&task.handle.0)
                    || state.owners_cancelled_mid_phase.contains(&task.owner)
                {
                    continue;
                }
            }

            report.executed += 1;
            let control = catch_unwind(AssertUnwindSafe(|| (task.work)(ctx)));
            let control = match control {
                Ok(control) => control,
                Err(_) => {
                    report.failures += 1;
                    error!(
                        "Task {:?} (owner {}) panicked at tick {current_tick}; isolating",
                        task.name, task.owner
                    );
                    TaskControl::Continue
                }
            };

            if let (Some(period), TaskControl::Continue) = (task.period, control) {
                let mut state = self.lock();
                let cancelled = state.cancelled_mid_phase.contains(&task.handle.0)
                    || state.owners_cancelled_mid_phase.contains(&task.owner);
                if !cancelled {
                    // Anchor the next run to the tick this one ran in.
                    task.due_tick = current_tick + u64::from(period);
                    state.tasks.insert(task.handle.0, task);
                }
            }
        }

        let mut state = self.lock();
        state.in_phase = false;
        state.extracted.clear();
        state.cancelled_mid_phase.clear();
        state.owners_cancelled_mid_phase.clear();
        state.tasks_executed += report.executed as u64;
        state.task_failures += report.failures as u64;
        report
    }

    /// Drops every pending task regardless of owner; used at shutdown.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.tasks.len();
        state.tasks.clear();
        removed
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.lock();
        SchedulerStats {
            pending_tasks: state.tasks.len(),
            tasks_executed: state.tasks_executed,
            task_failures: state.task_failures,
        }
    }
}
