//! Scheduler binding.
//!
//! A pipeline registers exactly one recurring task with the [`Scheduler`].
//! The scheduler decides when the task runs; each invocation calls
//! [`Topology::run_task`] with the pipeline handle stored in the
//! [`TaskSpec`], and the returned [`TaskState`] tells the scheduler whether
//! to keep the task armed.
//!
//! [`ManualScheduler`] is a deterministic implementation driven by explicit
//! clock advances. It is `Clone` over shared state so a test can keep a
//! handle while the topology owns another.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ScheduleError;
use crate::topology::{GraphId, Topology};

/// Handle to a scheduled task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(u32);

impl TaskId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// What drives the task's period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskKind {
    /// A platform timer.
    #[default]
    Timer,
    /// DMA completion interrupts.
    Dma,
}

/// Registration data for a pipeline task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    /// Period source.
    pub kind: TaskKind,
    /// Lower values run first when several tasks are due together.
    pub priority: u32,
    /// Core the task must run on.
    pub core: u32,
    /// Pipeline passed back to [`Topology::run_task`].
    pub graph: GraphId,
}

/// Outcome of one task invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Run again after one period.
    Reschedule,
    /// Stop; do not run again until re-armed.
    Completed,
}

/// Task scheduling service consumed by the topology.
pub trait Scheduler: Send {
    /// Registers a task without arming it.
    fn task_init(&mut self, spec: TaskSpec) -> Result<TaskId, ScheduleError>;

    /// Arms `task` to first run after `start_delay_us`, then every `period_us`.
    fn schedule(&mut self, task: TaskId, start_delay_us: u64, period_us: u32) -> Result<(), ScheduleError>;

    /// Disarms `task`. Cancelling a disarmed task is a no-op.
    fn cancel(&mut self, task: TaskId);

    /// Releases `task`.
    fn free(&mut self, task: TaskId);
}

#[derive(Debug)]
struct TaskEntry {
    spec: TaskSpec,
    armed: bool,
    next_due_us: u64,
    period_us: u32,
    runs: u64,
}

#[derive(Debug, Default)]
struct SchedInner {
    now_us: u64,
    tasks: Vec<Option<TaskEntry>>,
}

/// Deterministic scheduler advanced by hand.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    inner: Arc<Mutex<SchedInner>>,
}

impl ManualScheduler {
    /// Creates a scheduler with its clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current clock in microseconds.
    pub fn now_us(&self) -> u64 {
        self.inner.lock().now_us
    }

    /// Whether `task` is armed.
    pub fn is_armed(&self, task: TaskId) -> bool {
        self.with_task(task, |t| t.armed).unwrap_or(false)
    }

    /// How many times `task` has run.
    pub fn runs(&self, task: TaskId) -> u64 {
        self.with_task(task, |t| t.runs).unwrap_or(0)
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.inner.lock().tasks.iter().flatten().count()
    }

    fn with_task<R>(&self, task: TaskId, f: impl FnOnce(&TaskEntry) -> R) -> Option<R> {
        let inner = self.inner.lock();
        inner.tasks.get(task.0 as usize).and_then(Option::as_ref).map(f)
    }

    /// Advances the clock by `by_us`, running every task that falls due on `topology`.
    ///
    /// Returns the number of task invocations.
    pub fn advance(&self, topology: &mut Topology, by_us: u64) -> usize {
        let target = self.inner.lock().now_us + by_us;
        let mut invocations = 0;

        loop {
            let due = {
                let mut inner = self.inner.lock();
                let next = inner
                    .tasks
                    .iter()
                    .enumerate()
                    .filter_map(|(i, t)| t.as_ref().map(|t| (i, t)))
                    .filter(|(_, t)| t.armed && t.next_due_us <= target)
                    .min_by_key(|(_, t)| (t.next_due_us, t.spec.priority))
                    .map(|(i, t)| (i, t.next_due_us, t.spec.graph));
                if let Some((_, due_us, _)) = next {
                    inner.now_us = inner.now_us.max(due_us);
                } else {
                    inner.now_us = target;
                }
                next
            };
            let Some((index, _, graph)) = due else { break };

            // The lock is released while the task runs: the task may cancel
            // or re-arm itself through the topology's scheduler handle.
            let state = topology.run_task(graph);
            invocations += 1;

            let mut inner = self.inner.lock();
            let now = inner.now_us;
            if let Some(entry) = inner.tasks.get_mut(index).and_then(Option::as_mut) {
                entry.runs += 1;
                match state {
                    TaskState::Completed => entry.armed = false,
                    TaskState::Reschedule if entry.armed => {
                        let period = u64::from(entry.period_us.max(1));
                        entry.next_due_us = entry.next_due_us.max(now + period);
                    }
                    TaskState::Reschedule => {}
                }
            }
        }

        invocations
    }
}

impl Scheduler for ManualScheduler {
    fn task_init(&mut self, spec: TaskSpec) -> Result<TaskId, ScheduleError> {
        let mut inner = self.inner.lock();
        let id = u32::try_from(inner.tasks.len()).map_err(|_| ScheduleError::NoCapacity)?;
        inner.tasks.push(Some(TaskEntry {
            spec,
            armed: false,
            next_due_us: 0,
            period_us: 0,
            runs: 0,
        }));
        tracing::debug!(task = id, graph = %spec.graph, "task_init");
        Ok(TaskId(id))
    }

    fn schedule(&mut self, task: TaskId, start_delay_us: u64, period_us: u32) -> Result<(), ScheduleError> {
        let mut inner = self.inner.lock();
        let now = inner.now_us;
        let entry = inner
            .tasks
            .get_mut(task.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(ScheduleError::UnknownTask(task.0))?;
        entry.armed = true;
        entry.next_due_us = now + start_delay_us;
        entry.period_us = period_us;
        Ok(())
    }

    fn cancel(&mut self, task: TaskId) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.tasks.get_mut(task.0 as usize).and_then(Option::as_mut) {
            entry.armed = false;
        }
    }

    fn free(&mut self, task: TaskId) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.tasks.get_mut(task.0 as usize) {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TaskSpec {
        TaskSpec {
            kind: TaskKind::Timer,
            priority: 0,
            core: 0,
            graph: GraphId(0),
        }
    }

    #[test]
    fn test_schedule_and_cancel() {
        let mut sched = ManualScheduler::new();
        let task = sched.task_init(spec()).unwrap();
        assert!(!sched.is_armed(task));

        sched.schedule(task, 0, 1000).unwrap();
        assert!(sched.is_armed(task));

        sched.cancel(task);
        sched.cancel(task);
        assert!(!sched.is_armed(task));
    }

    #[test]
    fn test_free_forgets_task() {
        let mut sched = ManualScheduler::new();
        let task = sched.task_init(spec()).unwrap();
        sched.free(task);
        assert_eq!(sched.task_count(), 0);
        assert_eq!(sched.schedule(task, 0, 1000), Err(ScheduleError::UnknownTask(task.index())));
    }

    #[test]
    fn test_clones_share_tasks() {
        let mut sched = ManualScheduler::new();
        let handle = sched.clone();
        let task = sched.task_init(spec()).unwrap();
        sched.schedule(task, 0, 500).unwrap();
        assert!(handle.is_armed(task));
    }
}
