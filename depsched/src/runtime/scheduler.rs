use crate::dependency::{
    self, Dependency, DependencyResolver, Registration, Resolution, ResolverRegistry,
};
use crate::error::SchedulerError;
use crate::queue::{QueueId, QueueSet};
use crate::runtime::SchedulerConfig;
use crate::shared::Shared;
use crate::stats::SchedulerStats;
use crate::task::core::Attach;
use crate::task::harness;
use crate::task::{
    FnPayload, Join, MAX_DEPENDENCIES, Payload, RunContext, TaskHandle, TaskId, TaskState,
};
use std::any::Any;
use std::ops::Deref;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Debug)]
pub struct Scheduler {
    /// Runtime configuration, shared with every worker.
    pub(crate) cfg: SchedulerConfig,

    /// Task storage, ready queues and counters.
    pub(crate) shared: Arc<Shared>,

    pub(crate) resolvers: ResolverRegistry,
}

impl Scheduler {
    pub(crate) fn new(cfg: SchedulerConfig) -> Self {
        let shared = Arc::new(Shared::new(cfg.arena_capacity));

        Self {
            cfg,
            shared,
            resolvers: ResolverRegistry::new(),
        }
    }

    pub(crate) fn into_handle(self) -> Handle {
        Handle(Arc::new(self))
    }
}

/// Cheap, cloneable reference to a scheduler.
///
/// Every operation callers need lives here. Payloads receive one through their
/// [`RunContext`], so they can submit more work without reaching for a global.
#[derive(Debug, Clone)]
pub struct Handle(Arc<Scheduler>);

impl Deref for Handle {
    type Target = Scheduler;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// What a cancellation attempt did.
enum Cancel {
    AlreadyFinished,

    /// Cancelled on this thread, `on_cancel` already ran.
    Done,

    /// The task is owned by another thread (running, or still registering its
    /// dependencies) which will cancel it when it lets go.
    Deferred,
}

impl Handle {
    /// Submits a task with no dependencies. It is readied right away.
    pub fn spawn<P: Payload>(&self, payload: P) -> Result<TaskHandle, SchedulerError> {
        self.run(payload, std::iter::empty::<Dependency>())
    }

    /// Submits a task that runs once every one of `deps` resolved.
    ///
    /// If `deps` is empty, or already resolved, the task is pushed to its
    /// ready queue before this returns. On error the task is cancelled (its
    /// payload sees `on_cancel`) before the error is returned.
    pub fn run<P, I>(&self, payload: P, deps: I) -> Result<TaskHandle, SchedulerError>
    where
        P: Payload,
        I: IntoIterator,
        I::Item: Into<Dependency>,
    {
        let mut payload: Box<dyn Payload> = Box::new(payload);

        if self.shared.is_shutdown() {
            payload.on_cancel();
            return Err(SchedulerError::ShuttingDown);
        }

        let task = match self.shared.allocate(payload) {
            Ok(task) => task,
            Err((err, mut payload)) => {
                payload.on_cancel();
                return Err(err);
            }
        };

        trace!(task_id = %task.id(), name = %task.debug_name(), queue = %task.queue(), "task created");

        self.schedule_run(&task, deps)?;
        Ok(task)
    }

    /// Submits a closure. `f` may be called more than once if it asks for a
    /// continuation.
    pub fn run_fn<F, I>(
        &self,
        queue: QueueId,
        name: &'static str,
        f: F,
        deps: I,
    ) -> Result<TaskHandle, SchedulerError>
    where
        F: FnMut(&mut RunContext<'_>) -> anyhow::Result<()> + Send + 'static,
        I: IntoIterator,
        I::Item: Into<Dependency>,
    {
        self.run(FnPayload::new(queue, name, f), deps)
    }

    /// Returns a task with no work that finishes once all of `deps` resolved.
    /// Useful to wait on many tasks at once, or to fan a producer out past
    /// `MAX_WAITERS` dependents.
    pub fn wait_async<I>(&self, queue: QueueId, deps: I) -> Result<TaskHandle, SchedulerError>
    where
        I: IntoIterator,
        I::Item: Into<Dependency>,
    {
        self.run(Join::new(queue), deps)
    }

    /// Requests cancellation of `task`. A task that has not started yet is
    /// cancelled on the spot. A running task finishes its current `run`, then
    /// ends `Cancelled` whatever it returned.
    ///
    /// Returns false if the task had already finished.
    pub fn cancel(&self, task: &TaskHandle) -> bool {
        !matches!(self.cancel_inner(task), Cancel::AlreadyFinished)
    }

    fn cancel_inner(&self, task: &TaskHandle) -> Cancel {
        let core = task.core();
        if core.state.load().is_terminal() {
            return Cancel::AlreadyFinished;
        }

        core.request_cancel();
        if core.try_claim() {
            debug!(task_id = %task.id(), name = %core.debug_name(), "cancelling task");
            harness::cancel_claimed(task);
            Cancel::Done
        } else {
            Cancel::Deferred
        }
    }

    /// Blocks until every task in `tasks` finished or `timeout` elapsed.
    /// While waiting, the calling thread runs ready tasks from the queues of
    /// unfinished tasks that are also in `help`.
    ///
    /// Returns true if every task finished.
    pub fn wait(&self, tasks: &[TaskHandle], help: QueueSet, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let mut all_finished = true;
            let mut pending_queues = QueueSet::empty();
            for task in tasks.iter().filter(|task| !task.is_finished()) {
                all_finished = false;
                pending_queues |= QueueSet::from(task.queue());
            }

            if all_finished {
                return true;
            }

            let mut helped = false;
            for queue in (pending_queues & help).queues() {
                helped |= self.process_task(queue);
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return tasks.iter().all(TaskHandle::is_finished);
            }

            if !helped {
                if self.cfg.wait_poll_interval.is_zero() {
                    thread::yield_now();
                } else {
                    thread::sleep(self.cfg.wait_poll_interval);
                }
            }
        }
    }

    /// Turns an id back into a handle, as long as the task is still alive.
    pub fn upgrade(&self, id: TaskId) -> Result<TaskHandle, SchedulerError> {
        self.shared.upgrade(id)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.counters.snapshot(self.shared.arena.live())
    }

    /// Registers the resolver for external dependencies of type `T`. Returns
    /// true if it replaced a previous one.
    pub fn register_resolver<T, R>(&self, resolver: R) -> bool
    where
        T: Any,
        R: DependencyResolver,
    {
        debug!(value_type = std::any::type_name::<T>(), "registering dependency resolver");
        self.resolvers.register::<T>(Arc::new(resolver)).is_some()
    }

    /// Removes the resolver for `T`. Registrations it still holds are not
    /// affected until the resolver itself drops them.
    pub fn unregister_resolver<T: Any>(&self) -> bool {
        self.resolvers.unregister::<T>().is_some()
    }

    /// Pops one ready task from `queue` and runs it to its next state change.
    /// Returns whether a task was found. Any thread may call this, including
    /// from inside a running payload.
    pub fn process_task(&self, queue: QueueId) -> bool {
        match self.shared.queues.pop(queue) {
            Some(task) => {
                harness::execute(self, task);
                true
            }
            None => false,
        }
    }

    /// Runs ready tasks from `queues` until they are all empty or `max` tasks
    /// ran. Returns the number of tasks processed.
    pub fn process_tasks(&self, queues: QueueSet, max: usize) -> usize {
        let mut processed = 0;

        'drain: loop {
            let mut found = false;
            for queue in queues.queues() {
                if processed >= max {
                    break 'drain;
                }
                if self.process_task(queue) {
                    processed += 1;
                    found = true;
                }
            }

            if !found {
                break;
            }
        }

        processed
    }

    pub fn queue_len(&self, queue: QueueId) -> usize {
        self.shared.queues.len(queue)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }

    /// Registers `deps` for the next run of `task`, then hands it over:
    /// `Created/Running -> Pending`, and `Ready` if nothing is left to wait on.
    /// The caller holds the claim and the registration guard.
    pub(crate) fn schedule_run<I>(&self, task: &TaskHandle, deps: I) -> Result<(), SchedulerError>
    where
        I: IntoIterator,
        I::Item: Into<Dependency>,
    {
        let core = task.core();

        if let Err(err) = self.register_all(task, deps) {
            debug!(task_id = %task.id(), %err, "dependency registration failed, cancelling task");
            harness::cancel_claimed(task);
            return Err(err);
        }

        core.state.store(TaskState::Pending);
        core.release_claim();

        // `cancel` may have run while we held the claim.
        if core.cancel_requested() && core.try_claim() {
            harness::cancel_claimed(task);
            return Ok(());
        }

        if core.release_guard() {
            harness::make_ready(task);
        }
        Ok(())
    }

    fn register_all<I>(&self, task: &TaskHandle, deps: I) -> Result<(), SchedulerError>
    where
        I: IntoIterator,
        I::Item: Into<Dependency>,
    {
        for (bit, dep) in deps.into_iter().enumerate() {
            if bit >= MAX_DEPENDENCIES {
                return Err(SchedulerError::TooManyDependencies {
                    max: MAX_DEPENDENCIES,
                });
            }
            self.register_dependency(task, dep.into(), bit as u8)?;
        }
        Ok(())
    }

    fn register_dependency(
        &self,
        task: &TaskHandle,
        dep: Dependency,
        bit: u8,
    ) -> Result<(), SchedulerError> {
        let core = task.core();

        match dep {
            Dependency::Task {
                handle: producer,
                kind,
            } => {
                if producer.id() == task.id() {
                    return Err(SchedulerError::SelfDependency(task.id()));
                }

                core.add_pending();
                match producer.core().attach(producer.id(), task, bit, kind) {
                    Ok(Attach::Queued) => Ok(()),
                    Ok(Attach::AlreadyFinished(state)) => {
                        dependency::resolve(task, bit, Resolution::from_terminal(state), kind);
                        Ok(())
                    }
                    Err(err) => {
                        core.remove_pending();
                        Err(err)
                    }
                }
            }
            Dependency::External { value, type_name } => {
                let resolver = self.resolvers.get((*value).type_id(), type_name)?;

                core.add_pending();
                resolver.register(&*value, Registration::new(task.clone(), bit))
            }
        }
    }

    /// Cancels every task that is not terminal yet and drops whatever is left
    /// in the ready queues. Returns the number of tasks cancelled.
    pub(crate) fn cancel_outstanding(&self) -> usize {
        let mut total = 0;

        loop {
            let cancelled = self
                .shared
                .live_tasks()
                .iter()
                .filter(|task| matches!(self.cancel_inner(task), Cancel::Done))
                .count();

            // Every queued task was just cancelled, only the handles remain.
            drop(self.shared.queues.drain());

            total += cancelled;
            if cancelled == 0 {
                break;
            }
        }

        total
    }
}
