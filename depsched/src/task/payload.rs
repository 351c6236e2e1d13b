use crate::dependency::Dependency;
use crate::queue::QueueId;
use crate::runtime::Handle;
use crate::task::{TaskHandle, TaskId};
use smallvec::SmallVec;
use std::borrow::Cow;

/// The work a task carries.
///
/// A payload is moved into its task on `run` and dropped once the task reaches
/// a terminal state. Exactly one of the following happens to it:
///
/// - `run` is called one or more times (more than once only if it asked for a
///   continuation), then it is dropped;
/// - `on_cancel` is called once, then it is dropped.
///
/// A panic inside `run` is caught and turns into cancellation, so `on_cancel`
/// also runs in that case.
pub trait Payload: Send + 'static {
    /// Queue the task is bound to. Read once, when the task is created.
    fn queue(&self) -> QueueId;

    fn run(&mut self, ctx: &mut RunContext<'_>) -> anyhow::Result<()>;

    /// Called instead of (or after an interrupted) `run` when the task is
    /// cancelled. Must not block.
    fn on_cancel(&mut self) {}

    fn debug_name(&self) -> Cow<'static, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }
}

/// What a payload can see and do while it runs.
pub struct RunContext<'a> {
    scheduler: &'a Handle,
    task: &'a TaskHandle,
    continuation: Option<SmallVec<[Dependency; 4]>>,
}

impl<'a> RunContext<'a> {
    pub(crate) fn new(scheduler: &'a Handle, task: &'a TaskHandle) -> Self {
        Self {
            scheduler,
            task,
            continuation: None,
        }
    }

    /// The scheduler running this task. Use it to submit more tasks.
    pub fn scheduler(&self) -> &'a Handle {
        self.scheduler
    }

    pub fn task(&self) -> &'a TaskHandle {
        self.task
    }

    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    /// True if `Handle::cancel` was called while the task was running. The task
    /// will end `Cancelled` whatever `run` returns.
    pub fn is_cancel_requested(&self) -> bool {
        self.task.core().cancel_requested()
    }

    /// Number of dependencies of this run that ended `Failed`. Whether that
    /// matters is up to the payload.
    pub fn failed_dependencies(&self) -> u32 {
        self.task.core().failed_deps()
    }

    /// Asks for `run` to be called again once every one of `deps` resolved.
    /// The task stays non-terminal in between, so its own dependents keep
    /// waiting. Calling this more than once in the same run accumulates.
    pub fn continue_after<I>(&mut self, deps: I)
    where
        I: IntoIterator,
        I::Item: Into<Dependency>,
    {
        self.continuation
            .get_or_insert_with(SmallVec::new)
            .extend(deps.into_iter().map(Into::into));
    }

    pub(crate) fn take_continuation(&mut self) -> Option<SmallVec<[Dependency; 4]>> {
        self.continuation.take()
    }
}

/// Payload built from a closure. See `Handle::run_fn`.
pub struct FnPayload<F> {
    queue: QueueId,
    name: &'static str,
    f: F,
}

impl<F> FnPayload<F>
where
    F: FnMut(&mut RunContext<'_>) -> anyhow::Result<()> + Send + 'static,
{
    pub fn new(queue: QueueId, name: &'static str, f: F) -> Self {
        Self { queue, name, f }
    }
}

impl<F> Payload for FnPayload<F>
where
    F: FnMut(&mut RunContext<'_>) -> anyhow::Result<()> + Send + 'static,
{
    fn queue(&self) -> QueueId {
        self.queue
    }

    fn run(&mut self, ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
        (self.f)(ctx)
    }

    fn debug_name(&self) -> Cow<'static, str> {
        Cow::Borrowed(self.name)
    }
}

/// Payload with no work, used to join several dependencies into one task.
#[derive(Debug)]
pub(crate) struct Join {
    queue: QueueId,
}

impl Join {
    pub(crate) fn new(queue: QueueId) -> Self {
        Self { queue }
    }
}

impl Payload for Join {
    fn queue(&self) -> QueueId {
        self.queue
    }

    fn run(&mut self, _ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn debug_name(&self) -> Cow<'static, str> {
        Cow::Borrowed("join")
    }
}
