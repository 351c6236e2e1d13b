//! Drives a task through its run: claim, execute, then either continue or
//! finish and notify the waiters.

use crate::dependency::{self, Resolution};
use crate::runtime::Handle;
use crate::task::{Payload, RunContext, TaskHandle, TaskState};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, trace, warn};

/// Runs a task popped from a ready queue. The task may have been cancelled
/// since it was pushed, in which case there is nothing to do.
pub(crate) fn execute(handle: &Handle, task: TaskHandle) {
    let core = task.core();

    if !core.try_claim() {
        trace!(task_id = %task.id(), "popped a task claimed elsewhere, skipping");
        return;
    }

    if core.cancel_requested() || core.cancelled_deps() > 0 {
        debug!(
            task_id = %task.id(),
            name = %core.debug_name(),
            cancelled_deps = core.cancelled_deps(),
            "cancelling task before run"
        );
        cancel_claimed(&task);
        return;
    }

    let ready = core.state.transition(TaskState::Ready, TaskState::Running);
    debug_assert!(ready, "claimed a task that was not Ready: {:?}", core.state);

    let Some(mut payload) = core.take_payload() else {
        unreachable!("task {} has no payload", task.id());
    };

    let mut ctx = RunContext::new(handle, &task);
    let result = panic::catch_unwind(AssertUnwindSafe(|| payload.run(&mut ctx)));
    let continuation = ctx.take_continuation();

    match result {
        Ok(_) if core.cancel_requested() => {
            debug!(task_id = %task.id(), "task cancelled while running");
            cancel_payload(&task, payload);
        }
        Ok(Ok(())) => match continuation {
            Some(deps) => {
                trace!(task_id = %task.id(), deps = deps.len(), "task continues");
                task.shared().counters.inc_continued();
                core.restore_payload(payload);
                core.reset_for_continuation();

                // On error the task was already cancelled.
                if let Err(err) = handle.schedule_run(&task, deps) {
                    warn!(task_id = %task.id(), %err, "failed to register continuation");
                }
            }
            None => {
                drop(payload);
                finish(&task, TaskState::Completed);
            }
        },
        Ok(Err(err)) => {
            warn!(
                task_id = %task.id(),
                name = %core.debug_name(),
                "task failed: {:#}",
                err
            );
            drop(payload);
            core.set_failure(err);
            finish(&task, TaskState::Failed);
        }
        Err(panic) => {
            error!(
                task_id = %task.id(),
                name = %core.debug_name(),
                "task panicked: {}",
                panic_message(&*panic)
            );
            task.shared().counters.inc_panicked();
            cancel_payload(&task, payload);
        }
    }
}

/// Cancels a task whose claim is held by the caller. The payload sees
/// `on_cancel` before the terminal state becomes visible.
pub(crate) fn cancel_claimed(task: &TaskHandle) {
    match task.core().take_payload() {
        Some(payload) => cancel_payload(task, payload),
        None => finish(task, TaskState::Cancelled),
    }
}

fn cancel_payload(task: &TaskHandle, mut payload: Box<dyn Payload>) {
    // A panicking hook must not take the worker thread down with it.
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| payload.on_cancel())) {
        error!(
            task_id = %task.id(),
            "on_cancel panicked: {}",
            panic_message(&*panic)
        );
    }
    drop(payload);
    finish(task, TaskState::Cancelled);
}

/// Moves the task into a terminal state and fires every waiter exactly once.
pub(crate) fn finish(task: &TaskHandle, state: TaskState) {
    let waiters = task.core().finish(state);
    task.shared().counters.record_terminal(state);

    trace!(
        task_id = %task.id(),
        %state,
        waiters = waiters.len(),
        "task finished"
    );

    let resolution = Resolution::from_terminal(state);
    for waiter in waiters {
        dependency::resolve(&waiter.consumer, waiter.bit, resolution, waiter.kind);
    }
}

/// `Pending -> Ready` and push. Called by whoever took the counter to zero.
pub(crate) fn make_ready(task: &TaskHandle) {
    if task
        .core()
        .state
        .transition(TaskState::Pending, TaskState::Ready)
    {
        let shared = task.shared();
        shared.counters.inc_readied();
        shared.queues.push(task.clone());
    } else {
        // Cancelled by its owner in the meantime.
        trace!(task_id = %task.id(), state = %task.state(), "task not pending, not readied");
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
