use crate::queue::QueueId;
use crate::runtime::{Builder, Runtime};
use crate::task::{Payload, RunContext};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Installs a fmt subscriber once per test binary. Filter with `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A runtime without worker threads: tests drive it with `process_task`.
pub(crate) fn local_runtime() -> anyhow::Result<Runtime> {
    init_tracing();
    Builder::new().try_build()
}

#[derive(Debug)]
pub(crate) struct Noop {
    queue: QueueId,
}

impl Noop {
    pub(crate) fn new(queue: QueueId) -> Self {
        Self { queue }
    }
}

impl Payload for Noop {
    fn queue(&self) -> QueueId {
        self.queue
    }

    fn run(&mut self, _ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Shared view of how often a [`Probe`] was run and cancelled.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProbeCounts {
    runs: Arc<AtomicUsize>,
    cancels: Arc<AtomicUsize>,
}

impl ProbeCounts {
    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub(crate) fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

/// Payload recording every `run` and `on_cancel` call.
#[derive(Debug)]
pub(crate) struct Probe {
    queue: QueueId,
    counts: ProbeCounts,
}

impl Probe {
    pub(crate) fn new(queue: QueueId) -> (Self, ProbeCounts) {
        let counts = ProbeCounts::default();
        (
            Self {
                queue,
                counts: counts.clone(),
            },
            counts,
        )
    }
}

impl Payload for Probe {
    fn queue(&self) -> QueueId {
        self.queue
    }

    fn run(&mut self, _ctx: &mut RunContext<'_>) -> anyhow::Result<()> {
        self.counts.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_cancel(&mut self) {
        self.counts.cancels.fetch_add(1, Ordering::SeqCst);
    }
}
