use crate::queue::QueueSet;
use crate::runtime::{Runtime, Scheduler, ThreadPool};
use anyhow::{Result, anyhow};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Default number of task slots. Chunks are allocated lazily, so an idle
/// scheduler only pays for what it used.
const ARENA_CAPACITY: usize = 1 << 20;

/// Passes over its service set a worker makes before it idles.
const PROCESS_CYCLES_BEFORE_SUSPEND: usize = 3;

/// Bound on a blocked worker's sleep. Workers are woken on push, this only
/// caps the latency of a missed wakeup.
const IDLE_WAIT_TIMEOUT: Duration = Duration::from_millis(100);

/// How long `Handle::wait` sleeps when it found nothing to help with.
const WAIT_POLL_INTERVAL: Duration = Duration::from_micros(200);

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

fn default_thread_name_fn() -> ThreadNameFn {
    let worker_count = Arc::new(AtomicUsize::new(0));

    ThreadNameFn(Arc::new(move || {
        let id = worker_count.fetch_add(1, Ordering::Relaxed);
        format!("depsched-{}", id)
    }))
}

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

/// How an idle worker waits for work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Sleep on a condition variable, woken on push. Sleeps at most `timeout`.
    Block { timeout: Duration },

    /// Busy-poll `spins` times, then yield the CPU. Lowest latency, burns a
    /// core per idle worker.
    Spin { spins: u32 },
}

impl Default for WaitStrategy {
    fn default() -> Self {
        WaitStrategy::Block {
            timeout: IDLE_WAIT_TIMEOUT,
        }
    }
}

/// Configuration of one worker thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadConfig {
    pub(crate) name: Option<String>,
    pub(crate) queues: QueueSet,
}

impl ThreadConfig {
    /// A worker serving `queues`, named by the runtime's thread name fn.
    #[track_caller]
    pub fn new(queues: QueueSet) -> Self {
        assert!(!queues.is_empty(), "a worker must serve at least one queue");
        Self { name: None, queues }
    }

    /// Overrides the generated thread name. Names are only used for
    /// diagnostics, and truncated to 15 bytes on Linux.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn queues(&self) -> QueueSet {
        self.queues
    }
}

#[derive(Debug)]
pub struct Builder {
    /// Worker threads spawned by `try_build`. Empty by default: the thread
    /// owning the runtime drives every queue through `process_task`.
    threads: Vec<ThreadConfig>,

    /// Name fn used for threads spawned by the runtime.
    thread_name: ThreadNameFn,

    /// Stack size used for threads spawned by the runtime.
    thread_stack_size: Option<usize>,

    wait_strategy: WaitStrategy,

    /// Maximum number of live tasks.
    arena_capacity: usize,

    process_cycles_before_suspend: usize,

    wait_poll_interval: Duration,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            threads: Vec::new(),
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
            wait_strategy: WaitStrategy::default(),
            arena_capacity: ARENA_CAPACITY,
            process_cycles_before_suspend: PROCESS_CYCLES_BEFORE_SUSPEND,
            wait_poll_interval: WAIT_POLL_INTERVAL,
        }
    }

    /// Adds `n` worker threads serving `queues`.
    #[track_caller]
    pub fn worker_threads(mut self, n: usize, queues: QueueSet) -> Self {
        assert!(n > 0, "worker_threads must be greater than 0");
        self.threads
            .extend(std::iter::repeat_n(ThreadConfig::new(queues), n));
        self
    }

    /// Adds a single worker thread.
    pub fn thread(mut self, config: ThreadConfig) -> Self {
        self.threads.push(config);
        self
    }

    /// Sets the name of every thread spawned without an explicit name.
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        let val = val.into();
        self.thread_name = ThreadNameFn(Arc::new(move || val.clone()));
        self
    }

    /// Sets a function used to generate the name of threads spawned without an
    /// explicit name.
    ///
    /// The default name fn yields "depsched-{N}" with monotonically increasing N.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Sets the stack size (in bytes) for worker threads.
    ///
    /// The actual stack size may be greater than this value if the platform
    /// specifies minimal stack size.
    #[track_caller]
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        assert!(
            val.is_power_of_two(),
            "thread_stack_size must be a power of two"
        );
        self.thread_stack_size = Some(val);
        self
    }

    #[track_caller]
    pub fn wait_strategy(mut self, strategy: WaitStrategy) -> Self {
        if let WaitStrategy::Block { timeout } = strategy {
            assert!(!timeout.is_zero(), "block timeout must be greater than 0");
        }
        self.wait_strategy = strategy;
        self
    }

    /// Maximum number of tasks alive at once (referenced by at least one
    /// `TaskHandle`, including internal ones).
    #[track_caller]
    pub fn arena_capacity(mut self, val: usize) -> Self {
        assert!(val > 0, "arena_capacity must be greater than 0");
        self.arena_capacity = val;
        self
    }

    #[track_caller]
    pub fn process_cycles_before_suspend(mut self, val: usize) -> Self {
        assert!(
            val > 0,
            "process_cycles_before_suspend must be greater than 0"
        );
        self.process_cycles_before_suspend = val;
        self
    }

    pub fn wait_poll_interval(mut self, val: Duration) -> Self {
        self.wait_poll_interval = val;
        self
    }

    /// Creates the configured `Runtime` and starts its worker threads.
    pub fn try_build(self) -> Result<Runtime> {
        let cfg = SchedulerConfig::try_from(self)?;
        let threads = cfg.threads.clone();

        let handle = Scheduler::new(cfg).into_handle();

        // On error the partially started runtime is dropped, which joins the
        // workers spawned so far.
        let runtime = Runtime::new(handle, ThreadPool::new());
        for config in threads {
            runtime.add_thread(config)?;
        }

        Ok(runtime)
    }
}

/// Builder settings, frozen and shared with every worker.
#[derive(Debug, Clone)]
pub(crate) struct SchedulerConfig {
    pub(crate) threads: Vec<ThreadConfig>,
    pub(crate) thread_name: ThreadNameFn,
    pub(crate) thread_stack_size: Option<usize>,
    pub(crate) wait_strategy: WaitStrategy,
    pub(crate) arena_capacity: usize,
    pub(crate) process_cycles_before_suspend: usize,
    pub(crate) wait_poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            threads: Vec::new(),
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
            wait_strategy: WaitStrategy::default(),
            arena_capacity: ARENA_CAPACITY,
            process_cycles_before_suspend: PROCESS_CYCLES_BEFORE_SUSPEND,
            wait_poll_interval: WAIT_POLL_INTERVAL,
        }
    }
}

impl SchedulerConfig {
    fn validate(&self) -> Result<()> {
        if self.arena_capacity > u32::MAX as usize {
            return Err(anyhow!(
                "arena_capacity {} does not fit in a u32 task index",
                self.arena_capacity
            ));
        }

        if let Some(config) = self.threads.iter().find(|t| t.queues.is_empty()) {
            return Err(anyhow!("worker thread {:?} serves no queue", config.name));
        }

        Ok(())
    }
}

impl TryFrom<Builder> for SchedulerConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let cfg = SchedulerConfig {
            threads: builder.threads,
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
            wait_strategy: builder.wait_strategy,
            arena_capacity: builder.arena_capacity,
            process_cycles_before_suspend: builder.process_cycles_before_suspend,
            wait_poll_interval: builder.wait_poll_interval,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}
