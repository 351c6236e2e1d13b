//! Scheduler façade and worker threads.
//!
//! ```ignore
//! let runtime = Builder::new()
//!     .worker_threads(4, QueueSet::BACKGROUND | QueueSet::PER_FRAME)
//!     .try_build()?;
//!
//! let load = runtime.run_fn(QueueId::Background, "load", |_| Ok(()), NO_DEPS)?;
//! let upload = runtime.run_fn(QueueId::PerFrame, "upload", |_| Ok(()), [&load])?;
//!
//! // The calling thread helps with the per-frame queue while it waits.
//! runtime.wait(&[upload], QueueSet::PER_FRAME, Duration::from_secs(1));
//! ```

mod builder;
pub use builder::{Builder, ThreadConfig, WaitStrategy};
pub(crate) use builder::SchedulerConfig;

mod pool;
pub(crate) use pool::ThreadPool;

#[allow(clippy::module_inception)]
mod runtime;
pub use runtime::Runtime;

mod scheduler;
pub use scheduler::{Handle, Scheduler};

mod worker;
