use crate::runtime::worker::Worker;
use crate::runtime::{Handle, ThreadConfig};
use anyhow::{Context, Result, anyhow};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[derive(Debug)]
struct WorkerThread {
    name: String,
    looping: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

/// The OS threads running worker event loops.
#[derive(Debug, Default)]
pub(crate) struct ThreadPool {
    threads: Mutex<Vec<WorkerThread>>,
}

impl ThreadPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.threads.lock().len()
    }

    /// Spawns one worker thread and waits until it is running.
    pub(crate) fn spawn(&self, scheduler: &Handle, config: ThreadConfig) -> Result<()> {
        // Held until the thread is recorded, so `stop_all` cannot miss it.
        let mut threads = self.threads.lock();

        if scheduler.is_shutdown() {
            return Err(anyhow!("cannot add a worker thread to a runtime shutting down"));
        }

        let name = config
            .name
            .unwrap_or_else(|| (scheduler.cfg.thread_name.0)());
        let worker = Worker::new(name.clone(), config.queues, scheduler);
        let looping = worker.looping();

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(stack_size) = scheduler.cfg.thread_stack_size {
            builder = builder.stack_size(stack_size);
        }

        let barrier = Arc::new(Barrier::new(2));
        let handle = {
            let scheduler = scheduler.clone();
            let barrier = Arc::clone(&barrier);

            builder
                .spawn(move || {
                    barrier.wait();
                    worker.event_loop(&scheduler);
                })
                .with_context(|| format!("failed to spawn worker thread {}", name))?
        };

        // Spawning threads is async, wait for the thread to be started.
        barrier.wait();

        threads.push(WorkerThread {
            name,
            looping,
            handle,
        });
        Ok(())
    }

    /// Tells every worker to exit after the task it is currently running.
    pub(crate) fn stop_all(&self) {
        for thread in self.threads.lock().iter() {
            thread.looping.store(false, Ordering::Release);
        }
    }

    pub(crate) fn join_all(&self) -> Result<()> {
        let threads = std::mem::take(&mut *self.threads.lock());

        let errors = threads
            .into_iter()
            .filter_map(|thread| thread.handle.join().err().map(|_| thread.name))
            .collect::<Vec<_>>();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(
                "{} thread(s) panicked: {}",
                errors.len(),
                errors.join(", ")
            ))
        }
    }
}
