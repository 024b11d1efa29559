use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info};

use crate::error::WorkerError;

use super::executor::TaskExecutor;
use super::request::{QueuedTask, TaskOutcome};

/// Cloneable handle for putting tasks on the pool's channel.
#[derive(Clone)]
pub struct TaskSubmitter {
    sender: Sender<QueuedTask>,
    shutdown: Arc<AtomicBool>,
}

impl TaskSubmitter {
    /// A submitter over a bare channel, for driving tasks without a pool.
    pub fn for_channel(sender: Sender<QueuedTask>) -> Self {
        Self {
            sender,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queues `task` without waiting. Fails with `QueueFull` when every
    /// slot of the bounded channel is taken.
    pub fn submit(&self, task: QueuedTask) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.sender.try_send(task).map_err(|e| match e {
            TrySendError::Full(_) => WorkerError::QueueFull,
            TrySendError::Disconnected(_) => WorkerError::ChannelClosed,
        })
    }
}

pub struct WorkerPool {
    submitter: TaskSubmitter,
    result_receiver: Receiver<TaskOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Starts `worker_count` threads sharing `executor`. A count of zero is
    /// treated as one.
    pub fn new(executor: Arc<TaskExecutor>, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, task_receiver) = bounded::<QueuedTask>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<TaskOutcome>(worker_count * 16);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let task_rx = task_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_executor = Arc::clone(&executor);

            let handle = thread::spawn(move || {
                run_worker(worker_id, task_rx, result_tx, shutdown_flag, worker_executor);
            });

            workers.push(handle);
        }

        info!("Started {} conversion workers", worker_count);

        Self {
            submitter: TaskSubmitter {
                sender: task_sender,
                shutdown: Arc::clone(&shutdown),
            },
            result_receiver,
            workers,
            shutdown,
        }
    }

    pub fn submitter(&self) -> TaskSubmitter {
        self.submitter.clone()
    }

    pub fn submit(&self, task: QueuedTask) -> Result<(), WorkerError> {
        self.submitter.submit(task)
    }

    pub fn try_recv_result(&self) -> Option<TaskOutcome> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<TaskOutcome> {
        self.result_receiver.recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<TaskOutcome> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Joins every worker. Clones of the submitter keep the channel open, so
    /// call `shutdown` first when any are still alive.
    pub fn wait(self) {
        drop(self.submitter);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    task_receiver: Receiver<QueuedTask>,
    result_sender: Sender<TaskOutcome>,
    shutdown: Arc<AtomicBool>,
    executor: Arc<TaskExecutor>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match task_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(task) => {
                debug!("Worker {} processing job {}", worker_id, task.job_id);

                let outcome = executor.execute(&task);

                // Outcomes are informational; the ledger is the record.
                match result_sender.try_send(outcome) {
                    Ok(()) => {}
                    Err(TrySendError::Full(outcome)) => {
                        debug!(
                            "Worker {} dropped outcome for job {}: result queue full",
                            worker_id, outcome.job_id
                        );
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        debug!("Worker {} result channel closed", worker_id);
                    }
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} task channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
