//! Write-behind queue: request handlers enqueue, one thread writes.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, error, info};

use crate::error::{BshError, Result};
use crate::storage::{AppendOutcome, Execution, HistoryWriter};

/// Work for the writer thread, applied strictly in submission order.
#[derive(Debug)]
pub enum WriteTask {
    Append(Execution),
    /// Acknowledged once every earlier task has been applied.
    Barrier(Sender<()>),
}

/// Producer side of the single-writer pipeline.
#[derive(Debug)]
pub struct WriteQueue {
    sender: Option<Sender<WriteTask>>,
    handle: Option<JoinHandle<()>>,
    capacity: usize,
}

impl WriteQueue {
    /// Start the writer thread. It owns `writer` until the queue is dropped.
    pub fn spawn(writer: HistoryWriter, capacity: usize) -> Result<Self> {
        Self::with_consumer(capacity, move |rx| run_writer(writer, &rx))
    }

    pub(crate) fn with_consumer<F>(capacity: usize, consumer: F) -> Result<Self>
    where
        F: FnOnce(Receiver<WriteTask>) + Send + 'static,
    {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        let handle = thread::Builder::new()
            .name("bsh-writer".to_string())
            .spawn(move || consumer(rx))?;
        Ok(Self {
            sender: Some(tx),
            handle: Some(handle),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of tasks waiting for the writer.
    pub fn pending(&self) -> usize {
        self.sender.as_ref().map_or(0, Sender::len)
    }

    /// Hand an execution to the writer without blocking.
    pub fn submit(&self, event: Execution) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(BshError::QueueClosed)?;
        match sender.try_send(WriteTask::Append(event)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(BshError::QueueFull(self.capacity)),
            Err(TrySendError::Disconnected(_)) => Err(BshError::QueueClosed),
        }
    }

    /// Block until everything submitted so far has been applied.
    pub fn flush(&self) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(BshError::QueueClosed)?;
        let (ack_tx, ack_rx) = bounded(1);
        sender
            .send(WriteTask::Barrier(ack_tx))
            .map_err(|_| BshError::QueueClosed)?;
        ack_rx.recv().map_err(|_| BshError::QueueClosed)
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        // Closing the channel ends the writer loop once the backlog is drained.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("history writer thread panicked");
            }
        }
    }
}

fn run_writer(mut writer: HistoryWriter, rx: &Receiver<WriteTask>) {
    info!("history writer started");
    while let Ok(task) = rx.recv() {
        match task {
            WriteTask::Append(event) => match writer.append(&event) {
                Ok(AppendOutcome::Recorded { command_id }) => {
                    debug!(command_id, "execution recorded");
                }
                Ok(AppendOutcome::Skipped) => debug!("execution skipped by record filter"),
                Err(e) => error!(error = %e, "failed to record execution"),
            },
            WriteTask::Barrier(ack) => {
                let _ = ack.send(());
            }
        }
    }
    info!("history writer stopped");
}
