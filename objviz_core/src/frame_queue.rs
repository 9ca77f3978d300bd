//! FIFO frame queue.
//!
//! Messages may arrive faster than frames are assembled. The queue hands
//! them to a single worker task that owns the [`FrameAssembler`], so frames
//! are processed strictly in arrival order and never concurrently.

use crate::assembler::{FrameAssembler, FrameReport};
use crate::error::{AssemblerError, QueueError};
use crate::geometry::GeometryBuilder;
use crate::object::ObjectListMessage;
use crate::palette::ClassificationPalette;
use crate::sink::MarkerSink;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Reply = oneshot::Sender<Result<FrameReport, AssemblerError>>;

enum Command {
    Frame {
        message: ObjectListMessage,
        reply: Option<Reply>,
    },
    Shutdown,
}

/// Cloneable producer side of a [`FrameQueue`].
#[derive(Clone)]
pub struct FrameQueueHandle {
    tx: mpsc::Sender<Command>,
}

impl FrameQueueHandle {
    /// Enqueue a message without waiting for its frame.
    ///
    /// Waits only while the queue is full. Submission failures of frames
    /// queued this way are logged by the worker.
    pub async fn push(&self, message: ObjectListMessage) -> Result<(), QueueError> {
        self.tx
            .send(Command::Frame {
                message,
                reply: None,
            })
            .await
            .map_err(|_| QueueError::WorkerStopped)
    }

    /// Enqueue a message and wait for its frame report.
    pub async fn process(&self, message: ObjectListMessage) -> Result<FrameReport, QueueError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Frame {
                message,
                reply: Some(reply),
            })
            .await
            .map_err(|_| QueueError::WorkerStopped)?;
        let report = rx.await.map_err(|_| QueueError::WorkerStopped)??;
        Ok(report)
    }
}

pub struct FrameQueue<S, G, P> {
    handle: FrameQueueHandle,
    worker: JoinHandle<FrameAssembler<S, G, P>>,
}

impl<S, G, P> FrameQueue<S, G, P>
where
    S: MarkerSink + Send + 'static,
    G: GeometryBuilder + Send + 'static,
    P: ClassificationPalette + Send + 'static,
{
    /// Move `assembler` onto a worker task. Must be called inside a tokio runtime.
    pub fn spawn(assembler: FrameAssembler<S, G, P>, depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let worker = tokio::spawn(run_worker(assembler, rx));
        Self {
            handle: FrameQueueHandle { tx },
            worker,
        }
    }

    pub fn handle(&self) -> FrameQueueHandle {
        self.handle.clone()
    }

    /// Drain everything queued so far, stop the worker and return the assembler.
    pub async fn shutdown(self) -> Result<FrameAssembler<S, G, P>, QueueError> {
        self.handle
            .tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| QueueError::WorkerStopped)?;
        self.worker.await.map_err(|_| QueueError::WorkerStopped)
    }
}

async fn run_worker<S, G, P>(
    mut assembler: FrameAssembler<S, G, P>,
    mut rx: mpsc::Receiver<Command>,
) -> FrameAssembler<S, G, P>
where
    S: MarkerSink,
    G: GeometryBuilder,
    P: ClassificationPalette,
{
    while let Some(command) = rx.recv().await {
        match command {
            Command::Frame { message, reply } => {
                let result = assembler.process(&message);
                match reply {
                    // receiver may have given up waiting
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!("Queued frame dropped: {}", e);
                        }
                    }
                }
            }
            Command::Shutdown => break,
        }
    }
    debug!("frame queue worker stopped after {} frames", assembler.frames());
    assembler
}
