//! Bounded single-producer / single-consumer channels between ports.
//!
//! A full edge suspends its producer and an empty edge suspends its
//! consumer; this is the only backpressure mechanism in the pipeline.
//! Every edge of a pipeline observes the same [`CancelSignal`], so an abort
//! wakes all blocked pushes and pulls at once.

use super::datum::Datum;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeError {
    /// End of stream was already pushed (or pulled) on this edge.
    #[error("Edge is closed")]
    Closed,

    /// The pipeline was cancelled while waiting on the edge.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// The consumer went away before end of stream.
    #[error("Edge consumer disconnected")]
    Disconnected,
}

/// Pipeline-wide abort flag shared by every edge.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> CancelWatch {
        CancelWatch {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`CancelSignal`].
#[derive(Debug, Clone)]
pub struct CancelWatch {
    rx: watch::Receiver<bool>,
}

impl CancelWatch {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the pipeline is cancelled. Never resolves if the
    /// signal is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Create a bounded edge. `capacity` must be non-zero.
pub fn edge(capacity: usize, cancel: &CancelSignal) -> (EdgeSender, EdgeReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        EdgeSender {
            tx,
            cancel: cancel.subscribe(),
            closed: false,
        },
        EdgeReceiver {
            rx,
            cancel: cancel.subscribe(),
            finished: false,
        },
    )
}

#[derive(Debug)]
pub struct EdgeSender {
    tx: mpsc::Sender<Datum>,
    cancel: CancelWatch,
    closed: bool,
}

impl EdgeSender {
    /// Enqueue `datum`, waiting while the edge is at capacity.
    pub async fn push(&mut self, datum: Datum) -> Result<(), EdgeError> {
        if self.closed {
            return Err(EdgeError::Closed);
        }
        if self.cancel.is_cancelled() {
            return Err(EdgeError::Cancelled);
        }

        let is_end = datum.is_end_of_stream();

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EdgeError::Cancelled),
            sent = self.tx.send(datum) => {
                sent.map_err(|_| EdgeError::Disconnected)?;
                if is_end {
                    self.closed = true;
                }
                Ok(())
            }
        }
    }

    /// True once end of stream has been pushed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

#[derive(Debug)]
pub struct EdgeReceiver {
    rx: mpsc::Receiver<Datum>,
    cancel: CancelWatch,
    finished: bool,
}

impl EdgeReceiver {
    /// Dequeue the next datum, waiting while the edge is empty.
    ///
    /// `EndOfStream` is returned exactly once; later pulls report `Closed`.
    pub async fn pull(&mut self) -> Result<Datum, EdgeError> {
        if self.finished {
            return Err(EdgeError::Closed);
        }
        if self.cancel.is_cancelled() {
            return Err(EdgeError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EdgeError::Cancelled),
            received = self.rx.recv() => match received {
                Some(datum) => {
                    if datum.is_end_of_stream() {
                        self.finished = true;
                        self.rx.close();
                    }
                    Ok(datum)
                }
                None => {
                    self.finished = true;
                    Err(EdgeError::Closed)
                }
            }
        }
    }

    /// Non-blocking variant of [`pull`](Self::pull); `None` when empty.
    pub fn try_pull(&mut self) -> Option<Result<Datum, EdgeError>> {
        if self.finished {
            return Some(Err(EdgeError::Closed));
        }
        match self.rx.try_recv() {
            Ok(datum) => {
                if datum.is_end_of_stream() {
                    self.finished = true;
                    self.rx.close();
                }
                Some(Ok(datum))
            }
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.finished = true;
                Some(Err(EdgeError::Closed))
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
