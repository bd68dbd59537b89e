//! Live task progress.
//!
//! Each subscription is read by its own tokio task. Readers only do I/O: they
//! forward frames over one mpsc channel to the [`ProgressHub`], and the hub
//! applies them to the [`TaskStore`] on the caller's task, so updates for a
//! task land in the order they arrived.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use scrape_core::{EventError, StatusEvent, Task, TaskId, TaskStatus, TaskStore, UpdateOutcome};
use scrape_logging::{scrape_debug, scrape_info, scrape_warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Text frame asking the service to abort the task behind a stream.
pub const CANCEL_COMMAND: &str = "cancel";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("could not open status stream: {0}")]
    Connect(String),
    #[error("status stream failed: {0}")]
    Transport(String),
    #[error("status stream closed before the task finished")]
    ClosedEarly,
}

/// Opens the status stream of one task.
#[async_trait::async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, task_id: &str) -> Result<Box<dyn StatusStream>, StreamError>;
}

/// An open status stream delivering JSON text frames.
#[async_trait::async_trait]
pub trait StatusStream: Send {
    /// Next text frame; `None` once the peer closed the stream.
    async fn next_text(&mut self) -> Option<Result<String, StreamError>>;

    async fn send_text(&mut self, text: &str) -> Result<(), StreamError>;

    async fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Connecting,
    Open,
    ClosedNormal,
    ClosedError,
}

impl SubscriptionState {
    pub fn is_live(self) -> bool {
        matches!(self, SubscriptionState::Connecting | SubscriptionState::Open)
    }
}

/// What happened to the store (or a stream) while handling one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressNotice {
    Opened {
        task_id: TaskId,
    },
    Updated {
        task_id: TaskId,
        status: TaskStatus,
        progress: Option<u8>,
        outcome: UpdateOutcome,
    },
    /// A terminal event was applied and the stream has been closed.
    Finished {
        task_id: TaskId,
        status: TaskStatus,
        outcome: UpdateOutcome,
    },
    /// The stream ended before a terminal status. The task is untouched.
    StreamLost {
        task_id: TaskId,
        error: StreamError,
    },
}

#[derive(Debug)]
enum Frame {
    Opened,
    Event(StatusEvent),
    Malformed(EventError),
    Lost(StreamError),
}

#[derive(Debug)]
struct Inbound {
    task_id: TaskId,
    generation: u64,
    frame: Frame,
}

struct Subscription {
    state: SubscriptionState,
    generation: u64,
    token: CancellationToken,
    /// Frames for the reader to send once the stream is open.
    outbound: mpsc::UnboundedSender<String>,
    handle: JoinHandle<()>,
}

/// Owns every status stream opened on behalf of one caller.
///
/// Dropping the hub (or calling [`ProgressHub::dispose`]) cancels all of them.
pub struct ProgressHub {
    connector: Arc<dyn StreamConnector>,
    subscriptions: HashMap<TaskId, Subscription>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    root: CancellationToken,
    next_generation: u64,
}

impl ProgressHub {
    pub fn new(connector: Arc<dyn StreamConnector>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            subscriptions: HashMap::new(),
            inbound_tx,
            inbound_rx,
            root: CancellationToken::new(),
            next_generation: 0,
        }
    }

    /// Starts streaming `task_id`. Returns `false` when a stream for it is
    /// already connecting or open, or when the hub has been disposed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&mut self, task_id: &str) -> bool {
        if self.root.is_cancelled() {
            scrape_debug!("Hub disposed, not subscribing to {}", task_id);
            return false;
        }
        if self.state(task_id).is_some_and(SubscriptionState::is_live) {
            scrape_debug!("Already subscribed to {}", task_id);
            return false;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let token = self.root.child_token();
        let forwarder = Forwarder {
            tx: self.inbound_tx.clone(),
            task_id: task_id.to_string(),
            generation,
        };
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(read_stream(
            Arc::clone(&self.connector),
            forwarder,
            outbound_rx,
            token.clone(),
        ));

        scrape_info!("Subscribing to progress of {}", task_id);
        self.subscriptions.insert(
            task_id.to_string(),
            Subscription {
                state: SubscriptionState::Connecting,
                generation,
                token,
                outbound,
                handle,
            },
        );
        true
    }

    /// Asks the service to abort `task_id` over its stream. The answer
    /// arrives as an ordinary terminal event.
    ///
    /// Returns `false` when no stream for the task is connecting or open.
    pub fn cancel_task(&mut self, task_id: &str) -> bool {
        let Some(sub) = self
            .subscriptions
            .get(task_id)
            .filter(|sub| sub.state.is_live())
        else {
            scrape_debug!("No live stream to cancel {}", task_id);
            return false;
        };
        if sub.outbound.send(CANCEL_COMMAND.to_string()).is_err() {
            scrape_debug!("Reader for {} already gone", task_id);
            return false;
        }
        scrape_info!("Requested cancellation of {}", task_id);
        true
    }

    pub fn state(&self, task_id: &str) -> Option<SubscriptionState> {
        self.subscriptions.get(task_id).map(|sub| sub.state)
    }

    pub fn has_live_subscriptions(&self) -> bool {
        self.subscriptions.values().any(|sub| sub.state.is_live())
    }

    /// Cancelled once the hub is disposed. In-flight requests made on behalf
    /// of the same caller check it before touching the store.
    pub fn liveness(&self) -> &CancellationToken {
        &self.root
    }

    /// A clone of [`ProgressHub::liveness`] that can be cancelled from
    /// elsewhere, e.g. a signal handler.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Waits for the next frame from any live stream and applies it to
    /// `store`.
    ///
    /// Returns `None` once no stream is live or the hub is disposed.
    /// Malformed frames and frames from superseded streams are skipped.
    pub async fn next(&mut self, store: &mut TaskStore) -> Option<ProgressNotice> {
        loop {
            if self.root.is_cancelled() {
                self.close_live(SubscriptionState::ClosedNormal);
                return None;
            }
            if !self.has_live_subscriptions() {
                return None;
            }

            let inbound = tokio::select! {
                _ = self.root.cancelled() => continue,
                inbound = self.inbound_rx.recv() => inbound?,
            };
            if let Some(notice) = self.handle(inbound, store) {
                return Some(notice);
            }
        }
    }

    /// Cancels every stream. Later `subscribe` calls are refused.
    pub fn dispose(&mut self) {
        if !self.root.is_cancelled() {
            scrape_debug!("Disposing progress hub");
        }
        self.root.cancel();
        self.close_live(SubscriptionState::ClosedNormal);
    }

    /// Disposes the hub and waits briefly for the readers to close their
    /// streams.
    pub async fn shutdown(mut self) {
        self.dispose();
        let subscriptions = std::mem::take(&mut self.subscriptions);
        for (task_id, sub) in subscriptions {
            if tokio::time::timeout(SHUTDOWN_GRACE, sub.handle).await.is_err() {
                scrape_warn!("Reader for {} did not stop in time", task_id);
            }
        }
    }

    fn close_live(&mut self, state: SubscriptionState) {
        for sub in self.subscriptions.values_mut() {
            if sub.state.is_live() {
                sub.token.cancel();
                sub.state = state;
            }
        }
    }

    fn handle(&mut self, inbound: Inbound, store: &mut TaskStore) -> Option<ProgressNotice> {
        let Inbound {
            task_id,
            generation,
            frame,
        } = inbound;
        let sub = self.subscriptions.get_mut(&task_id)?;
        if sub.generation != generation || !sub.state.is_live() {
            scrape_debug!("Ignoring late frame for {}", task_id);
            return None;
        }

        match frame {
            Frame::Opened => {
                sub.state = SubscriptionState::Open;
                Some(ProgressNotice::Opened { task_id })
            }
            Frame::Malformed(err) => {
                scrape_warn!("Dropping malformed event for {}: {}", task_id, err);
                None
            }
            Frame::Lost(error) => {
                scrape_warn!("Lost progress stream of {}: {}", task_id, error);
                sub.state = SubscriptionState::ClosedError;
                Some(ProgressNotice::StreamLost { task_id, error })
            }
            Frame::Event(event) => {
                if let Some(other) = event.task_id.as_deref().filter(|id| *id != task_id) {
                    scrape_debug!("Event on stream {} names task {}", task_id, other);
                }
                let status = event.status;
                let terminal = event.is_terminal();
                let outcome = store.update_status(&task_id, status, event.patch);
                if terminal {
                    sub.state = SubscriptionState::ClosedNormal;
                    sub.token.cancel();
                    scrape_info!("Task {} finished as {}", task_id, status);
                    Some(ProgressNotice::Finished {
                        task_id,
                        status,
                        outcome,
                    })
                } else {
                    let progress = store.get(&task_id).and_then(Task::progress);
                    Some(ProgressNotice::Updated {
                        task_id,
                        status,
                        progress,
                        outcome,
                    })
                }
            }
        }
    }
}

impl Drop for ProgressHub {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

struct Forwarder {
    tx: mpsc::UnboundedSender<Inbound>,
    task_id: TaskId,
    generation: u64,
}

impl Forwarder {
    fn send(&self, frame: Frame) {
        let inbound = Inbound {
            task_id: self.task_id.clone(),
            generation: self.generation,
            frame,
        };
        // Receiver gone means the hub was dropped.
        let _ = self.tx.send(inbound);
    }
}

async fn read_stream(
    connector: Arc<dyn StreamConnector>,
    forwarder: Forwarder,
    mut outbound: mpsc::UnboundedReceiver<String>,
    token: CancellationToken,
) {
    let connected = tokio::select! {
        _ = token.cancelled() => return,
        connected = connector.connect(&forwarder.task_id) => connected,
    };
    let mut stream = match connected {
        Ok(stream) => stream,
        Err(err) => {
            forwarder.send(Frame::Lost(err));
            return;
        }
    };
    forwarder.send(Frame::Opened);

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => {
                stream.close().await;
                return;
            }
            Some(text) = outbound.recv() => {
                if let Err(err) = stream.send_text(&text).await {
                    stream.close().await;
                    forwarder.send(Frame::Lost(err));
                    return;
                }
                continue;
            }
            next = stream.next_text() => next,
        };

        match next {
            None => {
                forwarder.send(Frame::Lost(StreamError::ClosedEarly));
                return;
            }
            Some(Err(err)) => {
                stream.close().await;
                forwarder.send(Frame::Lost(err));
                return;
            }
            Some(Ok(text)) => match StatusEvent::parse(&text) {
                Ok(event) if event.is_terminal() => {
                    stream.close().await;
                    forwarder.send(Frame::Event(event));
                    return;
                }
                Ok(event) => forwarder.send(Frame::Event(event)),
                Err(err) => forwarder.send(Frame::Malformed(err)),
            },
        }
    }
}
