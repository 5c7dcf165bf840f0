//! Background worker that posts generated replies after a delay.
//!
//! Request handlers enqueue a [`ReplyJob`] holding a snapshot of the prompt
//! and its context. The worker waits the configured delay for each job in its
//! own task, asks the generator for a reply, then appends it through the store
//! so deletions made in the meantime are honoured.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::llm::{ContextMessage, TextGenerator};

use super::error::ChatError;
use super::store::StateStore;
use super::types::{DELIVERED_STATUS, Message, Participant};

/// Default delay between a human message and the generated reply.
pub const DEFAULT_REPLY_DELAY: Duration = Duration::from_secs(2);

/// Number of conversation messages captured as context for a reply.
pub const REPLY_CONTEXT_MESSAGES: usize = 5;

/// Immutable snapshot of what a reply needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyJob {
    /// Conversation the reply goes to.
    pub conversation_id: String,
    /// The human message being answered.
    pub prompt: String,
    /// Messages preceding (and including) the prompt.
    pub context: Vec<ContextMessage>,
}

/// Handle to the reply worker.
#[derive(Clone)]
pub struct ReplyScheduler {
    jobs: mpsc::UnboundedSender<ReplyJob>,
    shutdown: Arc<Notify>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ReplyScheduler {
    /// Spawn the worker as a tokio task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(
        store: Arc<StateStore>,
        generator: Arc<dyn TextGenerator>,
        delay: Duration,
    ) -> Self {
        let (jobs, receiver) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());
        let worker = ReplyWorker {
            store,
            generator,
            delay,
            receiver,
            shutdown: Arc::clone(&shutdown),
            pending: JoinSet::new(),
        };
        let handle = tokio::spawn(worker.run());
        Self {
            jobs,
            shutdown,
            worker: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Queue a reply. Never blocks.
    ///
    /// Returns `false` if the worker has stopped.
    pub fn schedule(&self, job: ReplyJob) -> bool {
        debug!(conversation = %job.conversation_id, "reply scheduled");
        self.jobs.send(job).is_ok()
    }

    /// Stop accepting jobs and wait until every queued reply has been
    /// delivered or dropped.
    ///
    /// Calling it again after the worker has stopped returns immediately.
    pub async fn shutdown(&self) {
        self.shutdown.notify_one();
        let Some(handle) = self.worker.lock().await.take() else {
            return;
        };
        if let Err(err) = handle.await {
            warn!(%err, "reply worker ended abnormally");
        }
    }
}

struct ReplyWorker {
    store: Arc<StateStore>,
    generator: Arc<dyn TextGenerator>,
    delay: Duration,
    receiver: mpsc::UnboundedReceiver<ReplyJob>,
    shutdown: Arc<Notify>,
    pending: JoinSet<()>,
}

impl ReplyWorker {
    async fn run(mut self) {
        info!(delay = ?self.delay, "Starting reply worker");

        loop {
            tokio::select! {
                job = self.receiver.recv() => {
                    let Some(job) = job else { break };
                    self.start(job);
                }
                Some(finished) = self.pending.join_next(), if !self.pending.is_empty() => {
                    if let Err(err) = finished {
                        warn!(%err, "reply task ended abnormally");
                    }
                }
                () = self.shutdown.notified() => {
                    info!("Reply worker shutting down");
                    break;
                }
            }
        }

        // Jobs accepted before the channel closed still run.
        self.receiver.close();
        while let Some(job) = self.receiver.recv().await {
            self.start(job);
        }
        if !self.pending.is_empty() {
            info!(pending = self.pending.len(), "Waiting for scheduled replies");
        }
        while let Some(finished) = self.pending.join_next().await {
            if let Err(err) = finished {
                warn!(%err, "reply task ended abnormally");
            }
        }
        info!("Reply worker stopped");
    }

    fn start(&mut self, job: ReplyJob) {
        let store = Arc::clone(&self.store);
        let generator = Arc::clone(&self.generator);
        let delay = self.delay;
        self.pending.spawn(async move {
            tokio::time::sleep(delay).await;
            deliver(&store, generator.as_ref(), job).await;
        });
    }
}

/// Generate and append one reply. Failures are logged and dropped.
async fn deliver(
    store: &StateStore,
    generator: &dyn TextGenerator,
    job: ReplyJob,
) -> Option<Message> {
    let text = match generator.generate(&job.prompt, &job.context).await {
        Ok(text) => text,
        Err(err) => {
            warn!(conversation = %job.conversation_id, %err, "reply generation failed");
            return None;
        }
    };

    let reply = Message::new(Participant::Their, text, DELIVERED_STATUS);
    let appended = reply.clone();
    let result = store
        .update(|state| {
            let conversation = state
                .conversations
                .get_mut(&job.conversation_id)
                .ok_or_else(|| ChatError::not_found(job.conversation_id.as_str()))?;
            conversation.messages.push(appended);
            Ok(())
        })
        .await;

    match result {
        Ok(()) => {
            debug!(conversation = %job.conversation_id, "reply delivered");
            Some(reply)
        }
        Err(ChatError::NotFound(_)) => {
            debug!(conversation = %job.conversation_id, "conversation gone, reply dropped");
            None
        }
        Err(err) => {
            warn!(conversation = %job.conversation_id, %err, "reply could not be stored");
            None
        }
    }
}
