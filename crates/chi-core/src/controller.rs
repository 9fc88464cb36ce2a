//! Job/Status Controller
//!
//! The concurrency boundary around the conversation loop. At most one turn
//! runs at a time: the running message list sits behind a fair
//! `tokio::sync::Mutex`, and holding that lock *is* running a turn. The
//! status value lives in an atomic cell next to it so status queries never
//! wait for a turn to finish.
//!
//! Asynchronous asks are queued on an unbounded channel drained by a single
//! worker task, so they start in submission order and each one publishes a
//! [`AgentEvent::ResponseReady`] when its turn completes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{Mutex, broadcast, mpsc};

use crate::error::AgentError;
use crate::message::{Message, Role};
use crate::reasoning::Agent;
use crate::session::HistoryStore;

/// Opaque handle returned by an asynchronous ask
pub type JobId = String;

const EVENT_CAPACITY: usize = 64;

/// Observable controller state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Ready,
    Thinking,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Ready => "ready",
            JobStatus::Thinking => "thinking",
            JobStatus::Error => "error",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => JobStatus::Thinking,
            2 => JobStatus::Error,
            _ => JobStatus::Ready,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications published to subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StatusChanged { status: JobStatus },
    ResponseReady { job_id: JobId, response: String },
}

struct QueuedJob {
    id: JobId,
    prompt: String,
}

/// Runs turns one at a time and owns the status cell
struct TurnRunner {
    agent: Agent,
    store: Arc<dyn HistoryStore>,
    running: Mutex<Vec<Message>>,
    status: AtomicU8,
    events: broadcast::Sender<AgentEvent>,
}

impl TurnRunner {
    fn set_status(&self, status: JobStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
        // No subscribers is fine
        let _ = self.events.send(AgentEvent::StatusChanged { status });
    }

    async fn persist(&self, role: Role, content: &str) {
        let store = Arc::clone(&self.store);
        let content = content.to_string();
        let saved = tokio::task::spawn_blocking(move || store.append_message(role, &content)).await;
        match saved {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(role = %role, error = %e, "Failed to persist message"),
            Err(e) => tracing::warn!(role = %role, error = %e, "History writer panicked"),
        }
    }

    async fn run(&self, prompt: &str) -> String {
        let mut running = self.running.lock().await;
        self.set_status(JobStatus::Thinking);
        self.persist(Role::User, prompt).await;

        let turn = self.agent.run_turn(&running, prompt);
        let outcome = match self.agent.config().turn_timeout {
            Some(limit) => match tokio::time::timeout(limit, turn).await {
                Ok(outcome) => outcome,
                Err(_) => Err(AgentError::TurnTimeout(limit.as_secs())),
            },
            None => turn.await,
        };

        match outcome {
            Ok(reply) => {
                self.persist(Role::Assistant, &reply.text).await;
                if reply.is_backend_failure() {
                    self.set_status(JobStatus::Error);
                } else {
                    *running = reply.messages;
                    self.set_status(JobStatus::Ready);
                }
                reply.text
            }
            Err(e) => {
                tracing::error!(error = %e, "Turn failed");
                self.set_status(JobStatus::Error);
                format!("Error: {}", e)
            }
        }
    }
}

/// Synchronous and asynchronous entry points over one [`Agent`]
#[derive(Clone)]
pub struct JobController {
    runner: Arc<TurnRunner>,
    jobs: mpsc::UnboundedSender<QueuedJob>,
}

impl JobController {
    /// Create the controller and spawn its job worker. Must be called
    /// inside a Tokio runtime.
    pub fn new(agent: Agent, store: Arc<dyn HistoryStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let runner = Arc::new(TurnRunner {
            agent,
            store,
            running: Mutex::new(Vec::new()),
            status: AtomicU8::new(JobStatus::Ready as u8),
            events,
        });

        let (jobs, queue) = mpsc::unbounded_channel();
        tokio::spawn(drain_jobs(Arc::clone(&runner), queue));

        Self { runner, jobs }
    }

    /// Run one turn and wait for its answer.
    ///
    /// The turn runs on its own task, so dropping the returned future does
    /// not abandon it halfway: it still persists its answer and settles the
    /// status.
    pub async fn ask(&self, prompt: &str) -> String {
        let runner = Arc::clone(&self.runner);
        let prompt = prompt.to_string();
        match tokio::spawn(async move { runner.run(&prompt).await }).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "Turn task failed");
                self.runner.set_status(JobStatus::Error);
                format!("Error: {}", e)
            }
        }
    }

    /// Queue one turn and return its job id immediately
    pub fn ask_async(&self, prompt: impl Into<String>) -> JobId {
        let id = new_job_id();
        let job = QueuedJob {
            id: id.clone(),
            prompt: prompt.into(),
        };
        if self.jobs.send(job).is_err() {
            tracing::error!(job_id = %id, "Job worker is gone; job dropped");
        } else {
            tracing::info!(job_id = %id, "Job queued");
        }
        id
    }

    /// Current status, without waiting for a running turn
    pub fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.runner.status.load(Ordering::SeqCst))
    }

    /// Receive status changes and finished async jobs from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.runner.events.subscribe()
    }

    /// Conversation history store
    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.runner.store
    }

    /// The agent driving each turn
    pub fn agent(&self) -> &Agent {
        &self.runner.agent
    }
}

async fn drain_jobs(runner: Arc<TurnRunner>, mut queue: mpsc::UnboundedReceiver<QueuedJob>) {
    while let Some(job) = queue.recv().await {
        tracing::info!(job_id = %job.id, "Job started");
        let response = runner.run(&job.prompt).await;
        let _ = runner.events.send(AgentEvent::ResponseReady {
            job_id: job.id,
            response,
        });
    }
    tracing::debug!("Job queue closed");
}

fn new_job_id() -> JobId {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
