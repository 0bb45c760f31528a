//! Background execution with single-flight replacement.
//!
//! [`PipelineSupervisor`] runs [`execute`] on a dedicated thread and
//! delivers results through an [`mpsc`] channel. At most one run is in
//! flight: submitting a new run cancels the previous one and waits for
//! its thread to exit before starting the next.
//!
//! Each submission gets a fresh, increasing `generation` number that is
//! passed through to its [`Delivery`], so a consumer can tell results
//! apart even across supervisor restarts. A run that panics still
//! delivers, as [`PipelineError::Worker`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::buffer::Image;
use crate::cancel::CancellationToken;
use crate::executor::{ExecutionResult, RunOutcome, execute};
use crate::registry::FilterSpec;
use crate::types::PipelineError;

/// A finished run, sent through the supervisor's channel.
///
/// Cancelled runs never produce a delivery.
#[derive(Debug)]
pub struct Delivery {
    /// Generation returned by the [`submit`](PipelineSupervisor::submit)
    /// call that started the run.
    pub generation: u64,
    /// The run's result, or the fatal error that aborted it.
    pub outcome: Result<ExecutionResult, PipelineError>,
}

struct ActiveRun {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns at most one in-flight pipeline run.
///
/// Dropping the supervisor cancels and joins the active run.
pub struct PipelineSupervisor {
    sender: Sender<Delivery>,
    active: Option<ActiveRun>,
    generation: u64,
    /// Held while a run checks its token and sends, and while
    /// [`cancel`](Self::cancel) sets the token, so a run that has been
    /// cancelled can never deliver afterwards.
    gate: Arc<Mutex<()>>,
}

impl PipelineSupervisor {
    /// Create a supervisor and the receiving end of its delivery channel.
    #[must_use]
    pub fn new() -> (Self, Receiver<Delivery>) {
        let (sender, receiver) = mpsc::channel();
        let supervisor = Self {
            sender,
            active: None,
            generation: 0,
            gate: Arc::new(Mutex::new(())),
        };
        (supervisor, receiver)
    }

    /// Start a run of `specs` over `base`, replacing any active run.
    ///
    /// The previous run (if any) is cancelled and joined first. Returns
    /// the generation number of the new run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Worker`] if the thread cannot be spawned.
    pub fn submit(
        &mut self,
        base: Arc<Image>,
        specs: Vec<FilterSpec>,
    ) -> Result<u64, PipelineError> {
        self.spawn_run(move |token| execute(&base, &specs, token))
    }

    /// Cancel any active run and start `job` on a fresh thread.
    fn spawn_run<F>(&mut self, job: F) -> Result<u64, PipelineError>
    where
        F: FnOnce(&CancellationToken) -> Result<RunOutcome, PipelineError> + Send + 'static,
    {
        self.cancel();

        self.generation += 1;
        let generation = self.generation;
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        let sender = self.sender.clone();
        let gate = Arc::clone(&self.gate);
        let handle = thread::Builder::new()
            .name(format!("restauro-run-{generation}"))
            .spawn(move || {
                let outcome = match panic::catch_unwind(AssertUnwindSafe(|| job(&token))) {
                    Ok(Ok(RunOutcome::Completed(result))) => Ok(result),
                    Ok(Ok(RunOutcome::Cancelled)) => {
                        debug!("run {generation} cancelled");
                        return;
                    }
                    Ok(Err(err)) => Err(err),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!("run {generation} panicked: {message}");
                        Err(PipelineError::Worker(format!("pipeline run panicked: {message}")))
                    }
                };
                let _guard = gate.lock().unwrap_or_else(PoisonError::into_inner);
                if token.is_cancelled() {
                    debug!("run {generation} cancelled after finishing; result dropped");
                    return;
                }
                if sender.send(Delivery { generation, outcome }).is_err() {
                    debug!("run {generation} finished after the receiver was dropped");
                }
            })
            .map_err(|e| PipelineError::Worker(e.to_string()))?;

        self.active = Some(ActiveRun {
            generation,
            cancel,
            handle,
        });
        Ok(generation)
    }

    /// Cancel the active run, if any, and wait for its thread to exit.
    ///
    /// A run that already delivered is unaffected; one that has not
    /// will never deliver.
    pub fn cancel(&mut self) {
        let Some(run) = self.active.take() else {
            return;
        };
        {
            let _guard = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
            run.cancel.cancel();
        }
        if run.handle.join().is_err() {
            warn!("run {} panicked", run.generation);
        }
    }

    /// Whether a run is still executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    /// Generation of the most recent submission (0 before the first).
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// Text of a panic payload, when it carries one.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl Drop for PipelineSupervisor {
    fn drop(&mut self) {
        self.cancel();
    }
}
