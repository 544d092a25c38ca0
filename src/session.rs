use crate::engine::AgentEngine;
use crate::protocol::WireEvent;
use crate::translate::Translator;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self != SessionState::Pending
    }
}

/// Moves `state` out of `Pending`. Terminal states never change again.
fn settle(state: &watch::Sender<SessionState>, next: SessionState) -> bool {
    state.send_if_modified(|current| {
        if current.is_terminal() {
            false
        } else {
            *current = next;
            true
        }
    })
}

/// One request's run: the agent produces into a bounded queue while the
/// transport drains it. Dropping a pending session cancels the run.
pub struct StreamSession {
    id: Uuid,
    events: mpsc::Receiver<WireEvent>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<SessionState>>,
}

/// Observer for a session that may outlive it.
#[derive(Clone)]
pub struct SessionHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl StreamSession {
    pub fn start(engine: Arc<dyn AgentEngine>, query: String, capacity: usize) -> Self {
        let id = Uuid::new_v4();
        let (tx, events) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let (state, _) = watch::channel(SessionState::Pending);
        let state = Arc::new(state);

        let span = tracing::info_span!("session", %id);
        tokio::spawn(
            produce(engine, query, tx, cancel.clone(), Arc::clone(&state), id).instrument(span),
        );

        Self {
            id,
            events,
            cancel,
            state,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            cancel: self.cancel.clone(),
            state: self.state.subscribe(),
        }
    }

    pub async fn next_event(&mut self) -> Option<WireEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The transport gave up waiting; the run is failed and told to stop.
    pub fn time_out(&self) {
        if settle(&self.state, SessionState::Failed) {
            tracing::warn!(session = %self.id, "session timed out");
        }
        self.cancel.cancel();
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if !self.state().is_terminal() {
            tracing::debug!(session = %self.id, "consumer went away, cancelling run");
            self.cancel();
        }
    }
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the session leaves `Pending`.
    pub async fn terminal_state(&mut self) -> SessionState {
        if let Ok(state) = self.state.wait_for(|state| state.is_terminal()).await {
            return *state;
        }
        // The producer settles before it drops the sender.
        *self.state.borrow()
    }
}

async fn produce(
    engine: Arc<dyn AgentEngine>,
    query: String,
    tx: mpsc::Sender<WireEvent>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<SessionState>>,
    id: Uuid,
) {
    tracing::info!("agent run started");
    let mut translator = Translator::new(id);
    let mut run = engine.run(query, cancel.clone());

    let outcome = 'run: loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break 'run SessionState::Cancelled,
            next = run.next() => next,
        };

        let events = match next {
            Some(item) => translator.translate(item),
            None => translator.abandoned(),
        };

        for event in events {
            let terminal = match &event {
                WireEvent::Complete { .. } => Some(SessionState::Succeeded),
                WireEvent::Error { .. } => Some(SessionState::Failed),
                _ => None,
            };

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                sent = tx.send(event) => sent.is_ok(),
            };
            if !sent {
                break 'run SessionState::Cancelled;
            }
            if let Some(terminal) = terminal {
                break 'run terminal;
            }
        }
    };

    if outcome == SessionState::Cancelled {
        cancel.cancel();
    }
    drop(run);

    settle(&state, outcome);
    let final_state = *state.borrow();
    tracing::info!(state = ?final_state, "agent run finished");
}
