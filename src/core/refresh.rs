use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::oneshot;

/// Why a session can no longer be used
///
/// Every caller parked behind a failed refresh receives the same value,
/// so this is `Clone` and carries no transport objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no refresh token stored; sign in again")]
    NoRefreshToken,

    #[error("refresh token rejected by the server (status {status})")]
    Rejected { status: u16 },

    #[error("refresh response did not contain an access token")]
    MissingAccessToken,

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("signed out")]
    SignedOut,
}

/// Outcome of one refresh cycle: the new access token or the failure
pub type RefreshOutcome = Result<String, SessionError>;

enum Phase {
    Idle,
    Refreshing {
        waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
    },
}

/// What a request that just saw a 401 should do next
#[derive(Debug)]
pub enum Admission {
    /// No refresh is running: the caller must drive one and then
    /// [`RefreshCoordinator::settle`] it. The receiver is the caller's own
    /// place at the head of the queue.
    Lead(oneshot::Receiver<RefreshOutcome>),
    /// A refresh is running: wait for it to settle
    Wait(oneshot::Receiver<RefreshOutcome>),
    /// A refresh settled after this request was sent; reuse its outcome
    Settled(RefreshOutcome),
}

/// The IDLE / REFRESHING state machine with its waiter queue
///
/// All methods are synchronous. Callers keep it behind a plain mutex and
/// never hold the lock across an await, so the check-then-set in
/// [`on_unauthorized`](Self::on_unauthorized) cannot interleave with
/// another task.
pub struct RefreshCoordinator {
    phase: Phase,
    epoch: u64,
    last_outcome: Option<RefreshOutcome>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            epoch: 0,
            last_outcome: None,
        }
    }

    /// Incremented every time the session changes (refresh settled,
    /// sign-in, sign-out). Requests record it before they are sent.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(self.phase, Phase::Refreshing { .. })
    }

    /// Number of callers parked on the running refresh, leader included
    pub fn pending(&self) -> usize {
        match &self.phase {
            Phase::Refreshing { waiters } => waiters.len(),
            Phase::Idle => 0,
        }
    }

    /// Admit a request that received a 401 after being sent at `sent_epoch`
    pub fn on_unauthorized(&mut self, sent_epoch: u64) -> Admission {
        if let Phase::Refreshing { waiters } = &mut self.phase {
            let (tx, rx) = oneshot::channel();
            waiters.push_back(tx);
            return Admission::Wait(rx);
        }

        if sent_epoch != self.epoch {
            if let Some(outcome) = &self.last_outcome {
                return Admission::Settled(outcome.clone());
            }
        }

        let (tx, rx) = oneshot::channel();
        let mut waiters = VecDeque::new();
        waiters.push_back(tx);
        self.phase = Phase::Refreshing { waiters };
        Admission::Lead(rx)
    }

    /// Finish the running refresh and drain the queue in FIFO order
    ///
    /// Returns how many waiters were handed the outcome. Waiters whose
    /// caller went away are skipped silently.
    pub fn settle(&mut self, outcome: RefreshOutcome) -> usize {
        let waiters = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Refreshing { waiters } => waiters,
            Phase::Idle => VecDeque::new(),
        };

        self.epoch += 1;
        self.last_outcome = Some(outcome.clone());

        let mut delivered = 0;
        for waiter in waiters {
            if waiter.send(outcome.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Record a session change that did not come from a refresh
    ///
    /// A running refresh is left alone; its own settle will win.
    pub fn session_changed(&mut self, outcome: RefreshOutcome) {
        self.epoch += 1;
        self.last_outcome = Some(outcome);
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
