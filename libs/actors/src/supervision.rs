//! Restart policies and intensity limits shared by both supervisors

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// When a supervised worker is restarted after it exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Always restarted
    #[default]
    Permanent,
    /// Restarted only after an abnormal exit
    Transient,
    /// Never restarted
    Temporary,
}

impl RestartPolicy {
    pub fn should_restart(self, reason: &ExitReason) -> bool {
        match self {
            RestartPolicy::Permanent => true,
            RestartPolicy::Transient => !reason.is_normal(),
            RestartPolicy::Temporary => false,
        }
    }
}

/// Why a worker task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The worker asked to stop
    Normal,
    /// A lifecycle hook returned an error
    Failed(String),
    /// The worker task panicked
    Panicked(String),
}

impl ExitReason {
    pub fn is_normal(&self) -> bool {
        matches!(self, ExitReason::Normal)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Normal => write!(f, "normal"),
            ExitReason::Failed(reason) => write!(f, "failed: {}", reason),
            ExitReason::Panicked(reason) => write!(f, "panicked: {}", reason),
        }
    }
}

/// At most `max_restarts` restarts within any window of `window`.
///
/// The window opens at the first restart and resets once it has elapsed.
#[derive(Debug, Clone)]
pub struct RestartIntensity {
    max_restarts: u32,
    window: Duration,
    window_start: Option<Instant>,
    count: u32,
}

impl RestartIntensity {
    pub fn new(max_restarts: u32, window: Duration) -> Self {
        Self {
            max_restarts,
            window,
            window_start: None,
            count: 0,
        }
    }

    /// Record a restart attempt; false once the limit is exceeded
    pub fn allow_restart(&mut self) -> bool {
        let now = Instant::now();
        match self.window_start {
            Some(start) if now.duration_since(start) <= self.window => {
                self.count = self.count.saturating_add(1);
            }
            _ => {
                self.window_start = Some(now);
                self.count = 1;
            }
        }
        self.count <= self.max_restarts
    }

    /// Restarts counted in the current window
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max_restarts(&self) -> u32 {
        self.max_restarts
    }
}

/// Members of the one-for-all supervision group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMember {
    Registry,
    WorkerPool,
}

impl fmt::Display for GroupMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupMember::Registry => write!(f, "address registry"),
            GroupMember::WorkerPool => write!(f, "worker pool"),
        }
    }
}
