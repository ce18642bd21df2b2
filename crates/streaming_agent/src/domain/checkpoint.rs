use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_CHECKPOINT_COUNT_THRESHOLD: u64 = 1000;
pub const DEFAULT_CHECKPOINT_TIME_THRESHOLD: Duration = Duration::from_secs(60);

/// Lifecycle of one partition worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Opened,
    Processing,
    Checkpointed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointPolicy {
    pub count_threshold: u64,
    pub time_threshold: Duration,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self {
            count_threshold: DEFAULT_CHECKPOINT_COUNT_THRESHOLD,
            time_threshold: DEFAULT_CHECKPOINT_TIME_THRESHOLD,
        }
    }
}

/// Per-partition progress since the last committed checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointState {
    policy: CheckpointPolicy,
    messages_since_last_checkpoint: u64,
    next_checkpoint_deadline: Instant,
}

impl CheckpointState {
    pub fn new(policy: CheckpointPolicy, now: Instant) -> Self {
        Self {
            policy,
            messages_since_last_checkpoint: 0,
            next_checkpoint_deadline: now + policy.time_threshold,
        }
    }

    pub fn record(&mut self, messages: u64) {
        self.messages_since_last_checkpoint += messages;
    }

    /// Count threshold reached, or the deadline has passed.
    pub fn is_due(&self, now: Instant) -> bool {
        self.messages_since_last_checkpoint >= self.policy.count_threshold
            || now > self.next_checkpoint_deadline
    }

    /// Call only after a successful commit.
    pub fn reset(&mut self, now: Instant) {
        self.messages_since_last_checkpoint = 0;
        self.next_checkpoint_deadline = now + self.policy.time_threshold;
    }

    pub fn messages_since_last_checkpoint(&self) -> u64 {
        self.messages_since_last_checkpoint
    }

    pub fn next_checkpoint_deadline(&self) -> Instant {
        self.next_checkpoint_deadline
    }
}
