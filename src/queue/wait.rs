//! Wait policies for blocking queue operations

use core::time::Duration;

use spin::relax::{RelaxStrategy, Spin};

/// How long a queue operation may wait for space or data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Fail immediately.
    NoWait,
    /// Wait until the other side makes progress, however long it takes.
    WaitForever,
    /// Wait at most this long, then fail.
    WaitUpTo(Duration),
}

impl WaitPolicy {
    /// Returns true if the policy may suspend the caller.
    #[inline]
    pub const fn may_block(self) -> bool {
        !matches!(self, Self::NoWait)
    }
}

/// Monotonic time source used to enforce [`WaitPolicy::WaitUpTo`].
///
/// Firmware typically backs this with a SysTick or generic timer counter.
/// The epoch is irrelevant; only differences are used.
pub trait Clock: Sync {
    /// Time elapsed since an arbitrary fixed point.
    fn now(&self) -> Duration;
}

/// Tracks one blocking attempt against a policy.
pub(crate) struct Waiter<'c> {
    policy: WaitPolicy,
    clock: &'c dyn Clock,
    deadline: Option<Duration>,
}

impl<'c> Waiter<'c> {
    pub(crate) fn new(policy: WaitPolicy, clock: &'c dyn Clock) -> Self {
        Self {
            policy,
            clock,
            deadline: None,
        }
    }

    /// Pause before the next attempt.
    ///
    /// Returns false once the policy says to give up. The deadline starts
    /// at the first failed attempt, so the clock is never read on the
    /// fast path.
    pub(crate) fn wait(&mut self) -> bool {
        match self.policy {
            WaitPolicy::NoWait => false,
            WaitPolicy::WaitForever => {
                Spin::relax();
                true
            }
            WaitPolicy::WaitUpTo(timeout) => {
                let now = self.clock.now();
                let deadline = *self
                    .deadline
                    .get_or_insert_with(|| now.saturating_add(timeout));
                if now >= deadline {
                    return false;
                }
                Spin::relax();
                true
            }
        }
    }
}
