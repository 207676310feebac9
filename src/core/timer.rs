use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Resolution of one guarded attempt. Exactly one variant is produced per
/// [`TimerGuard::run`] call; the losing path never observes an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome<T> {
    /// The guarded operation finished before the deadline fired
    Completed(T),
    /// The deadline fired first; the guarded operation was dropped
    DeadlineExpired,
}

impl<T> AttemptOutcome<T> {
    /// True when the deadline fired before the operation completed.
    pub fn expired(&self) -> bool {
        matches!(self, AttemptOutcome::DeadlineExpired)
    }
}

/// Arms one deadline around one attempt and resolves the race between
/// completion and expiry exactly once.
///
/// The two safety rules the rest of the system leans on:
/// - a disarmed guard can only resolve `Completed`, no matter how long the
///   attempt takes; disarming is idempotent and never errors, even after the
///   race already resolved
/// - when completion and expiry become ready in the same poll, completion
///   wins
///
/// Violating either rule would mean a response written twice or a retry
/// issued after the original response already completed, so the contract is
/// carried by the type: `run` returns exactly one [`AttemptOutcome`].
#[derive(Debug)]
pub struct TimerGuard {
    deadline: Duration,
    disarmed: CancellationToken,
}

impl TimerGuard {
    /// Arm a guard that lets attempts run for at most `deadline`.
    pub fn arm(deadline: Duration) -> Self {
        TimerGuard {
            deadline,
            disarmed: CancellationToken::new(),
        }
    }

    /// Disarm the guard so expiry can no longer fire.
    ///
    /// Safe to call any number of times, before or after the race resolved.
    pub fn disarm(&self) {
        self.disarmed.cancel();
    }

    /// True while expiry can still fire.
    pub fn is_armed(&self) -> bool {
        !self.disarmed.is_cancelled()
    }

    /// Configured deadline for attempts under this guard.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Drive `attempt` to completion under this guard's deadline.
    ///
    /// Losing the race drops `attempt`, which cancels any outbound call the
    /// future owns; the caller aborts host-side work separately.
    pub async fn run<F>(&self, attempt: F) -> AttemptOutcome<F::Output>
    where
        F: std::future::Future,
    {
        tokio::select! {
            biased;
            output = attempt => AttemptOutcome::Completed(output),
            _ = self.expiry() => AttemptOutcome::DeadlineExpired,
        }
    }

    /// Resolves when the deadline elapses while the guard is still armed;
    /// pends forever once disarmed. Disarming wins over an elapsed deadline
    /// when both are observed in the same poll.
    async fn expiry(&self) {
        tokio::select! {
            biased;
            _ = self.disarmed.cancelled() => std::future::pending::<()>().await,
            _ = tokio::time::sleep(self.deadline) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn after(delay: Duration, value: u32) -> u32 {
        tokio::time::sleep(delay).await;
        value
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_before_deadline() {
        let guard = TimerGuard::arm(Duration::from_millis(100));
        assert_eq!(guard.deadline(), Duration::from_millis(100));
        let outcome = guard.run(after(Duration::from_millis(20), 7)).await;
        assert_eq!(outcome, AttemptOutcome::Completed(7));
        assert!(guard.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires_first() {
        let guard = TimerGuard::arm(Duration::from_millis(50));
        let outcome = guard.run(after(Duration::from_secs(60), 7)).await;
        assert_eq!(outcome, AttemptOutcome::DeadlineExpired);
        assert!(outcome.expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarmed_guard_never_expires() {
        let guard = TimerGuard::arm(Duration::from_millis(10));
        guard.disarm();
        let outcome = guard.run(after(Duration::from_secs(3600), 42)).await;
        assert_eq!(outcome, AttemptOutcome::Completed(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_is_idempotent() {
        let guard = TimerGuard::arm(Duration::from_millis(10));
        guard.disarm();
        guard.disarm();
        assert!(!guard.is_armed());
        let outcome = guard.run(after(Duration::from_secs(1), 1)).await;
        assert_eq!(outcome, AttemptOutcome::Completed(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_after_expiry_is_a_noop() {
        let guard = TimerGuard::arm(Duration::from_millis(10));
        let outcome = guard.run(after(Duration::from_secs(1), 1)).await;
        assert_eq!(outcome, AttemptOutcome::DeadlineExpired);
        guard.disarm();
        assert!(!guard.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_simultaneous_readiness_prefers_completion() {
        let guard = TimerGuard::arm(Duration::ZERO);
        let outcome = guard.run(std::future::ready(9)).await;
        assert_eq!(outcome, AttemptOutcome::Completed(9));
    }
}
