use std::time::Duration;

/// Handle to a scheduled one-shot task. Cancelling is idempotent and a task
/// that already fired ignores it.
pub trait ScheduledTask {
    fn cancel(&self);
}

/// One-shot timer service on the designated scheduling context.
///
/// The task must run on the thread the client was created on. Re-arming is
/// expressed by cancelling the previous handle and scheduling anew; the
/// client never relies on a timer firing synchronously.
pub trait TimerScheduler {
    fn schedule(&self, after: Duration, task: Box<dyn FnOnce()>) -> Box<dyn ScheduledTask>;
}
