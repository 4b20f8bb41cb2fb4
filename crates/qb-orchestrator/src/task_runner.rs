use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use qb_common::QuickBuyError;
use tracing::error;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Progress sinks handed to a running task. A task that doesn't need one
/// simply never calls it; submitters that don't care leave the callback
/// unset and get a no-op.
#[derive(Clone, Default)]
pub struct ProgressSink {
    text: Option<Arc<dyn Fn(String) + Send + Sync>>,
    pct: Option<Arc<dyn Fn(u8) + Send + Sync>>,
}

impl ProgressSink {
    pub fn text(&self, message: impl Into<String>) {
        if let Some(sink) = &self.text {
            sink(message.into());
        }
    }

    pub fn pct(&self, percent: u8) {
        if let Some(sink) = &self.pct {
            sink(percent.min(100));
        }
    }
}

/// The callback set a submitter registers for one task run.
pub struct TaskCallbacks<T> {
    pub on_result: Box<dyn FnOnce(T) + Send>,
    pub on_error: Box<dyn FnOnce(QuickBuyError) + Send>,
    pub on_finished: Box<dyn FnOnce() + Send>,
    pub on_progress_text: Option<Arc<dyn Fn(String) + Send + Sync>>,
    pub on_progress_pct: Option<Arc<dyn Fn(u8) + Send + Sync>>,
}

impl<T> Default for TaskCallbacks<T> {
    fn default() -> Self {
        Self {
            on_result: Box::new(|_| {}),
            on_error: Box::new(|_| {}),
            on_finished: Box::new(|| {}),
            on_progress_text: None,
            on_progress_pct: None,
        }
    }
}

/// Runs at most one heavy task at a time. A submission while a task is
/// already running is rejected outright — there is no queue. This is a
/// deliberate policy: it gives the caller immediate feedback instead of
/// letting harvest jobs pile up and race each other.
pub struct TaskRunner {
    busy: Arc<AtomicBool>,
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRunner {
    pub fn new() -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Submits a task for execution on a dedicated thread with its own
    /// Tokio runtime. Returns `Err(QuickBuyError::Busy)` immediately if a
    /// task is already running; never queues.
    pub fn submit<T, F>(&self, task: F, callbacks: TaskCallbacks<T>) -> Result<(), QuickBuyError>
    where
        T: Send + 'static,
        F: FnOnce(ProgressSink) -> BoxFuture<Result<T, QuickBuyError>> + Send + 'static,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(QuickBuyError::Busy);
        }

        let busy = self.busy.clone();
        let sink = ProgressSink {
            text: callbacks.on_progress_text.clone(),
            pct: callbacks.on_progress_pct.clone(),
        };

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = %e, "failed to create tokio runtime for task");
                    busy.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let result = rt.block_on(task(sink));
            match result {
                Ok(value) => (callbacks.on_result)(value),
                Err(e) => (callbacks.on_error)(e),
            }
            (callbacks.on_finished)();
            busy.store(false, Ordering::SeqCst);
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn rejects_submission_while_busy() {
        let runner = TaskRunner::new();
        let started = Arc::new(std::sync::Barrier::new(2));
        let started_clone = started.clone();

        runner
            .submit(
                move |_sink| {
                    Box::pin(async move {
                        started_clone.wait();
                        std::thread::sleep(Duration::from_millis(200));
                        Ok::<_, QuickBuyError>(())
                    })
                },
                TaskCallbacks::default(),
            )
            .unwrap();

        started.wait();

        let second = runner.submit(
            |_sink| Box::pin(async { Ok::<_, QuickBuyError>(()) }),
            TaskCallbacks::default(),
        );
        assert!(matches!(second, Err(QuickBuyError::Busy)));
    }

    #[test]
    fn clears_busy_flag_and_delivers_result_on_success() {
        let runner = TaskRunner::new();
        let result_holder: Arc<Mutex<Option<i32>>> = Arc::new(Mutex::new(None));
        let holder_clone = result_holder.clone();
        let finished = Arc::new(AtomicUsize::new(0));
        let finished_clone = finished.clone();

        runner
            .submit(
                |_sink| Box::pin(async { Ok::<_, QuickBuyError>(42) }),
                TaskCallbacks {
                    on_result: Box::new(move |value| {
                        *holder_clone.lock().unwrap() = Some(value);
                    }),
                    on_finished: Box::new(move || {
                        finished_clone.fetch_add(1, Ordering::SeqCst);
                    }),
                    ..TaskCallbacks::default()
                },
            )
            .unwrap();

        // Poll briefly for the dedicated thread to complete.
        for _ in 0..50 {
            if !runner.is_busy() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        assert!(!runner.is_busy());
        assert_eq!(*result_holder.lock().unwrap(), Some(42));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn progress_sink_without_callback_is_a_no_op() {
        let sink = ProgressSink::default();
        sink.text("ignored");
        sink.pct(50);
    }
}
