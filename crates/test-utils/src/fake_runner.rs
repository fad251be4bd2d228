use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dagweave::exec::{RunFuture, RunRequest, RunnerFailure, RunnerOutput, TaskRunner};

type Responder = Arc<dyn Fn(&RunRequest) -> Result<RunnerOutput, RunnerFailure> + Send + Sync>;

/// A fake runner that:
/// - records which tasks were dispatched, in order
/// - answers per template with a scripted response (default: the task name
///   as result)
/// - can delay or hang a template to exercise timeouts and cancellation
/// - tracks how many runs were in flight at once.
#[derive(Clone, Default)]
pub struct FakeRunner {
    responders: Arc<Mutex<HashMap<String, Responder>>>,
    delays: Arc<Mutex<HashMap<String, Option<Duration>>>>,
    dispatched: Arc<Mutex<Vec<String>>>,
    finished: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer runs of `template` with `f`.
    pub fn respond<F>(self, template: &str, f: F) -> Self
    where
        F: Fn(&RunRequest) -> Result<RunnerOutput, RunnerFailure> + Send + Sync + 'static,
    {
        self.responders
            .lock()
            .unwrap()
            .insert(template.to_string(), Arc::new(f));
        self
    }

    /// `template` returns the value of its input `input` as result.
    pub fn echo(self, template: &str, input: &str) -> Self {
        let input = input.to_string();
        self.respond(template, move |req| {
            Ok(RunnerOutput {
                result: req.inputs.get(&input).cloned().unwrap_or_default(),
                ..Default::default()
            })
        })
    }

    /// `template` always fails with `message`.
    pub fn fail(self, template: &str, message: &str) -> Self {
        let message = message.to_string();
        self.respond(template, move |_| Err(RunnerFailure::new(message.clone())))
    }

    /// Runs of `template` take `delay` before answering.
    pub fn delay(self, template: &str, delay: Duration) -> Self {
        self.delays
            .lock()
            .unwrap()
            .insert(template.to_string(), Some(delay));
        self
    }

    /// Runs of `template` never finish on their own.
    pub fn hang(self, template: &str) -> Self {
        self.delays
            .lock()
            .unwrap()
            .insert(template.to_string(), None);
        self
    }

    /// Task names in dispatch order.
    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().clone()
    }

    /// Task names whose run returned, in completion order.
    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }

    pub fn dispatch_count(&self, task: &str) -> usize {
        self.dispatched
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.as_str() == task)
            .count()
    }

    /// Highest number of runs observed in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn into_runner(self) -> Arc<dyn TaskRunner> {
        Arc::new(self)
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TaskRunner for FakeRunner {
    fn run(&self, request: RunRequest) -> RunFuture<'_> {
        Box::pin(async move {
            self.dispatched.lock().unwrap().push(request.task.clone());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(self.in_flight.clone());

            let delay = self.delays.lock().unwrap().get(&request.template).cloned();
            match delay {
                Some(Some(d)) => tokio::time::sleep(d).await,
                Some(None) => std::future::pending::<()>().await,
                None => tokio::task::yield_now().await,
            }

            let responder = self
                .responders
                .lock()
                .unwrap()
                .get(&request.template)
                .cloned();
            let result = match responder {
                Some(f) => f(&request),
                None => Ok(RunnerOutput {
                    result: request.task.clone(),
                    ..Default::default()
                }),
            };

            self.finished.lock().unwrap().push(request.task.clone());
            result
        })
    }
}
