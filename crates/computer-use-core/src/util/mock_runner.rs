//! Scripted command runner for tests
//!
//! `MockCommandRunner` implements [`CommandRunner`] without touching the
//! host. Responses are scripted per program (optionally per `DISPLAY`),
//! every call is recorded, and spawned processes are tracked so tests can
//! assert how many were started and whether they were terminated.
//!
//! ```
//! use computer_use_core::util::{
//!     mock_runner::MockCommandRunner,
//!     process::{CommandOutput, CommandRunner, CommandSpec},
//! };
//!
//! # tokio_test_block(async {
//! let runner = MockCommandRunner::new().respond("xset", CommandOutput::failed(1, "unable to open display"));
//! let output = runner.run(&CommandSpec::new("xset").arg("q")).await.unwrap();
//! assert!(!output.success());
//! assert_eq!(runner.calls_for("xset").len(), 1);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f);
//! # }
//! ```

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::process::{CommandOutput, CommandRunner, CommandSpec, ManagedProcess, with_timeout};
use crate::error::{DesktopError, DesktopResult};

/// Scripted reply to a `run` call
#[derive(Debug, Clone)]
pub enum MockResponse {
    Output(CommandOutput),
    Error(DesktopError),
}

/// Observable state of a process started through the mock
#[derive(Debug)]
pub struct MockProcessState {
    pub pid: u32,
    pub program: String,
    pub args: Vec<String>,
    running: AtomicBool,
    terminate_calls: AtomicUsize,
}

impl MockProcessState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn terminate_calls(&self) -> usize {
        self.terminate_calls.load(Ordering::SeqCst)
    }

    /// Simulates the process exiting on its own
    pub fn exit(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

struct MockProcess {
    state: Arc<MockProcessState>,
    terminate_error: Option<DesktopError>,
}

#[async_trait]
impl ManagedProcess for MockProcess {
    fn pid(&self) -> Option<u32> {
        self.is_running_now().then_some(self.state.pid)
    }

    fn is_running(&mut self) -> bool {
        self.is_running_now()
    }

    async fn terminate(&mut self, _grace: Duration) -> DesktopResult<()> {
        self.state.terminate_calls.fetch_add(1, Ordering::SeqCst);
        self.state.running.store(false, Ordering::SeqCst);
        match &self.terminate_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl MockProcess {
    fn is_running_now(&self) -> bool {
        self.state.is_running()
    }
}

/// [`CommandRunner`] that never touches the host
pub struct MockCommandRunner {
    responses: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    default_response: CommandOutput,
    spawn_failures: Mutex<HashMap<String, DesktopError>>,
    terminate_failures: Mutex<HashMap<String, DesktopError>>,
    delay: Option<Duration>,
    spawn_delay: Option<Duration>,
    calls: Mutex<Vec<CommandSpec>>,
    processes: Mutex<Vec<Arc<MockProcessState>>>,
    next_pid: AtomicU32,
}

impl Default for MockCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCommandRunner {
    /// Every unscripted command succeeds with empty output
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            default_response: CommandOutput::ok(Vec::new()),
            spawn_failures: Mutex::new(HashMap::new()),
            terminate_failures: Mutex::new(HashMap::new()),
            delay: None,
            spawn_delay: None,
            calls: Mutex::new(Vec::new()),
            processes: Mutex::new(Vec::new()),
            next_pid: AtomicU32::new(4200),
        }
    }

    /// Response for commands that have no script
    pub fn with_default(mut self, output: CommandOutput) -> Self {
        self.default_response = output;
        self
    }

    /// Delay applied to every `run` call, subject to the command timeout
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delay applied to every `spawn` call
    pub fn with_spawn_delay(mut self, delay: Duration) -> Self {
        self.spawn_delay = Some(delay);
        self
    }

    /// Sticky response for `program`
    pub fn respond(self, program: &str, output: CommandOutput) -> Self {
        self.script(program.to_string(), vec![MockResponse::Output(output)]);
        self
    }

    /// Sticky response for `program` when run with `DISPLAY=display`
    pub fn respond_for_display(self, program: &str, display: &str, output: CommandOutput) -> Self {
        self.script(display_key(program, display), vec![MockResponse::Output(output)]);
        self
    }

    /// Sticky error for `program`
    pub fn fail(self, program: &str, error: DesktopError) -> Self {
        self.script(program.to_string(), vec![MockResponse::Error(error)]);
        self
    }

    /// Responses consumed in order; the last one repeats
    pub fn respond_sequence(self, program: &str, responses: Vec<MockResponse>) -> Self {
        self.script(program.to_string(), responses);
        self
    }

    /// Makes `spawn` of `program` fail
    pub fn fail_spawn(self, program: &str, error: DesktopError) -> Self {
        self.spawn_failures.lock().insert(program.to_string(), error);
        self
    }

    /// Makes `terminate` of processes started from `program` fail
    pub fn fail_terminate(self, program: &str, error: DesktopError) -> Self {
        self.terminate_failures.lock().insert(program.to_string(), error);
        self
    }

    /// Replaces the script for `program` on an existing runner
    pub fn set_response(&self, program: &str, output: CommandOutput) {
        self.script(program.to_string(), vec![MockResponse::Output(output)]);
    }

    /// Replaces the display-specific script for `program`
    pub fn set_response_for_display(&self, program: &str, display: &str, output: CommandOutput) {
        self.script(display_key(program, display), vec![MockResponse::Output(output)]);
    }

    fn script(&self, key: String, responses: Vec<MockResponse>) {
        self.responses.lock().insert(key, responses.into());
    }

    /// All recorded `run` and `spawn` calls
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Recorded calls whose program equals `program`
    pub fn calls_for(&self, program: &str) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }

    /// Number of processes started via `spawn`
    pub fn spawn_count(&self) -> usize {
        self.processes.lock().len()
    }

    pub fn spawned(&self) -> Vec<Arc<MockProcessState>> {
        self.processes.lock().clone()
    }

    /// Spawned processes that have not been terminated
    pub fn running_processes(&self) -> Vec<Arc<MockProcessState>> {
        self.processes
            .lock()
            .iter()
            .filter(|p| p.is_running())
            .cloned()
            .collect()
    }

    fn next_response(&self, spec: &CommandSpec) -> MockResponse {
        let mut responses = self.responses.lock();
        let display_specific = spec
            .env_value("DISPLAY")
            .map(|d| display_key(&spec.program, d));

        let key = display_specific
            .filter(|k| responses.contains_key(k))
            .unwrap_or_else(|| spec.program.clone());

        match responses.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| MockResponse::Output(self.default_response.clone())),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| MockResponse::Output(self.default_response.clone())),
            None => MockResponse::Output(self.default_response.clone()),
        }
    }
}

fn display_key(program: &str, display: &str) -> String {
    format!("{program} DISPLAY={display}")
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> DesktopResult<CommandOutput> {
        self.calls.lock().push(spec.clone());
        let response = self.next_response(spec);
        let delay = self.delay;

        with_timeout(&spec.program, spec.timeout, async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match response {
                MockResponse::Output(output) => Ok(output),
                MockResponse::Error(err) => Err(err),
            }
        })
        .await
    }

    async fn spawn(&self, spec: &CommandSpec) -> DesktopResult<Box<dyn ManagedProcess>> {
        self.calls.lock().push(spec.clone());

        if let Some(delay) = self.spawn_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.spawn_failures.lock().get(&spec.program) {
            return Err(err.clone());
        }

        let state = Arc::new(MockProcessState {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            program: spec.program.clone(),
            args: spec.args.clone(),
            running: AtomicBool::new(true),
            terminate_calls: AtomicUsize::new(0),
        });
        self.processes.lock().push(state.clone());

        Ok(Box::new(MockProcess {
            state,
            terminate_error: self.terminate_failures.lock().get(&spec.program).cloned(),
        }))
    }
}
