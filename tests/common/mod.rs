//! Shared test harness for integration tests.
//!
//! Provides [`ScriptedEngine`], an instrumented in-memory engine whose runs
//! can be delayed, held, or made to fail, and [`TestHarness`], which wires it
//! into a full loader/staging/executor/queue stack.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use transforge::config::Config;
use transforge::transcode::{build_queue_with, JobQueue, TranscodeRequest};
use transforge_common::EventBus;
use transforge_engine::{
    BuildOptions, Engine, EngineBuilder, Error as EngineError, MemoryNamespace, RunOutput,
};

/// What a [`ScriptedEngine`] run does.
#[derive(Debug, Clone)]
pub enum RunBehavior {
    /// Copy the `-i`/first existing input to the last argument.
    Copy,
    /// Exit with this status and diagnostic without writing anything.
    Fail { exit_code: i32, diagnostic: String },
    /// Return an engine fault instead of a status.
    Fault(String),
    /// Succeed but write a zero-length output.
    EmptyOutput,
    /// Succeed without writing any output.
    NoOutput,
}

/// Instrumented in-memory engine.
pub struct ScriptedEngine {
    namespace: MemoryNamespace,
    behavior: Mutex<RunBehavior>,
    delay: Mutex<Duration>,
    delete_delay: Mutex<Duration>,
    hold: Option<Arc<Semaphore>>,
    runs: Mutex<Vec<Vec<String>>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    writes: AtomicUsize,
    deletes: AtomicUsize,
    capabilities: Vec<String>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            namespace: MemoryNamespace::new(),
            behavior: Mutex::new(RunBehavior::Copy),
            delay: Mutex::new(Duration::ZERO),
            delete_delay: Mutex::new(Duration::ZERO),
            hold: None,
            runs: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            capabilities: vec!["copy".to_string()],
        }
    }

    pub fn with_behavior(self, behavior: RunBehavior) -> Self {
        *self.behavior.lock() = behavior;
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = delay;
        self
    }

    /// Every removal sleeps for `delay` before touching the namespace.
    pub fn with_delete_delay(self, delay: Duration) -> Self {
        *self.delete_delay.lock() = delay;
        self
    }

    /// Every run waits for one permit from `hold` before finishing.
    pub fn with_hold(mut self, hold: Arc<Semaphore>) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn set_behavior(&self, behavior: RunBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Argument vectors of every run, in invocation order.
    pub fn runs(&self) -> Vec<Vec<String>> {
        self.runs.lock().clone()
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().len()
    }

    /// Highest number of simultaneously active runs observed.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Names currently present in the namespace.
    pub fn entries(&self) -> Vec<String> {
        self.namespace.list()
    }

    fn copy(&self, args: &[String]) -> RunOutput {
        let Some((target, sources)) = args.split_last() else {
            return RunOutput::failed(1, "no output");
        };
        match sources.iter().find(|a| self.namespace.contains(a)) {
            Some(source) => match self
                .namespace
                .read(source)
                .and_then(|data| self.namespace.write(target, data))
            {
                Ok(()) => RunOutput::ok(),
                Err(e) => RunOutput::failed(1, e.to_string()),
            },
            None => RunOutput::failed(1, "No such file or directory"),
        }
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    async fn write_file(&self, path: &str, data: Bytes) -> transforge_engine::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.namespace.write(path, data)
    }

    async fn read_file(&self, path: &str) -> transforge_engine::Result<Bytes> {
        self.namespace.read(path)
    }

    async fn delete_file(&self, path: &str) -> transforge_engine::Result<()> {
        let delay = *self.delete_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.namespace.remove(path)
    }

    async fn run(&self, args: &[String]) -> transforge_engine::Result<RunOutput> {
        self.runs.lock().push(args.to_vec());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(hold) = &self.hold {
            if let Ok(permit) = hold.acquire().await {
                permit.forget();
            }
        }

        let behavior = self.behavior.lock().clone();
        let result = match behavior {
            RunBehavior::Copy => Ok(self.copy(args)),
            RunBehavior::Fail {
                exit_code,
                diagnostic,
            } => Ok(RunOutput::failed(exit_code, diagnostic)),
            RunBehavior::Fault(message) => Err(EngineError::tool_failed("scripted", message)),
            RunBehavior::EmptyOutput => {
                let target = args.last().cloned().unwrap_or_default();
                self.namespace
                    .write(&target, Bytes::new())
                    .map(|()| RunOutput::ok())
            }
            RunBehavior::NoOutput => Ok(RunOutput::ok()),
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Builder handing out one shared [`ScriptedEngine`].
pub struct ScriptedBuilder {
    engine: Arc<ScriptedEngine>,
    builds: AtomicUsize,
    fail_first: AtomicUsize,
}

impl ScriptedBuilder {
    pub fn new(engine: Arc<ScriptedEngine>) -> Self {
        Self {
            engine,
            builds: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(0),
        }
    }

    /// Fail the first `n` builds.
    pub fn failing(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineBuilder for ScriptedBuilder {
    fn backend(&self) -> &'static str {
        "scripted"
    }

    async fn build(&self, _options: &BuildOptions) -> transforge_engine::Result<Arc<dyn Engine>> {
        let attempt = self.builds.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        if attempt < self.fail_first.load(Ordering::SeqCst) {
            return Err(EngineError::tool_not_found("scripted"));
        }
        Ok(self.engine.clone() as Arc<dyn Engine>)
    }
}

/// A queue wired to a [`ScriptedEngine`].
pub struct TestHarness {
    pub queue: JobQueue,
    pub engine: Arc<ScriptedEngine>,
    pub builder: Arc<ScriptedBuilder>,
    pub events: Arc<EventBus>,
}

impl TestHarness {
    pub fn new(engine: ScriptedEngine) -> Self {
        Self::with_config(engine, Config::default())
    }

    pub fn with_config(engine: ScriptedEngine, config: Config) -> Self {
        Self::with_builder(
            ScriptedBuilder::new(Arc::new(engine)),
            config,
        )
    }

    pub fn with_builder(builder: ScriptedBuilder, config: Config) -> Self {
        let engine = Arc::clone(&builder.engine);
        let builder = Arc::new(builder);
        let events = Arc::new(EventBus::default());
        let queue = build_queue_with(
            &config,
            Arc::clone(&builder) as Arc<dyn EngineBuilder>,
            Arc::clone(&events),
        );
        Self {
            queue,
            engine,
            builder,
            events,
        }
    }
}

/// `{ bytes, "<name>.txt", "<name>.out", [INPUT, OUTPUT] }`
pub fn copy_request(name: &str, bytes: &'static [u8]) -> TranscodeRequest {
    TranscodeRequest::new(
        Bytes::from_static(bytes),
        format!("{name}.txt"),
        format!("{name}.out"),
        ["INPUT", "OUTPUT"],
    )
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
