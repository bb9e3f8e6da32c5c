//! Lazy, memoized engine construction.
//!
//! The [`EngineLoader`] owns the single engine instance of a host. The first
//! call to [`EngineLoader::ensure_ready`] builds it; later calls return the
//! cached [`EngineHandle`]. The state mutex is held across construction, so
//! concurrent first callers wait for one shared initialization.
//!
//! A failed initialization is sticky: every later call fails with
//! `EngineUnavailable` until [`EngineLoader::reinitialize`] is called.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{error, info};
use transforge_common::{EventBus, EventPayload, Result, TranscodeError};
use transforge_engine::{BuildOptions, Engine, EngineBuilder};

/// Shared reference to the initialized engine.
///
/// Cloning copies the reference, never the engine. Handles from the same
/// initialization compare equal.
#[derive(Clone)]
pub struct EngineHandle(Arc<dyn Engine>);

impl EngineHandle {
    pub fn same_engine(&self, other: &EngineHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for EngineHandle {
    type Target = dyn Engine;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for EngineHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_engine(other)
    }
}

impl Eq for EngineHandle {}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EngineHandle").field(&self.0.name()).finish()
    }
}

enum LoaderState {
    Uninit,
    Ready(EngineHandle),
    Failed(String),
}

/// Builds the engine once and hands out references to it.
pub struct EngineLoader {
    builder: Arc<dyn EngineBuilder>,
    options: BuildOptions,
    required_capabilities: Vec<String>,
    state: Mutex<LoaderState>,
    initializations: AtomicUsize,
    /// Mirrors `LoaderState::Ready`; written under the state lock.
    ready: AtomicBool,
    events: Option<Arc<EventBus>>,
}

impl EngineLoader {
    pub fn new(builder: Arc<dyn EngineBuilder>) -> Self {
        Self {
            builder,
            options: BuildOptions::default(),
            required_capabilities: Vec::new(),
            state: Mutex::new(LoaderState::Uninit),
            initializations: AtomicUsize::new(0),
            ready: AtomicBool::new(false),
            events: None,
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Capabilities the engine must report; initialization fails otherwise.
    pub fn with_required_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Name of the backend this loader constructs.
    pub fn backend(&self) -> &'static str {
        self.builder.backend()
    }

    /// Number of construction attempts so far.
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }

    /// Whether a ready engine is cached. Never triggers initialization.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Return the engine, constructing it on first use.
    ///
    /// # Errors
    ///
    /// `EngineUnavailable` if construction failed now or on an earlier call.
    pub async fn ensure_ready(&self) -> Result<EngineHandle> {
        let mut state = self.state.lock().await;
        match &*state {
            LoaderState::Ready(handle) => return Ok(handle.clone()),
            LoaderState::Failed(message) => {
                return Err(TranscodeError::engine_unavailable(message.clone()))
            }
            LoaderState::Uninit => {}
        }

        self.initializations.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        info!(backend = self.builder.backend(), "Initializing engine");

        match self.initialize().await {
            Ok(handle) => {
                info!(
                    engine = handle.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Engine ready"
                );
                self.broadcast(EventPayload::EngineReady {
                    engine: handle.name().to_string(),
                });
                *state = LoaderState::Ready(handle.clone());
                self.ready.store(true, Ordering::SeqCst);
                Ok(handle)
            }
            Err(message) => {
                error!(
                    backend = self.builder.backend(),
                    error = %message,
                    "Engine initialization failed"
                );
                self.broadcast(EventPayload::EngineFailed {
                    message: message.clone(),
                });
                *state = LoaderState::Failed(message.clone());
                Err(TranscodeError::engine_unavailable(message))
            }
        }
    }

    /// Clear a sticky failure and try again. A ready engine is returned as is.
    pub async fn reinitialize(&self) -> Result<EngineHandle> {
        {
            let mut state = self.state.lock().await;
            if matches!(*state, LoaderState::Failed(_)) {
                info!(backend = self.builder.backend(), "Re-initialization requested");
                *state = LoaderState::Uninit;
            }
        }
        self.ensure_ready().await
    }

    /// Drop the cached engine; the next [`ensure_ready`](Self::ensure_ready)
    /// constructs a fresh one. Outstanding handles stay valid until dropped.
    pub async fn teardown(&self) {
        let mut state = self.state.lock().await;
        if matches!(*state, LoaderState::Ready(_)) {
            info!(backend = self.builder.backend(), "Engine torn down");
        }
        *state = LoaderState::Uninit;
        self.ready.store(false, Ordering::SeqCst);
    }

    async fn initialize(&self) -> std::result::Result<EngineHandle, String> {
        let engine = self
            .builder
            .build(&self.options)
            .await
            .map_err(|e| e.to_string())?;

        let missing: Vec<&str> = self
            .required_capabilities
            .iter()
            .map(String::as_str)
            .filter(|c| !engine.has_capability(c))
            .collect();
        if !missing.is_empty() {
            return Err(transforge_engine::Error::missing_capability(missing.join(", ")).to_string());
        }

        Ok(EngineHandle(engine))
    }

    fn broadcast(&self, payload: EventPayload) {
        if let Some(events) = &self.events {
            events.broadcast(payload);
        }
    }
}
