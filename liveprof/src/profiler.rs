//! # Profiler Façade
//!
//! Entry point for instrumented code: starts transactions and steps, keeps
//! the bounded list of recently started transactions, and owns the
//! subscriber registry.
//!
//! ```
//! use liveprof::{Profiler, StepOptions};
//!
//! # fn main() -> Result<(), liveprof::ProfilerError> {
//! let profiler = Profiler::default();
//!
//! let request = profiler.transaction("HTTP", "GET /users")?;
//! {
//!     let query = profiler.step_with("DB", "select users", StepOptions::new().parameters(42))?;
//!     query.success_with("12 rows")?;
//! }
//! request.success()?;
//!
//! let recent = profiler.recent_transactions(false);
//! assert_eq!(recent[0].name, "GET /users");
//! assert_eq!(recent[0].steps().len(), 1);
//! # Ok(())
//! # }
//! ```

use log::{debug, warn};
use serde_json::Value as JsonValue;
use std::cmp::Reverse;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::config::ProfilerConfig;
use crate::context;
use crate::dispatch::{AsyncEventSubscriber, EventSubscriber, Registry, Subscriber, SubscriberKey};
use crate::domain::{ProfilerError, TransactionMode, TransactionState};
use crate::snapshot::TransactionSnapshot;
use crate::timing::{NewTiming, ProfilerContext, Timing, TimingRef, TransactionCore};

type Predicate = Box<dyn Fn(&ProfilerContext) -> bool>;

/// Optional arguments of [`Profiler::step_with`]
#[derive(Default)]
pub struct StepOptions {
    display_name: Option<String>,
    parameters: Option<JsonValue>,
    predicate: Option<Predicate>,
}

impl StepOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    #[must_use]
    pub fn parameters(mut self, parameters: impl Into<JsonValue>) -> Self {
        self.parameters = Some(parameters.into());
        self
    }

    /// Only record the step when `predicate` accepts the caller's context
    #[must_use]
    pub fn predicate(mut self, predicate: impl Fn(&ProfilerContext) -> bool + 'static) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }
}

impl std::fmt::Debug for StepOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepOptions")
            .field("display_name", &self.display_name)
            .field("parameters", &self.parameters)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Optional arguments of [`Profiler::transaction_with`]
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    display_name: Option<String>,
    parameters: Option<JsonValue>,
    correlation_id: Option<String>,
    mode: TransactionMode,
}

impl TransactionOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    #[must_use]
    pub fn parameters(mut self, parameters: impl Into<JsonValue>) -> Self {
        self.parameters = Some(parameters.into());
        self
    }

    /// Opaque id tying the transaction to work in other processes
    #[must_use]
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: TransactionMode) -> Self {
        self.mode = mode;
        self
    }
}

struct ProfilerInner {
    config: ProfilerConfig,
    /// Most recently started transactions, oldest at the front
    recent: Mutex<VecDeque<Arc<TransactionCore>>>,
    registry: Arc<Registry>,
}

/// Cheap to clone; clones share transactions and subscribers
#[derive(Clone)]
pub struct Profiler {
    inner: Arc<ProfilerInner>,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::build(ProfilerConfig::default())
    }
}

impl std::fmt::Debug for Profiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profiler")
            .field("config", &self.inner.config)
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl Profiler {
    /// # Errors
    /// `InvalidConfig` if `config` does not validate
    pub fn new(config: ProfilerConfig) -> Result<Self, ProfilerError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ProfilerConfig) -> Self {
        let registry = Arc::new(Registry::new(config.idle_poll_interval()));
        Self {
            inner: Arc::new(ProfilerInner {
                recent: Mutex::new(VecDeque::with_capacity(config.max_recent_transactions)),
                config,
                registry,
            }),
        }
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.inner.config
    }

    /// Start a step below the current timing
    ///
    /// # Errors
    /// `InvalidArgument` if `category` or `name` is blank
    pub fn step(&self, category: &str, name: &str) -> Result<Timing, ProfilerError> {
        self.step_with(category, name, StepOptions::default())
    }

    /// Start a step below the current timing.
    ///
    /// Returns an inert handle when nothing is current, when the predicate
    /// rejects the context, or when the current timing finished concurrently.
    ///
    /// # Errors
    /// `InvalidArgument` if `category`, `name` or a supplied display name is blank
    pub fn step_with(&self, category: &str, name: &str, options: StepOptions) -> Result<Timing, ProfilerError> {
        let StepOptions { display_name, parameters, predicate } = options;
        let fields = new_timing(category, name, display_name, parameters)?;

        let Some(parent) = context::current() else {
            return Ok(Timing::inert());
        };
        if let Some(predicate) = predicate {
            let context = ProfilerContext { current_timing: Some(parent.info()) };
            if !predicate(&context) {
                return Ok(Timing::inert());
            }
        }
        Ok(attach_or_inert(&parent, fields))
    }

    /// Start a new transaction in [`TransactionMode::New`] mode
    ///
    /// # Errors
    /// `TransactionInflight` if a timing is already inflight in this context,
    /// `InvalidArgument` if `category` or `name` is blank
    pub fn transaction(&self, category: &str, name: &str) -> Result<Timing, ProfilerError> {
        self.transaction_with(category, name, TransactionOptions::default())
    }

    /// Start a transaction, or a step when the mode allows it
    ///
    /// # Errors
    /// `TransactionInflight` in `New` mode if a timing is already inflight in
    /// this context, `InvalidArgument` for a blank category, name or display name
    pub fn transaction_with(
        &self,
        category: &str,
        name: &str,
        options: TransactionOptions,
    ) -> Result<Timing, ProfilerError> {
        let TransactionOptions { display_name, parameters, correlation_id, mode } = options;
        let fields = new_timing(category, name, display_name, parameters)?;

        let inflight = context::current().filter(|current| current.state() == TransactionState::Inflight);
        match (mode, inflight) {
            (TransactionMode::New, Some(_)) => Err(ProfilerError::TransactionInflight {
                category: fields.category,
                name: fields.name,
            }),
            (TransactionMode::StepOrTransaction, Some(parent)) => Ok(attach_or_inert(&parent, fields)),
            _ => Ok(self.start_transaction(fields, correlation_id)),
        }
    }

    fn start_transaction(&self, fields: NewTiming, correlation_id: Option<String>) -> Timing {
        let transaction = TransactionCore::new(fields, correlation_id, Arc::clone(&self.inner.registry));
        context::set_current(Some(transaction.root()));
        self.remember(Arc::clone(&transaction));
        transaction.publish_start();
        Timing::live(transaction.root())
    }

    /// Insert into the recent ring, evicting the oldest while over the cap
    fn remember(&self, transaction: Arc<TransactionCore>) {
        let cap = self.inner.config.max_recent_transactions;
        let mut recent = self.inner.recent.lock().unwrap_or_else(PoisonError::into_inner);
        recent.push_back(transaction);
        while recent.len() > cap {
            recent.pop_front();
        }
    }

    /// Snapshots of the most recently started transactions, newest first
    pub fn recent_transactions(&self, inflight_only: bool) -> Vec<TransactionSnapshot> {
        // Snapshots lock each transaction, so never while holding the ring lock
        let mut transactions: Vec<Arc<TransactionCore>> = self
            .inner
            .recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        transactions.sort_by_key(|transaction| Reverse(transaction.sequence()));

        transactions
            .iter()
            .map(|transaction| transaction.snapshot(None))
            .filter(|snapshot| !inflight_only || snapshot.state == TransactionState::Inflight)
            .collect()
    }

    /// What a step predicate would see right now
    pub fn context(&self) -> ProfilerContext {
        ProfilerContext { current_timing: context::current().map(|current| current.info()) }
    }

    /// Register a subscriber and start its dispatch loop.
    ///
    /// Returns `Ok(false)` if this exact subscriber is already registered.
    ///
    /// # Errors
    /// `DispatchSpawn` if the dispatch thread cannot be started
    pub fn register_subscriber(&self, subscriber: Arc<dyn EventSubscriber>) -> Result<bool, ProfilerError> {
        self.inner.registry.register(Subscriber::Sync(subscriber))
    }

    /// Async variant of [`register_subscriber`](Profiler::register_subscriber)
    ///
    /// # Errors
    /// `DispatchSpawn` if the dispatch thread cannot be started
    pub fn register_async_subscriber(
        &self,
        subscriber: Arc<dyn AsyncEventSubscriber>,
    ) -> Result<bool, ProfilerError> {
        self.inner.registry.register(Subscriber::Async(subscriber))
    }

    /// Unregister a subscriber, waiting until it has handled every event
    /// queued so far and its `stop()` hook has run.
    ///
    /// Returns `false` if it was not registered.
    pub fn unregister_subscriber<S: EventSubscriber + ?Sized>(&self, subscriber: &Arc<S>) -> bool {
        self.inner.registry.unregister(SubscriberKey::of_sync(subscriber))
    }

    /// Async variant of [`unregister_subscriber`](Profiler::unregister_subscriber)
    pub fn unregister_async_subscriber<S: AsyncEventSubscriber + ?Sized>(&self, subscriber: &Arc<S>) -> bool {
        self.inner.registry.unregister(SubscriberKey::of_async(subscriber))
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Clear the caller's current timing, the recent transactions and all
    /// subscribers. Meant for isolating test cases only.
    pub fn reset_for_testing(&self) {
        context::clear();
        self.inner.recent.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.inner.registry.clear();
    }
}

/// Attach under `parent`, or hand out an inert handle if it finished meanwhile
fn attach_or_inert(parent: &TimingRef, fields: NewTiming) -> Timing {
    let name = fields.name.clone();
    match parent.attach_step(fields) {
        Ok(step) => Timing::live(step),
        Err(e) => {
            debug!("Step '{name}' not recorded: {e}");
            Timing::inert()
        }
    }
}

fn new_timing(
    category: &str,
    name: &str,
    display_name: Option<String>,
    parameters: Option<JsonValue>,
) -> Result<NewTiming, ProfilerError> {
    let category = required("category", category)?;
    let name = required("name", name)?;
    if display_name.as_deref().is_some_and(|d| d.trim().is_empty()) {
        return Err(ProfilerError::InvalidArgument {
            argument: "display_name",
            reason: "must not be blank when supplied",
        });
    }
    Ok(NewTiming { category, name, display_name, parameters })
}

fn required(argument: &'static str, value: &str) -> Result<String, ProfilerError> {
    if value.trim().is_empty() {
        return Err(ProfilerError::InvalidArgument { argument, reason: "must not be blank" });
    }
    Ok(value.to_string())
}

static GLOBAL: OnceLock<Profiler> = OnceLock::new();

/// Process-wide profiler, configured from the environment on first use
pub fn global() -> &'static Profiler {
    GLOBAL.get_or_init(|| {
        Profiler::new(ProfilerConfig::from_env()).unwrap_or_else(|e| {
            warn!("{e}; using the default profiler configuration");
            Profiler::default()
        })
    })
}
