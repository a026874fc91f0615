//! One independent check loop per monitored endpoint.
//!
//! The scheduler owns every endpoint's state, checker, cancellation token and
//! loop handle in a single slot map. Structural changes (register, start,
//! stop, add, remove, update) are serialized by one control lock; snapshot
//! reads only take the slot map's read lock and the per-endpoint state locks.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

use crate::checker::{CheckError, Checker};
use crate::classify::classify;
use crate::config::CheckConfig;
use crate::dependency::{Dependency, DependencyType, Endpoint, endpoint_key, validate_name};
use crate::error::{SchedulerError, SchedulerResult};
use crate::metrics::MetricsSink;
use crate::state::{EndpointMeta, EndpointState, EndpointStatus};
use crate::tracker::Transition;

/// Everything the scheduler holds for one endpoint.
struct EndpointSlot {
    state: Arc<EndpointState>,
    checker: Arc<dyn Checker>,
    config: CheckConfig,
    /// Child of the scheduler's root token; `None` before start and after stop.
    cancel: Option<CancellationToken>,
    /// The running loop; `None` before start and once joined.
    task: Option<JoinHandle<()>>,
}

type SlotMap = Arc<RwLock<HashMap<String, EndpointSlot>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

struct Control {
    phase: Phase,
    root: CancellationToken,
}

/// Runs periodic checks for a live, mutable set of endpoints.
pub struct Scheduler {
    metrics: Arc<dyn MetricsSink>,
    /// Config for endpoints added after start.
    config: CheckConfig,
    control: Mutex<Control>,
    slots: SlotMap,
}

impl Scheduler {
    /// Create a scheduler publishing to `metrics`.
    ///
    /// `config` applies to endpoints added with [`add_endpoint`](Self::add_endpoint)
    /// and [`update_endpoint`](Self::update_endpoint); registered dependencies
    /// carry their own.
    pub fn new(metrics: Arc<dyn MetricsSink>, config: CheckConfig) -> Self {
        Self {
            metrics,
            config,
            control: Mutex::new(Control {
                phase: Phase::Idle,
                root: CancellationToken::new(),
            }),
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a dependency before start. Each endpoint starts out unknown.
    pub async fn register(
        &self,
        dependency: Dependency,
        checker: Arc<dyn Checker>,
    ) -> SchedulerResult<()> {
        let control = self.control.lock().await;
        match control.phase {
            Phase::Idle => {}
            Phase::Running => return Err(SchedulerError::AlreadyStarted),
            Phase::Stopped => return Err(SchedulerError::AlreadyStopped),
        }

        let mut slots = self.slots.write().await;
        for ep in dependency.endpoints() {
            let key = endpoint_key(dependency.name(), ep.host(), ep.port());
            if slots.contains_key(&key) {
                return Err(SchedulerError::DuplicateEndpoint(key));
            }
        }

        for ep in dependency.endpoints() {
            let meta = EndpointMeta {
                name: dependency.name().to_string(),
                dep_type: dependency.dep_type(),
                critical: dependency.critical(),
                endpoint: ep.clone(),
            };
            let key = meta.key();
            let slot = EndpointSlot {
                state: Arc::new(EndpointState::new(meta, dependency.config())),
                checker: Arc::clone(&checker),
                config: *dependency.config(),
                cancel: None,
                task: None,
            };
            slots.insert(key, slot);
        }

        debug!(
            dependency = %dependency.name(),
            endpoints = dependency.endpoints().len(),
            "dependency registered"
        );
        Ok(())
    }

    /// Spawn a check loop for every registered endpoint.
    pub async fn start(&self) -> SchedulerResult<()> {
        let mut control = self.control.lock().await;
        match control.phase {
            Phase::Idle => {}
            Phase::Running => return Err(SchedulerError::AlreadyStarted),
            Phase::Stopped => return Err(SchedulerError::AlreadyStopped),
        }

        let mut slots = self.slots.write().await;
        for (key, slot) in slots.iter_mut() {
            self.spawn_loop(key, slot, &control.root);
        }
        control.phase = Phase::Running;

        info!(endpoints = slots.len(), "scheduler started");
        Ok(())
    }

    /// Cancel every loop and wait for all of them to finish.
    ///
    /// A no-op before start and on repeated calls. States stay readable.
    /// The control lock is held until every loop has exited, so a concurrent
    /// `remove_endpoint` cannot delete metrics a loop is still writing.
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;
        if control.phase != Phase::Running {
            return;
        }
        control.phase = Phase::Stopped;
        control.root.cancel();

        // Loops read the slot map, so release it before joining.
        let tasks: Vec<JoinHandle<()>> = {
            let mut slots = self.slots.write().await;
            slots
                .values_mut()
                .filter_map(|slot| {
                    slot.cancel = None;
                    slot.task.take()
                })
                .collect()
        };

        let count = tasks.len();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "check loop ended abnormally");
            }
        }
        drop(control);
        info!(loops = count, "scheduler stopped");
    }

    /// Health flag per endpoint, omitting endpoints not yet checked.
    pub async fn health(&self) -> HashMap<String, bool> {
        let states = self.states().await;
        let mut result = HashMap::with_capacity(states.len());
        for (key, state) in states {
            if let Some(healthy) = state.healthy().await {
                result.insert(key, healthy);
            }
        }
        result
    }

    /// Full status per endpoint, including endpoints not yet checked.
    pub async fn health_details(&self) -> HashMap<String, EndpointStatus> {
        let states = self.states().await;
        let mut result = HashMap::with_capacity(states.len());
        for (key, state) in states {
            result.insert(key, state.snapshot().await);
        }
        result
    }

    /// Start monitoring one more endpoint while running.
    ///
    /// A no-op if `name:host:port` is already monitored. The new endpoint
    /// uses the scheduler's config.
    pub async fn add_endpoint(
        &self,
        name: &str,
        dep_type: DependencyType,
        critical: bool,
        endpoint: Endpoint,
        checker: Arc<dyn Checker>,
    ) -> SchedulerResult<()> {
        let control = self.control.lock().await;
        match control.phase {
            Phase::Idle => return Err(SchedulerError::NotStarted),
            Phase::Stopped => return Err(SchedulerError::Stopped),
            Phase::Running => {}
        }
        validate_name(name)?;

        let meta = EndpointMeta {
            name: name.to_string(),
            dep_type,
            critical,
            endpoint,
        };
        if self.insert_running(meta, checker, &control.root).await {
            info!(dependency = %name, "endpoint added");
        }
        Ok(())
    }

    /// Stop monitoring an endpoint and delete its metrics.
    ///
    /// A no-op if the endpoint is not monitored. Returns once the endpoint's
    /// loop has exited, so nothing is published for it afterwards.
    pub async fn remove_endpoint(&self, name: &str, host: &str, port: &str) -> SchedulerResult<()> {
        let control = self.control.lock().await;
        if control.phase == Phase::Idle {
            return Err(SchedulerError::NotStarted);
        }

        let key = endpoint_key(name, host, port);
        let slot = self.slots.write().await.remove(&key);
        let Some(slot) = slot else {
            debug!(%key, "endpoint not monitored, nothing to remove");
            return Ok(());
        };
        self.retire(&key, slot).await;

        info!(%key, "endpoint removed");
        Ok(())
    }

    /// Replace one endpoint of a dependency with another.
    ///
    /// The replacement keeps the old endpoint's type and critical flag and
    /// uses the scheduler's config. Fails if the old endpoint is not monitored.
    pub async fn update_endpoint(
        &self,
        name: &str,
        old_host: &str,
        old_port: &str,
        endpoint: Endpoint,
        checker: Arc<dyn Checker>,
    ) -> SchedulerResult<()> {
        let control = self.control.lock().await;
        match control.phase {
            Phase::Idle => return Err(SchedulerError::NotStarted),
            Phase::Stopped => return Err(SchedulerError::Stopped),
            Phase::Running => {}
        }

        let old_key = endpoint_key(name, old_host, old_port);
        let old = self.slots.write().await.remove(&old_key);
        let Some(old) = old else {
            return Err(SchedulerError::EndpointNotFound(old_key));
        };
        let old_meta = old.state.meta().clone();
        self.retire(&old_key, old).await;

        let meta = EndpointMeta {
            endpoint,
            ..old_meta
        };
        let new_key = meta.key();
        self.insert_running(meta, checker, &control.root).await;

        info!(%old_key, %new_key, "endpoint updated");
        Ok(())
    }

    /// Insert a slot and spawn its loop. Returns false if the key already exists.
    async fn insert_running(
        &self,
        meta: EndpointMeta,
        checker: Arc<dyn Checker>,
        root: &CancellationToken,
    ) -> bool {
        let key = meta.key();
        let mut slots = self.slots.write().await;
        if slots.contains_key(&key) {
            debug!(%key, "endpoint already monitored");
            return false;
        }

        let mut slot = EndpointSlot {
            state: Arc::new(EndpointState::new(meta, &self.config)),
            checker,
            config: self.config,
            cancel: None,
            task: None,
        };
        self.spawn_loop(&key, &mut slot, root);
        slots.insert(key, slot);
        true
    }

    /// Cancel a detached slot's loop, wait for it, then drop its metrics.
    async fn retire(&self, key: &str, slot: EndpointSlot) {
        if let Some(cancel) = slot.cancel {
            cancel.cancel();
        }
        if let Some(task) = slot.task {
            if let Err(e) = task.await {
                warn!(%key, error = %e, "check loop ended abnormally");
            }
        }
        self.metrics.delete_metrics(slot.state.meta());
    }

    fn spawn_loop(&self, key: &str, slot: &mut EndpointSlot, root: &CancellationToken) {
        let cancel = root.child_token();
        let check_loop = CheckLoop {
            key: key.to_string(),
            endpoint: slot.state.meta().endpoint.clone(),
            checker: Arc::clone(&slot.checker),
            config: slot.config,
            slots: Arc::clone(&self.slots),
            metrics: Arc::clone(&self.metrics),
            cancel: cancel.clone(),
        };
        slot.cancel = Some(cancel);
        slot.task = Some(tokio::spawn(check_loop.run()));
    }

    async fn states(&self) -> Vec<(String, Arc<EndpointState>)> {
        let slots = self.slots.read().await;
        slots
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(&slot.state)))
            .collect()
    }
}

/// The loop for a single endpoint. Checks never overlap: the next one is
/// only scheduled after the previous probe returned or timed out.
struct CheckLoop {
    key: String,
    endpoint: Endpoint,
    checker: Arc<dyn Checker>,
    config: CheckConfig,
    slots: SlotMap,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
}

impl CheckLoop {
    async fn run(self) {
        debug!(key = %self.key, "check loop starting");

        let delay = self.config.initial_delay();
        if !delay.is_zero() && self.pause(delay).await.is_break() {
            debug!(key = %self.key, "check loop cancelled during initial delay");
            return;
        }

        loop {
            // Removed since the last iteration.
            let state = self
                .slots
                .read()
                .await
                .get(&self.key)
                .map(|slot| Arc::clone(&slot.state));

            if let Some(state) = state {
                if self.check_once(&state).await.is_break() {
                    break;
                }
            }

            if self.pause(self.config.interval()).await.is_break() {
                break;
            }
        }

        debug!(key = %self.key, "check loop stopped");
    }

    /// Sleep unless cancelled first.
    async fn pause(&self, duration: Duration) -> ControlFlow<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => ControlFlow::Break(()),
            _ = tokio::time::sleep(duration) => ControlFlow::Continue(()),
        }
    }

    async fn check_once(&self, state: &EndpointState) -> ControlFlow<()> {
        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return ControlFlow::Break(()),
            outcome = self.probe() => outcome,
        };
        let latency = started.elapsed();

        let result = classify(&outcome);
        let transition = state.record(&result, latency).await;

        let meta = state.meta();
        self.metrics.set_health(meta, transition.after == Some(true));
        self.metrics.observe_latency(meta, latency);
        self.metrics.set_status(meta, result.category);
        self.metrics.set_status_detail(meta, &result.detail);

        log_transition(meta, &transition, outcome.as_ref().err());
        ControlFlow::Continue(())
    }

    /// Run the checker in its own task under the configured timeout.
    ///
    /// The task is aborted when the deadline passes or this future is dropped.
    async fn probe(&self) -> Result<(), CheckError> {
        let checker = Arc::clone(&self.checker);
        let endpoint = self.endpoint.clone();
        let mut task = AbortOnDropHandle::new(tokio::spawn(async move {
            checker.check(&endpoint).await
        }));

        match tokio::time::timeout(self.config.timeout(), &mut task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => Err(CheckError::Other(anyhow!(
                "health checker panicked: {join_err}"
            ))),
            Err(_) => Err(CheckError::Timeout),
        }
    }
}

/// Log only at state boundaries, never for repeated outcomes.
fn log_transition(meta: &EndpointMeta, transition: &Transition, failure: Option<&CheckError>) {
    let host = meta.endpoint.host();
    let port = meta.endpoint.port();

    if transition.recovered() {
        info!(
            dependency = %meta.name,
            dep_type = %meta.dep_type,
            host,
            port,
            "dependency recovered"
        );
    }

    if let Some(err) = failure {
        if transition.before != Some(false) {
            warn!(
                dependency = %meta.name,
                dep_type = %meta.dep_type,
                host,
                port,
                error = %err.describe(),
                "check failed"
            );
        }
    }

    if transition.became_unhealthy() {
        error!(
            dependency = %meta.name,
            dep_type = %meta.dep_type,
            host,
            port,
            "dependency became unhealthy"
        );
    }
}
