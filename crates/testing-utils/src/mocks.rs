//! In-memory test doubles for model systems and provider connections

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use modelhub_core::traits::{
    ConnectionFactory, ModelSystem, ModelSystemStatus, ProviderConnection, SharedConnection,
};
use modelhub_errors::{HubError, HubResult};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Payloads in the order they reached `execute_task`
pub type ExecutionLog = Arc<Mutex<Vec<Value>>>;

#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return the payload unchanged
    Echo,
    /// Return a fixed value
    Respond(Value),
    Fail(String),
    /// Wait for the given duration, returning early with an error on cancellation
    Delay(Duration),
    /// Resolve only when cancelled
    Hang,
    /// Never resolve, ignoring cancellation
    Stall,
    /// Panic inside `execute_task`
    Panic(String),
}

/// Mock implementation of ModelSystem for testing
pub struct MockModelSystem {
    name: String,
    behavior: Mutex<MockBehavior>,
    status: Mutex<ModelSystemStatus>,
    executions: ExecutionLog,
    status_queries: AtomicUsize,
    cancelled: AtomicUsize,
}

impl MockModelSystem {
    pub fn new(name: &str) -> Self {
        Self::with_behavior(name, MockBehavior::Echo)
    }

    pub fn with_behavior(name: &str, behavior: MockBehavior) -> Self {
        Self {
            name: name.to_string(),
            behavior: Mutex::new(behavior),
            status: Mutex::new(ModelSystemStatus::idle()),
            executions: Arc::new(Mutex::new(Vec::new())),
            status_queries: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self::with_behavior(name, MockBehavior::Fail(message.to_string()))
    }

    pub fn hanging(name: &str) -> Self {
        Self::with_behavior(name, MockBehavior::Hang)
    }

    pub fn stalled(name: &str) -> Self {
        Self::with_behavior(name, MockBehavior::Stall)
    }

    pub fn panicking(name: &str, message: &str) -> Self {
        Self::with_behavior(name, MockBehavior::Panic(message.to_string()))
    }

    pub fn delayed(name: &str, delay: Duration) -> Self {
        Self::with_behavior(name, MockBehavior::Delay(delay))
    }

    pub fn busy(name: &str) -> Self {
        let system = Self::new(name);
        system.set_status(ModelSystemStatus::busy());
        system
    }

    pub fn unavailable(name: &str) -> Self {
        let system = Self::new(name);
        system.set_status(ModelSystemStatus::unavailable());
        system
    }

    /// Record executions into a log shared with other mocks
    pub fn with_execution_log(mut self, log: ExecutionLog) -> Self {
        self.executions = log;
        self
    }

    pub fn set_status(&self, status: ModelSystemStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn execution_count(&self) -> usize {
        self.executions.lock().unwrap().len()
    }

    pub fn executed_payloads(&self) -> Vec<Value> {
        self.executions.lock().unwrap().clone()
    }

    pub fn status_query_count(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }

    /// Number of executions that observed their cancellation token firing
    pub fn cancelled_count(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelSystem for MockModelSystem {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute_task(&self, payload: &Value, cancel: CancellationToken) -> HubResult<Value> {
        self.executions.lock().unwrap().push(payload.clone());
        let behavior = self.behavior.lock().unwrap().clone();

        match behavior {
            MockBehavior::Echo => Ok(payload.clone()),
            MockBehavior::Respond(value) => Ok(value),
            MockBehavior::Fail(message) => Err(HubError::execution_error(message)),
            MockBehavior::Delay(delay) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => Ok(payload.clone()),
                    _ = cancel.cancelled() => {
                        self.cancelled.fetch_add(1, Ordering::SeqCst);
                        Err(HubError::Cancelled(self.name.clone()))
                    }
                }
            }
            MockBehavior::Hang => {
                cancel.cancelled().await;
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                Err(HubError::Cancelled(self.name.clone()))
            }
            MockBehavior::Stall => std::future::pending().await,
            MockBehavior::Panic(message) => panic!("{}", message),
        }
    }

    async fn get_status(&self) -> ModelSystemStatus {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        *self.status.lock().unwrap()
    }
}

/// Mock provider connection with togglable health
pub struct MockConnection {
    id: usize,
    healthy: AtomicBool,
    probe_error: AtomicBool,
    fail_disconnect: AtomicBool,
    latency: Option<Duration>,
    health_checks: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MockConnection {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            healthy: AtomicBool::new(true),
            probe_error: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
            latency: None,
            health_checks: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Make the health probe return an error instead of a verdict
    pub fn set_probe_error(&self, fail: bool) {
        self.probe_error.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_disconnect(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    pub fn health_check_count(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnect_count() > 0
    }
}

#[async_trait]
impl ProviderConnection for MockConnection {
    async fn health_check(&self) -> HubResult<bool> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.probe_error.load(Ordering::SeqCst) {
            return Err(HubError::connection_error(format!(
                "connection {} probe failed",
                self.id
            )));
        }
        Ok(self.healthy.load(Ordering::SeqCst))
    }

    async fn disconnect(&self) -> HubResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(HubError::connection_error(format!(
                "connection {} refused to close",
                self.id
            )));
        }
        Ok(())
    }
}

/// Mock connection factory that keeps every connection it creates
pub struct MockConnectionFactory {
    created: Mutex<Vec<Arc<MockConnection>>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
    latency: Option<Duration>,
    creation_delay: Option<Duration>,
}

impl MockConnectionFactory {
    pub fn new() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            latency: None,
            creation_delay: None,
        }
    }

    pub fn failing() -> Self {
        let factory = Self::new();
        factory.set_failing(true);
        factory
    }

    /// Probe latency applied to every connection created afterwards
    pub fn with_connection_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Delay before each creation attempt decides whether to fail
    pub fn with_creation_delay(mut self, delay: Duration) -> Self {
        self.creation_delay = Some(delay);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.created.lock().unwrap().clone()
    }

    pub fn set_all_healthy(&self, healthy: bool) {
        for connection in self.created.lock().unwrap().iter() {
            connection.set_healthy(healthy);
        }
    }

    pub fn total_disconnects(&self) -> usize {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.disconnect_count())
            .sum()
    }
}

impl Default for MockConnectionFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn create_connection(&self) -> HubResult<SharedConnection> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.creation_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(HubError::factory_error("mock factory refused to connect"));
        }

        let mut created = self.created.lock().unwrap();
        let mut connection = MockConnection::new(created.len());
        if let Some(latency) = self.latency {
            connection = connection.with_latency(latency);
        }
        let connection = Arc::new(connection);
        created.push(Arc::clone(&connection));
        Ok(connection)
    }
}

/// Upcast a mock so it can be compared with pool-issued handles
pub fn as_shared(connection: &Arc<MockConnection>) -> SharedConnection {
    Arc::clone(connection) as SharedConnection
}
