//! The Connector: one session of the SyncBridge protocol.
//!
//! A session brings together the codec, the task router and the commit
//! queue. It replaces any process-wide state: build one per request (or
//! per process), and build a new one to reset.

use std::path::PathBuf;
use std::sync::Arc;

use syncbridge_core::{CommitAction, Value};
use syncbridge_router::{HostIntegration, ObjectLocks, Registry, Router};
use syncbridge_store::{select_backend, storage_key, BlobStore, FileStore, WaitingEvents, WaitingStore};
use syncbridge_wire::{
    Codec, ConnectorConfig, Logger, Response, Transport, WireError, CONNECT_SERVICE, PING_SERVICE,
};

use crate::clock::{Clock, SystemClock};
use crate::commit::{CommitOutcome, CommitQueue, CommitRecord, FlushReport};
use crate::config::QueueConfig;
use crate::error::{ConnectorError, Result};

/// Directory of the file-backed waiting queue when none is configured.
fn default_queue_dir() -> PathBuf {
    std::env::temp_dir().join("syncbridge")
}

/// Builder for a [`Connector`].
pub struct ConnectorBuilder {
    config: ConnectorConfig,
    queue: QueueConfig,
    transport: Option<Arc<dyn Transport>>,
    host: Option<Arc<dyn HostIntegration>>,
    registry: Option<Arc<Registry>>,
    locks: Option<Arc<ObjectLocks>>,
    cache: Option<Arc<dyn BlobStore>>,
    fallback: Option<Arc<dyn BlobStore>>,
    clock: Arc<dyn Clock>,
}

impl ConnectorBuilder {
    fn new(config: ConnectorConfig) -> Self {
        Self {
            config,
            queue: QueueConfig::default(),
            transport: None,
            host: None,
            registry: None,
            locks: None,
            cache: None,
            fallback: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn host(mut self, host: Arc<dyn HostIntegration>) -> Self {
        self.host = Some(host);
        self
    }

    /// Object and widget types. Defaults to an empty registry.
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Share write locks with other sessions of the same host.
    pub fn locks(mut self, locks: Arc<ObjectLocks>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Preferred waiting queue backend, used when it reports itself available.
    pub fn cache(mut self, cache: Arc<dyn BlobStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Fallback waiting queue backend. Defaults to a [`FileStore`] in the
    /// system temp directory.
    pub fn fallback_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.fallback = Some(store);
        self
    }

    /// Keep the waiting queue file in `dir`.
    pub fn queue_dir(self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_store(Arc::new(FileStore::new(dir)))
    }

    pub fn queue_config(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Wire the session. A transport and a host integration are required.
    pub fn build(self) -> Result<Connector> {
        let transport = self
            .transport
            .ok_or_else(|| ConnectorError::InvalidOperation("no transport configured".into()))?;
        let host = self
            .host
            .ok_or_else(|| ConnectorError::InvalidOperation("no host integration configured".into()))?;
        let registry = self.registry.unwrap_or_default();
        let locks = self.locks.unwrap_or_default();

        let logger = Arc::new(Logger::new(self.config.debug));
        let key = storage_key(&self.config.identifier, &self.config.host);
        let fallback = self
            .fallback
            .unwrap_or_else(|| Arc::new(FileStore::new(default_queue_dir())));
        let mut store = WaitingStore::new(select_backend(self.cache, fallback), key);
        if let Some(ttl) = self.queue.queue_ttl {
            store = store.with_ttl(ttl);
        }

        let codec = Arc::new(Codec::new(self.config, transport, logger.clone()));
        let router = Router::new(registry.clone(), host, locks.clone(), logger.clone());
        let queue = CommitQueue::new(
            codec.clone(),
            registry.clone(),
            locks.clone(),
            store,
            self.clock,
            self.queue,
        );

        Ok(Connector {
            codec,
            router,
            queue,
            registry,
            locks,
            logger,
        })
    }
}

/// A connector session.
pub struct Connector {
    codec: Arc<Codec>,
    router: Router,
    queue: CommitQueue,
    registry: Arc<Registry>,
    locks: Arc<ObjectLocks>,
    logger: Arc<Logger>,
}

impl Connector {
    pub fn builder(config: ConnectorConfig) -> ConnectorBuilder {
        ConnectorBuilder::new(config)
    }

    pub fn config(&self) -> &ConnectorConfig {
        self.codec.config()
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn queue(&self) -> &CommitQueue {
        &self.queue
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn locks(&self) -> &Arc<ObjectLocks> {
        &self.locks
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Outbound
    // ─────────────────────────────────────────────────────────────────────────

    /// Check that the server is reachable.
    pub async fn ping(&self) -> Result<bool> {
        Ok(self.codec.ping().await?)
    }

    /// Check that the server shares our key.
    pub async fn connect(&self) -> Result<bool> {
        Ok(self.codec.connect().await?)
    }

    /// Report a local change. See [`CommitQueue::commit`].
    pub async fn commit<I, S>(
        &self,
        object_type: &str,
        local_ids: I,
        action: CommitAction,
        user: &str,
        comment: &str,
    ) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queue
            .commit(object_type, local_ids, action, user, comment)
            .await
    }

    pub async fn commit_with_outcome<I, S>(
        &self,
        object_type: &str,
        local_ids: I,
        action: CommitAction,
        user: &str,
        comment: &str,
    ) -> CommitOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queue
            .commit_with_outcome(object_type, local_ids, action, user, comment)
            .await
    }

    pub fn is_deferred_mode(&self) -> bool {
        self.queue.is_deferred_mode()
    }

    /// Deliver queued commits. Call once the response has been sent.
    pub async fn flush(&self) -> Result<FlushReport> {
        self.queue.flush().await
    }

    pub async fn restart_all(&self) -> Result<usize> {
        self.queue.restart_all().await
    }

    pub async fn waiting_events(&self) -> Result<WaitingEvents> {
        self.queue.waiting_events().await
    }

    pub fn commit_log(&self) -> Vec<CommitRecord> {
        self.queue.commit_log()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────────

    /// Answer a request sent by the server.
    ///
    /// `ping` travels uncrypted and `connect` is answered directly; any other
    /// service runs its task batch through the router. The session log is
    /// attached to the answer.
    pub async fn handle_request(&self, service: &str, payload: &str) -> Result<String> {
        self.codec.verify()?;
        let uncrypted = service == PING_SERVICE;
        let input = self.codec.unpack(payload, uncrypted)?;

        let answer = if service == PING_SERVICE || service == CONNECT_SERVICE {
            Response {
                result: true,
                log: Some(self.logger.take()),
                ..Response::default()
            }
            .to_value()
        } else {
            let mut output = Value::Null;
            if !self.router.execute(service, &input, &mut output).await {
                output.insert("result", false);
            }
            let log = self.logger.take();
            if !log.is_empty() {
                output.insert("log", log.to_value());
            }
            output
        };

        Ok(self.codec.pack(&answer, uncrypted)?)
    }

    /// Panic on purpose, to test host fault handling.
    ///
    /// Only allowed in debug mode; otherwise returns a configuration error.
    pub fn simulate_fault(&self) -> Result<()> {
        if !self.config().debug {
            return Err(WireError::Config("fault simulation requires debug mode".into()).into());
        }
        panic!("simulated connector fault");
    }
}
