//! Test fixtures and helpers.
//!
//! In-memory object types, a widget, a host integration and a scripted sync
//! server that speaks the real envelope format.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use indexmap::IndexMap;
use syncbridge_core::{BatchStats, Map, Task, TaskResult, Value, COMMIT_TASK};
use syncbridge_router::{
    HandlerError, HandlerResult, HostIntegration, LocalFiles, ObjectHandler, Registry,
    WidgetHandler,
};
use syncbridge_wire::{
    Codec, ConnectorConfig, Logger, MemoryTransport, Request, Response, TransportFault,
    PING_SERVICE,
};

/// Connector identifier used by fixtures.
pub const IDENTIFIER: &str = "ThisIsConnectorId";
/// Shared key used by fixtures.
pub const SHARED_KEY: &str = "ThisIsSecretKey";
/// Server URL used by fixtures.
pub const HOST: &str = "https://sync.example.com/ws";

/// A complete, valid connector configuration.
pub fn test_config() -> ConnectorConfig {
    ConnectorConfig::new(IDENTIFIER, SHARED_KEY, HOST).with_debug(true)
}

// ─────────────────────────────────────────────────────────────────────────────
// Object types
// ─────────────────────────────────────────────────────────────────────────────

/// An object type backed by an in-memory table.
pub struct MemoryObjects {
    name: String,
    rows: Mutex<IndexMap<String, Map>>,
    next_id: AtomicU64,
    calls: AtomicUsize,
    valid: AtomicBool,
}

impl MemoryObjects {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Mutex::new(IndexMap::new()),
            next_id: AtomicU64::new(100),
            calls: AtomicUsize::new(0),
            valid: AtomicBool::new(true),
        }
    }

    /// Add a row.
    pub fn with_row<K, V, I>(self, id: &str, fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let row = fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.rows.lock().unwrap().insert(id.to_string(), row);
        self
    }

    /// Number of handler calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Enable or disable the type, as a host module switch would.
    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::SeqCst);
    }

    pub fn row(&self, id: &str) -> Option<Map> {
        self.rows.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn key(id: &Value) -> HandlerResult<String> {
        id.scalar_text()
            .ok_or_else(|| HandlerError::Rejected(format!("unusable id {:?}", id)))
    }
}

#[async_trait]
impl ObjectHandler for MemoryObjects {
    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    async fn describe(&self) -> HandlerResult<Value> {
        self.touch();
        Ok(Value::from_pairs([
            ("type", self.name.as_str()),
            ("name", self.name.as_str()),
            ("allow_push_created", "1"),
        ]))
    }

    async fn fields(&self) -> HandlerResult<Value> {
        self.touch();
        let rows = self.rows.lock().unwrap();
        let mut names: Vec<&String> = rows.values().flat_map(|row| row.keys()).collect();
        names.sort();
        names.dedup();
        Ok(Value::List(
            names
                .into_iter()
                .map(|name| Value::from_pairs([("id", name.as_str()), ("type", "varchar")]))
                .collect(),
        ))
    }

    async fn list(&self, filter: Option<&str>, params: &Value) -> HandlerResult<Value> {
        self.touch();
        let offset = params.get("offset").and_then(Value::as_i64).unwrap_or(0).max(0) as usize;
        let max = params
            .get("max")
            .and_then(Value::as_i64)
            .filter(|max| *max > 0)
            .map(|max| max as usize)
            .unwrap_or(usize::MAX);

        let rows = self.rows.lock().unwrap();
        let items = rows
            .iter()
            .filter(|(_, row)| match filter {
                Some(filter) if !filter.is_empty() => row
                    .values()
                    .filter_map(Value::as_str)
                    .any(|text| text.contains(filter)),
                _ => true,
            })
            .skip(offset)
            .take(max)
            .map(|(id, row)| {
                let mut item = Value::Map(row.clone());
                item.insert("id", id.as_str());
                item
            })
            .collect();
        Ok(Value::List(items))
    }

    async fn get(&self, id: &Value, fields: &[String]) -> HandlerResult<Value> {
        self.touch();
        let key = Self::key(id)?;
        let rows = self.rows.lock().unwrap();
        let row = rows.get(&key).ok_or_else(|| HandlerError::NotFound(key.clone()))?;

        let mut out = Value::from_pairs([("id", key.as_str())]);
        for field in fields {
            out.insert(field.as_str(), row.get(field).cloned().unwrap_or_default());
        }
        Ok(out)
    }

    async fn set(&self, id: Option<&Value>, fields: &Map) -> HandlerResult<Value> {
        self.touch();
        let mut rows = self.rows.lock().unwrap();
        let key = match id {
            Some(id) => {
                let key = Self::key(id)?;
                if !rows.contains_key(&key) {
                    return Err(HandlerError::NotFound(key));
                }
                key
            }
            None => self.next_id.fetch_add(1, Ordering::SeqCst).to_string(),
        };

        let row = rows.entry(key.clone()).or_default();
        for (field, value) in fields {
            row.insert(field.clone(), value.clone());
        }
        Ok(Value::from(key))
    }

    async fn delete(&self, id: &Value) -> HandlerResult<Value> {
        self.touch();
        let key = Self::key(id)?;
        match self.rows.lock().unwrap().shift_remove(&key) {
            Some(_) => Ok(Value::from(true)),
            None => Err(HandlerError::NotFound(key)),
        }
    }
}

/// A widget with fixed contents.
pub struct StaticWidget {
    title: String,
    contents: Value,
}

impl StaticWidget {
    pub fn new(title: impl Into<String>, contents: impl Into<Value>) -> Self {
        Self {
            title: title.into(),
            contents: contents.into(),
        }
    }
}

#[async_trait]
impl WidgetHandler for StaticWidget {
    async fn describe(&self) -> HandlerResult<Value> {
        Ok(Value::from_pairs([("title", self.title.as_str())]))
    }

    async fn get(&self, _params: &Value) -> HandlerResult<Value> {
        Ok(Value::from_pairs([
            ("title", Value::from(self.title.as_str())),
            ("contents", self.contents.clone()),
        ]))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Host
// ─────────────────────────────────────────────────────────────────────────────

/// Files keyed by `(path, filename)`.
#[derive(Default)]
pub struct MemoryFiles {
    files: IndexMap<(String, String), String>,
}

impl MemoryFiles {
    pub fn with_file(mut self, path: &str, filename: &str, contents: &str) -> Self {
        self.files
            .insert((path.to_string(), filename.to_string()), contents.to_string());
        self
    }

    fn info(path: &str, filename: &str, contents: &str) -> Value {
        Value::from_pairs([
            ("path", Value::from(path)),
            ("filename", Value::from(filename)),
            ("size", Value::from(contents.len() as i64)),
        ])
    }
}

#[async_trait]
impl LocalFiles for MemoryFiles {
    async fn is_file(&self, path: &str, filename: &str) -> HandlerResult<Value> {
        match self.files.get(&(path.to_string(), filename.to_string())) {
            Some(contents) => Ok(Self::info(path, filename, contents)),
            None => Ok(Value::from(false)),
        }
    }

    async fn read_file(&self, path: &str, filename: &str) -> HandlerResult<Value> {
        let contents = self
            .files
            .get(&(path.to_string(), filename.to_string()))
            .ok_or_else(|| HandlerError::NotFound(format!("{}/{}", path, filename)))?;
        let mut info = Self::info(path, filename, contents);
        info.insert("raw", contents.as_str());
        Ok(info)
    }
}

/// Host integration with a switchable self-test.
pub struct TestHost {
    healthy: AtomicBool,
    files: Option<MemoryFiles>,
}

impl TestHost {
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            files: None,
        }
    }

    pub fn with_files(mut self, files: MemoryFiles) -> Self {
        self.files = Some(files);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostIntegration for TestHost {
    async fn self_test(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn informations(&self) -> Value {
        Value::from_pairs([("company", "Acme Test"), ("country", "FR")])
    }

    fn local_files(&self) -> Option<&dyn LocalFiles> {
        self.files.as_ref().map(|files| files as &dyn LocalFiles)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// How the scripted server answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerScript {
    /// Every task succeeds.
    Accept,
    /// Calls are answered, but every task fails.
    Refuse,
    /// Every call fails at transport level.
    Fault { code: i32, message: String },
    /// The first `n` calls fail at transport level, later ones succeed.
    FaultFirst(usize),
}

/// A sync server decoding real envelopes with the shared credentials.
pub struct ScriptedServer {
    codec: Codec,
    script: Mutex<ServerScript>,
    requests: Mutex<Vec<Request>>,
    calls: AtomicUsize,
}

impl ScriptedServer {
    pub fn new(config: ConnectorConfig) -> Arc<Self> {
        let unused = Arc::new(MemoryTransport::failing(0, "server side codec never calls out"));
        Arc::new(Self {
            codec: Codec::new(config, unused, Arc::new(Logger::default())),
            script: Mutex::new(ServerScript::Accept),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_script(&self, script: ServerScript) {
        *self.script.lock().unwrap() = script;
    }

    /// A transport whose calls are answered by this server.
    pub fn transport(self: &Arc<Self>) -> MemoryTransport {
        let server = Arc::clone(self);
        MemoryTransport::new(move |service, payload| server.answer(service, payload))
    }

    /// Answer one call.
    pub fn answer(&self, service: &str, payload: &str) -> Result<String, TransportFault> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let accept = match &*self.script.lock().unwrap() {
            ServerScript::Accept => true,
            ServerScript::Refuse => false,
            ServerScript::Fault { code, message } => {
                return Err(TransportFault::new(*code, message.clone()))
            }
            ServerScript::FaultFirst(n) if call <= *n => {
                return Err(TransportFault::new(503, "service unavailable"))
            }
            ServerScript::FaultFirst(_) => true,
        };

        let uncrypted = service == PING_SERVICE;
        let value = self
            .codec
            .unpack(payload, uncrypted)
            .map_err(|e| TransportFault::new(400, e.to_string()))?;
        let request =
            Request::from_value(&value).map_err(|e| TransportFault::new(400, e.to_string()))?;

        let tasks: Vec<TaskResult> = request
            .tasks
            .iter()
            .map(|task| {
                if accept {
                    TaskResult::succeeded(task, Value::from(true))
                } else {
                    TaskResult::failed(task)
                }
            })
            .collect();
        let ok = tasks.iter().filter(|t| t.result).count() as u32;
        let response = Response {
            result: accept,
            stats: Some(BatchStats {
                elapsed_ms: 0.0,
                performed: tasks.len() as u32,
                ok,
            }),
            tasks,
            log: None,
        };
        self.requests.lock().unwrap().push(request);

        self.codec
            .pack_response(&response, uncrypted)
            .map_err(|e| TransportFault::new(500, e.to_string()))
    }

    /// Calls received, including faulted ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Decoded requests, faulted calls excluded.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Every commit task received.
    pub fn commits(&self) -> Vec<Task> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .flat_map(|request| request.tasks.iter())
            .filter(|task| task.name == COMMIT_TASK)
            .cloned()
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixture
// ─────────────────────────────────────────────────────────────────────────────

/// A registry with `Product` and `ThirdParty` types and a `Banner` widget,
/// a host and a scripted server sharing the fixture credentials.
pub struct TestFixture {
    pub config: ConnectorConfig,
    pub products: Arc<MemoryObjects>,
    pub thirdparties: Arc<MemoryObjects>,
    pub registry: Arc<Registry>,
    pub host: Arc<TestHost>,
    pub server: Arc<ScriptedServer>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ConnectorConfig) -> Self {
        let products = Arc::new(
            MemoryObjects::new("Product")
                .with_row("12", [("ref", "CHAIR-01"), ("label", "Chair")])
                .with_row("13", [("ref", "DESK-02"), ("label", "Desk")]),
        );
        let thirdparties = Arc::new(
            MemoryObjects::new("ThirdParty").with_row("1", [("name", "Acme"), ("town", "Paris")]),
        );

        let mut registry = Registry::new();
        registry
            .register_object("Product", products.clone())
            .expect("valid type name");
        registry
            .register_object("ThirdParty", thirdparties.clone())
            .expect("valid type name");
        registry
            .register_widget("Banner", Arc::new(StaticWidget::new("Banner", "<b>hello</b>")))
            .expect("valid widget name");

        Self {
            server: ScriptedServer::new(config.clone()),
            config,
            products,
            thirdparties,
            registry: Arc::new(registry),
            host: Arc::new(
                TestHost::new().with_files(MemoryFiles::default().with_file(
                    "/var/www",
                    "logo.png",
                    "PNG",
                )),
            ),
        }
    }

    /// A transport answered by the fixture server.
    pub fn transport(&self) -> Arc<MemoryTransport> {
        Arc::new(self.server.transport())
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_objects_crud() {
        let objects = MemoryObjects::new("Product").with_row("1", [("label", "Chair")]);

        let id = objects
            .set(None, &Map::from_iter([("label".to_string(), Value::from("Desk"))]))
            .await
            .unwrap();
        assert_eq!(id, Value::from("100"));
        assert_eq!(objects.len(), 2);

        let row = objects
            .get(&Value::from("100"), &["label".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(row.get("label"), Some(&Value::from("Desk")));
        assert_eq!(row.get("missing"), Some(&Value::Null));

        assert_eq!(objects.delete(&Value::from("1")).await.unwrap(), Value::from(true));
        assert!(matches!(
            objects.delete(&Value::from("1")).await,
            Err(HandlerError::NotFound(_))
        ));
        assert_eq!(objects.calls(), 4);
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let objects = MemoryObjects::new("Product")
            .with_row("1", [("label", "Red chair")])
            .with_row("2", [("label", "Blue chair")])
            .with_row("3", [("label", "Desk")]);

        let chairs = objects.list(Some("chair"), &Value::Null).await.unwrap();
        assert_eq!(chairs.as_list().map(|l| l.len()), Some(2));

        let page = objects
            .list(None, &Value::from_pairs([("max", 1), ("offset", 2)]))
            .await
            .unwrap();
        let page = page.as_list().unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].get("id"), Some(&Value::from("3")));
    }

    #[tokio::test]
    async fn test_update_of_missing_row_is_not_found() {
        let objects = MemoryObjects::new("Product");
        let result = objects.set(Some(&Value::from("9")), &Map::new()).await;
        assert!(matches!(result, Err(HandlerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_files() {
        let files = MemoryFiles::default().with_file("/tmp", "a.txt", "abc");
        assert_eq!(files.is_file("/tmp", "b.txt").await.unwrap(), Value::from(false));
        let info = files.read_file("/tmp", "a.txt").await.unwrap();
        assert_eq!(info.get("size"), Some(&Value::from(3)));
        assert_eq!(info.get("raw"), Some(&Value::from("abc")));
    }

    #[test]
    fn test_scripted_server_faults() {
        let server = ScriptedServer::new(test_config());
        server.set_script(ServerScript::FaultFirst(1));
        let fault = server.answer("objects", "garbage").unwrap_err();
        assert_eq!(fault.code, 503);
        // The second call gets past the fault and fails on the payload
        let fault = server.answer("objects", "garbage").unwrap_err();
        assert_eq!(fault.code, 400);
        assert_eq!(server.calls(), 2);
        assert!(server.requests().is_empty());
    }
}
