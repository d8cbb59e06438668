//! Registry of object types, widget types and the host integration.
//!
//! Hosts populate the registry at startup; the router and the commit queue
//! only ever look types up.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use syncbridge_core::validation::is_valid_type_name;
use syncbridge_core::{Map, Value};

use crate::error::{HandlerResult, Result, RouterError};

/// Local mapping of one business object type.
#[async_trait]
pub trait ObjectHandler: Send + Sync {
    /// Whether the type is currently usable, e.g. its host module is enabled.
    fn is_valid(&self) -> bool {
        true
    }

    /// Type description: name, icon, capabilities.
    async fn describe(&self) -> HandlerResult<Value>;

    /// Field schema.
    async fn fields(&self) -> HandlerResult<Value>;

    /// Instances matching `filter`, paged by `params` (`max`, `offset`).
    async fn list(&self, filter: Option<&str>, params: &Value) -> HandlerResult<Value>;

    /// Read the requested fields of one instance.
    async fn get(&self, id: &Value, fields: &[String]) -> HandlerResult<Value>;

    /// Write fields to an instance, creating it when `id` is `None`.
    ///
    /// Returns the instance id.
    async fn set(&self, id: Option<&Value>, fields: &Map) -> HandlerResult<Value>;

    /// Delete one instance.
    async fn delete(&self, id: &Value) -> HandlerResult<Value>;
}

/// Local dashboard widget.
#[async_trait]
pub trait WidgetHandler: Send + Sync {
    fn is_valid(&self) -> bool {
        true
    }

    /// Widget schema.
    async fn describe(&self) -> HandlerResult<Value>;

    /// Rendered widget contents.
    async fn get(&self, params: &Value) -> HandlerResult<Value>;
}

/// Local file access point.
#[async_trait]
pub trait LocalFiles: Send + Sync {
    /// File information, or `false` when the file does not exist.
    async fn is_file(&self, path: &str, filename: &str) -> HandlerResult<Value>;

    /// File information and contents.
    async fn read_file(&self, path: &str, filename: &str) -> HandlerResult<Value>;
}

/// Host-level hooks.
#[async_trait]
pub trait HostIntegration: Send + Sync {
    /// Check that the host is correctly configured.
    async fn self_test(&self) -> bool;

    /// Host description: company, address, logo and similar.
    async fn informations(&self) -> Value;

    /// Local file override point. `None` disables file tasks.
    fn local_files(&self) -> Option<&dyn LocalFiles> {
        None
    }
}

/// Type catalogue.
#[derive(Default)]
pub struct Registry {
    objects: IndexMap<String, Arc<dyn ObjectHandler>>,
    widgets: IndexMap<String, Arc<dyn WidgetHandler>>,
    lookups: AtomicUsize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object type, replacing any previous handler.
    pub fn register_object(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn ObjectHandler>,
    ) -> Result<()> {
        let name = name.into();
        if !is_valid_type_name(&name) {
            return Err(RouterError::InvalidTypeName(name));
        }
        self.objects.insert(name, handler);
        Ok(())
    }

    /// Register a widget type, replacing any previous handler.
    pub fn register_widget(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn WidgetHandler>,
    ) -> Result<()> {
        let name = name.into();
        if !is_valid_type_name(&name) {
            return Err(RouterError::InvalidTypeName(name));
        }
        self.widgets.insert(name, handler);
        Ok(())
    }

    /// Handler of a registered, currently valid object type.
    pub fn resolve_object(&self, name: &str) -> Option<Arc<dyn ObjectHandler>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.objects.get(name).filter(|h| h.is_valid()).cloned()
    }

    /// Handler of a registered, currently valid widget type.
    pub fn resolve_widget(&self, name: &str) -> Option<Arc<dyn WidgetHandler>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.widgets.get(name).filter(|h| h.is_valid()).cloned()
    }

    /// True if `name` is a registered, currently valid object type.
    pub fn is_valid_type(&self, name: &str) -> bool {
        self.resolve_object(name).is_some()
    }

    /// Names of valid object types, in registration order.
    pub fn object_types(&self) -> Vec<String> {
        self.objects
            .iter()
            .filter(|(_, h)| h.is_valid())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Names of valid widget types, in registration order.
    pub fn widget_types(&self) -> Vec<String> {
        self.widgets
            .iter()
            .filter(|(_, h)| h.is_valid())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of type lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        valid: bool,
    }

    #[async_trait]
    impl WidgetHandler for Dummy {
        fn is_valid(&self) -> bool {
            self.valid
        }

        async fn describe(&self) -> HandlerResult<Value> {
            Ok(Value::from("dummy"))
        }

        async fn get(&self, _params: &Value) -> HandlerResult<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = Registry::new();
        registry.register_widget("Sales", Arc::new(Dummy { valid: true })).unwrap();
        registry.register_widget("Hidden", Arc::new(Dummy { valid: false })).unwrap();

        assert!(registry.resolve_widget("Sales").is_some());
        assert!(registry.resolve_widget("Hidden").is_none());
        assert!(registry.resolve_widget("Missing").is_none());
        assert_eq!(registry.widget_types(), vec!["Sales"]);
        assert_eq!(registry.lookups(), 3);
    }

    #[test]
    fn test_rejects_invalid_names() {
        let mut registry = Registry::new();
        let result = registry.register_widget("not a name", Arc::new(Dummy { valid: true }));
        assert_eq!(result, Err(RouterError::InvalidTypeName("not a name".into())));
    }

    #[test]
    fn test_unknown_object_type_is_invalid() {
        let registry = Registry::new();
        assert!(!registry.is_valid_type("Product"));
        assert!(registry.object_types().is_empty());
    }
}
