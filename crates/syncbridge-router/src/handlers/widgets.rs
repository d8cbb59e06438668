//! Widget tasks. An unknown widget type fails quietly.

use syncbridge_core::validation::require_str;
use syncbridge_core::{Task, Value};

use super::names;
use crate::error::TaskError;
use crate::router::Router;

pub(crate) async fn dispatch(router: &Router, task: &Task) -> Result<Value, TaskError> {
    match task.name.as_str() {
        "list" => Ok(names(router.registry().widget_types())),
        "description" | "get" => {
            let widget_type = require_str(&task.params, "type")?;
            let handler = router
                .registry()
                .resolve_widget(widget_type)
                .ok_or_else(|| TaskError::UnknownWidget(widget_type.to_string()))?;
            let data = if task.name == "description" {
                handler.describe().await?
            } else {
                handler.get(&task.params).await?
            };
            Ok(data)
        }
        other => Err(TaskError::UnknownTask(other.to_string())),
    }
}
