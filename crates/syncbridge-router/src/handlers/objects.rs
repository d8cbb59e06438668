//! Object tasks.
//!
//! Every task needs `params.type` naming a valid object type. Ids and field
//! lists are checked before the registry is touched.

use syncbridge_core::validation::{
    is_valid_object_id, require_field_list, require_field_map, require_object_id, require_str,
};
use syncbridge_core::{Task, ValidationError, Value};

use crate::error::TaskError;
use crate::locks::NEW_OBJECT;
use crate::router::Router;

pub(crate) async fn dispatch(router: &Router, task: &Task) -> Result<Value, TaskError> {
    let params = &task.params;
    let object_type = require_str(params, "type")?;

    // Syntactic checks first: a malformed task never reaches the registry.
    match task.name.as_str() {
        "get" => {
            require_object_id(params)?;
            require_field_list(params)?;
        }
        "set" => {
            if let Some(id) = params.get("id").filter(|id| !id.is_null()) {
                if !is_valid_object_id(id) {
                    return Err(ValidationError::InvalidObjectId(format!("{:?}", id)).into());
                }
            }
            require_field_map(params)?;
        }
        "delete" => {
            require_object_id(params)?;
        }
        "description" | "fields" | "list" => {}
        other => return Err(TaskError::UnknownTask(other.to_string())),
    }

    let handler = router
        .registry()
        .resolve_object(object_type)
        .ok_or_else(|| TaskError::InvalidObjectType(object_type.to_string()))?;

    let data = match task.name.as_str() {
        "description" => handler.describe().await?,
        "fields" => handler.fields().await?,
        "list" => {
            let filter = params.get("filter").and_then(Value::as_str);
            let paging = params.get("params").cloned().unwrap_or_default();
            handler.list(filter, &paging).await?
        }
        "get" => {
            let id = require_object_id(params)?;
            let fields = require_field_list(params)?;
            handler.get(id, &fields).await?
        }
        "set" => {
            let id = params.get("id").filter(|id| !id.is_null());
            let fields = require_field_map(params)?;
            let lock_id = id
                .and_then(Value::scalar_text)
                .unwrap_or_else(|| NEW_OBJECT.to_string());
            let _guard = router.locks().write_guard(object_type, &lock_id).await;
            handler.set(id, fields).await?
        }
        "delete" => {
            let id = require_object_id(params)?;
            let lock_id = id.scalar_text().unwrap_or_default();
            let _guard = router.locks().write_guard(object_type, &lock_id).await;
            handler.delete(id).await?
        }
        other => return Err(TaskError::UnknownTask(other.to_string())),
    };

    router
        .logger()
        .debug(format!("objects/{} {} done", task.name, object_type));
    Ok(data)
}
