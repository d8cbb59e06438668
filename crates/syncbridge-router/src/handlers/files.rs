//! File tasks. Writing and deleting files is recognized but disabled.

use syncbridge_core::validation::require_str;
use syncbridge_core::{Task, Value};

use crate::error::TaskError;
use crate::router::Router;

pub(crate) async fn dispatch(router: &Router, task: &Task) -> Result<Value, TaskError> {
    match task.name.as_str() {
        "isfile" | "getfile" => {}
        "setfile" | "deletefile" => return Err(TaskError::Disabled(task.name.clone())),
        other => return Err(TaskError::UnknownTask(other.to_string())),
    }

    let filename = require_str(&task.params, "filename")?;
    let path = require_str(&task.params, "path")?;
    let files = router.host().local_files().ok_or(TaskError::NoLocalFiles)?;

    let data = match task.name.as_str() {
        "isfile" => files.is_file(path, filename).await?,
        _ => files.read_file(path, filename).await?,
    };
    Ok(data)
}
