//! Admin tasks: catalogues, self-test and host description.

use syncbridge_core::{Task, Value};

use super::names;
use crate::error::TaskError;
use crate::router::Router;

pub(crate) async fn dispatch(router: &Router, task: &Task) -> Result<Value, TaskError> {
    match task.name.as_str() {
        "objects" => Ok(names(router.registry().object_types())),
        "widgets" => Ok(names(router.registry().widget_types())),
        "selftest" => {
            if router.host().self_test().await {
                Ok(Value::from(true))
            } else {
                Err(TaskError::SelfTestFailed)
            }
        }
        "infos" => Ok(router.host().informations().await),
        other => Err(TaskError::UnknownTask(other.to_string())),
    }
}
