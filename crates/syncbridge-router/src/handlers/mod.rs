//! Handler groups. Each group switches on the task name.

pub(crate) mod admin;
pub(crate) mod files;
pub(crate) mod objects;
pub(crate) mod widgets;

use syncbridge_core::Value;

fn names(list: Vec<String>) -> Value {
    Value::List(list.into_iter().map(Value::from).collect())
}
