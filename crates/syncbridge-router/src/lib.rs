//! # SyncBridge Router
//!
//! Executes inbound task batches against the host's object types, widgets
//! and files.
//!
//! ## Key Types
//!
//! - [`Router`] - Validates a batch and dispatches its tasks in order
//! - [`Registry`] - Catalogue of [`ObjectHandler`]s and [`WidgetHandler`]s
//! - [`HostIntegration`] - Self-test, host description and [`LocalFiles`]
//! - [`ObjectLocks`] - Write locks shared with the commit queue
//!
//! ## Handler Groups
//!
//! | Service | Tasks |
//! |---|---|
//! | `admin` | `objects`, `widgets`, `selftest`, `infos` |
//! | `objects` | `description`, `fields`, `list`, `get`, `set`, `delete` |
//! | `files` | `isfile`, `getfile` (`setfile`, `deletefile` disabled) |
//! | `widgets` | `list`, `description`, `get` |

mod handlers;

pub mod error;
pub mod locks;
pub mod registry;
pub mod router;

pub use error::{HandlerError, HandlerResult, Result, RouterError, TaskError};
pub use locks::{LockGuard, ObjectLocks, WriteGuard, NEW_OBJECT};
pub use registry::{HostIntegration, LocalFiles, ObjectHandler, Registry, WidgetHandler};
pub use router::{HandlerGroup, Router, ValidatedBatch};
