//! # SyncBridge Testkit
//!
//! Testing utilities for the SyncBridge connector.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: In-memory object types, a widget, a host and a scripted
//!   sync server that decodes real envelopes
//! - **Generators**: Proptest strategies for value trees and commit events
//! - **Golden vectors**: Pinned XML tree, cipher and commit identity outputs
//!
//! ## Golden Vectors
//!
//! ```rust
//! use syncbridge_testkit::vectors::verify_all_vectors;
//!
//! for (name, passed, detail) in verify_all_vectors() {
//!     assert!(passed, "{}: {}", name, detail);
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use syncbridge_testkit::fixtures::{ServerScript, TestFixture};
//!
//! let fixture = TestFixture::new();
//! fixture.server.set_script(ServerScript::FaultFirst(2));
//! let transport = fixture.transport();
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{
    test_config, MemoryFiles, MemoryObjects, ScriptedServer, ServerScript, StaticWidget,
    TestFixture, TestHost,
};
pub use generators::{commit_event, value_tree};
pub use vectors::{cipher_vectors, identity_vectors, tree_vectors, verify_all_vectors};

/// Install a test log subscriber filtered by `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
