//! Scenario test infrastructure for Gatehouse.
//!
//! Wires the scheduler against the in-memory store and configuration
//! repository, with recording doubles for lock listeners and notifications
//! and a settable disk.
//!
//! # Usage
//!
//! ```ignore
//! use gatehouse_tests::{PipelineFixture, TestContext};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let ctx = TestContext::new(vec![PipelineFixture::simple("up")]);
//!     // Use ctx.queue, ctx.locks, ctx.checkers, etc.
//! }
//! ```

pub mod context;
pub mod fixtures;
pub mod helpers;

pub use context::{ADMIN, TestContext};
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,gatehouse_scheduler=debug")),
        )
        .with_test_writer()
        .try_init();
}
