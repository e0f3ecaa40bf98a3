//! The Connector Executor (§4.2): a uniform runtime over in-process
//! library sources and out-of-process subprocess sources, both exposed
//! through the same [`Connector`] trait.

pub mod executor;
pub mod in_process;
pub mod subprocess;

pub use executor::{collect_with_timeout, Connector, ExecutionResult, MessageStream, DEFAULT_TIMEOUT};
pub use in_process::{InProcessConnector, LibrarySource};
pub use subprocess::SubprocessConnector;

#[cfg(any(test, feature = "test-support"))]
pub use in_process::testing;
