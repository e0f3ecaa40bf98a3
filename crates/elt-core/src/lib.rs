//! Shared domain model for the ELT sync engine: sources, streams, records,
//! replication state, jobs, schedules, the error taxonomy, table-naming
//! rule, and the profiler contracts the orchestrator calls into.

pub mod error;
pub mod job;
pub mod model;
pub mod profiler;
pub mod table_name;

pub use error::{ElError, ErrorKind};
pub use job::{JobStatus, Schedule, SyncJob};
pub use model::{
    new_run_id, ConfiguredCatalog, ConfiguredStream, CursorValue, DestinationSyncMode, Record,
    Source, SourceState, Stream, StreamState, SyncMode,
};
pub use profiler::{
    DimensionResult, PiiDetector, PiiFinding, PiiReport, QualityReport, QualityValidator,
    DIMENSION_WEIGHTS,
};
pub use table_name::{qualified_table_name, Layer};
