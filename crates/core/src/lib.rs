// crates/core/src/lib.rs
//! Pure pipeline logic for vizperf: extraction, reduction, record
//! building, and the event-store seam the orchestrator runs against.

pub mod error;
pub mod extract;
pub mod memory;
pub mod record;
pub mod session_index;
pub mod store;

pub use error::{BuildError, StoreError, StoreResult};
pub use extract::{extract_workbook_dashboard, normalize_user};
pub use memory::InMemoryStore;
pub use record::build_performance_record;
pub use session_index::reduce_session_events;
pub use store::{is_bootstrap_request, EnrichedCursor, EventStore, SourceCounts, BOOTSTRAP_MARKER};
