// Basic modules
pub mod config;
pub mod error;
pub mod lock;
pub mod metrics;

// Snapshot model + wire format
pub mod model;  // src/model/{mod,flags}.rs
pub mod codec;  // src/codec/{mod,wire,naming}.rs

// Collaborators: local library, snapshot locations, source/tracker lookup
pub mod store;  // src/store/{mod,memory,file}.rs
pub mod storage;
pub mod registry;

// Write path
pub mod writer;
pub mod validator;

// Restore path
pub mod restore;  // src/restore/{mod,coalesce,merge}.rs
pub mod orchestrator;
pub mod progress;

// Convenience re-exports
pub use config::SnapConfig;
pub use error::SnapshotError;
pub use model::{BackupFlags, Snapshot};
pub use orchestrator::{FileLease, KeepAlive, NoKeepAlive, RestoreOutcome, RestoreReport, RestoreTask};
pub use progress::{BackupProgress, CancelToken, LogProgress, NoProgress, RestoreProgress};
pub use registry::{SourceRegistry, StaticRegistry, TrackerRegistry};
pub use restore::{RestoreEngine, RestoreItemError, RestoreSummary};
pub use storage::{FsPath, FsStorage, SnapshotStorage};
pub use store::{LibraryFile, LibraryStore, MemoryStore};
pub use validator::{validate, ValidationReport};
pub use writer::{build_snapshot, Destination, SnapshotWriter, WriteOutcome};
