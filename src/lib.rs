pub mod config;
pub mod ledger;
pub mod migration;
pub mod operation;
pub mod parser;
pub mod source;
pub mod utils;

// Re-export commonly used types
pub use config::{read_config, write_config, ConfigError, MigratorConfig};
pub use ledger::{ErrorData, FileStateRepository, OperationRecord, StateRepository};
pub use migration::{
    create_manager, ChecksumDrift, Executor, FatalError, Manager, Migration, MigrationError,
    MigrationOperation, MigrationStatusReport, Operation, OperationStatus, RunMode,
};
pub use operation::{
    OperationExecutor, ProcessRuntime, ScriptOperationExecutor, ScriptRuntime,
    SqlOperationExecutor, SqliteStore, Store,
};
pub use parser::{
    is_valid_file_name, parse_file_name, Direction, FormatError, MigrationMetadata, OperationType,
};
pub use source::{FileSourceRepository, SourceRepository};
