mod hash;

pub use hash::compute_checksum;

/// Name of the optional configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "migrator.json";

/// Date used as the lower scan bound when nothing has completed yet
pub const EPOCH_DATE: &str = "1970-01-01";

/// Get current timestamp in ISO 8601 format
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}
