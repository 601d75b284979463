//! Migration file name parsing.
//!
//! Two grammars are recognised:
//!
//! - SQL: `NNNN-TASKID-description_up.sql` / `NNNN-TASKID-description_down.sql`
//! - PHP: `NNNN-TASKID-description.php`
//!
//! where `TASKID` is a ticket-style identifier such as `SHOP-42`.

mod types;

pub use types::{Direction, FormatError, MigrationMetadata, OperationType};

use once_cell::sync::Lazy;
use regex::Regex;

static SQL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)-([A-Za-z]+-\d+)-(.+)_(up|down)\.(sql)$").expect("valid SQL pattern")
});

static PHP_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)-([A-Za-z]+-\d+)-(.+)\.(php)$").expect("valid PHP pattern")
});

static RESEMBLES_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+-.*\.(sql|php)$").expect("valid resemblance pattern"));

/// Parse a migration file name into its metadata.
pub fn parse_file_name(file_name: &str) -> Result<MigrationMetadata, FormatError> {
    // Try SQL first; a `_up.php` name is still a PHP migration
    if let Some(caps) = SQL_PATTERN.captures(file_name) {
        let direction = match &caps[4] {
            "up" => Direction::Up,
            _ => Direction::Down,
        };
        return Ok(MigrationMetadata {
            version: parse_version(&caps[1], file_name)?,
            task_name: caps[2].to_string(),
            description: caps[3].to_string(),
            operation_type: OperationType::Sql,
            direction,
            extension: caps[5].to_string(),
        });
    }

    if let Some(caps) = PHP_PATTERN.captures(file_name) {
        return Ok(MigrationMetadata {
            version: parse_version(&caps[1], file_name)?,
            task_name: caps[2].to_string(),
            description: caps[3].to_string(),
            operation_type: OperationType::Php,
            direction: Direction::Both,
            extension: caps[4].to_string(),
        });
    }

    Err(FormatError::InvalidFileName(file_name.to_string()))
}

/// Whether `parse_file_name` would succeed for this name.
pub fn is_valid_file_name(file_name: &str) -> bool {
    parse_file_name(file_name).is_ok()
}

/// Whether a name looks like an attempt at a migration file.
///
/// Such names must parse; anything else in a date folder is ignored.
pub fn looks_like_migration(file_name: &str) -> bool {
    RESEMBLES_PATTERN.is_match(file_name)
}

fn parse_version(digits: &str, file_name: &str) -> Result<u32, FormatError> {
    digits
        .parse()
        .map_err(|_| FormatError::InvalidVersion(file_name.to_string()))
}
