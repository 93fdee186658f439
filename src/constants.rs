//! Library-wide constants
//!
//! Centralized constants to avoid duplication and ensure consistency.

// =============================================================================
// Log records
// =============================================================================

/// Maximum UTF-8 size of a record name (server index limit)
pub const MAX_NAME_BYTES: usize = 1000;

/// Maximum UTF-8 size of a record message (server index limit)
pub const MAX_MESSAGE_BYTES: usize = 1000;

// =============================================================================
// Structural cloner
// =============================================================================

/// Default nesting bound for cloned error/extra data
pub const DEFAULT_MAX_DEPTH: usize = 4;

/// Stacks longer than this are assumed to come from a stack overflow
pub const MAX_STACK_FRAMES: usize = 500;

/// Frames kept at each end of an oversized stack
pub const STACK_KEEP_FRAMES: usize = 250;

/// Placeholder for subtrees past the depth bound
pub const TOO_DEEP: &str = "[Too deep]";

// =============================================================================
// Queries
// =============================================================================

/// Default row limit for queries
pub const DEFAULT_QUERY_LIMIT: u32 = 100;

/// Default look-back window for queries without a minimum date (hours)
pub const DEFAULT_QUERY_WINDOW_HOURS: i64 = 24;

// =============================================================================
// CLI / network
// =============================================================================

/// Default server URL
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8018";

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "log-sink.toml";
