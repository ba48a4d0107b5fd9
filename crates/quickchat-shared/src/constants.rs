/// Application name
pub const APP_NAME: &str = "QuickChat";

/// Default polling interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;

/// Ceiling for the failure backoff interval in milliseconds (1 minute)
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 60_000;

/// Default number of messages requested per fetch
pub const DEFAULT_FETCH_LIMIT: u32 = 50;

/// Default HTTP request timeout in milliseconds
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

/// Cache envelopes older than this many days are swept at startup
pub const CACHE_RETENTION_DAYS: i64 = 30;

/// Maximum message length in characters
pub const MAX_MESSAGE_CHARS: usize = 2_000;

/// Maximum upload size in bytes (10 MiB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Prefix for client-generated temporary message ids
pub const LOCAL_ID_PREFIX: &str = "local-";
