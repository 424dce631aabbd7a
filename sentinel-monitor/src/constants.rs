//! Defaults for the monitoring policy.

/// Consecutive misses tolerated before the first alert
pub const DEFAULT_MISSED_THRESHOLD: i64 = 5;

/// Consecutive misses after which a validator is considered down
pub const DEFAULT_DOWN_THRESHOLD: i64 = 20;

/// Blocks between repeated alerts for the same streak
pub const DEFAULT_REPEAT_THRESHOLD: i64 = 10;

/// How far a check endpoint may trail the reference before alerting
pub const DEFAULT_LAG_THRESHOLD: i64 = 50;

/// Interval between node health poll cycles in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Timeout for a single node status request in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 5;

/// Inbound block events buffered ahead of the validator monitor
pub const DEFAULT_BLOCK_QUEUE_CAPACITY: usize = 1024;

/// First delay before re-subscribing to the chain event stream, in milliseconds
pub const SUBSCRIBE_BACKOFF_BASE_MS: u64 = 1_000;

/// Upper bound for the re-subscribe delay, in milliseconds
pub const SUBSCRIBE_BACKOFF_MAX_MS: u64 = 60_000;

/// Subscription attempts before giving up
pub const SUBSCRIBE_MAX_ATTEMPTS: u32 = 10;

/// CometBFT event query for new blocks
pub const NEW_BLOCK_QUERY: &str = "tm.event='NewBlock'";
