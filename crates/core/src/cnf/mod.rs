use std::sync::LazyLock;

/// The exact length of every generated business code.
pub const CODE_LENGTH: usize = 10;

/// The number of characters of a code which make up its prefix.
pub const PREFIX_LENGTH: usize = 4;

/// The minimum number of digits the counter is zero-padded to.
pub const COUNTER_WIDTH: usize = 4;

/// The filler used to right-pad codes and counter key prefixes.
pub const CODE_PADDING: char = ' ';

/// The number of candidate codes tried before code generation gives up.
pub const COLLISION_BUDGET: u32 = 1000;

/// The literal which starts every pro number.
pub const PRO_NUMBER_PREFIX: &str = "S";

/// The number of digits the pro number serial is zero-padded to.
pub const PRO_NUMBER_WIDTH: usize = 6;

/// The name of the table holding the durable pro number counters.
pub const PRO_NUMBER_TABLE: &str = "pro_number_counters";

/// How many times a transaction which failed with a retryable conflict is re-run.
pub static TRANSACTION_MAX_RETRIES: LazyLock<u32> =
	lazy_env_parse!("TENANTCODE_TRANSACTION_MAX_RETRIES", u32, 8);

/// The maximum number of pooled connections held by a remote datastore.
pub static STORE_MAX_CONNECTIONS: LazyLock<u32> =
	lazy_env_parse!("TENANTCODE_STORE_MAX_CONNECTIONS", u32, 10);

/// How long to wait for a pooled connection, in seconds.
pub static STORE_ACQUIRE_TIMEOUT_SECS: LazyLock<u64> =
	lazy_env_parse!("TENANTCODE_STORE_ACQUIRE_TIMEOUT_SECS", u64, 30);
