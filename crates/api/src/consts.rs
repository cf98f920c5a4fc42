/// Maximum size for request body (256 KiB)
/// Large enough for a maximal prompt plus its context
pub const MAX_REQUEST_BODY_SIZE: usize = 256 * 1024;

/// Default page size for usage history
pub const DEFAULT_USAGE_PAGE_SIZE: i64 = 20;
