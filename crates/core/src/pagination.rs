//! Limit/offset clamping shared by every list endpoint.

/// Default page size when the client does not provide `limit`.
pub const DEFAULT_LIMIT: i64 = 50;

/// Hard ceiling on page size.
pub const MAX_LIMIT: i64 = 100;

/// Clamp a user-provided limit into `[1, max]`, falling back to `default`.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).max(1).min(max)
}

/// Clamp a user-provided offset to non-negative.
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_caps() {
        assert_eq!(clamp_limit(None, DEFAULT_LIMIT, MAX_LIMIT), 50);
        assert_eq!(clamp_limit(Some(500), DEFAULT_LIMIT, MAX_LIMIT), 100);
        assert_eq!(clamp_limit(Some(0), DEFAULT_LIMIT, MAX_LIMIT), 1);
        assert_eq!(clamp_limit(Some(-3), DEFAULT_LIMIT, MAX_LIMIT), 1);
    }

    #[test]
    fn offset_never_negative() {
        assert_eq!(clamp_offset(None), 0);
        assert_eq!(clamp_offset(Some(-10)), 0);
        assert_eq!(clamp_offset(Some(25)), 25);
    }
}
