//! Query parameter types for list endpoints.

use serde::Deserialize;

/// Default page size for list endpoints.
pub const DEFAULT_LIMIT: usize = 50;

/// Upper bound on `limit`.
pub const MAX_LIMIT: usize = 500;

/// `?status=&limit=` for `GET /jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListParams {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

impl JobListParams {
    /// `limit` clamped to `1..=MAX_LIMIT`.
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(JobListParams::default().limit(), DEFAULT_LIMIT);
        let zero = JobListParams { status: None, limit: Some(0) };
        assert_eq!(zero.limit(), 1);
        let huge = JobListParams { status: None, limit: Some(10_000) };
        assert_eq!(huge.limit(), MAX_LIMIT);
    }
}
