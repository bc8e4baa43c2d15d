//! Consecutive-failure circuit breaker

/// Counts failures since the last clean tick. Once `max` is reached the
/// scheduler stops for good.
#[derive(Debug, Clone)]
pub struct ErrorCircuitBreaker {
    max: u32,
    consecutive: u32,
}

impl ErrorCircuitBreaker {
    pub fn new(max: u32) -> Self {
        Self {
            max: max.max(1),
            consecutive: 0,
        }
    }

    /// Count one failure, returning the new streak length
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn is_tripped(&self) -> bool {
        self.consecutive >= self.max
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}
