//! Structured unit logging utilities.
//!
//! Provides consistent log lines for the lifecycle of a generation unit
//! (a scene or the test clip).

use tracing::{error, info, warn, Span};

/// Logger carrying the unit and operation of every line it writes.
#[derive(Debug, Clone)]
pub struct UnitLogger {
    unit_id: String,
    operation: String,
}

impl UnitLogger {
    pub fn new(unit_id: impl Into<String>, operation: &str) -> Self {
        Self {
            unit_id: unit_id.into(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            unit_id = %self.unit_id,
            operation = %self.operation,
            "Unit started: {}", message
        );
    }

    pub fn log_progress(&self, percent: u8) {
        info!(
            unit_id = %self.unit_id,
            operation = %self.operation,
            percent,
            "Unit progress"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            unit_id = %self.unit_id,
            operation = %self.operation,
            "Unit warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            unit_id = %self.unit_id,
            operation = %self.operation,
            "Unit error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            unit_id = %self.unit_id,
            operation = %self.operation,
            "Unit completed: {}", message
        );
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span for work done on behalf of this unit.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "unit",
            unit_id = %self.unit_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_logger_fields() {
        let logger = UnitLogger::new("scene_2", "generate");
        assert_eq!(logger.unit_id(), "scene_2");
        assert_eq!(logger.operation(), "generate");
    }
}
