//! Tracing setup for binaries and tests embedding the data layer

use tracing_subscriber::{EnvFilter, prelude::*};

use crate::error::{DataError, Result};

/// Install a global subscriber filtered by `filter` (an `EnvFilter` directive
/// such as `info` or `haulage_data=debug,sqlx=warn`).
///
/// Fails with an argument error on a malformed directive and with an invalid
/// operation error when a global subscriber is already installed.
pub fn init(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(filter)
        .map_err(|e| DataError::argument(format!("invalid log filter {filter:?}: {e}")))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_line_number(true)
                .with_file(true),
        )
        .try_init()
        .map_err(|e| DataError::invalid_operation(format!("logging is already initialized: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_filter_is_rejected() {
        assert!(matches!(init("haulage_data=notalevel"), Err(DataError::Argument(_))));
    }

    #[test]
    fn second_init_is_reported_not_fatal() {
        let _ = init("warn");
        assert!(matches!(init("warn"), Err(DataError::InvalidOperation(_))));
    }
}
