pub mod events;
pub mod sos;

/// Install the fmt subscriber used by the engine's `log` records
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_logging() {
    if tracing_subscriber::fmt().try_init().is_err() {
        log::debug!("logging already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        init_logging();
        init_logging();
        log::info!("logging initialized");
    }
}
