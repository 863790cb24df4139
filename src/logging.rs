//! Process-wide logger initialization.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the global logger. Safe to call from every entry point and from
/// tests; only the first call has any effect.
pub fn init() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_millis()
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        log::info!("logger initialized twice without panicking");
    }
}
