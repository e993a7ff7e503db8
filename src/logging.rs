use env_logger::Env;

/// Initialize logging with a level taken from the `BATTLESHIP_LOG` environment variable.
/// Defaults to `info` if the variable is not set.
pub fn init_logging() {
    let env = Env::new().filter_or("BATTLESHIP_LOG", "info");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_secs()
        .try_init();
}
