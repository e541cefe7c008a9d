use tracing_subscriber::EnvFilter;

/// Filter directive for a verbosity count (0 = info, 1 = debug, 2+ = trace).
pub fn directive(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    format!("warn,sprayzone={level},geoclip={level}")
}

/// Install a timestamped fmt subscriber. `RUST_LOG` overrides `verbosity`.
///
/// Returns false if a global subscriber was already installed.
pub fn init(verbosity: u8) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(directive(verbosity))),
        )
        .with_target(true)
        .try_init()
        .is_ok()
}
