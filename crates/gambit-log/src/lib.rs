// ABOUTME: Shared logging setup for gambit binaries
// ABOUTME: init() logs everything at INFO, init_for() focuses on the named crates

use tracing_subscriber::EnvFilter;

/// Standard logging to stderr. Default: INFO level, RUST_LOG override.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

/// Crate-filtered logging to stderr. Default: INFO for the named crates, WARN for
/// everything else (hyper, axum, tungstenite).
pub fn init_for(crate_names: &[&str]) {
    tracing_subscriber::fmt().with_env_filter(filter_for(crate_names)).init();
}

fn filter_for(crate_names: &[&str]) -> EnvFilter {
    crate_names.iter().fold(
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        |filter, name| {
            let directive = format!("{name}=info");
            filter.add_directive(
                directive
                    .parse()
                    .unwrap_or_else(|_| tracing::Level::INFO.into()),
            )
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_init() {
        let _ = super::init as fn();
    }

    #[test]
    fn exports_init_for() {
        let _ = super::init_for as fn(&[&str]);
    }

    #[test]
    fn filter_mentions_each_crate() {
        let filter = filter_for(&["gambit_core", "gambit_serve"]).to_string();
        assert!(filter.contains("gambit_core=info"));
        assert!(filter.contains("gambit_serve=info"));
    }
}
