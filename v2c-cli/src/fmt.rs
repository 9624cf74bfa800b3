use crate::opts::Opts;

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over the verbosity
/// flags when set.
pub fn setup_tracing(opts: &Opts) {
    let default_level = if opts.trace {
        "v2c=trace,v2c_core=trace"
    } else if opts.debug {
        "v2c=debug,v2c_core=debug"
    } else {
        "v2c=info,v2c_core=info"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
