//! Diagnostics setup.
//!
//! Output goes to the host's stderr, so everything below `warn` stays
//! silent unless `IPR_DEBUG` is set. `INCPROF_LOG` overrides the filter
//! without touching the host's own `RUST_LOG`.

use std::io::Write;

use incprof_protocol::env;

/// Install the agent's logger. A logger that is already installed wins.
pub fn init(debug: bool) {
    let level = if debug { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::new().filter_or(env::LOG, level))
        .format(|buf, record| {
            writeln!(
                buf,
                "incprof[{}]: {}: {}",
                std::process::id(),
                record.level().as_str().to_lowercase(),
                record.args()
            )
        })
        .try_init();
}
