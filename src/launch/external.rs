//! External mode: listeners configured from our own command line.
//!
//! The arguments are one or more configurations back to back, each
//! starting with a supported protocol name:
//!
//! ```text
//! dummy client 127.0.0.1:5000 10.0.0.9:11253 dummy server 0.0.0.0:11253 127.0.0.1:9005
//! └──────────── configuration 1 ───────────┘ └──────────── configuration 2 ───────────┘
//! ```

use crate::launch::LaunchError;
use crate::lifecycle::{Lifecycle, LifecycleOptions};
use crate::observability::logging::scrub;
use crate::protocol::{self, TransportConfig};

/// Split `args` at every supported protocol name.
pub fn split_configurations(args: &[String]) -> Result<Vec<&[String]>, LaunchError> {
    match args.first() {
        None => return Err(LaunchError::Usage("No protocol specified".into())),
        Some(first) if !protocol::is_supported(first) => {
            return Err(LaunchError::Usage(format!("Unknown protocol '{first}'")));
        }
        Some(_) => {}
    }

    let mut starts: Vec<usize> = args
        .iter()
        .enumerate()
        .filter(|(_, arg)| protocol::is_supported(arg))
        .map(|(i, _)| i)
        .collect();
    starts.push(args.len());

    let mut configs = Vec::with_capacity(starts.len() - 1);
    for (n, window) in starts.windows(2).enumerate() {
        let config = &args[window[0]..window[1]];
        if config.len() < 2 {
            tracing::warn!("No arguments for configuration {}", n + 1);
            return Err(LaunchError::Usage(format!("No arguments for configuration {}", n + 1)));
        }
        tracing::debug!("Configuration {}: {}", n + 1, scrub(config.join(" ")));
        configs.push(config);
    }
    Ok(configs)
}

/// Parse every configuration, bring the lifecycle up, open all
/// listeners, run until shutdown and tear down.
pub fn launch(args: &[String], options: &LifecycleOptions) -> Result<(), LaunchError> {
    let configs = split_configurations(args)?
        .into_iter()
        .map(TransportConfig::from_args)
        .collect::<Result<Vec<_>, _>>()?;

    let mut lifecycle = Lifecycle::initialize(options)?;

    for (i, config) in configs.iter().enumerate() {
        if let Err(source) = lifecycle.open_listeners(config) {
            tracing::error!("Failed to open listeners for configuration {}", i + 1);
            lifecycle.teardown();
            return Err(LaunchError::Listener { index: i + 1, source });
        }
    }

    lifecycle.run();
    lifecycle.teardown();
    Ok(())
}
