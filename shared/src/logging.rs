use env_logger::{Env, Target};
use log::info;
use std::fs::OpenOptions;
use std::path::Path;

/// Initializes the global logger for a binary
///
/// Uses `RUST_LOG` when set and `info` otherwise. With `log_file`, output is
/// appended to that file instead of stderr.
pub fn init_logger(log_file: Option<&Path>) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));

    if let Some(path) = log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Unable to log to file {}: {}", path.display(), e),
        }
    }

    // A second init (tests, embedded use) keeps the first logger
    if builder.try_init().is_ok() {
        info!("Logging initialized");
    }
}
