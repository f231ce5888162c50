//! Constants used throughout the application.

/// Output directory used when none is given on the command line.
pub const DEFAULT_OUTPUT_DIR: &str = "../openPoseOutput";

/// Log level used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_LEVEL: &str = "info";
