// Macroblock converter - Shared Library
// Ambient services used by the converter binaries: configuration, logging
// setup and log sinks

pub mod config;
pub mod log;
pub mod sink;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "MBCONV_";

/// Default options file name
pub const DEFAULT_CONFIG: &str = "macroblock-converter.conf";
