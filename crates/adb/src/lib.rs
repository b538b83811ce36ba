//! adb shell transport and device output parsing.
//!
//! The remote shell protocol silently truncates commands longer than
//! [`MAX_ADB_COMMAND_SIZE`] bytes, so every bulk operation pre-chunks its
//! argument list ([`chunk_args`]) before composing commands. Command output
//! is semi-structured text; the [`parse`] module turns recursive listings
//! and package dumps into typed values.

pub mod chunk;
pub mod error;
pub mod parse;
pub mod shell;

pub use chunk::chunk_args;
pub use error::AdbError;
pub use parse::{PackageInfo, parse_ls_recursive, parse_path_and_package_info};
pub use shell::{AdbShell, EXIT_STATUS_SUFFIX, check_status_output, rm_commands};

/// Maximum length of a command passed to the device shell. Longer commands
/// are silently truncated by the transport.
pub const MAX_ADB_COMMAND_SIZE: usize = 1019;
