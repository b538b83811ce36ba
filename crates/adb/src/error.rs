//! Error types for the adb transport.

/// Errors produced while talking to a device over adb.
#[derive(Debug, thiserror::Error)]
pub enum AdbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("adb rejected command {command:?}: {output}")]
    CommandFailed { command: String, output: String },

    #[error("shell command {command:?} exited with status {status}: {output}")]
    ShellStatus {
        command: String,
        status: i32,
        output: String,
    },

    #[error("shell command {command:?} produced no exit-status marker: {output:?}")]
    MissingStatusMarker { command: String, output: String },

    #[error("malformed device output: {0}")]
    MalformedOutput(String),
}
