//! Error types for the agent channel.

use std::path::PathBuf;

use exodeploy_adb::AdbError;

/// Errors produced while pushing a file through the agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Adb(#[from] AdbError),

    #[error("agent produced no secret key (output: {output:?})")]
    MissingKey { output: String },

    #[error("agent closed its output before signalling readiness (output: {output:?})")]
    NotReady { output: String },

    #[error("source path is not absolute: {0}")]
    SourceNotAbsolute(PathBuf),

    #[error("device path is not absolute: {0}")]
    TargetNotAbsolute(String),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("{primary}; shell command failed as well: {shell}")]
    TransferAndShell {
        primary: Box<AgentChannelError>,
        shell: Box<AdbError>,
    },
}
