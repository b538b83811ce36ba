//! Structured events emitted around installs.

/// Events published on the installer's channel.
///
/// Fine-grained timings (package-info query, signature check, per-class and
/// per-file installs, app kill) are emitted as `tracing` events with an
/// `elapsed_ms` field rather than on this channel.
#[derive(Debug, Clone)]
pub enum InstallEvent {
    /// An install run started.
    Started { target: String },
    /// One device finished, successfully or not.
    DeviceFinished {
        serial: String,
        success: bool,
        error: Option<String>,
    },
    /// The whole run finished; `success` means every device succeeded.
    Finished {
        target: String,
        success: bool,
        package_name: String,
    },
}
