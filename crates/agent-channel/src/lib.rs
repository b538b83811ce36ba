//! Authenticated file transfer to the on-device agent.
//!
//! A push runs on one shell session plus one TCP connection through a port
//! forward. The agent prints a per-transfer secret key on its stdout; the
//! host echoes the key back over the TCP side so no other process on the
//! device can feed the agent content. The literal [`READY_MARKER`] tells the
//! host the agent is ready to read (writing earlier would race the agent's
//! accept loop).

pub mod error;
pub mod transfer;

pub use error::AgentChannelError;
pub use transfer::install_file;

/// Length in bytes of the textual secret key the agent prints on stdout.
/// Fixed at agent build time.
pub const TEXT_SECRET_KEY_SIZE: usize = 32;

/// Marker the agent writes once it is ready to read from the data socket.
pub const READY_MARKER: &str = "z1";
