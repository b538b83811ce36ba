//! The `receive-file` push protocol.

use std::net::SocketAddr;
use std::path::Path;

use exodeploy_adb::{AdbError, AdbShell, EXIT_STATUS_SUFFIX, check_status_output};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::AgentChannelError;
use crate::{READY_MARKER, TEXT_SECRET_KEY_SIZE};

/// Write buffer size for the data socket.
const SOCKET_BUFFER_SIZE: usize = 256 * 1024;

/// Pushes `source` to `device_path` using the agent's `receive-file` verb.
///
/// The agent must be reachable on `127.0.0.1:<port>` through an already
/// established forward. After the body is streamed, the target is chmodded
/// to 644: files created by the shell or root user are otherwise unreadable
/// by the application's UID.
///
/// When both the data socket and the shell command fail, the socket error is
/// reported as the primary cause with the shell failure attached.
pub async fn install_file(
    shell: &AdbShell,
    agent_command: &str,
    port: u16,
    device_path: &str,
    source: &Path,
    cancel: &CancellationToken,
) -> Result<(), AgentChannelError> {
    if !source.is_absolute() {
        return Err(AgentChannelError::SourceNotAbsolute(source.to_path_buf()));
    }
    if !device_path.starts_with('/') {
        return Err(AgentChannelError::TargetNotAbsolute(device_path.to_string()));
    }

    let size = tokio::fs::metadata(source).await?.len();
    let command = format!(
        "umask 022 && {agent_command} receive-file {port} {size} {device_path}{EXIT_STATUS_SUFFIX}"
    );
    debug!(command = %command, "pushing file through agent");

    let mut child = shell.spawn_shell(&command)?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("child stdout was not piped"))?;

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let (output, transfer_error) = stream_to_agent(stdout, addr, source, size, cancel).await;

    // A cancelled transfer must not wait for the shell command to finish.
    if matches!(transfer_error, Some(AgentChannelError::Cancelled)) {
        let _ = child.kill().await;
        return Err(AgentChannelError::Cancelled);
    }

    let shell_error = match child.wait().await {
        Ok(status) if !status.success() => Some(AdbError::CommandFailed {
            command: command.clone(),
            output: output.clone(),
        }),
        Ok(_) => check_status_output(&command, &output).err(),
        Err(e) => Some(AdbError::Io(e)),
    };

    match (transfer_error, shell_error) {
        (None, None) => {}
        (Some(primary), Some(shell)) => {
            return Err(AgentChannelError::TransferAndShell {
                primary: Box::new(primary),
                shell: Box::new(shell),
            });
        }
        (Some(primary), None) => return Err(primary),
        (None, Some(shell)) => return Err(shell.into()),
    }

    shell
        .shell_checked(&format!("chmod 644 {device_path}"))
        .await?;
    Ok(())
}

/// Drives one transfer and returns the collected shell output together with
/// the transfer error, if any, so the caller can still inspect the command's
/// exit status after a socket failure.
async fn stream_to_agent<R>(
    mut stdout: R,
    addr: SocketAddr,
    source: &Path,
    size: u64,
    cancel: &CancellationToken,
) -> (String, Option<AgentChannelError>)
where
    R: AsyncRead + Unpin,
{
    let mut collected: Vec<u8> = Vec::new();
    let error = run_transfer(&mut stdout, &mut collected, addr, source, size, cancel)
        .await
        .err();
    // Keep draining so the exit-status marker is captured even after a
    // failure mid-transfer. Not on cancellation, where the command may
    // never finish on its own.
    if !matches!(error, Some(AgentChannelError::Cancelled)) {
        let mut rest = Vec::new();
        let _ = stdout.read_to_end(&mut rest).await;
        collected.extend_from_slice(&rest);
    }
    (String::from_utf8_lossy(&collected).into_owned(), error)
}

async fn run_transfer<R>(
    stdout: &mut R,
    collected: &mut Vec<u8>,
    addr: SocketAddr,
    source: &Path,
    size: u64,
    cancel: &CancellationToken,
) -> Result<(), AgentChannelError>
where
    R: AsyncRead + Unpin,
{
    // The agent prints the per-transfer secret key first.
    while collected.len() < TEXT_SECRET_KEY_SIZE {
        if read_some(stdout, collected, cancel).await? == 0 {
            return Err(AgentChannelError::MissingKey {
                output: String::from_utf8_lossy(collected).into_owned(),
            });
        }
    }
    let key = collected[..TEXT_SECRET_KEY_SIZE].to_vec();
    debug!(key = %String::from_utf8_lossy(&key), "got secret key");

    let stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AgentChannelError::Cancelled),
        result = TcpStream::connect(addr) => result?,
    };
    debug!(%addr, "connected to agent");

    // Wait until the agent acknowledges the connection before writing.
    while !String::from_utf8_lossy(collected).contains(READY_MARKER) {
        if read_some(stdout, collected, cancel).await? == 0 {
            return Err(AgentChannelError::NotReady {
                output: String::from_utf8_lossy(collected).into_owned(),
            });
        }
    }
    debug!("agent ready");

    let mut writer = BufWriter::with_capacity(SOCKET_BUFFER_SIZE, stream);
    writer.write_all(&key).await?;

    let mut file = tokio::fs::File::open(source).await?;
    let mut remaining = size;
    let mut buf = vec![0u8; 64 * 1024];
    while remaining > 0 {
        if cancel.is_cancelled() {
            return Err(AgentChannelError::Cancelled);
        }
        let to_read = (remaining as usize).min(buf.len());
        let n = file.read(&mut buf[..to_read]).await?;
        if n == 0 {
            return Err(std::io::Error::other("unexpected EOF reading source file").into());
        }
        writer.write_all(&buf[..n]).await?;
        remaining -= n as u64;
    }
    writer.flush().await?;
    let mut stream = writer.into_inner();
    stream.shutdown().await?;
    debug!(bytes = size, "file body sent");
    Ok(())
}

async fn read_some<R>(
    stdout: &mut R,
    collected: &mut Vec<u8>,
    cancel: &CancellationToken,
) -> Result<usize, AgentChannelError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    let n = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AgentChannelError::Cancelled),
        result = stdout.read(&mut buf) => result?,
    };
    collected.extend_from_slice(&buf[..n]);
    Ok(n)
}
