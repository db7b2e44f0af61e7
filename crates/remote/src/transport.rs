//! Authenticated remote shell transport over SSH.
//!
//! Built on `russh`/`russh-keys` rather than the libssh2-backed `ssh2`
//! crate so the whole call chain stays on tokio instead of forcing a
//! blocking call onto the async runtime.

use crate::types::{CommandOutput, ConnectSpec, Credential};
use async_trait::async_trait;
use common::GatewayError;
use russh::client::{self, Handle};
use russh::ChannelMsg;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// The capability surface the install orchestrator and platform probe
/// need from a remote host. A trait so tests can substitute a fake
/// without dialing real SSH.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn run(&self, cmd: &str) -> Result<CommandOutput, GatewayError>;
    async fn run_timeout(&self, cmd: &str, secs: u64) -> Result<CommandOutput, GatewayError>;
    async fn write_file(&self, path: &str, data: &[u8], mode: u32) -> Result<(), GatewayError>;
    async fn remove_file(&self, path: &str) -> Result<(), GatewayError>;
    async fn mkdir_all(&self, path: &str, mode: u32) -> Result<(), GatewayError>;
    async fn exists(&self, path: &str) -> Result<bool, GatewayError>;
}

struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    /// Host-key verification is intentionally permissive: every key is
    /// accepted. A pinned-key policy is an open design question left for
    /// a later revision (see the system's design notes on open questions).
    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// One authenticated SSH session to a remote host.
pub struct SshTransport {
    handle: Handle<ClientHandler>,
}

impl SshTransport {
    pub async fn connect(spec: &ConnectSpec) -> Result<Self, GatewayError> {
        let config = Arc::new(client::Config::default());
        let addr = (spec.host.as_str(), spec.port);

        let mut session = timeout(
            Duration::from_secs(spec.dial_timeout_secs),
            client::connect(config, addr, ClientHandler),
        )
        .await
        .map_err(|_| GatewayError::SshDial {
            host: spec.host.clone(),
            source: "dial timed out".to_string(),
        })?
        .map_err(|e| GatewayError::SshDial {
            host: spec.host.clone(),
            source: e.to_string(),
        })?;

        let authenticated = match &spec.credential {
            Credential::Key {
                key_bytes,
                passphrase,
            } => {
                let key_str = String::from_utf8_lossy(key_bytes);
                let key_pair = russh_keys::decode_secret_key(&key_str, passphrase.as_deref())
                    .map_err(|_| GatewayError::SshAuth { host: spec.host.clone() })?;
                session
                    .authenticate_publickey(&spec.user, Arc::new(key_pair))
                    .await
                    .map_err(|_| GatewayError::SshAuth { host: spec.host.clone() })?
            }
            Credential::Password(password) => session
                .authenticate_password(&spec.user, password)
                .await
                .map_err(|_| GatewayError::SshAuth { host: spec.host.clone() })?,
        };

        if !authenticated {
            return Err(GatewayError::SshAuth {
                host: spec.host.clone(),
            });
        }

        Ok(Self { handle: session })
    }

    async fn exec(&self, cmd: &str, stdin: Option<&[u8]>) -> Result<CommandOutput, GatewayError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| GatewayError::RemoteExec(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| GatewayError::RemoteExec(e.to_string()))?;

        if let Some(data) = stdin {
            channel
                .data(data)
                .await
                .map_err(|e| GatewayError::RemoteExec(e.to_string()))?;
            channel
                .eof()
                .await
                .map_err(|e| GatewayError::RemoteExec(e.to_string()))?;
        }

        let mut out = CommandOutput::default();
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    out.stdout.push_str(&String::from_utf8_lossy(&data));
                }
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    out.stderr.push_str(&String::from_utf8_lossy(&data));
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    out.exit_code = exit_status as i32;
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) => break,
                Some(_) => continue,
                None => break,
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl RemoteTransport for SshTransport {
    async fn run(&self, cmd: &str) -> Result<CommandOutput, GatewayError> {
        self.run_timeout(cmd, 30).await
    }

    async fn run_timeout(&self, cmd: &str, secs: u64) -> Result<CommandOutput, GatewayError> {
        debug!(cmd, "executing remote command");
        timeout(Duration::from_secs(secs), self.exec(cmd, None))
            .await
            .map_err(|_| GatewayError::RemoteExec(format!("command timed out after {secs}s: {cmd}")))?
    }

    async fn write_file(&self, path: &str, data: &[u8], mode: u32) -> Result<(), GatewayError> {
        let cmd = format!("cat > {path} && chmod {mode:o} {path}");
        let out = self.exec(&cmd, Some(data)).await?;
        if !out.success() {
            return Err(GatewayError::RemoteExec(format!(
                "failed to write {path}: {}",
                out.stderr.trim()
            )));
        }

        let expected = data.len() as u64;
        let stat = self.run(&format!("stat -c %s {path}")).await?;
        let actual: u64 = stat.stdout.trim().parse().unwrap_or(0);
        if actual != expected {
            warn!(path, expected, actual, "uploaded file size mismatch");
            return Err(GatewayError::UploadSizeMismatch { expected, actual });
        }
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), GatewayError> {
        // Best-effort: a missing file is not an error.
        let _ = self.run(&format!("rm -f {path}")).await?;
        Ok(())
    }

    async fn mkdir_all(&self, path: &str, mode: u32) -> Result<(), GatewayError> {
        let out = self
            .run(&format!("mkdir -p {path} && chmod {mode:o} {path}"))
            .await?;
        if out.success() {
            Ok(())
        } else {
            Err(GatewayError::RemoteExec(format!(
                "failed to create {path}: {}",
                out.stderr.trim()
            )))
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, GatewayError> {
        let out = self.run(&format!("test -e {path}")).await?;
        Ok(out.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_output_success_reflects_exit_code() {
        let ok = CommandOutput {
            exit_code: 0,
            ..Default::default()
        };
        let fail = CommandOutput {
            exit_code: 1,
            ..Default::default()
        };
        assert!(ok.success());
        assert!(!fail.success());
    }
}
