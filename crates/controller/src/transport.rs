//! Build an authenticated [`remote::SshTransport`] from a stored
//! [`cluster::RouterRecord`]'s credentials.

use cluster::RouterRecord;
use common::GatewayError;
use remote::{ConnectSpec, Credential, SshTransport};

pub async fn connect(record: &RouterRecord) -> Result<SshTransport, GatewayError> {
    let credential = if let Some(key) = &record.ssh_key {
        Credential::Key {
            key_bytes: key.as_bytes().to_vec(),
            passphrase: None,
        }
    } else if let Some(password) = &record.ssh_password {
        Credential::Password(password.clone())
    } else {
        return Err(GatewayError::SshAuth {
            host: record.host.clone(),
        });
    };

    let spec = ConnectSpec {
        host: record.host.clone(),
        user: record.ssh_user.clone().unwrap_or_else(|| "root".to_string()),
        credential,
        ..ConnectSpec::default()
    };

    SshTransport::connect(&spec).await
}
