use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_ssh2_tokio::client::{AuthMethod, Client, ServerCheckMethod};
use async_trait::async_trait;
use url::Url;

use crate::error::{ErrorKind, Result};
use crate::repository::HARMONY_DIR;

use super::{Connector, ConnectorFactory};

/// `ssh://[user[:password]@]host[:port]/path` transport. Files are read
/// remotely with `cat` over an executed command rather than a dedicated
/// SFTP subsystem, mirroring the reference implementation's use of a plain
/// shell-level file transfer rather than a bespoke wire protocol.
pub struct SshConnector {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    remote_root: String,
}

impl SshConnector {
    fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri)
            .map_err(|e| ErrorKind::RemoteUnreachable(format!("invalid ssh uri {uri}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| ErrorKind::RemoteUnreachable(format!("ssh uri missing host: {uri}")))?
            .to_string();
        Ok(Self {
            host,
            port: url.port().unwrap_or(22),
            user: if url.username().is_empty() {
                "root".to_string()
            } else {
                url.username().to_string()
            },
            password: url.password().map(str::to_string),
            remote_root: url.path().to_string(),
        })
    }

    async fn connect_client(&self) -> Result<Client> {
        let auth = match &self.password {
            Some(p) => AuthMethod::with_password(p),
            None => AuthMethod::with_key_file(default_key_path(), None),
        };
        Client::connect((self.host.as_str(), self.port), &self.user, auth, ServerCheckMethod::NoCheck)
            .await
            .map_err(|e| ErrorKind::RemoteUnreachable(format!("{}@{}: {e}", self.user, self.host)))
    }

    fn remote_path(&self, relative: &str) -> String {
        format!("{}/{}", self.remote_root.trim_end_matches('/'), relative)
    }

    async fn cat(&self, client: &Client, remote_path: &str) -> Result<Vec<u8>> {
        let result = client
            .execute(&format!("cat {}", shell_quote(remote_path)))
            .await
            .map_err(|e| ErrorKind::RemoteUnreachable(e.to_string()))?;
        if result.exit_status != 0 {
            return Err(ErrorKind::RemoteUnreachable(format!(
                "remote cat {remote_path} exited {}",
                result.exit_status
            )));
        }
        Ok(result.stdout.into_bytes())
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn fetch_metadata_files(
        &self,
        relative_paths: &[String],
    ) -> Result<HashMap<String, PathBuf>> {
        let client = self.connect_client().await?;
        let tmp_dir = std::env::temp_dir().join(format!("harmony-ssh-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&tmp_dir)?;
        let mut out = HashMap::new();
        for rel in relative_paths {
            let remote = self.remote_path(&format!("{HARMONY_DIR}/{rel}"));
            let bytes = self.cat(&client, &remote).await?;
            let local_path = tmp_dir.join(rel.replace('/', "_"));
            std::fs::write(&local_path, bytes)?;
            out.insert(rel.clone(), local_path);
        }
        Ok(out)
    }

    async fn fetch_payload_files(&self, relative_paths: &[String], destination_dir: &Path) -> Result<()> {
        let client = self.connect_client().await?;
        for rel in relative_paths {
            let remote = self.remote_path(rel);
            let bytes = self.cat(&client, &remote).await?;
            let target = destination_dir.join(rel);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, bytes)?;
        }
        Ok(())
    }
}

fn default_key_path() -> String {
    dirs_home()
        .map(|h| h.join(".ssh/id_rsa").to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

pub(super) struct SshFactory;

impl ConnectorFactory for SshFactory {
    fn priority(&self) -> i32 {
        200
    }

    fn is_valid(&self, uri: &str) -> bool {
        uri.starts_with("ssh://")
    }

    fn open(&self, uri: &str) -> Result<Box<dyn Connector>> {
        Ok(Box::new(SshConnector::parse(uri)?))
    }
}
