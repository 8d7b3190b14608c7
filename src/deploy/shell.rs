use super::DeployError;
use async_trait::async_trait;
use std::borrow::Cow;
use std::path::Path;
use tokio::process::Command;

// A command line to run on a testbed node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub line: String,
    pub cwd: Option<String>,
    pub sudo_user: Option<String>,
    pub quiet: bool,
}

impl RemoteCommand {
    pub fn new<S: Into<String>>(line: S) -> Self {
        Self {
            line: line.into(),
            cwd: None,
            sudo_user: None,
            quiet: false,
        }
    }

    pub fn cwd(mut self, dir: &str) -> Self {
        self.cwd = Some(dir.to_string());
        self
    }

    pub fn sudo(mut self, user: &str) -> Self {
        self.sudo_user = Some(user.to_string());
        self
    }

    // A quiet command may fail without aborting the task.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn render(&self) -> Result<String, DeployError> {
        let body = match &self.cwd {
            Some(dir) => format!("cd {} && {}", quote(dir)?, self.line),
            None => self.line.clone(),
        };
        Ok(match &self.sudo_user {
            Some(user) => format!("sudo -H -u {} bash -l -c {}", quote(user)?, quote(&body)?),
            None => body,
        })
    }
}

// Quotes one word for the remote POSIX shell.
pub fn quote(word: &str) -> Result<Cow<'_, str>, DeployError> {
    Ok(shlex::try_quote(word)?)
}

#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn run(&self, host: &str, command: &RemoteCommand) -> Result<String, DeployError>;
    // Copies `local` into the remote directory, applying `mode` to a copied file.
    async fn put(&self, host: &str, local: &Path, remote_dir: &str, mode: Option<u32>) -> Result<(), DeployError>;
    async fn get(&self, host: &str, remote: &str, local_dir: &Path) -> Result<(), DeployError>;
    async fn read(&self, host: &str, remote: &str) -> Result<String, DeployError>;
}

#[derive(Debug, Clone)]
pub struct SshShell {
    pub ssh: String,
    pub scp: String,
}

impl Default for SshShell {
    fn default() -> Self {
        Self {
            ssh: "ssh".to_string(),
            scp: "scp".to_string(),
        }
    }
}

impl SshShell {
    async fn output(&self, host: &str, mut command: Command, display: String) -> Result<String, DeployError> {
        let output = command.output().await.map_err(|source| DeployError::Spawn {
            host: host.to_string(),
            source,
        })?;
        if !output.status.success() {
            return Err(DeployError::CommandFailed {
                host: host.to_string(),
                command: display,
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn run(&self, host: &str, command: &RemoteCommand) -> Result<String, DeployError> {
        let rendered = command.render()?;
        tracing::debug!(host, command = %rendered, "run");
        let mut ssh = Command::new(&self.ssh);
        ssh.args(&["-o", "BatchMode=yes", host, rendered.as_str()]);
        self.output(host, ssh, rendered.clone()).await
    }

    async fn put(&self, host: &str, local: &Path, remote_dir: &str, mode: Option<u32>) -> Result<(), DeployError> {
        let target = format!("{}:{}", host, remote_dir);
        tracing::debug!(host, local = %local.display(), remote_dir, "put");
        let mut scp = Command::new(&self.scp);
        scp.arg("-r").arg(local).arg(&target);
        self.output(host, scp, format!("put {} {}", local.display(), target))
            .await?;
        // Modes only apply to single files; directory trees keep theirs
        if let (Some(mode), Some(name)) = (mode, local.file_name()) {
            if local.is_file() {
                let remote = format!("{}/{}", remote_dir.trim_end_matches('/'), name.to_string_lossy());
                let chmod = RemoteCommand::new(format!("chmod {:o} {}", mode, quote(&remote)?));
                self.run(host, &chmod).await?;
            }
        }
        Ok(())
    }

    async fn get(&self, host: &str, remote: &str, local_dir: &Path) -> Result<(), DeployError> {
        let source = format!("{}:{}", host, remote);
        tracing::debug!(host, remote, local = %local_dir.display(), "get");
        let mut scp = Command::new(&self.scp);
        scp.arg(&source).arg(local_dir);
        self.output(host, scp, format!("get {}", source)).await?;
        Ok(())
    }

    async fn read(&self, host: &str, remote: &str) -> Result<String, DeployError> {
        self.run(host, &RemoteCommand::new(format!("cat {}", quote(remote)?)))
            .await
    }
}
