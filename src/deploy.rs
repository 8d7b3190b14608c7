//! Installs and drives LDM6 / LDM7 on testbed nodes over ssh.

use serde::Deserialize;
use std::io::BufRead;
use thiserror::Error;

pub mod ldmd_conf;
pub mod shell;
pub mod tasks;

pub use ldmd_conf::{LdmdConf, LdmdEntry};
pub use shell::{quote, RemoteCommand, RemoteShell, SshShell};
pub use tasks::{run_on_hosts, Deployer, Task};

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{host}: `{command}` exited with {status}: {stderr}")]
    CommandFailed {
        host: String,
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("{host}: could not start ssh/scp")]
    Spawn {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot quote a remote command word: {0}")]
    Quote(#[from] shlex::QuoteError),
    #[error("Unknown task {0}")]
    UnknownTask(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Ldm6,
    Ldm7,
}

impl std::str::FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ldm6" | "6" => Ok(Variant::Ldm6),
            "ldm7" | "7" => Ok(Variant::Ldm7),
            _ => Err(format!("{} is not ldm6 or ldm7", s)),
        }
    }
}

// One host per line; blanks and `#` comments are skipped. Nodes are driven as root.
pub fn read_hosts<R: BufRead>(reader: R) -> Result<Vec<String>, DeployError> {
    let mut hosts = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let host = line.trim();
        if host.is_empty() || host.starts_with('#') {
            continue;
        }
        hosts.push(format!("root@{}", host));
    }
    Ok(hosts)
}
