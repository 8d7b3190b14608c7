//! Supervisor for a NOAAPort `blender` / `noaaportIngester` pair.
//!
//! The blender merges frames from one or more fanout servers and writes them
//! into a FIFO; the ingester reads the FIFO. When both have exited the pair is
//! started again.

use crate::configuration::BlenderSettings;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod feeds;
pub mod fifo;
pub mod supervisor;

pub use feeds::NoaaportFeed;
pub use supervisor::Supervisor;

#[derive(Debug, Error)]
pub enum BlenderError {
    #[error("The LDMHOME environment variable is NOT set. Bailing out.")]
    LdmHomeUnset,
    #[error("<port> is missing from fanout address {0:?}; give one or use -p <port>")]
    MissingPort(String),
    #[error("At least one --fanout address is required")]
    NoFanout,
    #[error("Unknown NOAAPort feed {0}")]
    UnknownFeed(String),
    #[error("Could not create FIFO with this path name: {path}")]
    Fifo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not start {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BlenderError {
    // Errors in what the user asked for, as opposed to runtime failures.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            BlenderError::LdmHomeUnset
                | BlenderError::MissingPort(_)
                | BlenderError::NoFanout
                | BlenderError::UnknownFeed(_)
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlenderOptions {
    pub blender_log: Option<String>,
    pub ingester_log: Option<String>,
    pub fifo: Option<PathBuf>,
    pub port: Option<String>,
    pub rcv_buf: Option<String>,
    pub delay: Option<String>,
    pub verbose: bool,
    pub debug: bool,
    pub feed: Option<String>,
    pub fanout: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_word(f, &self.program)?;
        for arg in &self.args {
            f.write_str(" ")?;
            write_word(f, arg)?;
        }
        Ok(())
    }
}

fn write_word(f: &mut fmt::Formatter<'_>, word: &str) -> fmt::Result {
    match shlex::try_quote(word) {
        Ok(quoted) => f.write_str(&quoted),
        // NUL has no shell spelling
        Err(_) => write!(f, "{:?}", word),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    pub port: String,
    pub fifo: PathBuf,
    pub blender: CommandSpec,
    pub ingester: CommandSpec,
}

impl fmt::Display for PipelinePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} < {} ; {} > {}",
            self.ingester,
            self.fifo.display(),
            self.blender,
            self.fifo.display()
        )
    }
}

// LDMHOME must name an existing directory.
pub fn ldm_home(value: Option<OsString>) -> Result<PathBuf, BlenderError> {
    match value.map(PathBuf::from) {
        Some(path) if path.is_dir() => Ok(path),
        _ => Err(BlenderError::LdmHomeUnset),
    }
}

impl PipelinePlan {
    pub fn build(
        opts: &BlenderOptions,
        settings: &BlenderSettings,
        ldm_home: &Path,
    ) -> Result<Self, BlenderError> {
        let first = opts.fanout.first().ok_or(BlenderError::NoFanout)?;
        let feed = match &opts.feed {
            Some(name) => Some(
                NoaaportFeed::lookup(name).ok_or_else(|| BlenderError::UnknownFeed(name.clone()))?,
            ),
            None => None,
        };

        // -p wins, then the feed table, then the first fanout address
        let port = match (&opts.port, feed) {
            (Some(port), _) => port.clone(),
            (None, Some(feed)) => feed.port.to_string(),
            (None, None) => match first.split(':').collect::<Vec<_>>().as_slice() {
                [_, port] if !port.is_empty() => port.to_string(),
                _ => return Err(BlenderError::MissingPort(first.clone())),
            },
        };

        let fifo = opts
            .fifo
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}{}.fifo", settings.fifo_prefix, port)));

        let ingester_log = opts.ingester_log.clone().or_else(|| {
            feed.map(|f| f.log_path(ldm_home).display().to_string())
        });

        Ok(Self {
            port,
            fifo,
            blender: Self::blender_command(opts, settings),
            ingester: Self::ingester_command(opts, settings, ingester_log),
        })
    }

    fn blender_command(opts: &BlenderOptions, settings: &BlenderSettings) -> CommandSpec {
        let delay = opts
            .delay
            .clone()
            .unwrap_or_else(|| settings.default_delay.clone());
        let mut args = vec!["-t".to_string(), delay];
        // debug has precedence over verbose
        if opts.verbose && !opts.debug {
            args.push("-v".to_string());
        }
        if opts.debug {
            args.push("-x".to_string());
        }
        if let Some(rcv_buf) = &opts.rcv_buf {
            args.push("-R".to_string());
            args.push(rcv_buf.clone());
        }
        if let Some(log) = &opts.blender_log {
            args.push("-l".to_string());
            args.push(log.clone());
        }
        args.extend(opts.fanout.iter().cloned());
        CommandSpec {
            program: settings.blender_program.clone(),
            args,
        }
    }

    fn ingester_command(
        opts: &BlenderOptions,
        settings: &BlenderSettings,
        log: Option<String>,
    ) -> CommandSpec {
        let mut args = Vec::new();
        // The ingester spells its levels differently: -n notice, -v info
        if opts.verbose && !opts.debug {
            args.push("-n".to_string());
        }
        if opts.debug {
            args.push("-v".to_string());
        }
        if let Some(log) = log {
            args.push("-l".to_string());
            args.push(log);
        }
        CommandSpec {
            program: settings.ingester_program.clone(),
            args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(fanout: &[&str]) -> BlenderOptions {
        BlenderOptions {
            fanout: fanout.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn args(spec: &CommandSpec) -> Vec<&str> {
        spec.args.iter().map(String::as_str).collect()
    }

    #[test]
    fn port_comes_from_first_fanout_address() {
        let plan = PipelinePlan::build(
            &opts(&["chico.unidata.ucar.edu:1201", "leno:1201"]),
            &BlenderSettings::default(),
            Path::new("/home/ldm"),
        )
        .unwrap();
        assert_eq!(plan.port, "1201");
        assert_eq!(plan.fifo, PathBuf::from("/tmp/blender_1201.fifo"));
        assert_eq!(
            args(&plan.blender),
            vec!["-t", "5.0", "chico.unidata.ucar.edu:1201", "leno:1201"]
        );
        assert!(plan.ingester.args.is_empty());
    }

    #[test]
    fn fanout_without_port_needs_dash_p() {
        let err = PipelinePlan::build(
            &opts(&["chico.unidata.ucar.edu"]),
            &BlenderSettings::default(),
            Path::new("/home/ldm"),
        )
        .unwrap_err();
        assert!(err.is_usage());
        assert!(matches!(err, BlenderError::MissingPort(_)));

        let mut o = opts(&["chico.unidata.ucar.edu"]);
        o.port = Some("1205".to_string());
        let plan = PipelinePlan::build(&o, &BlenderSettings::default(), Path::new("/home/ldm")).unwrap();
        assert_eq!(plan.port, "1205");
    }

    #[test]
    fn debug_takes_precedence_over_verbose() {
        let mut o = opts(&["chico:1202"]);
        o.verbose = true;
        o.debug = true;
        o.rcv_buf = Some("4194304".to_string());
        o.blender_log = Some("/tmp/blender.log".to_string());
        o.ingester_log = Some("/tmp/goes.log".to_string());
        o.delay = Some("0.01".to_string());
        let plan = PipelinePlan::build(&o, &BlenderSettings::default(), Path::new("/home/ldm")).unwrap();
        assert_eq!(
            args(&plan.blender),
            vec!["-t", "0.01", "-x", "-R", "4194304", "-l", "/tmp/blender.log", "chico:1202"]
        );
        assert_eq!(args(&plan.ingester), vec!["-v", "-l", "/tmp/goes.log"]);
    }

    #[test]
    fn verbose_alone_maps_to_each_programs_flag() {
        let mut o = opts(&["chico:1202"]);
        o.verbose = true;
        let plan = PipelinePlan::build(&o, &BlenderSettings::default(), Path::new("/home/ldm")).unwrap();
        assert_eq!(args(&plan.blender), vec!["-t", "5.0", "-v", "chico:1202"]);
        assert_eq!(args(&plan.ingester), vec!["-n"]);
    }

    #[test]
    fn feed_supplies_port_and_ingester_log() {
        let mut o = opts(&["chico"]);
        o.feed = Some("goes".to_string());
        let plan = PipelinePlan::build(&o, &BlenderSettings::default(), Path::new("/home/ldm")).unwrap();
        assert_eq!(plan.port, "1202");
        assert_eq!(args(&plan.ingester), vec!["-l", "/home/ldm/var/logs/goes.log"]);

        o.feed = Some("nbm".to_string());
        let err = PipelinePlan::build(&o, &BlenderSettings::default(), Path::new("/home/ldm")).unwrap_err();
        assert!(matches!(err, BlenderError::UnknownFeed(name) if name == "nbm"));
    }

    #[test]
    fn explicit_fifo_is_kept() {
        let mut o = opts(&["chico:1201"]);
        o.fifo = Some(PathBuf::from("/tmp/myFIFO"));
        let plan = PipelinePlan::build(&o, &BlenderSettings::default(), Path::new("/home/ldm")).unwrap();
        assert_eq!(plan.fifo, PathBuf::from("/tmp/myFIFO"));
        assert_eq!(
            plan.to_string(),
            "noaaportIngester < /tmp/myFIFO ; blender -t 5.0 chico:1201 > /tmp/myFIFO"
        );
    }

    #[test]
    fn command_display_quotes_each_word() {
        let spec = CommandSpec {
            program: "blender".to_string(),
            args: vec![
                "-l".to_string(),
                "/tmp/my logs/blender.log".to_string(),
                "chico:1201".to_string(),
            ],
        };
        let shown = spec.to_string();
        assert_eq!(
            shlex::split(&shown).unwrap(),
            vec!["blender", "-l", "/tmp/my logs/blender.log", "chico:1201"]
        );
        assert!(shown.ends_with(" chico:1201"));
    }

    #[test]
    fn ldm_home_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(ldm_home(Some(dir.path().into())).unwrap(), dir.path());
        assert!(matches!(ldm_home(None), Err(BlenderError::LdmHomeUnset)));
        assert!(matches!(
            ldm_home(Some("/nonexistent/ldm".into())),
            Err(BlenderError::LdmHomeUnset)
        ));
    }
}
