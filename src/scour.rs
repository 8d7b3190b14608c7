//! Fixture harness for the external scour program.
//!
//! Builds a small tree of files, directories and symlinks whose modification
//! times straddle the age thresholds of a scour configuration, runs scour on
//! it and checks which paths survived.

use crate::configuration::ScourSettings;
use crate::utilities::expand_home;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, FileTimes};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::process::Command;

pub const DEFAULT_PROGRAM: &str = "scour";
pub const CONFIG_NAME: &str = "scourTest.conf";

// Stale files are pushed this far past their threshold.
const STALE_MARGIN: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum ScourError {
    #[error("Invalid daysOld {0}, expected D, D-HH, D-HHMM or D-HHMMSS")]
    InvalidDaysOld(String),
    #[error("No fixture root given and HOME is not set")]
    RootUnset,
    #[error("Could not start {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },
    #[error("Fixture path {0} was missing before scour ran")]
    FixtureMissing(PathBuf),
    #[error("{} path(s) did not match expectations: {}", .0.len(), describe(.0))]
    Mismatch(Vec<Mismatch>),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn describe(mismatches: &[Mismatch]) -> String {
    mismatches
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Age threshold of a scour entry: whole days, optionally followed by
/// `-HH`, `-HHMM` or `-HHMMSS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaysOld {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl DaysOld {
    pub fn days(days: u64) -> Self {
        Self {
            days,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(
            self.days * 86_400 + self.hours * 3_600 + self.minutes * 60 + self.seconds,
        )
    }
}

impl std::str::FromStr for DaysOld {
    type Err = ScourError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScourError::InvalidDaysOld(s.to_string());
        let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());

        let (days, clock) = match s.split_once('-') {
            Some((days, clock)) => (days, Some(clock)),
            None => (s, None),
        };
        if !all_digits(days) {
            return Err(invalid());
        }
        let mut parsed = DaysOld::days(days.parse().map_err(|_| invalid())?);
        let clock = match clock {
            Some(clock) => clock,
            None => return Ok(parsed),
        };
        if !all_digits(clock) || !matches!(clock.len(), 2 | 4 | 6) {
            return Err(invalid());
        }
        // Two-digit groups: hours, then minutes, then seconds
        let field = |i: usize| clock.get(i..i + 2).map_or(Ok(0), |f| f.parse::<u64>());
        parsed.hours = field(0).map_err(|_| invalid())?;
        parsed.minutes = field(2).map_err(|_| invalid())?;
        parsed.seconds = field(4).map_err(|_| invalid())?;
        if parsed.hours > 23 || parsed.minutes > 59 || parsed.seconds > 59 {
            return Err(invalid());
        }
        Ok(parsed)
    }
}

impl fmt::Display for DaysOld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.days)?;
        match (self.hours, self.minutes, self.seconds) {
            (0, 0, 0) => Ok(()),
            (h, m, 0) => write!(f, "-{:02}{:02}", h, m),
            (h, m, s) => write!(f, "-{:02}{:02}{:02}", h, m, s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    Removed,
    Kept,
    Unchecked,
}

// One line of the scour configuration. `dir` is relative to the fixture root.
#[derive(Debug, Clone)]
pub struct ScourEntry {
    pub dir: String,
    pub days_old: DaysOld,
    pub pattern: String,
}

#[derive(Debug, Clone)]
pub struct FixtureFile {
    pub path: String,
    /// Index of the entry whose threshold sets this file's age.
    pub entry: usize,
    pub stale: bool,
    pub expect: Expectation,
}

#[derive(Debug, Clone)]
pub struct FixtureLink {
    pub link: String,
    pub target: String,
    pub expect: Expectation,
}

#[derive(Debug, Clone)]
pub struct Fixture {
    pub root: PathBuf,
    pub dirs: Vec<String>,
    pub entries: Vec<ScourEntry>,
    pub files: Vec<FixtureFile>,
    pub links: Vec<FixtureLink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub path: PathBuf,
    pub expected: Expectation,
    pub exists: bool,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.exists { "still exists" } else { "was removed" };
        write!(f, "{} {} (expected {:?})", self.path.display(), state, self.expected)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub verbose: bool,
    pub delete_dirs: bool,
}

#[derive(Debug, Default)]
pub struct ScourReport {
    pub removed: Vec<PathBuf>,
    pub kept: Vec<PathBuf>,
}

pub type Snapshot = BTreeMap<PathBuf, bool>;

fn file(path: &str, entry: usize, stale: bool, expect: Expectation) -> FixtureFile {
    FixtureFile {
        path: path.to_string(),
        entry,
        stale,
        expect,
    }
}

impl Fixture {
    /// A symlink to a file and a symlink to a directory next to ordinary
    /// files. A file symlink goes when its target is old enough; a followed
    /// directory symlink gets scoured with the linking entry's rules.
    pub fn symlink_scenario(root: &Path) -> Result<Self, ScourError> {
        use Expectation::*;
        Ok(Self {
            root: root.to_path_buf(),
            dirs: vec![
                "titi".to_string(),
                "toto".to_string(),
                "toto/tut_dir".to_string(),
            ],
            entries: vec![
                ScourEntry {
                    dir: "titi".to_string(),
                    days_old: "2".parse()?,
                    pattern: "*.txt".to_string(),
                },
                ScourEntry {
                    dir: "toto".to_string(),
                    days_old: "7-1130".parse()?,
                    pattern: "*.foo".to_string(),
                },
            ],
            files: vec![
                file("titi/.scour$*.foo", 0, false, Kept),
                file("titi/aFileToo.foo", 0, true, Kept),
                file("titi/aFile.txt", 0, true, Removed),
                file("toto/tata.txt", 1, false, Kept),
                file("toto/titi.foo", 1, false, Kept),
                file("toto/.scour$*.foo", 1, false, Kept),
                file("toto/stale.foo", 1, true, Removed),
                file("toto/tut_dir/old.txt", 0, true, Removed),
            ],
            links: vec![
                FixtureLink {
                    link: "titi/sl_toto_file".to_string(),
                    target: "toto/tata.txt".to_string(),
                    expect: Kept,
                },
                FixtureLink {
                    link: "titi/sl_toto_tut_dir".to_string(),
                    target: "toto/tut_dir".to_string(),
                    expect: Kept,
                },
            ],
        })
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_NAME)
    }

    // Tab separated, one entry per line, with absolute directories.
    pub fn config_contents(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "{}\t{}\t{}",
                    self.root.join(&e.dir).display(),
                    e.days_old,
                    e.pattern
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn cleanup(&self) -> Result<(), ScourError> {
        for dir in &self.dirs {
            let path = self.root.join(dir);
            if path.symlink_metadata().is_ok() {
                tracing::debug!(path = %path.display(), "removing fixture directory");
                std::fs::remove_dir_all(&path)?;
            }
        }
        let config = self.config_path();
        if config.exists() {
            std::fs::remove_file(config)?;
        }
        Ok(())
    }

    pub fn create(&self, now: SystemTime) -> Result<(), ScourError> {
        for dir in &self.dirs {
            std::fs::create_dir_all(self.root.join(dir))?;
        }
        for f in &self.files {
            let threshold = self.entries[f.entry].days_old.as_duration();
            let mtime = if f.stale {
                now.checked_sub(threshold + STALE_MARGIN).unwrap_or(UNIX_EPOCH)
            } else {
                now
            };
            let path = self.root.join(&f.path);
            let handle = File::create(&path)?;
            handle.set_times(FileTimes::new().set_accessed(now).set_modified(mtime))?;
            tracing::debug!(path = %path.display(), stale = f.stale, "created fixture file");
        }
        for l in &self.links {
            let link = self.root.join(&l.link);
            let target = self.root.join(&l.target);
            std::os::unix::fs::symlink(&target, &link)?;
            tracing::debug!(link = %link.display(), target = %target.display(), "created symlink");
        }
        std::fs::write(self.config_path(), self.config_contents())?;
        Ok(())
    }

    // Every path the fixture knows about, with its expectation.
    pub fn expectations(&self, opts: &RunOptions) -> Vec<(PathBuf, Expectation)> {
        let dir_expect = if opts.delete_dirs {
            Expectation::Unchecked
        } else {
            Expectation::Kept
        };
        let dirs = self.dirs.iter().map(|d| (self.root.join(d), dir_expect));
        let files = self.files.iter().map(|f| (self.root.join(&f.path), f.expect));
        let links = self.links.iter().map(|l| (self.root.join(&l.link), l.expect));
        dirs.chain(files).chain(links).collect()
    }

    pub fn snapshot(&self, opts: &RunOptions) -> Snapshot {
        self.expectations(opts)
            .into_iter()
            .map(|(path, _)| {
                let exists = path.symlink_metadata().is_ok();
                (path, exists)
            })
            .collect()
    }

    pub fn compare(&self, opts: &RunOptions, after: &Snapshot) -> Result<ScourReport, ScourError> {
        let mut report = ScourReport::default();
        let mut mismatches = Vec::new();
        for (path, expected) in self.expectations(opts) {
            let exists = after.get(&path).copied().unwrap_or(false);
            if exists {
                report.kept.push(path.clone());
            } else {
                report.removed.push(path.clone());
            }
            let ok = match expected {
                Expectation::Removed => !exists,
                Expectation::Kept => exists,
                Expectation::Unchecked => true,
            };
            if !ok {
                mismatches.push(Mismatch {
                    path,
                    expected,
                    exists,
                });
            }
        }
        if mismatches.is_empty() {
            Ok(report)
        } else {
            Err(ScourError::Mismatch(mismatches))
        }
    }
}

pub struct Harness {
    pub program: String,
    pub fixture: Fixture,
}

impl Harness {
    pub fn new(settings: &ScourSettings, root: Option<&str>) -> Result<Self, ScourError> {
        let root = match root.or_else(|| settings.root.as_deref()) {
            Some(root) => expand_home(root),
            None => std::env::var_os("HOME")
                .map(PathBuf::from)
                .ok_or(ScourError::RootUnset)?,
        };
        Ok(Self {
            program: settings
                .program
                .clone()
                .unwrap_or_else(|| DEFAULT_PROGRAM.to_string()),
            fixture: Fixture::symlink_scenario(&root)?,
        })
    }

    // Fixture directories are removed before and after, whatever the outcome.
    pub async fn run(&self, opts: RunOptions) -> Result<ScourReport, ScourError> {
        self.fixture.cleanup()?;
        let result = self.run_prepared(opts).await;
        if let Err(e) = self.fixture.cleanup() {
            tracing::warn!(error = %e, "could not clean up scour fixture");
        }
        result
    }

    async fn run_prepared(&self, opts: RunOptions) -> Result<ScourReport, ScourError> {
        self.fixture.create(SystemTime::now())?;
        let before = self.fixture.snapshot(&opts);
        if let Some((path, _)) = before.iter().find(|(_, exists)| !**exists) {
            return Err(ScourError::FixtureMissing(path.clone()));
        }
        tracing::info!(entries = %self.fixture.config_contents().replace('\n', " | "), "scour entries");

        let mut command = Command::new(&self.program);
        if opts.verbose {
            command.arg("-v");
        }
        if opts.delete_dirs {
            command.arg("-d");
        }
        command.arg(self.fixture.config_path());
        let status = command.status().await.map_err(|source| ScourError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        if !status.success() {
            return Err(ScourError::Failed {
                program: self.program.clone(),
                status,
            });
        }

        let after = self.fixture.snapshot(&opts);
        let report = self.fixture.compare(&opts, &after)?;
        tracing::info!(
            removed = report.removed.len(),
            kept = report.kept.len(),
            "scour behaved as expected"
        );
        Ok(report)
    }
}
