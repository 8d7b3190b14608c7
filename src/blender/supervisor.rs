use super::{fifo, BlenderError, CommandSpec, PipelinePlan};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tokio::time::Duration;

#[derive(Debug)]
pub struct Supervisor {
    pub plan: PipelinePlan,
    pub restart_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub ingester: ExitStatus,
    pub blender: ExitStatus,
}

impl Supervisor {
    pub fn new(plan: PipelinePlan, restart_delay: Duration) -> Self {
        Self {
            plan,
            restart_delay,
        }
    }

    pub fn prepare(&self) -> Result<(), BlenderError> {
        fifo::make_fifo(&self.plan.fifo)
    }

    // Runs the pair again each time both have stopped. A cycle that fails to
    // start is logged and retried after the same delay; only a FIFO that cannot
    // be made is fatal. Never returns Ok unless a cycle limit is given.
    pub async fn run_cycles(&self, limit: Option<usize>) -> Result<usize, BlenderError> {
        self.prepare()?;
        let mut cycles = 0;
        loop {
            cycles += 1;
            match self.cycle().await {
                Ok(report) => tracing::info!(
                    cycle = cycles,
                    ingester = %report.ingester,
                    blender = %report.blender,
                    "The NOAAport ingester and the blender have stopped. Re-running them..."
                ),
                Err(e) => tracing::error!(
                    cycle = cycles,
                    error = %e,
                    "Couldn't run the NOAAport ingester and the blender. Retrying..."
                ),
            }
            if limit.map_or(false, |n| cycles >= n) {
                return Ok(cycles);
            }
            tokio::time::sleep(self.restart_delay).await;
        }
    }

    pub async fn run(&self) -> Result<(), BlenderError> {
        self.run_cycles(None).await.map(|_| ())
    }

    async fn cycle(&self) -> Result<CycleReport, BlenderError> {
        tracing::info!(command = %self.plan.ingester, fifo = %self.plan.fifo.display(), "re-Starting NOAAport Ingester...");
        tracing::info!(command = %self.plan.blender, fifo = %self.plan.fifo.display(), "re-Starting blender...");

        let (reader, writer) = fifo::open_pair(&self.plan.fifo)?;
        // Reader first
        let mut ingester = spawn(&self.plan.ingester, Stdio::from(reader), Stdio::inherit())?;
        let mut blender = match spawn(&self.plan.blender, Stdio::null(), Stdio::from(writer)) {
            Ok(child) => child,
            Err(e) => {
                // Without a writer the ingester only sees EOF
                let _ = ingester.wait().await;
                return Err(e);
            }
        };

        let (ingester, blender) = tokio::join!(ingester.wait(), blender.wait());
        Ok(CycleReport {
            ingester: ingester?,
            blender: blender?,
        })
    }
}

// The Command owns the parent's copies of the FIFO ends and drops them on return,
// so the children see EOF once their peer exits.
fn spawn(spec: &CommandSpec, stdin: Stdio, stdout: Stdio) -> Result<Child, BlenderError> {
    Command::new(&spec.program)
        .args(&spec.args)
        .stdin(stdin)
        .stdout(stdout)
        .spawn()
        .map_err(|source| BlenderError::Spawn {
            program: spec.program.clone(),
            source,
        })
}
