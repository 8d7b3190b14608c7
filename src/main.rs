use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ldm_toolbox::blender::{self, BlenderError, BlenderOptions, PipelinePlan, Supervisor};
use ldm_toolbox::configuration::{ScourSettings, Settings};
use ldm_toolbox::deploy::{self, Deployer, SshShell, Task, Variant};
use ldm_toolbox::oess::{self, Credentials, EditAction, Endpoint, RestClient};
use ldm_toolbox::scour::{Harness, RunOptions};
use ldm_toolbox::utilities::expand_home;
use ldm_toolbox::{latency, telemetry};
use std::path::PathBuf;
use tokio::time::Duration;

#[derive(Parser, Debug)]
#[clap(name = "ldm-toolbox", version, about = "Tools around the LDM data distribution system")]
struct Cli {
    /// Configuration file, extension optional
    #[clap(long, default_value = "configuration")]
    config: String,

    /// Log at debug level
    #[clap(short, long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query and provision OESS circuits
    Oess {
        #[clap(subcommand)]
        command: OessCommand,
    },
    /// Extract per-product latency from an LDM7 log into a CSV file
    Latency { log: PathBuf, csv: PathBuf },
    /// Run and restart a blender / noaaportIngester pair
    Blender(BlenderArgs),
    /// Run a deployment task on testbed nodes
    Deploy(DeployArgs),
    /// Build a fixture tree, run scour on it and check the result
    ScourCheck(ScourArgs),
}

#[derive(Subcommand, Debug)]
enum OessCommand {
    Workgroups,
    Details {
        circuit_id: String,
    },
    Create {
        #[clap(long)]
        workgroup: String,
        #[clap(long)]
        description: String,
        /// node,interface,tag
        #[clap(required = true, min_values = 2)]
        endpoints: Vec<Endpoint>,
    },
    Edit {
        #[clap(long)]
        workgroup: String,
        circuit_id: String,
        /// add or del
        action: EditAction,
        /// node,interface,tag
        endpoint: Endpoint,
    },
    Remove {
        #[clap(long)]
        workgroup: String,
        circuit_id: String,
    },
}

#[derive(clap::Args, Debug)]
struct BlenderArgs {
    /// Blender log file
    #[clap(short = 'b')]
    blender_log: Option<String>,
    /// noaaportIngester log file
    #[clap(short = 'l')]
    ingester_log: Option<String>,
    /// FIFO between the two processes
    #[clap(short = 'f')]
    fifo: Option<PathBuf>,
    #[clap(short = 'p')]
    port: Option<String>,
    /// Receive buffer size for the blender
    #[clap(short = 'R')]
    rcv_buf: Option<String>,
    /// Blender delay in seconds
    #[clap(short = 't')]
    delay: Option<String>,
    #[clap(short = 'v')]
    verbose: bool,
    #[clap(short = 'x')]
    debug: bool,
    /// NOAAPort feed name, e.g. nwstg
    #[clap(long)]
    feed: Option<String>,
    /// host:port of each fanout server
    #[clap(long, required = true, multiple_values = true)]
    fanout: Vec<String>,
}

impl From<BlenderArgs> for BlenderOptions {
    fn from(args: BlenderArgs) -> Self {
        BlenderOptions {
            blender_log: args.blender_log,
            ingester_log: args.ingester_log,
            fifo: args.fifo,
            port: args.port,
            rcv_buf: args.rcv_buf,
            delay: args.delay,
            verbose: args.verbose,
            debug: args.debug,
            feed: args.feed,
            fanout: args.fanout,
        }
    }
}

#[derive(clap::Args, Debug)]
struct DeployArgs {
    task: Task,
    #[clap(long)]
    variant: Option<Variant>,
    /// Run on every host at once
    #[clap(long)]
    parallel: bool,
    /// Host list, one per line; stdin when absent
    #[clap(long)]
    hosts: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct ScourArgs {
    /// Directory the fixture tree is built under, $HOME by default
    #[clap(long)]
    root: Option<String>,
    #[clap(long)]
    program: Option<String>,
    /// Let scour delete empty directories
    #[clap(short = 'd')]
    delete_dirs: bool,
    /// Pass -v to scour
    #[clap(short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:?}", e);
        std::process::exit(if is_usage(&e) { 2 } else { 1 });
    }
}

fn is_usage(e: &anyhow::Error) -> bool {
    e.downcast_ref::<BlenderError>()
        .map_or(false, BlenderError::is_usage)
}

async fn run(cli: Cli) -> Result<()> {
    // Load configuration
    let settings = Settings::from_configuration(&cli.config)
        .with_context(|| format!("Failed to read configuration {}", cli.config))?;

    // Load telemetry
    let level = if cli.verbose { "debug" } else { settings.log.level.as_str() };
    let log_file = match (&settings.log.file, &cli.command) {
        (Some(file), _) => Some(expand_home(file)),
        (None, Command::Blender(_)) => Some(expand_home(&settings.blender.script_log)),
        (None, _) => None,
    };
    telemetry::init(level, log_file.as_deref()).context("Failed to open the log file")?;

    match cli.command {
        Command::Oess { command } => run_oess(&settings, command).await,
        Command::Latency { log, csv } => {
            let summary = latency::run(&log, &csv)
                .with_context(|| format!("Failed to extract latencies from {}", log.display()))?;
            println!(
                "{} products, {} bytes, mean latency {:.3} s, max latency {:.3} s",
                summary.products, summary.total_bytes, summary.mean_latency, summary.max_latency
            );
            Ok(())
        }
        Command::Blender(args) => run_blender(&settings, args.into()).await,
        Command::Deploy(args) => run_deploy(&settings, args).await,
        Command::ScourCheck(args) => {
            let harness = Harness::new(
                &ScourSettings {
                    program: args.program.or_else(|| settings.scour.program.clone()),
                    root: settings.scour.root.clone(),
                },
                args.root.as_deref(),
            )?;
            let report = harness
                .run(RunOptions {
                    verbose: args.verbose,
                    delete_dirs: args.delete_dirs,
                })
                .await?;
            for path in &report.removed {
                println!("removed {}", path.display());
            }
            for path in &report.kept {
                println!("kept    {}", path.display());
            }
            Ok(())
        }
    }
}

async fn run_oess(settings: &Settings, command: OessCommand) -> Result<()> {
    let oess = &settings.oess;
    let credentials = Credentials::from_file(&expand_home(&oess.credentials_path))
        .context("Failed to read OESS credentials")?;
    let client = RestClient::new(&oess.base_url, credentials, oess.timeout_secs)?;
    let result_log = expand_home(&oess.result_log);

    let (program, outcome) = match command {
        OessCommand::Workgroups => {
            for w in client.get_workgroups().await? {
                println!("{}\t{}", w.workgroup_id, w.name);
            }
            return Ok(());
        }
        OessCommand::Details { circuit_id } => {
            let details = client.get_circuit_details(&circuit_id).await?;
            println!("{}", details.description);
            for e in &details.endpoints {
                println!(
                    "endpoint {} {} {}",
                    e.node.as_deref().unwrap_or("-"),
                    e.interface.as_deref().unwrap_or("-"),
                    e.tag.as_deref().unwrap_or("-")
                );
            }
            for name in details.links.iter().filter_map(|l| l.name.as_deref()) {
                println!("link {}", name);
            }
            return Ok(());
        }
        OessCommand::Create {
            workgroup,
            description,
            endpoints,
        } => (
            "oess create",
            client.create(&workgroup, &description, endpoints).await,
        ),
        OessCommand::Edit {
            workgroup,
            circuit_id,
            action,
            endpoint,
        } => (
            "oess edit",
            client.edit(&workgroup, &circuit_id, action, endpoint).await,
        ),
        OessCommand::Remove {
            workgroup,
            circuit_id,
        } => {
            let outcome = match client.workgroup_id(&workgroup).await {
                Ok(id) => client.remove_circuit(&id, &circuit_id).await,
                Err(e) => Err(e),
            };
            ("oess remove", outcome)
        }
    };
    oess::report_outcome(program, &outcome, &result_log)?;
    Ok(())
}

async fn run_blender(settings: &Settings, opts: BlenderOptions) -> Result<()> {
    let ldm_home = blender::ldm_home(std::env::var_os("LDMHOME"))?;
    let plan = PipelinePlan::build(&opts, &settings.blender, &ldm_home)?;
    tracing::info!(%plan, "starting pipeline");
    let supervisor = Supervisor::new(
        plan,
        Duration::from_secs(settings.blender.restart_delay_secs),
    );
    supervisor.run().await?;
    Ok(())
}

async fn run_deploy(settings: &Settings, args: DeployArgs) -> Result<()> {
    let hosts = match &args.hosts {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open host list {}", path.display()))?;
            deploy::read_hosts(std::io::BufReader::new(file))?
        }
        None => deploy::read_hosts(std::io::stdin().lock())?,
    };
    if hosts.is_empty() {
        bail!("No hosts given");
    }

    let mut deploy_settings = settings.deploy.clone();
    if let Some(variant) = args.variant {
        deploy_settings.variant = variant;
    }
    let deployer = Deployer::new(deploy_settings, SshShell::default());
    let results = deploy::run_on_hosts(&deployer, &hosts, args.task, args.parallel).await;

    let mut failed = 0;
    for (host, result) in &results {
        match result {
            Ok(()) => tracing::info!(%host, task = args.task.name(), "done"),
            Err(e) => {
                failed += 1;
                tracing::error!(%host, task = args.task.name(), error = %e, "failed");
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} host(s) failed {}", failed, hosts.len(), args.task.name());
    }
    Ok(())
}
