use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, LevelFilter};

use drover::script::{self, ScriptSource};
use drover::topology::Topology;
use drover::{viz, Harness, HarnessError};

#[derive(Parser, Debug)]
#[command(name = "drover", about = "Scripted multi-node harness for a content-addressed peer network")]
struct Args {
    /// Script to run; stdin is used interactively when omitted
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Serve the topology visualization on this address (e.g. 127.0.0.1:8080)
    #[arg(short, long)]
    serve: Option<String>,

    /// Allocate a secondary control address per node
    #[arg(short, long)]
    remote_control: bool,

    /// Skip topology entry and use the default star layout
    #[arg(long = "default")]
    default_topology: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Keep nodes alive after the script finishes, until ctrl-c
    #[arg(long)]
    inspect: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(if args.quiet {
            LevelFilter::Warn
        } else {
            LevelFilter::Info
        })
        .init();

    if let Err(e) = run(args).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), HarnessError> {
    let mut source = match &args.file {
        Some(path) => ScriptSource::from_file(path)?,
        None => ScriptSource::interactive(),
    };

    let topology = if args.default_topology {
        Topology::default_star(args.remote_control)?
    } else {
        if args.file.is_none() {
            println!("Please enter number of nodes:");
        }
        let n = script::read_node_count(&mut source).await?;
        let mut topology = Topology::build(n, args.remote_control)?;
        if args.file.is_none() {
            println!("Enter bootstrapping config: ('--' to stop)");
        }
        script::read_topology(&mut source, &mut topology).await?;
        topology
    };

    info!("provisioning {} nodes", topology.len());
    let harness = Harness::new(topology);
    harness.start_enabled().await?;

    if let Some(addr) = args.serve.clone() {
        let server = Arc::clone(&harness);
        tokio::spawn(async move {
            if let Err(e) = viz::run(server, addr).await {
                error!("visualization server: {e}");
            }
        });
    }

    println!("enter a command:");
    let outcome = script::run_commands(&harness, &mut source).await;

    if args.inspect {
        info!("inspect mode: nodes stay up until ctrl-c");
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("waiting for ctrl-c: {e}");
        }
    }

    harness.shutdown().await;

    if !harness.stats.is_empty() {
        println!("{}", harness.stats.summary());
    }

    outcome
}
