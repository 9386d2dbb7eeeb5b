// Thin CLI for local experimentation: produce one record, run a consumer
// that prints what it receives, or inspect a group's current assignment.
// It only ever calls `produce`/`subscribe`/`group_status` — no shortcuts
// into the crates underneath.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use broker::{Broker, BrokerConfig, Record};

#[derive(Parser)]
#[command(name = "broker", about = "single-host partitioned log broker")]
struct Cli {
    /// TOML config file. Overrides `--root`/`--partitions` when given.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root directory holding partitions and consumer-group state.
    #[arg(long, default_value = "./broker-data")]
    root: PathBuf,

    /// Partition count. Only meaningful the first time `root` is opened.
    #[arg(long, default_value_t = 4)]
    partitions: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append one record.
    Produce {
        #[arg(long)]
        key: String,
        #[arg(long)]
        payload: String,
    },
    /// Join a consumer group and print every record it delivers until Ctrl-C.
    Consume {
        #[arg(long)]
        group: String,
        #[arg(long)]
        member_id: Option<String>,
    },
    /// Print a group's current generation and partition assignment.
    Status {
        #[arg(long)]
        group: String,
    },
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        },
        None => BrokerConfig::new(cli.root.clone(), cli.partitions),
    };

    if let Err(e) = run(cli, config) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli, config: BrokerConfig) -> broker::Result<()> {
    let broker = Broker::open(config)?;

    match cli.command {
        Command::Produce { key, payload } => {
            let (partition, offset) = broker.produce(key.as_bytes(), payload.as_bytes())?;
            println!("produced to partition {partition} at offset {offset}");
        }
        Command::Consume { group, member_id } => {
            let member_id = member_id.unwrap_or_else(default_member_id);
            let handler: broker::Handler = Arc::new(|record: Record| {
                println!(
                    "partition={} offset={} key={:?} payload={:?}",
                    record.partition,
                    record.offset,
                    String::from_utf8_lossy(&record.key),
                    String::from_utf8_lossy(&record.payload),
                );
                Ok(())
            });

            info!(%group, %member_id, "joining group");
            let _member = broker.subscribe(group, member_id, handler)?;

            // Runs until killed. An unclean exit here is exactly the
            // "ungraceful termination" case: peers detect it once this
            // member's heartbeat goes stale past session_timeout and evict it.
            loop {
                std::thread::sleep(std::time::Duration::from_secs(1));
            }
        }
        Command::Status { group } => {
            let (generation, assignment) = broker.group_status(group)?;
            println!("generation: {generation}");
            for (member_id, partitions) in assignment {
                println!("  {member_id}: {partitions:?}");
            }
        }
    }
    Ok(())
}

fn default_member_id() -> String {
    format!("{}-{}", hostname(), std::process::id())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

fn load_config(path: &PathBuf) -> Result<BrokerConfig, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("reading config {}: {e}", path.display()))?;
    toml::from_str(&text).map_err(|e| format!("parsing config {}: {e}", path.display()))
}
