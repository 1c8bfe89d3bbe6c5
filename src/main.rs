mod config;
mod set_firewall;

use std::{
    fs::OpenOptions, io::Write, net::Ipv4Addr, path::PathBuf, process::exit, str::FromStr,
    sync::Arc, time::Duration,
};

use chrono::Local;
use clap::{Parser, Subcommand};
use colored::{Color, Colorize};
use config::Config;
use env_logger::Target;
use log::{LevelFilter, debug, error, info};
use set_firewall::{
    Direction, Error, HttpProvider, Mattermost, Netfilter, Notifier, Orchestrator, Policy, Result,
    RuleDefinition, Silent, acquire, export, find_covering, hostname,
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable timestamp in logs (overrides config file setting)
    #[arg(short, long)]
    timestamp: bool,

    /// Log at debug level (overrides config file setting)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Update every rule definition of the configuration (default)
    Run,

    /// Update a single set outside the configuration
    Update {
        /// Source identifier, a country code or "tor"
        #[arg(short, long)]
        source: String,

        /// Set name, defaults to the upper-cased source
        #[arg(long)]
        set: Option<String>,

        /// Local list file, may be repeated
        #[arg(short, long)]
        file: Vec<PathBuf>,

        /// Extra entry added to the list, may be repeated
        #[arg(short, long)]
        extra: Vec<String>,

        /// Attach the iptables match rule
        #[arg(short, long)]
        iptables: bool,

        /// Rule target, "accept" or "drop"
        #[arg(short, long)]
        policy: Option<Policy>,

        /// Matched address, "src" or "dst", may be repeated
        #[arg(short, long)]
        direction: Vec<Direction>,
    },

    /// Remove the rules, sets and custom chain of every rule definition
    Clear,

    /// List existing sets, or the members of one set
    List {
        /// Only sets that have a backup generation
        #[arg(short, long)]
        managed: bool,

        /// Print the members of this set instead
        #[arg(long, conflicts_with = "managed")]
        set: Option<String>,
    },

    /// Check whether an address is covered by a set or a source list
    Check {
        ip: Ipv4Addr,

        /// Live set to test
        #[arg(long, conflicts_with = "source", required_unless_present = "source")]
        set: Option<String>,

        /// Source list to fetch and test
        #[arg(long)]
        source: Option<String>,
    },

    /// Swap a set with its backup generation
    Rollback { set: String },

    /// Write the merged list of a source to a file
    Export {
        #[arg(short, long)]
        source: String,

        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Parse CLI args
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration file [{}]: {}", path, e);
                exit(2);
            }
        },
        None => Config::default(),
    };

    // CLI options override config file settings
    config.log.timestamp = cli.timestamp || config.log.timestamp;
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::from_str(&config.log.level).unwrap_or(LevelFilter::Info)
    };

    // Initialize logger
    if let Err(e) = init_logger(config.log.timestamp, level, config.log.file.as_deref()) {
        eprintln!("Failed to open log file: {}", e);
        exit(2);
    }
    debug!("LOADED CONFIGURATION: {:?}", &config);

    if let Err(e) = execute(cli.command.unwrap_or(Command::Run), &config).await {
        error!("{}", e);
        exit(1);
    }
}

async fn execute(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Export { source, output } => {
            let provider = HttpProvider::new(&config.sources)?;
            let rule = config.firewall.resolve(&definition(config, &source))?;
            let merged = acquire(&provider, &rule).await?;
            export(&merged, &output)
        }
        Command::Check {
            ip,
            source: Some(source),
            ..
        } => {
            let provider = HttpProvider::new(&config.sources)?;
            let rule = config.firewall.resolve(&definition(config, &source))?;
            let merged = acquire(&provider, &rule).await?;
            match find_covering(&merged.nets, ip) {
                Some(net) => println!("{} exists in {}", ip, net),
                None => println!("{} does not exist", ip),
            }
            Ok(())
        }
        command => with_kernel(command, config).await,
    }
}

/// Commands that touch the kernel, run with the notification sink alive
async fn with_kernel(command: Command, config: &Config) -> Result<()> {
    let (notifier, delivery): (Arc<dyn Notifier>, _) = if config.notify.enabled() {
        let timeout = Duration::from_secs(config.sources.timeout);
        let (notifier, handle) = Mattermost::spawn(&config.notify, timeout)?;
        (Arc::new(notifier), Some(handle))
    } else {
        (Arc::new(Silent), None)
    };

    let orchestrator = Orchestrator::builder()
        .kernel(Netfilter::open()?)
        .notifier(notifier)
        .provider(Box::new(HttpProvider::new(&config.sources)?))
        .option(&config.firewall)
        .rules(&config.rules)
        .host(&config.notify.host)
        .build()?;

    let result = match command {
        Command::Update {
            source,
            set,
            file,
            extra,
            iptables,
            policy,
            direction,
        } => {
            let mut definition = RuleDefinition {
                set,
                files: file,
                extra,
                iptables,
                ..RuleDefinition::new(&source)
            };
            definition.binding.policy = policy;
            if !direction.is_empty() {
                definition.binding.directions = Some(direction);
            }
            orchestrator.update(&definition).await.map(|_| ())
        }
        Command::Clear => orchestrator.clear(),
        Command::List {
            set: Some(set), ..
        } => orchestrator.members(&set).map(|members| {
            for net in members {
                println!("{}", net);
            }
        }),
        Command::List { managed, .. } => orchestrator.list_sets(managed).map(|sets| {
            for set in sets {
                println!("{}", set);
            }
        }),
        Command::Check {
            ip, set: Some(set), ..
        } => orchestrator.check_set(&set, ip).map(|found| {
            if found {
                println!("{} exists in {}", ip, set);
            } else {
                println!("{} does not exist in {}", ip, set);
            }
        }),
        Command::Rollback { set } => orchestrator.rollback(&set),
        Command::Run => orchestrator.run().await.map(|_| ()),
        command => Err(Error::Config(format!("{:?} does not use the kernel", command))),
    };

    // flush queued notifications before exiting
    drop(orchestrator);
    if let Some(handle) = delivery {
        if let Err(e) = handle.await {
            error!("NOTIFY TASK FAILED: {}", e);
        }
    }
    result
}

/// A rule definition for a source given on the command line, using the
/// configured rule of the same source when there is one
fn definition(config: &Config, source: &str) -> RuleDefinition {
    config
        .rules
        .iter()
        .find(|rule| rule.source.eq_ignore_ascii_case(source))
        .cloned()
        .unwrap_or_else(|| RuleDefinition::new(source))
}

/// Custom logger initialization, with optional timestamp and log file
fn init_logger(timestamp: bool, level: LevelFilter, file: Option<&str>) -> std::io::Result<()> {
    let mut builder = env_logger::Builder::new();
    if let Some(path) = file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
        colored::control::set_override(false);
    }
    builder
        .format(move |buf, record| {
            let color = match record.level() {
                log::Level::Error => Color::Red,
                log::Level::Warn => Color::Yellow,
                log::Level::Info => Color::Green,
                log::Level::Debug => Color::Blue,
                log::Level::Trace => Color::Magenta,
            };
            let level = format!("{:5}", record.level()).color(color);
            if timestamp {
                writeln!(
                    buf,
                    "[{} {}] {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S"),
                    level,
                    record.args()
                )
            } else {
                writeln!(buf, "[{}] {}", level, record.args())
            }
        })
        .filter_module(env!("CARGO_CRATE_NAME"), level)
        .init();
    info!("IPSETFW {} STARTED ON [{}]", env!("CARGO_PKG_VERSION"), hostname());
    Ok(())
}
