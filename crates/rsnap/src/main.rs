mod app;

use clap::Parser;

/// Multi-host rsync snapshot backups.
#[derive(Parser)]
#[command(name = "rsnap", about = "Back up hosts into rotated hard-link snapshots")]
pub struct Cli {
    /// Hosts to back up
    pub hostnames: Vec<String>,

    /// Back up every configured host
    #[arg(long)]
    pub all: bool,

    /// Include hosts belonging to a group (repeatable)
    #[arg(long = "group", value_name = "NAME")]
    pub groups: Vec<String>,

    /// Config file
    #[arg(long, value_name = "PATH", default_value = rsnap_core::config::DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Ignore the lockfile and disable the progress fifo
    #[arg(long)]
    pub force: bool,

    /// Skip all filesystem mutation and subprocess execution
    #[arg(long)]
    pub simulate: bool,

    /// Skip the deferred-deletion phase
    #[arg(long)]
    pub no_cleanup: bool,

    /// Verbose trace output
    #[arg(long)]
    pub debug: bool,

    /// Query a running instance for progress and exit
    #[arg(long)]
    pub progress: bool,

    /// Override a config key (repeatable)
    #[arg(short = 'o', value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = app::run(cli) {
        eprintln!("rsnap: {}", e);
        std::process::exit(1);
    }
}
