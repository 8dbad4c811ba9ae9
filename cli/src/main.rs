mod commands;
mod terminal;

use commands::{CommandLine, Commands, probe, scan, watch};
use speakerwatch_common::config::MonitorConfig;
use terminal::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands: CommandLine = CommandLine::parse_args();

    logging::init_logging(commands.verbose)?;

    let cfg: MonitorConfig = commands.monitor_config()?;

    match commands.command {
        Commands::Watch => watch::watch(&cfg).await,
        Commands::Scan => scan::scan(&cfg, commands.json).await,
        Commands::Probe { address } => probe::probe(address, &cfg, commands.json).await,
    }
}
