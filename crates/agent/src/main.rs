#![forbid(unsafe_code)]

mod api_client;
mod cli;
mod commands;
mod shutdown;
mod startup;

use anyhow::Result;

use api_client::{AlertListQuery, ApiClient};
use cli::{AlertsCommand, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::parse();
    let output = cli.output;

    match cli.command {
        Some(Command::Version) => {
            println!("alertscope {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }

        Some(Command::CheckConfig) => commands::cmd_check_config(&cli.config, output),

        Some(Command::Health { ref conn }) => {
            let client = ApiClient::new(&conn.host, conn.port)?;
            commands::cmd_health(&client, output).await
        }

        Some(Command::Metrics { ref conn }) => {
            let client = ApiClient::new(&conn.host, conn.port)?;
            commands::cmd_metrics(&client).await
        }

        Some(Command::Alerts(ref args)) => {
            let client = ApiClient::new(&args.conn.host, args.conn.port)?;
            match args.command {
                AlertsCommand::List {
                    ref severity,
                    ref min_severity,
                    ref search,
                    ref order,
                    limit,
                    offset,
                } => {
                    let query = AlertListQuery {
                        severity: severity.as_deref(),
                        min_severity: min_severity.as_deref(),
                        search: search.as_deref(),
                        order: order.as_deref(),
                        limit,
                        offset,
                    };
                    commands::cmd_alerts_list(&client, &query, output).await
                }
                AlertsCommand::Get { ref id } => commands::cmd_alerts_get(&client, id, output).await,
                AlertsCommand::Stats => commands::cmd_alerts_stats(&client, output).await,
                AlertsCommand::Refresh => commands::cmd_alerts_refresh(&client, output).await,
                AlertsCommand::Map { limit } => {
                    commands::cmd_alerts_map(&client, limit, output).await
                }
            }
        }

        // No subcommand = run the agent daemon
        None | Some(Command::Run) => startup::run(&cli).await,
    }
}
