use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

/// Fare watcher CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "fare-watch",
    version,
    about = "Watches one-way fares on a route and alerts when they drop to a target price"
)]
pub struct Cli {
    /// Origin airport code (e.g. AGA)
    #[arg(long, global = true)]
    pub origin: Option<String>,

    /// Destination airport code (e.g. FEZ)
    #[arg(long, global = true)]
    pub destination: Option<String>,

    /// Fare polling interval in seconds
    #[arg(long, global = true)]
    pub poll_interval: Option<u64>,

    /// SQLite database URL for subscriptions
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// HTTP API port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the poller and the HTTP API (default)
    Serve,
    /// Print the cheapest available fare in the lookahead window
    Lowest,
    /// List the cheapest fares, ordered by date
    Prices {
        /// Number of days to search (defaults to the lookahead window)
        #[arg(long)]
        days: Option<u32>,
        /// First day to search, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Only show fares at or below this price
        #[arg(long)]
        max_price: Option<Decimal>,
        /// Maximum number of fares to show
        #[arg(long, default_value_t = 15)]
        limit: usize,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::parse_from(["fare-watch"]);
        assert_eq!(cli.command(), Command::Serve);
    }

    #[test]
    fn prices_accepts_filters() {
        let cli = Cli::parse_from([
            "fare-watch",
            "prices",
            "--days",
            "10",
            "--date",
            "2025-03-01",
            "--max-price",
            "199.50",
            "--origin",
            "RAK",
        ]);
        assert_eq!(cli.origin.as_deref(), Some("RAK"));
        assert_eq!(
            cli.command(),
            Command::Prices {
                days: Some(10),
                date: NaiveDate::from_ymd_opt(2025, 3, 1),
                max_price: Some(dec!(199.50)),
                limit: 15,
            }
        );
    }

    #[test]
    fn rejects_malformed_date() {
        assert!(Cli::try_parse_from(["fare-watch", "prices", "--date", "03/01/2025"]).is_err());
    }
}
