//! Command-line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::auth::{self, AuthOptions};
use crate::client::{ExistingFilter, GmailClient, LabelInfo, ProductionGmailClient};
use crate::config::FiltersConfig;
use crate::error::Result;
use crate::filter_manager::{BatchReport, FilterManager};
use crate::label_manager::LabelManager;

#[derive(Parser, Debug)]
#[command(name = "gmail-filters")]
#[command(version)]
#[command(about = "Manage Gmail filters and labels from a configuration file", long_about = None)]
pub struct Cli {
    /// User to authenticate as
    #[arg(short, long, default_value = "me")]
    pub user: String,

    /// YAML (or .toml) filter configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Path to OAuth2 client credentials file (defaults to GMAIL_FILTERS_CLIENT_ID/SECRET)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Give up waiting for the browser authorization after this many seconds
    #[arg(long, value_name = "SECS")]
    pub auth_timeout: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Operations on labels
    Labels {
        #[command(subcommand)]
        command: LabelsCommand,
    },

    /// Operations on filters
    Filters {
        #[command(subcommand)]
        command: FiltersCommand,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelsCommand {
    /// List all labels
    List,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum FiltersCommand {
    /// List all filters
    List,
    /// Show one filter by ID
    Get {
        /// Filter ID as shown by `filters list`
        id: String,
    },
    /// Delete all filters
    Delete,
    /// Upload filters from the configuration file
    Upload,
}

impl Cli {
    pub fn auth_options(&self) -> AuthOptions {
        AuthOptions {
            credentials_path: self.credentials.clone(),
            callback_timeout: self.auth_timeout.map(Duration::from_secs),
        }
    }
}

/// Authenticate, build the client once, and run the selected command
pub async fn execute(cli: &Cli) -> Result<()> {
    let hub = auth::authenticate(&cli.user, &cli.auth_options()).await?;
    let client = ProductionGmailClient::new(hub, cli.user.clone());
    run_command(cli, &client).await
}

/// Run the selected command against an already authenticated client
pub async fn run_command(cli: &Cli, client: &dyn GmailClient) -> Result<()> {
    match &cli.command {
        Commands::Labels {
            command: LabelsCommand::List,
        } => {
            let labels = LabelManager::new(client).list_labels().await?;
            print!("{}", render_labels(&labels));
        }
        Commands::Filters {
            command: FiltersCommand::List,
        } => {
            let filters = FilterManager::new(client).list_filters().await?;
            print!("{}", render_filters(&filters));
        }
        Commands::Filters {
            command: FiltersCommand::Get { id },
        } => {
            let filter = FilterManager::new(client).get_filter(id).await?;
            print!("{}", render_filters(std::slice::from_ref(&filter)));
        }
        Commands::Filters {
            command: FiltersCommand::Delete,
        } => {
            let report = FilterManager::new(client).delete_all_filters().await?;
            println!("{}", summarize("Deleted", &report));
        }
        Commands::Filters {
            command: FiltersCommand::Upload,
        } => {
            let config = FiltersConfig::load(&cli.config).await?;
            let report = FilterManager::new(client)
                .upload_filters(config.filters)
                .await?;
            println!("{}", summarize("Created", &report));
        }
    }
    info!("Done");
    Ok(())
}

fn summarize(verb: &str, report: &BatchReport) -> String {
    let mut out = format!(
        "{} {}/{} filters",
        verb, report.succeeded, report.attempted
    );
    for (item, error) in &report.failures {
        out.push_str(&format!("\n  failed: {}: {}", item, error));
    }
    out
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Render rows as a bordered text table
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let separator = format!(
        "+{}+\n",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );
    let format_row = |cells: Vec<&str>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!(" {:<width$} ", cell, width = *width))
            .collect();
        format!("|{}|\n", padded.join("|"))
    };

    let mut out = String::new();
    out.push_str(&separator);
    out.push_str(&format_row(headers.to_vec()));
    out.push_str(&separator);
    for row in rows {
        let mut cells: Vec<&str> = row.iter().map(String::as_str).collect();
        cells.resize(widths.len(), "");
        out.push_str(&format_row(cells));
    }
    out.push_str(&separator);
    out
}

pub fn render_labels(labels: &[LabelInfo]) -> String {
    let rows: Vec<Vec<String>> = labels
        .iter()
        .map(|label| vec![label.id.clone(), label.name.clone()])
        .collect();
    render_table(&["Id", "Name"], &rows)
}

pub fn render_filters(filters: &[ExistingFilter]) -> String {
    let rows: Vec<Vec<String>> = filters
        .iter()
        .map(|filter| {
            vec![
                filter.id.clone(),
                truncate_string(&filter.criteria.to_string(), 60),
                truncate_string(&filter.action.to_string(), 40),
            ]
        })
        .collect();
    render_table(&["Id", "Criteria", "Action"], &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_flag_is_required() {
        let result = Cli::try_parse_from(["gmail-filters", "labels", "list"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["gmail-filters", "-c", "filters.yaml", "filters", "upload"])
            .unwrap();
        assert_eq!(cli.user, "me");
        assert_eq!(cli.config, PathBuf::from("filters.yaml"));
        assert!(!cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Filters {
                command: FiltersCommand::Upload
            }
        ));
        assert!(cli.auth_options().callback_timeout.is_none());
    }

    #[test]
    fn test_parse_all_flags() {
        let cli = Cli::try_parse_from([
            "gmail-filters",
            "-u",
            "alice@example.com",
            "-c",
            "f.yaml",
            "-v",
            "--auth-timeout",
            "120",
            "--credentials",
            "creds.json",
            "labels",
            "list",
        ])
        .unwrap();
        assert_eq!(cli.user, "alice@example.com");
        assert!(cli.verbose);
        let options = cli.auth_options();
        assert_eq!(options.callback_timeout, Some(Duration::from_secs(120)));
        assert_eq!(options.credentials_path, Some(PathBuf::from("creds.json")));
    }

    #[test]
    fn test_parse_filters_get() {
        let cli = Cli::try_parse_from(["gmail-filters", "-c", "f.yaml", "filters", "get", "ANe1Bmj"])
            .unwrap();
        assert_eq!(
            cli.command,
            Commands::Filters {
                command: FiltersCommand::Get {
                    id: "ANe1Bmj".to_string()
                }
            }
        );
        assert!(Cli::try_parse_from(["gmail-filters", "-c", "f.yaml", "filters", "get"]).is_err());
    }

    #[test]
    fn test_render_labels() {
        let table = render_labels(&[
            LabelInfo {
                id: "INBOX".to_string(),
                name: "INBOX".to_string(),
            },
            LabelInfo {
                id: "Label_1".to_string(),
                name: "Work".to_string(),
            },
        ]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "+---------+-------+");
        assert_eq!(lines[1], "| Id      | Name  |");
        assert_eq!(lines[3], "| INBOX   | INBOX |");
        assert_eq!(lines[4], "| Label_1 | Work  |");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("a much longer string", 10), "a much ...");
    }

    #[test]
    fn test_summarize_lists_failures() {
        let report = BatchReport {
            attempted: 3,
            succeeded: 2,
            failures: vec![("from:(x)".to_string(), "Bad request".to_string())],
        };
        assert_eq!(
            summarize("Created", &report),
            "Created 2/3 filters\n  failed: from:(x): Bad request"
        );
    }
}
