//! # minimarket
//!
//! Admin CLI over the terminal commands: bulk import, categorization,
//! backups, reports, sync and user bootstrap.
//!
//! ```text
//! minimarket --user admin --password ... import productos.csv
//! minimarket report --from 2024-03-01 --to 2024-03-31
//! minimarket backup export respaldo.json
//! minimarket user add rosa --new-password ... (first run: no login, admin)
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use minimarket_core::users::Role;
use minimarket_db::NewUser;
use minimarket_sync::SyncConfig;
use minimarket_terminal::commands::{backup, config, import, report, sale, sync, user};
use minimarket_terminal::state::TerminalConfig;
use minimarket_terminal::{init_tracing, Terminal};

#[derive(Parser)]
#[command(name = "minimarket", version, about = "Minimarket POS admin tool")]
struct Cli {
    /// terminal.toml (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// sync.toml (defaults to the platform config dir)
    #[arg(long, global = true)]
    sync_config: Option<PathBuf>,

    #[arg(long, global = true, env = "MINIMARKET_USER")]
    user: Option<String>,

    #[arg(long, global = true, env = "MINIMARKET_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import products from a .csv or .json file
    Import {
        path: PathBuf,
        /// Keyword rules (.json or .toml) for rows without a category
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Suggest categories from product names
    Categorize {
        /// Write the suggestions instead of only printing them
        #[arg(long)]
        apply: bool,
        /// Include products that already have a category
        #[arg(long)]
        all: bool,
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Export or restore a JSON backup
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
    /// Sales report for a range of local dates
    Report {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Low stock, expiry and valuation instead of sales
        #[arg(long)]
        inventory: bool,
        #[arg(long)]
        json: bool,
    },
    /// Push pending changes to the cloud now
    Sync,
    /// Show pending outbox entries and the last sync
    Status,
    /// User administration
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Receipt operations
    Receipt {
        #[command(subcommand)]
        action: ReceiptAction,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    Export { path: PathBuf },
    Restore { path: PathBuf },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user; the first user of a new database is always admin
    Add {
        username: String,
        #[arg(long)]
        new_password: String,
        #[arg(long, default_value = "cashier")]
        role: Role,
        #[arg(long, default_value = "")]
        display_name: String,
    },
    List,
}

#[derive(Subcommand)]
enum ReceiptAction {
    /// Print a copy of a sale's receipt (sale id or receipt number)
    Reprint { sale: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let terminal_config = TerminalConfig::load(cli.config.clone())?;
    let terminal = Terminal::open(terminal_config).await?;

    let result = run(&terminal, cli).await;
    terminal.shutdown().await;
    result
}

async fn run(t: &Terminal, cli: Cli) -> Result<()> {
    if let (Some(username), Some(password)) = (cli.user, cli.password) {
        let logged_in = user::login(&t.db, &t.session, username, password).await?;
        info!(username = %logged_in.username, role = %logged_in.role, "Logged in");
    } else if !matches!(cli.command, Commands::User { action: UserAction::Add { .. } }) {
        bail!("--user and --password (or MINIMARKET_USER / MINIMARKET_PASSWORD) are required");
    }

    match cli.command {
        Commands::Import { path, rules } => {
            let summary = import::import_products(&t.db, &t.session, path, rules).await?;
            println!(
                "Imported {} products ({} categorized by keyword), skipped {} existing",
                summary.imported, summary.categorized, summary.skipped
            );
            for error in &summary.errors {
                println!("  row {}: {}", error.row, error.message);
            }
        }
        Commands::Categorize { apply, all, rules } => {
            let suggestions =
                import::categorize_products(&t.db, &t.session, apply, all, rules).await?;
            for s in &suggestions {
                println!(
                    "{:<36} {} -> {}{}  ({})",
                    s.name,
                    s.current_category,
                    s.suggestion.category,
                    s.suggestion
                        .subcategory
                        .as_deref()
                        .map(|sub| format!(" / {}", sub))
                        .unwrap_or_default(),
                    s.suggestion.keyword
                );
            }
            let verb = if apply { "Updated" } else { "Would update" };
            println!("{} {} products", verb, suggestions.len());
        }
        Commands::Backup { action } => match action {
            BackupAction::Export { path } => {
                let summary = backup::export_backup(&t.db, &t.session, path).await?;
                println!(
                    "Wrote {} ({} products, {} sales, {} movements, {} bytes)",
                    summary.path.display(),
                    summary.products,
                    summary.sales,
                    summary.movements,
                    summary.bytes
                );
            }
            BackupAction::Restore { path } => {
                let summary = backup::restore_backup(&t.db, &t.cart, &t.session, path).await?;
                print_json(&summary)?;
            }
        },
        Commands::Report {
            from,
            to,
            inventory,
            json,
        } => {
            if inventory {
                let report = report::get_inventory_report(&t.db, &t.config, &t.session).await?;
                print_json(&report)?;
            } else {
                let report =
                    report::get_sales_report(&t.db, &t.config, &t.session, from, to).await?;
                if json {
                    print_json(&report)?;
                } else {
                    let company = config::get_company_config(&t.db).await?;
                    print!("{}", report::format_sales_report(&report, &company.currency_symbol));
                }
            }
        }
        Commands::Sync => {
            let sync_config = SyncConfig::load(cli.sync_config)
                .context("Cannot load the sync config")?;
            t.start_sync(sync_config)?;
            let report = sync::sync_now(&t.session, &t.sync).await?;
            print_json(&report)?;
        }
        Commands::Status => {
            let status = sync::get_sync_status(&t.db, &t.sync).await?;
            print_json(&status)?;
        }
        Commands::User { action } => match action {
            UserAction::Add {
                username,
                new_password,
                role,
                display_name,
            } => {
                let created = user::add_user(
                    &t.db,
                    &t.session,
                    NewUser {
                        username,
                        display_name,
                        password: new_password,
                        role,
                        extra_permissions: BTreeSet::new(),
                    },
                )
                .await?;
                println!("Created {} ({})", created.username, created.role);
            }
            UserAction::List => {
                for u in user::list_users(&t.db, &t.session).await? {
                    let state = if u.is_active { "" } else { "  (inactive)" };
                    println!("{:<20}{:<10}{}{}", u.username, u.role.as_str(), u.display_name, state);
                }
            }
        },
        Commands::Receipt { action } => match action {
            ReceiptAction::Reprint { sale } => {
                let response = sale::reprint_receipt(&t.db, &t.config, &t.session, sale).await?;
                print!("{}", response.receipt);
            }
        },
    }

    Ok(())
}
