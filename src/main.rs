#[macro_use]
mod macros;

mod access;
mod analyzer;
mod api;
mod catalog;
mod classes;
mod cli;
mod composer;
mod config;
mod db;
mod error;
mod recorder;

use crate::access::Role;
use crate::cli::onboard::run_onboarding;
use crate::cli::{CategoryCommands, Cli, Commands, ConfigCommands, UserCommands};
use crate::config::Config;
use crate::db::Database;
use anyhow::{Context, Result};
use clap::Parser;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Onboard => {
            let _ = run_onboarding()?;
            Ok(())
        }
        Commands::Serve => {
            let config = load_config()?;
            run_service(config).await
        }
        Commands::Status => handle_status(),
        Commands::Doctor => handle_doctor(),
        Commands::Config { command } => handle_config_command(command),
        Commands::User { command } => handle_user_command(command),
        Commands::Category { command } => handle_category_command(command),
    }
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            println!("Config saved: {key} = {value}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_user_command(command: UserCommands) -> Result<()> {
    let config = load_or_default_config()?;
    let database = Database::open(&config.db_path)?;

    match command {
        UserCommands::Add { name, email, role } => {
            let account = database.insert_account(&name, &email, role)?;
            info!(account_id = account.id, role = %account.role, "account created");
            println!(
                "Account created: id={} name={} email={} role={}",
                account.id, account.name, account.email, account.role
            );
        }
        UserCommands::List { role } => {
            let accounts = database.list_accounts(role)?;
            if accounts.is_empty() {
                println!("No accounts");
            }
            for account in accounts {
                let state = if account.is_active { "" } else { " (inactive)" };
                println!(
                    "{:>4}  {:<8} {} <{}>{state}",
                    account.id,
                    account.role.as_str(),
                    account.name,
                    account.email
                );
            }
        }
    }

    Ok(())
}

fn handle_category_command(command: CategoryCommands) -> Result<()> {
    let config = load_or_default_config()?;
    let database = Database::open(&config.db_path)?;

    match command {
        CategoryCommands::Add { name } => {
            let category = database.insert_category(&name)?;
            println!("Category: id={} name={}", category.id, category.name);
        }
        CategoryCommands::List => {
            for category in database.list_categories()? {
                println!("{:>4}  {}", category.id, category.name);
            }
        }
    }

    Ok(())
}

fn handle_status() -> Result<()> {
    let config = load_config()?;
    let database = Database::open(&config.db_path)?;
    let counts = database.counts()?;

    println!("ringside status");
    println!("- db_path: {}", config.db_path.display());
    println!(
        "- api: {}:{} ({})",
        config.api_host,
        config.api_port,
        if is_api_listening(&config) {
            "listening"
        } else {
            "not running"
        }
    );
    println!("- accounts: {}", counts.accounts);
    println!("- exercises: {}", counts.exercises);
    println!("- routines: {}", counts.routines);
    println!("- completions: {}", counts.completions);
    println!("- planned_classes: {}", counts.planned_classes);

    Ok(())
}

fn handle_doctor() -> Result<()> {
    let config_path = Config::config_path()?;
    let mut issues = Vec::new();

    if config_path.exists() {
        println!("[OK] config.json found: {}", config_path.display());
    } else {
        println!("[WARN] config.json not found: {}", config_path.display());
        issues.push("config missing".to_string());
    }

    let config = load_or_default_config()?;

    match Database::open(&config.db_path) {
        Ok(database) => {
            println!("[OK] SQLite reachable: {}", config.db_path.display());

            match database.list_accounts(Some(Role::Admin)) {
                Ok(admins) if !admins.is_empty() => {
                    println!("[OK] {} admin account(s) configured", admins.len());
                }
                Ok(_) => {
                    println!("[WARN] no admin account. Run `ringside user add <name> <email> --role admin`");
                    issues.push("admin missing".to_string());
                }
                Err(error) => {
                    println!("[WARN] account lookup failed: {error}");
                    issues.push("accounts unreadable".to_string());
                }
            }
        }
        Err(error) => {
            println!("[WARN] SQLite check failed: {error}");
            issues.push("db unreachable".to_string());
        }
    }

    if is_api_listening(&config) {
        println!(
            "[OK] API responding on {}:{}",
            config.api_host, config.api_port
        );
    } else {
        println!(
            "[OK] API port {} is free (run `ringside serve`)",
            config.api_port
        );
    }

    if issues.is_empty() {
        println!("doctor result: no issues");
    } else {
        println!("doctor result: {} warning(s)", issues.len());
    }

    Ok(())
}

async fn run_service(config: Config) -> Result<()> {
    config.ensure_bootstrap_files()?;
    let _ = Database::open(&config.db_path)?;

    let shared_config = Arc::new(config);

    info!("ringside service started");

    tokio::select! {
        api_result = api::run_server(Arc::clone(&shared_config)) => {
            api_result?;
        }
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

fn load_or_default_config() -> Result<Config> {
    Config::load().or_else(|_| {
        let config = Config::default();
        config.ensure_bootstrap_files()?;
        config.save()?;
        Ok(config)
    })
}

fn load_config() -> Result<Config> {
    Config::load().with_context(|| "Config file not found. Run `ringside onboard` first.".to_string())
}

fn is_api_listening(config: &Config) -> bool {
    let addresses: Vec<SocketAddr> = (config.api_host.as_str(), config.api_port)
        .to_socket_addrs()
        .map(|resolved| resolved.collect())
        .unwrap_or_default();

    addresses
        .iter()
        .any(|addr| TcpStream::connect_timeout(addr, Duration::from_millis(250)).is_ok())
}
