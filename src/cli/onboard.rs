use crate::access::Role;
use crate::config::{Config, expand_home};
use crate::db::Database;
use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, theme::ColorfulTheme};

pub fn run_onboarding() -> Result<Config> {
    println!("──────────────────────────────────────────");
    println!("  Welcome to ringside onboarding.");
    println!("──────────────────────────────────────────");

    let theme = ColorfulTheme::default();
    let defaults = Config::default();

    println!("\n[1/3] Database location");
    let db_path_input: String = Input::with_theme(&theme)
        .with_prompt("  SQLite database file")
        .default(defaults.db_path.display().to_string())
        .interact_text()
        .context("Failed to read database path")?;
    let db_path = expand_home(db_path_input.trim());
    println!("  ✓ {}", db_path.display());

    println!("\n[2/3] API server");
    let api_port: u16 = Input::with_theme(&theme)
        .with_prompt("  Port for the JSON API")
        .default(defaults.api_port)
        .validate_with(|port: &u16| -> std::result::Result<(), &str> {
            if *port == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()
        .context("Failed to read API port")?;
    println!("  ✓ API will listen on {}:{api_port}", defaults.api_host);

    let config = Config {
        db_path,
        api_port,
        ..defaults
    };

    config.ensure_bootstrap_files()?;
    config.save()?;
    let database = Database::open(&config.db_path)?;

    println!("\n[3/3] First administrator");
    let existing_admins = database.list_accounts(Some(Role::Admin))?;
    if let Some(admin) = existing_admins.first() {
        println!("  ✓ Admin already present: {} <{}>", admin.name, admin.email);
    } else {
        let create_admin = Confirm::with_theme(&theme)
            .with_prompt("  Create an admin account now?")
            .default(true)
            .interact()
            .context("Failed to read admin prompt input")?;

        if create_admin {
            let name: String = Input::with_theme(&theme)
                .with_prompt("  Admin name")
                .interact_text()
                .context("Failed to read admin name")?;
            let email: String = Input::with_theme(&theme)
                .with_prompt("  Admin email")
                .validate_with(|input: &String| -> std::result::Result<(), &str> {
                    if input.contains('@') {
                        Ok(())
                    } else {
                        Err("Enter a valid email address")
                    }
                })
                .interact_text()
                .context("Failed to read admin email")?;

            let admin = database.insert_account(&name, &email, Role::Admin)?;
            println!("  ✓ Admin created (id {}). Send it as the x-actor-id header.", admin.id);
        } else {
            println!("  ! Skipped. Add one later with `ringside user add <name> <email> --role admin`");
        }
    }

    println!("\n──────────────────────────────────────────");
    println!("  Onboarding complete!");
    println!("  Run `ringside serve` to start the API.");
    println!("──────────────────────────────────────────");

    Ok(config)
}
