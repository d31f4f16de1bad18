pub mod onboard;

use crate::access::Role;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "ringside",
    about = "Boxing academy routines, classes & session tracking"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Onboard,
    Serve,
    Status,
    Doctor,
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

#[derive(Debug, Subcommand)]
pub enum UserCommands {
    Add {
        name: String,
        email: String,
        #[arg(long, default_value_t = Role::Student)]
        role: Role,
    },
    List {
        #[arg(long)]
        role: Option<Role>,
    },
}

#[derive(Debug, Subcommand)]
pub enum CategoryCommands {
    Add { name: String },
    List,
}
