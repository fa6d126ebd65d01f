// CLI module - command-line argument parsing
//
// Every subcommand maps onto one client operation; the handlers live in
// `commands`. `config` runs before the context is built so a broken backend
// URL can still be inspected and fixed.

use crate::config::VERSION;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// qdesk - queue desk client
#[derive(Parser)]
#[command(name = "qdesk")]
#[command(version = VERSION)]
#[command(about = "Command-line client for the queue desk backend", long_about = None)]
pub struct Cli {
    /// Config file to load instead of ~/.config/qdesk/config.toml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Log in with email and password
    Login {
        email: String,

        /// Password (prompted on stdin when omitted)
        #[arg(long)]
        password: Option<String>,

        /// Keep the session across restarts
        #[arg(long)]
        remember: bool,
    },

    /// Forget the stored credential
    Logout,

    /// Show the logged-in identity (refreshed from the server)
    Whoami,

    /// Register a new account
    Signup {
        email: String,

        #[arg(long)]
        password: Option<String>,
    },

    /// Queue tickets
    #[command(subcommand)]
    Queues(QueueCommand),

    /// Service desks
    #[command(subcommand)]
    Services(ServiceCommand),

    /// Walk-in clients
    #[command(subcommand)]
    Clients(ClientCommand),

    /// Tickets per month for a year
    Report { year: i32 },

    /// Upload an avatar image
    Avatar { path: PathBuf },

    /// Print live notifications until Ctrl+C
    Watch {
        /// JSON message to send once the socket is open, e.g. '{"room": 3}'
        #[arg(long, value_name = "JSON")]
        join: Option<String>,
    },
}

/// Paging and sorting shared by list commands
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Rows per page (defaults to [list] per_page)
    #[arg(long)]
    pub per_page: Option<u32>,

    /// Field to sort the page by
    #[arg(long)]
    pub sort: Option<String>,

    /// Sort descending
    #[arg(long)]
    pub desc: bool,

    /// Case-insensitive search
    #[arg(long, default_value = "")]
    pub search: String,
}

#[derive(Subcommand)]
pub enum QueueCommand {
    /// List tickets (active by default)
    List {
        /// Finished tickets instead of active ones
        #[arg(long)]
        inactive: bool,

        #[command(flatten)]
        list: ListArgs,
    },

    /// Reserve a ticket
    Add {
        /// YYYY-MM-DD
        #[arg(long)]
        date: String,

        #[arg(long)]
        service: i64,

        #[arg(long)]
        client: Option<i64>,

        #[arg(long)]
        number: Option<i64>,

        #[arg(long)]
        time: Option<String>,

        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Change a ticket's step, number, time or service
    Update {
        id: i64,

        /// 0..=3, where 3 marks the ticket finished
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=3))]
        step: Option<u8>,

        #[arg(long)]
        number: Option<i64>,

        #[arg(long)]
        time: Option<String>,

        /// Move the ticket to another service
        #[arg(long)]
        service: Option<i64>,
    },

    /// Delete a ticket
    Remove { id: i64 },

    /// Call a ticket to the desk
    Call { id: i64 },

    /// Mark a ticket as served
    Finish { id: i64 },

    /// Tickets waiting and being served
    Waitlist,

    /// Free ticket numbers for a service on a date
    Numbers {
        #[arg(long)]
        date: String,

        #[arg(long)]
        service: i64,
    },
}

#[derive(Subcommand)]
pub enum ServiceCommand {
    List {
        #[command(flatten)]
        list: ListArgs,
    },

    Add {
        name: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, default_value = "")]
        room: String,

        /// e.g. "Mon-Fri"
        #[arg(long, default_value = "")]
        days: String,

        /// HH:MM
        #[arg(long, default_value = "09:00")]
        from: String,

        /// HH:MM
        #[arg(long, default_value = "17:00")]
        to: String,

        /// Average minutes per ticket
        #[arg(long, default_value_t = 15)]
        avg_minute: i64,
    },

    /// Change the given fields of a service
    Update {
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        room: Option<String>,

        #[arg(long)]
        days: Option<String>,

        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,

        #[arg(long)]
        avg_minute: Option<i64>,
    },

    Remove { id: i64 },
}

#[derive(Subcommand)]
pub enum ClientCommand {
    /// Register a walk-in client
    Add {
        firstname: String,

        surname: String,

        #[arg(long, default_value = "")]
        middlename: String,

        /// male or female
        #[arg(long)]
        gender: String,
    },
}
