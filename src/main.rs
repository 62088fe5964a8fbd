use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};

use festimap_lib::config::ConfigStore;
use festimap_lib::filter::FilterCriteria;
use festimap_lib::marker::{count_label, popup_text};
use festimap_lib::FestiMap;

#[derive(Parser, Debug)]
#[command(name = "festimap", about = "Music festival map with AI-assisted curation")]
struct Cli {
    /// Festival document to load instead of the configured one
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the festivals matching the filters
    List {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long)]
        json: bool,
    },
    /// Rebuild the marker layer for the filters and print it as JSON
    Markers {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Print the genres and countries available as filters
    Options,
    #[command(subcommand)]
    Admin(AdminCommand),
    /// Ask the AI for festivals not yet on the map
    Discover {
        #[arg(long)]
        country: String,
        /// Indexes (from the printed list) to add to the map
        #[arg(long, num_args = 1..)]
        accept: Vec<usize>,
        #[arg(long, conflicts_with = "accept")]
        accept_all: bool,
        /// Write the updated festival document here
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Ask the AI whether stored festival dates are still current
    CheckDates {
        #[arg(long)]
        country: String,
        /// Indexes (from the printed list) to apply
        #[arg(long, num_args = 1..)]
        apply: Vec<usize>,
        #[arg(long, conflicts_with = "apply")]
        apply_all: bool,
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum AdminCommand {
    Login { password: String },
    Logout,
    SetKey { key: String },
    SetPassword { password: String },
}

#[derive(Args, Debug)]
struct FilterArgs {
    #[arg(long, default_value = "all")]
    month: String,
    #[arg(long, default_value = "all")]
    genre: String,
    #[arg(long, default_value = "all")]
    country: String,
    #[arg(long, default_value = "")]
    search: String,
}

impl FilterArgs {
    fn criteria(&self) -> FilterCriteria {
        FilterCriteria::from_selections(&self.month, &self.genre, &self.country, &self.search)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => ConfigStore::open(path),
        None => ConfigStore::load(),
    };
    let mut app = match cli.data {
        Some(path) => FestiMap::start_from(&path, config),
        None => FestiMap::start(config),
    };

    match cli.command {
        Command::List { filters, json } => {
            let visible = app.visible(&filters.criteria());
            if json {
                println!("{}", serde_json::to_string_pretty(&visible)?);
            } else {
                for festival in &visible {
                    println!("{}\n", popup_text(festival));
                }
                println!("{}", count_label(visible.len()));
            }
        }
        Command::Markers { filters } => {
            let layer = app.render(&filters.criteria());
            println!("{}", serde_json::to_string_pretty(&layer)?);
        }
        Command::Options => {
            println!("{}", serde_json::to_string_pretty(&app.filter_options())?);
        }
        Command::Admin(admin) => match admin {
            AdminCommand::Login { password } => {
                app.login(&password)?;
                println!("logged in");
            }
            AdminCommand::Logout => {
                app.logout()?;
                println!("logged out");
            }
            AdminCommand::SetKey { key } => {
                app.set_api_key(&key)?;
                println!("API key stored");
            }
            AdminCommand::SetPassword { password } => {
                app.set_password(&password)?;
                println!("admin password updated");
            }
        },
        Command::Discover {
            country,
            accept,
            accept_all,
            export,
        } => {
            let ai = app.ai_client()?;
            let found = app.discover(&ai, &country).await?;
            if found.is_empty() {
                println!("no new festivals found for {country}");
                return Ok(());
            }
            for (index, pending) in found.iter().enumerate() {
                let c = &pending.candidate;
                println!(
                    "[{index}] {} ({}) {}..{} {}",
                    c.name, c.city, c.start_date, c.end_date, c.genre
                );
            }

            let chosen = selection(accept, accept_all, found.len())?;
            for index in chosen {
                match app.accept_candidate(index) {
                    Ok(id) => println!("added [{index}] as festival {id}"),
                    Err(err) => eprintln!("could not add [{index}]: {err}"),
                }
            }
            if let Some(path) = export {
                app.export(&path)?;
                println!("wrote {}", path.display());
            }
        }
        Command::CheckDates {
            country,
            apply,
            apply_all,
            export,
        } => {
            let ai = app.ai_client()?;
            let changes = app.check_dates(&ai, &country).await?;
            if changes.is_empty() {
                println!("no date updates suggested for {country}");
                return Ok(());
            }
            for (index, pending) in changes.iter().enumerate() {
                let c = &pending.change;
                let marker = if c.is_noop() { " (unchanged)" } else { "" };
                println!(
                    "[{index}] {}: {}..{} -> {}..{}{marker} {}",
                    c.festival_name, c.old_start, c.old_end, c.new_start, c.new_end, c.source_note
                );
            }

            let chosen = selection(apply, apply_all, changes.len())?;
            for index in chosen {
                match app.apply_change(index) {
                    Ok(true) => println!("applied [{index}]"),
                    Ok(false) => println!("[{index}] already applied"),
                    Err(err) => eprintln!("could not apply [{index}]: {err}"),
                }
            }
            if let Some(path) = export {
                app.export(&path)?;
                println!("wrote {}", path.display());
            }
        }
    }

    Ok(())
}

fn selection(mut picked: Vec<usize>, all: bool, available: usize) -> Result<Vec<usize>> {
    if all {
        return Ok((0..available).collect());
    }
    picked.sort_unstable();
    picked.dedup();
    if let Some(bad) = picked.iter().find(|&&i| i >= available) {
        bail!("index {bad} is out of range (0..{available})");
    }
    Ok(picked)
}
