use anyhow::Context;
use blockflow::config::JobConfig;
use blockflow::job::Job;
use blockflow::menu::{Menu, MenuMsg};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "blockflow")]
#[command(about = "Steer CSV blocks through a menu of algorithms into Arrow files", long_about = None)]
struct Cli {
    /// Default filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job (validates the configuration and menu before starting).
    Run {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        menu: PathBuf,
    },
    /// Compile a menu and print its execution order.
    Plan {
        #[arg(long)]
        menu: PathBuf,
    },
}

fn load_menu(path: &Path) -> Result<Menu> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading menu {}", path.display()))?;
    let msg = MenuMsg::from_json(&text).with_context(|| format!("parsing menu {}", path.display()))?;
    Menu::from_definition(&msg).with_context(|| format!("compiling menu {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.cmd {
        Commands::Run { config, menu } => {
            let job_config = JobConfig::from_file(&config)
                .with_context(|| format!("loading job config {}", config.display()))?;
            let menu = load_menu(&menu)?;

            let mut job = Job::new(job_config, menu);
            let summary = job.control().context("job failed")?;
            println!(
                "Wrote {} records in {} files; summary in {}",
                summary.total_records,
                summary.total_files,
                job.meta_path().display()
            );
        }
        Commands::Plan { menu } => {
            let menu = load_menu(&menu)?;
            for entry in menu.ordered_sequence() {
                println!(
                    "{:<20} parents=[{}] algos=[{}]",
                    entry.id,
                    entry.parents.join(", "),
                    entry.algos.join(", ")
                );
            }
            println!("{}", menu.to_msg().to_json()?);
        }
    }

    Ok(())
}
