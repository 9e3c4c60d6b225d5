use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use stelshop_cli::OutputFormat;
use stelshop_cli::commands;
use stelshop_core::Config;

#[derive(Parser)]
#[command(name = "stelshop")]
#[command(author, version, long_about = None)]
#[command(
    about = "Push shop descriptions and SEO fields into the Stelorder catalog",
    long_about = "Stelshop drives a Chrome session signed in to Stelorder and writes the \
                  online-shop fields of every product listed in a job file, keeping per-item \
                  outcomes and exportable statistics."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "pretty")]
    format: OutputFormat,

    /// Configuration file (defaults to config/stelshop.json when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a job file against the Stelorder catalog
    Run {
        /// Path to the job file
        #[arg(value_name = "FILE")]
        job: PathBuf,

        /// Named Chrome profile to launch with
        #[arg(long, default_value = "default")]
        profile: String,

        /// Use a throwaway profile deleted after the run
        #[arg(long, conflicts_with = "profile")]
        temp: bool,

        /// Path to Chrome/Chromium executable
        #[arg(long)]
        chrome_path: Option<PathBuf>,

        /// Run Chrome without a window
        #[arg(long)]
        headless: bool,

        /// Where to write the statistics export
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,

        /// Disable the p/r/s keyboard controls
        #[arg(long)]
        no_keys: bool,
    },

    /// Check a job file without touching the browser
    Validate {
        /// Path to the job file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Show an exported statistics file
    Stats {
        /// Path to the statistics export
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Only list failed items
        #[arg(long)]
        failures: bool,
    },

    /// Manage Chrome profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Generate shell completion scripts
    #[command(after_help = "SUPPORTED SHELLS:
    bash, zsh, fish, powershell, elvish

INSTALLATION:
    Bash:
        stelshop completion --shell bash > ~/.local/share/bash-completion/completions/stelshop
        # or add to ~/.bashrc:
        eval \"$(stelshop completion --shell bash)\"

    Zsh:
        stelshop completion --shell zsh > ~/.zfunc/_stelshop
        # then add to ~/.zshrc:
        fpath=(~/.zfunc $fpath)
        autoload -Uz compinit && compinit

    Fish:
        stelshop completion --shell fish > ~/.config/fish/completions/stelshop.fish")]
    Completion {
        /// Target shell
        #[arg(long, value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// List profiles with their size and lock state
    List,

    /// Remove cookies, storage, caches and history
    Clean {
        /// Profile to clean (all unlocked profiles when omitted)
        name: Option<String>,
    },

    /// Delete a profile directory
    Delete {
        /// Profile to delete
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Commands::Completion { shell } = &cli.command {
        return commands::completion::execute(*shell, &mut Cli::command());
    }

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            job,
            profile,
            temp,
            chrome_path,
            headless,
            export,
            no_keys,
        } => {
            if chrome_path.is_some() {
                config.browser.chrome_path = chrome_path;
            }
            if headless {
                config.browser.headless = true;
            }
            commands::run::execute(
                &config,
                commands::run::RunOptions {
                    job,
                    profile,
                    temp,
                    export,
                    interactive: !no_keys,
                },
            )
        }
        Commands::Validate { file } => commands::validate::execute(&file, cli.format),
        Commands::Stats { file, failures } => commands::stats::execute(&file, failures, cli.format),
        Commands::Profile { command } => match command {
            ProfileCommands::List => commands::profile::list(&config),
            ProfileCommands::Clean { name } => commands::profile::clean(&config, name.as_deref()),
            ProfileCommands::Delete { name, force } => {
                commands::profile::delete(&config, &name, force)
            }
        },
        Commands::Completion { .. } => Ok(()),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("stelshop=debug,chromiumoxide=warn")
    } else {
        EnvFilter::new("stelshop=info,stelshop_workflow=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
