// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use poddle::{Config, ReqwestClient, SearchClient, fetch_podcast, is_url, read_podcast_file, server, store};

/// Podcast manager, search and streaming proxy
#[derive(Parser, Debug)]
#[command(name = "poddle")]
#[command(about = "A tool for managing a library of podcasts")]
#[command(version)]
struct Cli {
    /// Default log filter when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP proxy server (default)
    Serve,

    /// Search the configured catalog for podcasts
    Search {
        /// Search terms
        #[arg(required = true)]
        terms: Vec<String>,
    },

    /// Ingest a feed and print it as JSON
    Feed {
        /// RSS feed URL or path to local RSS file
        source: String,
    },

    /// Generate a shell completion script
    ///
    /// For example: poddle completion bash > /etc/bash_completion.d/poddle.bash
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn search(config: &Config, terms: &[String]) -> Result<()> {
    let client = SearchClient::new(config.search_backend.backend(), ReqwestClient::new());
    let query = terms.join(" ");

    let podcasts = client
        .search(&query)
        .await
        .with_context(|| format!("Search via {} failed", client.backend_name()))?;

    for podcast in podcasts.iter().filter(|p| !p.url.is_empty()) {
        println!("{} [{}]", podcast.title.bold(), podcast.url.cyan());
    }
    Ok(())
}

async fn feed(config: &Config, source: &str) -> Result<()> {
    let storage = config.storage()?;
    let repository = store::open(&storage);

    let normalized = if is_url(source) {
        fetch_podcast(&ReqwestClient::new(), source).await
    } else {
        read_podcast_file(Path::new(source))
    }
    .with_context(|| format!("Failed to ingest feed {}", source))?;

    let mut podcast = normalized.podcast;
    podcast.id = repository.save_podcast(podcast.clone()).await;

    if !normalized.issues.is_empty() {
        eprintln!(
            "{} {} issue(s) while normalizing",
            "warning:".yellow().bold(),
            normalized.issues.len()
        );
    }

    println!("{}", serde_json::to_string_pretty(&podcast)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            // An unusable DSN stops the process before it starts serving.
            let storage = cli.config.storage().context("Invalid database configuration")?;
            let _repository = store::open(&storage);

            server::serve(&cli.config).await.context("Server failed")?;
        }
        Command::Search { terms } => search(&cli.config, &terms).await?,
        Command::Feed { source } => feed(&cli.config, &source).await?,
        Command::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "poddle", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn subcommand_defaults_to_serve() {
        let cli = Cli::try_parse_from(["poddle"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["poddle", "completion", "bash"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Completion { shell: Shell::Bash })));
    }

    #[test]
    fn bash_completion_names_subcommands() {
        let mut script = Vec::new();
        clap_complete::generate(Shell::Bash, &mut Cli::command(), "poddle", &mut script);

        let script = String::from_utf8(script).unwrap();
        assert!(script.contains("poddle"));
        assert!(script.contains("search"));
        assert!(script.contains("completion"));
    }
}
