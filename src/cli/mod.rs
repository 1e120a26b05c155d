//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "docsieve",
    version,
    author = "neur0map",
    about = "Metadata-scoped semantic search over document collections",
    long_about = "docsieve narrows a document collection with categories, paths, query templates and \
                  metadata predicates, then runs a vector similarity search restricted to the \
                  resulting candidate set."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/docsieve/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config file
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search a collection
    Search {
        /// Search query text
        query: String,

        /// JSON file with search options
        #[arg(short, long, value_name = "FILE")]
        options: Option<PathBuf>,

        /// Collection name
        #[arg(short = 'C', long)]
        collection: String,

        /// Organisation whose templates may be used
        #[arg(short = 'O', long, default_value = "1")]
        organisation: i64,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,

        /// Only list documents covering this share of the total score (0-1 or percent)
        #[arg(long, value_name = "SHARE")]
        top_share: Option<f64>,
    },

    /// Embed chunks that have no vector for the configured model yet
    Embed {
        /// Collection name
        #[arg(short = 'C', long)]
        collection: String,
    },

    /// Manage query templates
    Templates {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Show database statistics
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum TemplateAction {
    /// Load a template configuration file, replacing the grammar's active set
    Load {
        /// Template configuration file (defaults to templates.config_path)
        file: Option<PathBuf>,

        /// Owning organisation
        #[arg(short = 'O', long, default_value = "1")]
        organisation: i64,
    },

    /// Print a stored template
    Show {
        /// Template id
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_arguments() {
        let cli = Cli::try_parse_from([
            "docsieve",
            "search",
            "concerts next week",
            "--collection",
            "events",
            "--options",
            "opts.json",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Search {
                query,
                collection,
                organisation,
                options,
                ..
            } => {
                assert_eq!(query, "concerts next week");
                assert_eq!(collection, "events");
                assert_eq!(organisation, 1);
                assert_eq!(options, Some(PathBuf::from("opts.json")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
