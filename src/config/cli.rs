use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "support-triage")]
#[command(about = "Agentic customer support triage service")]
pub struct Cli {
    /// Path to TOML configuration file (environment variables still override it)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Rebuild the knowledge base index from a docs directory
    Ingest {
        #[arg(long)]
        kb_dir: Option<PathBuf>,
    },
    /// Query the knowledge base
    Retrieve {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Run the triage agent once and print the result as JSON
    Triage {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
        #[arg(long)]
        customer_email: Option<String>,
        #[arg(long, default_value = "api")]
        channel: String,
    },
    /// Redact PII from text
    Redact {
        text: String,
        #[arg(long, help = "Keep original values in findings")]
        keep_values: bool,
    },
    /// Classify a labelled CSV dataset and report accuracy
    Eval {
        #[arg(long)]
        dataset: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_triage_command() {
        let cli = Cli::parse_from([
            "support-triage",
            "--verbose",
            "triage",
            "--subject",
            "Refund",
            "--body",
            "I want my money back",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Triage { subject, channel, customer_email, .. } => {
                assert_eq!(subject, "Refund");
                assert_eq!(channel, "api");
                assert!(customer_email.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from(["support-triage", "serve", "--port", "9001", "-c", "triage.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("triage.toml")));
        assert!(matches!(cli.command, Commands::Serve { port: Some(9001), .. }));
    }
}
