use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod config;
pub mod keygen;
pub mod logging;
pub mod sign;
pub mod tally;
pub mod verify;
pub mod version;

use config::{default_config_path, CovenantConfig};

#[derive(Parser)]
#[command(name = "covenant")]
#[command(author = "Covenant Project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator CLI for covenant DAO governance", long_about = None)]
pub struct Cli {
    /// Path to config file (default: <config dir>/covenant/covenant.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default operator config file
    Init {
        /// DAO name bound into vote signatures
        #[arg(long, default_value = "covenant-dao")]
        dao_name: String,

        #[arg(long, default_value_t = 1)]
        chain_id: u64,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Generate an Ed25519 voter key
    Keygen {
        /// Where to write the key seed (hex)
        #[arg(long)]
        output: String,

        #[arg(long)]
        force: bool,
    },

    /// Sign a vote for a proposal
    SignVote {
        /// Key file written by `keygen`
        #[arg(long)]
        key: String,

        /// Proposal id (hex)
        #[arg(long)]
        proposal: String,

        /// yes or no
        #[arg(long)]
        choice: String,

        /// Unix timestamp of the vote (default: now)
        #[arg(long)]
        timestamp: Option<u64>,

        /// Vote file to append to (prints the vote if omitted)
        #[arg(long)]
        output: Option<String>,
    },

    /// Build a vote batch and write the tally report
    Tally {
        /// JSON array of signed votes
        #[arg(long)]
        votes: String,

        /// JSON weight export for the proposal's snapshot
        #[arg(long)]
        weights: String,

        /// Proposal id (hex)
        #[arg(long)]
        proposal: String,

        /// Report path (prints the report if omitted)
        #[arg(long)]
        output: Option<String>,
    },

    /// Verify one leaf of a tally report
    VerifyProof {
        /// Report written by `tally`
        #[arg(long)]
        report: String,

        /// Leaf index
        #[arg(long)]
        index: usize,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    if let Commands::Init {
        dao_name,
        chain_id,
        force,
    } = &cli.command
    {
        if config_path.exists() && !force {
            return Err(format!(
                "Config file '{}' already exists. Use --force to overwrite it.",
                config_path.display()
            )
            .into());
        }
        CovenantConfig::create_default(&config_path, dao_name, *chain_id)?;
        println!("📝 Created: {}", config_path.display());
        return Ok(());
    }

    let config = CovenantConfig::load_or_default(&config_path)?;
    logging::init(&config.logging)?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Keygen { output, force } => keygen::execute(output, force),
        Commands::SignVote {
            key,
            proposal,
            choice,
            timestamp,
            output,
        } => sign::execute(&config, key, proposal, choice, timestamp, output),
        Commands::Tally {
            votes,
            weights,
            proposal,
            output,
        } => tally::execute(&config, votes, weights, proposal, output).await,
        Commands::VerifyProof { report, index } => verify::execute(report, index),
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parse_init_defaults() {
        let cli = Cli::parse_from(["covenant", "init"]);

        assert_eq!(cli.config, None);
        match cli.command {
            Commands::Init {
                dao_name,
                chain_id,
                force,
            } => {
                assert_eq!(dao_name, "covenant-dao");
                assert_eq!(chain_id, 1);
                assert!(!force);
            }
            _ => panic!("Expected Init command"),
        }
    }

    #[test]
    fn test_cli_parse_sign_vote() {
        let cli = Cli::parse_from([
            "covenant",
            "sign-vote",
            "--key",
            "/tmp/voter.key",
            "--proposal",
            "ab",
            "--choice",
            "yes",
            "--output",
            "/tmp/votes.json",
            "--config",
            "/etc/covenant.toml",
        ]);

        assert_eq!(cli.config, Some("/etc/covenant.toml".to_string()));
        match cli.command {
            Commands::SignVote {
                key,
                proposal,
                choice,
                timestamp,
                output,
            } => {
                assert_eq!(key, "/tmp/voter.key");
                assert_eq!(proposal, "ab");
                assert_eq!(choice, "yes");
                assert_eq!(timestamp, None);
                assert_eq!(output, Some("/tmp/votes.json".to_string()));
            }
            _ => panic!("Expected SignVote command"),
        }
    }

    #[test]
    fn test_cli_parse_tally() {
        let cli = Cli::parse_from([
            "covenant",
            "tally",
            "--votes",
            "votes.json",
            "--weights",
            "weights.json",
            "--proposal",
            "ab",
        ]);

        match cli.command {
            Commands::Tally {
                votes,
                weights,
                output,
                ..
            } => {
                assert_eq!(votes, "votes.json");
                assert_eq!(weights, "weights.json");
                assert_eq!(output, None);
            }
            _ => panic!("Expected Tally command"),
        }
    }

    #[test]
    fn test_cli_parse_verify_proof() {
        let cli = Cli::parse_from(["covenant", "verify-proof", "--report", "r.json", "--index", "2"]);

        match cli.command {
            Commands::VerifyProof { report, index } => {
                assert_eq!(report, "r.json");
                assert_eq!(index, 2);
            }
            _ => panic!("Expected VerifyProof command"),
        }
    }

    #[test]
    fn test_cli_parse_version() {
        let cli = Cli::parse_from(["covenant", "version"]);
        assert!(matches!(cli.command, Commands::Version));
    }

    #[tokio::test]
    async fn test_init_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("covenant.toml");
        let args = |force: bool| {
            let mut args = vec![
                "covenant".to_string(),
                "init".to_string(),
                "--dao-name".to_string(),
                "guild".to_string(),
                "--config".to_string(),
                path.display().to_string(),
            ];
            if force {
                args.push("--force".to_string());
            }
            Cli::parse_from(args)
        };

        execute(args(false)).await.unwrap();
        assert_eq!(CovenantConfig::load(&path).unwrap().governance.dao_name, "guild");
        assert!(execute(args(false)).await.is_err());
        execute(args(true)).await.unwrap();
    }
}
