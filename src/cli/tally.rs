//! `covenant tally`: build a vote batch from a JSON vote file and a weight
//! export, and write the report a relayer submits and challengers check.

use super::config::CovenantConfig;
use async_trait::async_trait;
use covenant::error::{DaoError, DaoResult};
use covenant::types::{Epoch, ProposalId};
use covenant::voting::{
    collect_batch, MerkleProof, SignedVote, TallySubmission, VoteLeaf, VoteSource, VotingDomain,
    WeightTable,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Votes stored as a JSON array of `SignedVote`.
pub struct JsonFileVoteSource {
    path: PathBuf,
}

impl JsonFileVoteSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl VoteSource for JsonFileVoteSource {
    async fn votes(&self, proposal: &ProposalId) -> DaoResult<Vec<SignedVote>> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DaoError::InvalidInput(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let votes: Vec<SignedVote> = serde_json::from_str(&contents)
            .map_err(|e| DaoError::Serialization(format!("{}: {}", self.path.display(), e)))?;
        Ok(votes
            .into_iter()
            .filter(|vote| vote.payload.proposal == *proposal)
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub leaf: VoteLeaf,
    pub proof: MerkleProof,
}

/// Everything needed to submit the result and to challenge any leaf of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TallyReport {
    pub proposal: ProposalId,
    pub snapshot: Epoch,
    pub domain: VotingDomain,
    pub tally: TallySubmission,
    pub entries: Vec<ReportEntry>,
}

impl TallyReport {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read report '{}': {}", path.display(), e))?;
        let report = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse report '{}': {}", path.display(), e))?;
        Ok(report)
    }
}

pub async fn build_report(
    config: &CovenantConfig,
    votes: &Path,
    weights: &Path,
    proposal: ProposalId,
) -> Result<TallyReport, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(weights)
        .map_err(|e| format!("Failed to read weight export '{}': {}", weights.display(), e))?;
    let table: WeightTable = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse weight export '{}': {}", weights.display(), e))?;

    let domain = config.governance.domain();
    let source = JsonFileVoteSource::new(votes);
    let batch = collect_batch(&source, &domain, proposal, table.snapshot, &table).await?;

    let entries = batch
        .proofs()
        .map(|(leaf, proof)| ReportEntry {
            leaf: leaf.clone(),
            proof,
        })
        .collect();
    Ok(TallyReport {
        proposal,
        snapshot: table.snapshot,
        domain,
        tally: batch.tally(),
        entries,
    })
}

pub async fn execute(
    config: &CovenantConfig,
    votes: String,
    weights: String,
    proposal: String,
    output: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let proposal: ProposalId = proposal.parse()?;
    let report = build_report(config, Path::new(&votes), Path::new(&weights), proposal).await?;
    let json = serde_json::to_string_pretty(&report)?;

    info!(%proposal, root = %report.tally.root, votes = report.tally.total_votes, "tally built");
    match output {
        Some(path) => {
            fs::write(&path, json)
                .map_err(|e| format!("Failed to write report '{}': {}", path, e))?;
            println!("Report written to {}", path);
        }
        None => println!("{}", json),
    }

    let tally = &report.tally;
    eprintln!("Root:   {}", tally.root);
    eprintln!("Yes:    {} votes, weight {}", tally.yes_count, tally.yes_weight);
    eprintln!("No:     {} votes, weight {}", tally.no_count, tally.no_weight);
    Ok(())
}
