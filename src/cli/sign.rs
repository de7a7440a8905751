//! `covenant sign-vote`: sign a vote and append it to a vote file.

use super::config::CovenantConfig;
use super::keygen::read_key;
use covenant::types::ProposalId;
use covenant::voting::{SignedVote, VoteChoice};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn execute(
    config: &CovenantConfig,
    key_file: String,
    proposal: String,
    choice: String,
    timestamp: Option<u64>,
    output: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = read_key(Path::new(&key_file))?;
    let proposal: ProposalId = proposal.parse()?;
    let choice: VoteChoice = choice.parse()?;
    let timestamp = match timestamp {
        Some(ts) => ts,
        None => SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs(),
    };

    let vote = key.vote(&config.governance.domain(), proposal, choice, timestamp);
    match output {
        Some(path) => {
            let count = append_vote(Path::new(&path), vote)?;
            println!("Vote from {} appended to {} ({} votes)", key.address(), path, count);
        }
        None => println!("{}", serde_json::to_string_pretty(&vote)?),
    }
    Ok(())
}

/// Append `vote` to the JSON array at `path`, creating it if missing.
/// Returns the number of votes now in the file.
pub fn append_vote(path: &Path, vote: SignedVote) -> Result<usize, Box<dyn std::error::Error>> {
    let mut votes: Vec<SignedVote> = if path.exists() {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read vote file '{}': {}", path.display(), e))?;
        serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse vote file '{}': {}", path.display(), e))?
    } else {
        Vec::new()
    };
    votes.push(vote);
    fs::write(path, serde_json::to_string_pretty(&votes)?)
        .map_err(|e| format!("Failed to write vote file '{}': {}", path.display(), e))?;
    Ok(votes.len())
}
