use super::tally::{ReportEntry, TallyReport};
use covenant::voting::verify_proof;
use std::path::Path;

/// Verify one leaf of a tally report
///
/// Checks, in order:
/// - The leaf's Merkle proof rebuilds the report root
/// - The proof's path is the one for its index in a tree of this size
/// - The voter's signature over the leaf's vote is valid for the report domain
/// - The leaf's index and running tallies are consistent with its position
pub fn verify_entry(report: &TallyReport, index: usize) -> Result<(), Box<dyn std::error::Error>> {
    let ReportEntry { leaf, proof } = report
        .entries
        .get(index)
        .ok_or_else(|| format!("Report has {} leaves, no index {}", report.entries.len(), index))?;

    let digest = leaf.digest(&report.domain);
    if !verify_proof(&digest, proof, &report.tally.root) {
        return Err(format!("Leaf {} does not match root {}", index, report.tally.root).into());
    }
    if proof.index != index as u64 || !proof.matches_position(report.tally.total_votes) {
        return Err(format!("Proof path does not belong to position {}", index).into());
    }
    leaf.verify_signature(&report.domain)?;
    if leaf.index != index as u64 {
        return Err(format!("Leaf at position {} claims index {}", index, leaf.index).into());
    }
    let counted = leaf.running_yes_count.checked_add(leaf.running_no_count);
    if counted != Some(index as u64 + 1) {
        return Err(format!("Leaf {} running counts do not add up to {}", index, index + 1).into());
    }
    let own_weight = if leaf.choice.is_yes() {
        leaf.running_yes_weight
    } else {
        leaf.running_no_weight
    };
    if own_weight < leaf.weight {
        return Err(format!("Leaf {} running weight is below its own weight", index).into());
    }
    Ok(())
}

pub fn execute(report: String, index: usize) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Verifying leaf {} of {}...", index, report);
    let report = TallyReport::load(Path::new(&report))?;
    match verify_entry(&report, index) {
        Ok(()) => {
            let leaf = &report.entries[index].leaf;
            println!("✅ {} voted {} with weight {}", leaf.account, leaf.choice, leaf.weight);
            println!("✅ Included under root {}", report.tally.root);
            Ok(())
        }
        Err(e) => {
            println!("❌ {}", e);
            Err("Verification failed".into())
        }
    }
}
