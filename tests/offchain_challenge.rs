//! Integration tests for challenging off-chain vote results.
//!
//! A relayer submits a batch whose root commits to an inflated weight. Any
//! watcher holding the batch can prove the bad leaf against the ledger
//! snapshot, which invalidates the result and blocks processing until an
//! honest batch replaces it.

use covenant::bank::{BankExtension, Ledger, TokenId};
use covenant::registry::{
    AccessFlags, DaoFlag, DaoRegistry, EventKind, EventQuery, ModuleKind, CHALLENGE_WINDOW,
    VOTING_PERIOD,
};
use covenant::types::{Address, BlockContext, ModuleId, ProposalId};
use covenant::voting::{
    ChallengeOutcome, Inconsistency, LedgerSnapshot, MerkleTree, OffchainVoting, SignedVote,
    TallySubmission, VoteBatch, VoteChoice, VoteLeaf, VoteOutcome, VoteResultSource, VoterKey,
    VotingDomain, VotingStatus, WeightTable,
};
use covenant::{DaoError, StateViolation};

fn module(name: &str) -> ModuleId {
    ModuleId::new(name).unwrap()
}

struct World {
    registry: DaoRegistry,
    bank: BankExtension,
    voting: OffchainVoting,
    votes: Vec<SignedVote>,
    proposal: ProposalId,
    bob: Address,
}

/// alice (5 units) votes YES, bob (3 units) votes NO on P1; snapshot epoch 1;
/// voting ends at 1_100 and the challenge window is 50s.
fn world() -> World {
    let ctx = BlockContext::new(1, 1_000);
    let configurator = module("configurator");
    let mut registry =
        DaoRegistry::new("guild", configurator.clone(), Address::from_label("configurator"), &ctx);
    registry.set_configuration(&configurator, VOTING_PERIOD, 100, &ctx).unwrap();
    registry.set_configuration(&configurator, CHALLENGE_WINDOW, 50, &ctx).unwrap();
    for (id, flags) in [
        ("financing", AccessFlags::proposal_adapter()),
        ("voting", AccessFlags::from_flags(&[DaoFlag::SubmitVoteResult])),
    ] {
        registry
            .register_module(&configurator, module(id), Address::from_label(id), ModuleKind::Adapter, flags, &ctx)
            .unwrap();
    }

    let alice = VoterKey::from_seed([10; 32]).unwrap();
    let bob = VoterKey::from_seed([20; 32]).unwrap();
    let mut bank = BankExtension::new();
    for (key, units) in [(&alice, 5u128), (&bob, 3)] {
        registry.add_member(&configurator, key.address(), &ctx).unwrap();
        bank.credit_account(&key.address(), &TokenId::units(), units, &ctx).unwrap();
    }

    let proposal = ProposalId::from_label("P1");
    let opened = BlockContext::new(2, 1_000);
    registry.submit_proposal(&module("financing"), proposal, &opened).unwrap();
    registry.sponsor_proposal(&module("financing"), &proposal, 1, &opened).unwrap();

    let domain = VotingDomain {
        name: "guild".to_string(),
        version: "1".to_string(),
        chain_id: 1,
        verifying_address: Address::from_label("voting"),
        action_id: Address::from_label("financing"),
    };
    let votes = vec![
        alice.vote(&domain, proposal, VoteChoice::Yes, 1_010),
        bob.vote(&domain, proposal, VoteChoice::No, 1_020),
    ];
    World {
        registry,
        bank,
        voting: OffchainVoting::new(module("voting"), domain),
        votes,
        proposal,
        bob: bob.address(),
    }
}

/// Batch built against a weight table that claims bob holds 30 units.
fn inflated_batch(w: &World) -> VoteBatch {
    let mut claimed = WeightTable::from_bank(&w.bank, &TokenId::units(), 1).unwrap();
    claimed.insert(w.bob, 30);
    VoteBatch::build(w.voting.domain(), w.proposal, 1, w.votes.clone(), &claimed).unwrap()
}

fn honest_batch(w: &World) -> VoteBatch {
    let weights = LedgerSnapshot::new(&w.bank, 3);
    VoteBatch::build(w.voting.domain(), w.proposal, 1, w.votes.clone(), &weights).unwrap()
}

/// Commit hand-edited leaves under a fresh root; the tally mirrors the last leaf.
fn commit(w: &World, leaves: &[VoteLeaf]) -> (TallySubmission, MerkleTree) {
    let digests = leaves.iter().map(|leaf| leaf.digest(w.voting.domain())).collect();
    let tree = MerkleTree::from_leaves(digests).unwrap();
    let last = leaves.last().unwrap();
    let tally = TallySubmission {
        root: tree.root(),
        yes_count: last.running_yes_count,
        no_count: last.running_no_count,
        total_votes: leaves.len() as u64,
        yes_weight: last.running_yes_weight,
        no_weight: last.running_no_weight,
    };
    (tally, tree)
}

fn challenge_leaf(w: &mut World, leaves: &[VoteLeaf], tree: &MerkleTree, index: usize) -> ChallengeOutcome {
    let resolver = LedgerSnapshot::new(&w.bank, 3).with_delegation(&w.registry);
    w.voting
        .challenge(
            &resolver,
            &w.proposal,
            &leaves[index],
            &tree.proof(index).unwrap(),
            &BlockContext::new(3, 1_110),
        )
        .unwrap()
}

fn bob_index(batch: &VoteBatch, bob: &Address) -> usize {
    batch.leaves().iter().position(|leaf| leaf.account == *bob).unwrap()
}

#[test]
fn test_inflated_weight_is_invalidated() {
    let mut w = world();
    let bad = inflated_batch(&w);
    // The inflated batch flips the outcome.
    assert_eq!(bad.tally().no_weight, 30);

    let submitted = BlockContext::new(3, 1_100);
    w.voting
        .submit_result(&w.registry, &module("voting"), &w.proposal, bad.tally(), &submitted)
        .unwrap();

    let index = bob_index(&bad, &w.bob);
    let resolver = LedgerSnapshot::new(&w.bank, 3).with_delegation(&w.registry);
    let outcome = w
        .voting
        .challenge(
            &resolver,
            &w.proposal,
            bad.leaf(index).unwrap(),
            &bad.proof(index).unwrap(),
            &BlockContext::new(3, 1_120),
        )
        .unwrap();
    assert_eq!(
        outcome,
        ChallengeOutcome::Invalidated(Inconsistency::WeightMismatch {
            index: index as u64,
            claimed: 30,
            actual: 3,
        })
    );
    assert_eq!(w.voting.status(&w.proposal), VotingStatus::Invalidated);

    // Invalidated results can neither be finalized nor challenged again.
    assert_eq!(
        w.voting.finalize(&w.proposal, &BlockContext::new(4, 1_200)).unwrap_err(),
        DaoError::InvalidState(StateViolation::ResultInvalidated)
    );
    assert_eq!(
        w.voting.outcome(&w.proposal).unwrap_err(),
        DaoError::InvalidState(StateViolation::NotFinalized)
    );
    let again = w.voting.challenge(
        &resolver,
        &w.proposal,
        bad.leaf(index).unwrap(),
        &bad.proof(index).unwrap(),
        &BlockContext::new(3, 1_121),
    );
    assert_eq!(
        again.unwrap_err(),
        DaoError::InvalidState(StateViolation::ResultInvalidated)
    );

    let invalidated = w.voting.events().query(&EventQuery {
        kind: Some("result-invalidated"),
        ..Default::default()
    });
    assert_eq!(invalidated.len(), 1);
    assert_eq!(invalidated[0].event.kind(), "result-invalidated");
}

#[test]
fn test_honest_result_replaces_invalidated_one() {
    let mut w = world();
    let bad = inflated_batch(&w);
    w.voting
        .submit_result(&w.registry, &module("voting"), &w.proposal, bad.tally(), &BlockContext::new(3, 1_100))
        .unwrap();
    let index = bob_index(&bad, &w.bob);
    let resolver = LedgerSnapshot::new(&w.bank, 3);
    w.voting
        .challenge(
            &resolver,
            &w.proposal,
            bad.leaf(index).unwrap(),
            &bad.proof(index).unwrap(),
            &BlockContext::new(3, 1_110),
        )
        .unwrap();

    // Same vote count, but the previous result is invalidated.
    let good = honest_batch(&w);
    let resubmitted = BlockContext::new(4, 1_200);
    w.voting
        .submit_result(&w.registry, &module("voting"), &w.proposal, good.tally(), &resubmitted)
        .unwrap();
    assert_eq!(w.voting.status(&w.proposal), VotingStatus::Pending);

    for index in 0..good.leaves().len() {
        let outcome = w
            .voting
            .challenge(
                &resolver,
                &w.proposal,
                good.leaf(index).unwrap(),
                &good.proof(index).unwrap(),
                &BlockContext::new(4, 1_210),
            )
            .unwrap();
        assert_eq!(outcome, ChallengeOutcome::Consistent);
    }
    assert_eq!(w.voting.result(&w.proposal).unwrap().accepted_leaves().count(), 2);

    assert_eq!(
        w.voting.finalize(&w.proposal, &BlockContext::new(5, 1_250)).unwrap(),
        VoteOutcome::Pass
    );
    assert_eq!(w.voting.outcome(&w.proposal).unwrap(), VoteOutcome::Pass);
}

#[test]
fn test_challenge_rejections_leave_result_pending() {
    let mut w = world();
    let good = honest_batch(&w);
    w.voting
        .submit_result(&w.registry, &module("voting"), &w.proposal, good.tally(), &BlockContext::new(3, 1_100))
        .unwrap();
    let resolver = LedgerSnapshot::new(&w.bank, 3);

    // Proof for a different leaf does not rebuild the root.
    let wrong_proof = w.voting.challenge(
        &resolver,
        &w.proposal,
        good.leaf(0).unwrap(),
        &good.proof(1).unwrap(),
        &BlockContext::new(3, 1_110),
    );
    assert_eq!(wrong_proof.unwrap_err(), DaoError::InvalidProof { index: 0 });

    // Window closed.
    let stale = w.voting.challenge(
        &resolver,
        &w.proposal,
        good.leaf(0).unwrap(),
        &good.proof(0).unwrap(),
        &BlockContext::new(3, 1_150),
    );
    assert_eq!(stale.unwrap_err(), DaoError::Stale { deadline: 1_150 });
    assert_eq!(w.voting.status(&w.proposal), VotingStatus::Pending);

    // A replacement inside the window must count more votes.
    assert_eq!(
        w.voting
            .submit_result(&w.registry, &module("voting"), &w.proposal, good.tally(), &BlockContext::new(3, 1_120))
            .unwrap_err(),
        DaoError::InvalidState(StateViolation::ResultNotImproved)
    );

    // State survives a round trip through the CBOR export.
    let restored = OffchainVoting::import_state(&w.voting.export_state().unwrap()).unwrap();
    assert_eq!(restored.status(&w.proposal), VotingStatus::Pending);
    assert_eq!(restored.result(&w.proposal).unwrap().tally, good.tally());
}

#[test]
fn test_unknown_submitter_rejected() {
    let mut w = world();
    let good = honest_batch(&w);
    let result = w.voting.submit_result(
        &w.registry,
        &module("financing"),
        &w.proposal,
        good.tally(),
        &BlockContext::new(3, 1_100),
    );
    assert!(matches!(result, Err(DaoError::Unauthorized { .. })));
    assert_eq!(w.voting.status(&w.proposal), VotingStatus::NotStarted);
}

#[test]
fn test_jailing_after_submission_keeps_snapshot_weight() {
    let mut w = world();
    let good = honest_batch(&w);
    w.voting
        .submit_result(&w.registry, &module("voting"), &w.proposal, good.tally(), &BlockContext::new(3, 1_100))
        .unwrap();

    let configurator = module("configurator");
    let ctx = BlockContext::new(3, 1_105);
    w.registry
        .register_module(
            &configurator,
            module("stewards"),
            Address::from_label("stewards"),
            ModuleKind::Adapter,
            AccessFlags::from_flags(&[DaoFlag::JailMember]),
            &ctx,
        )
        .unwrap();
    w.registry.jail_member(&module("stewards"), &w.bob, &ctx).unwrap();
    assert!(!w.registry.is_active_member(&w.bob));

    // bob was free at snapshot 1, so his leaf still carries his weight.
    let index = bob_index(&good, &w.bob);
    let resolver = LedgerSnapshot::new(&w.bank, 3).with_delegation(&w.registry);
    let outcome = w
        .voting
        .challenge(
            &resolver,
            &w.proposal,
            good.leaf(index).unwrap(),
            &good.proof(index).unwrap(),
            &BlockContext::new(3, 1_110),
        )
        .unwrap();
    assert_eq!(outcome, ChallengeOutcome::Consistent);
    assert_eq!(w.voting.status(&w.proposal), VotingStatus::Pending);
}

#[test]
fn test_running_weight_jump_caught_from_either_neighbour() {
    for order in [[0usize, 1], [1, 0]] {
        let mut w = world();
        let mut leaves = honest_batch(&w).leaves().to_vec();
        leaves[1].running_yes_weight += 10;
        let (tally, tree) = commit(&w, &leaves);
        w.voting
            .submit_result(&w.registry, &module("voting"), &w.proposal, tally, &BlockContext::new(3, 1_100))
            .unwrap();

        // Each leaf is fine on its own; the contradiction shows once both are accepted.
        assert_eq!(challenge_leaf(&mut w, &leaves, &tree, order[0]), ChallengeOutcome::Consistent);
        assert_eq!(
            challenge_leaf(&mut w, &leaves, &tree, order[1]),
            ChallengeOutcome::Invalidated(Inconsistency::StepMismatch { index: 1, previous: 0 })
        );
        assert_eq!(w.voting.status(&w.proposal), VotingStatus::Invalidated);
    }
}

#[test]
fn test_duplicated_account_caught() {
    let mut w = world();
    let first = honest_batch(&w).leaves()[0].clone();
    let mut repeat = first.clone();
    repeat.index = 1;
    if repeat.choice.is_yes() {
        repeat.running_yes_count += 1;
        repeat.running_yes_weight += repeat.weight;
    } else {
        repeat.running_no_count += 1;
        repeat.running_no_weight += repeat.weight;
    }
    let leaves = vec![first, repeat];
    let (tally, tree) = commit(&w, &leaves);
    w.voting
        .submit_result(&w.registry, &module("voting"), &w.proposal, tally, &BlockContext::new(3, 1_100))
        .unwrap();

    assert_eq!(challenge_leaf(&mut w, &leaves, &tree, 0), ChallengeOutcome::Consistent);
    assert_eq!(
        challenge_leaf(&mut w, &leaves, &tree, 1),
        ChallengeOutcome::Invalidated(Inconsistency::AccountOrder { index: 1, previous: 0 })
    );
}
