//! Integration test for the end-to-end proposal flow.
//!
//! Tests the complete lifecycle:
//! 1. Bootstrap the registry, register adapters, admit members
//! 2. Submit a funding proposal and sponsor it (pins the snapshot)
//! 3. Collect signed votes and build the Merkle batch
//! 4. Submit the result after the voting period
//! 5. Challenge a leaf inside the window (consistent)
//! 6. Finalize after the window
//! 7. Process exactly once and pay out

use covenant::adapters::{FinancingAdapter, FundingRequest, ProposalAdapter};
use covenant::bank::{BankExtension, Ledger, TokenId, GUILD};
use covenant::registry::{
    AccessFlags, DaoFlag, DaoRegistry, EventQuery, ModuleKind, ProposalState, CHALLENGE_WINDOW,
    VOTING_PERIOD,
};
use covenant::types::{Address, BlockContext, ModuleId, ProposalId};
use covenant::voting::{
    collect_batch, ChallengeOutcome, InMemoryVoteSource, LedgerSnapshot, OffchainVoting,
    VoteChoice, VoteOutcome, VoteResultSource, VoterKey, VotingDomain, VotingStatus,
};
use covenant::{DaoError, StateViolation};

fn module(name: &str) -> ModuleId {
    ModuleId::new(name).unwrap()
}

/// Three voter keys whose addresses sort alice < bob < carol.
fn ordered_keys() -> [VoterKey; 3] {
    let mut keys: Vec<VoterKey> = (1..=16u8)
        .map(|seed| VoterKey::from_seed([seed; 32]).unwrap())
        .collect();
    keys.sort_by_key(|key| key.address());
    let mut lowest = keys.into_iter();
    [
        lowest.next().unwrap(),
        lowest.next().unwrap(),
        lowest.next().unwrap(),
    ]
}

struct Dao {
    registry: DaoRegistry,
    bank: BankExtension,
    financing: FinancingAdapter,
    voting: OffchainVoting,
    voters: [VoterKey; 3],
}

fn bootstrap() -> Dao {
    let ctx = BlockContext::new(1, 1_000);
    let configurator = module("configurator");
    let mut registry =
        DaoRegistry::new("guild", configurator.clone(), Address::from_label("configurator"), &ctx);
    registry.set_configuration(&configurator, VOTING_PERIOD, 100, &ctx).unwrap();
    registry.set_configuration(&configurator, CHALLENGE_WINDOW, 50, &ctx).unwrap();

    let financing = FinancingAdapter::new(module("financing"));
    registry
        .register_module(
            &configurator,
            module("financing"),
            Address::from_label("financing"),
            ModuleKind::Adapter,
            financing.required_flags(),
            &ctx,
        )
        .unwrap();
    registry
        .register_module(
            &configurator,
            module("voting"),
            Address::from_label("voting"),
            ModuleKind::Adapter,
            AccessFlags::from_flags(&[DaoFlag::SubmitVoteResult]),
            &ctx,
        )
        .unwrap();

    let voters = ordered_keys();
    let mut bank = BankExtension::new();
    for (key, units) in voters.iter().zip([5u128, 3, 2]) {
        registry.add_member(&configurator, key.address(), &ctx).unwrap();
        bank.credit_account(&key.address(), &TokenId::units(), units, &ctx).unwrap();
    }
    bank.credit_account(&GUILD, &TokenId::loot(), 100, &ctx).unwrap();

    let domain = VotingDomain {
        name: registry.name().to_string(),
        version: "1".to_string(),
        chain_id: 1,
        verifying_address: registry.resolve(&module("voting")).unwrap(),
        action_id: registry.resolve(&module("financing")).unwrap(),
    };
    Dao {
        registry,
        bank,
        financing,
        voting: OffchainVoting::new(module("voting"), domain),
        voters,
    }
}

#[tokio::test]
async fn test_full_proposal_lifecycle() {
    let mut dao = bootstrap();
    let p1 = ProposalId::from_label("P1");
    let applicant = Address::from_label("applicant");

    // Submit and sponsor at epoch 2: snapshot pins epoch 1.
    let opened = BlockContext::new(2, 1_010);
    dao.financing
        .submit(
            &mut dao.registry,
            p1,
            FundingRequest {
                applicant,
                token: TokenId::loot(),
                amount: 40,
            },
            &opened,
        )
        .unwrap();
    let sponsor = dao.voters[0].address();
    dao.financing.sponsor(&mut dao.registry, &p1, &sponsor, &opened).unwrap();
    assert_eq!(dao.registry.proposal_state(&p1), ProposalState::Sponsored);
    let snapshot = dao.registry.proposal(&p1).unwrap().snapshot.unwrap();
    assert_eq!(snapshot, 1);

    // Units minted after the snapshot do not count.
    dao.bank
        .credit_account(&dao.voters[1].address(), &TokenId::units(), 1_000, &opened)
        .unwrap();

    // Votes: alice YES, bob NO, carol YES.
    let source = InMemoryVoteSource::new();
    let domain = dao.voting.domain().clone();
    for (key, choice) in dao.voters.iter().zip([VoteChoice::Yes, VoteChoice::No, VoteChoice::Yes]) {
        source.push(key.vote(&domain, p1, choice, 1_050)).unwrap();
    }
    let resolver = LedgerSnapshot::new(&dao.bank, opened.epoch).with_delegation(&dao.registry);
    let batch = collect_batch(&source, &domain, p1, snapshot, &resolver).await.unwrap();

    let yes_counts: Vec<u64> = batch.leaves().iter().map(|l| l.running_yes_count).collect();
    let no_counts: Vec<u64> = batch.leaves().iter().map(|l| l.running_no_count).collect();
    assert_eq!(yes_counts, vec![1, 1, 2]);
    assert_eq!(no_counts, vec![0, 1, 1]);
    let tally = batch.tally();
    assert_eq!((tally.yes_weight, tally.no_weight), (7, 3));
    assert_eq!(tally.total_votes, 3);

    // Nothing to process before a result exists.
    let processed_too_early = dao.financing.process(
        &mut dao.registry,
        &mut dao.bank,
        &dao.voting,
        &p1,
        &BlockContext::new(2, 1_020),
    );
    assert!(matches!(processed_too_early, Err(DaoError::NotFound { .. })));

    // Result submission waits for the voting period.
    let early = BlockContext::new(2, 1_100);
    assert_eq!(
        dao.voting
            .submit_result(&dao.registry, &module("voting"), &p1, tally, &early)
            .unwrap_err(),
        DaoError::InvalidState(StateViolation::VotingPeriodOpen)
    );
    let submitted = BlockContext::new(3, 1_110);
    dao.voting
        .submit_result(&dao.registry, &module("voting"), &p1, tally, &submitted)
        .unwrap();
    assert_eq!(dao.voting.status(&p1), VotingStatus::Pending);

    // An honest leaf survives a challenge.
    let resolver = LedgerSnapshot::new(&dao.bank, submitted.epoch).with_delegation(&dao.registry);
    let proof = batch.proof(1).unwrap();
    let outcome = dao
        .voting
        .challenge(&resolver, &p1, batch.leaf(1).unwrap(), &proof, &BlockContext::new(3, 1_120))
        .unwrap();
    assert_eq!(outcome, ChallengeOutcome::Consistent);

    // Finalize only after the challenge window.
    assert_eq!(
        dao.voting.finalize(&p1, &BlockContext::new(3, 1_159)).unwrap_err(),
        DaoError::InvalidState(StateViolation::ChallengeWindowOpen)
    );
    assert_eq!(
        dao.voting.finalize(&p1, &BlockContext::new(4, 1_160)).unwrap(),
        VoteOutcome::Pass
    );
    assert_eq!(dao.voting.outcome(&p1).unwrap(), VoteOutcome::Pass);

    // Process once.
    let done = BlockContext::new(4, 1_170);
    let outcome = dao
        .financing
        .process(&mut dao.registry, &mut dao.bank, &dao.voting, &p1, &done)
        .unwrap();
    assert_eq!(outcome, VoteOutcome::Pass);
    assert_eq!(dao.registry.proposal_state(&p1), ProposalState::Processed);
    assert_eq!(dao.bank.balance_of(&applicant, &TokenId::loot()).unwrap(), 40);
    assert_eq!(dao.bank.balance_of(&GUILD, &TokenId::loot()).unwrap(), 60);

    let again = dao
        .financing
        .process(&mut dao.registry, &mut dao.bank, &dao.voting, &p1, &done)
        .unwrap_err();
    assert_eq!(again, DaoError::InvalidState(StateViolation::AlreadyProcessed));
    assert_eq!(dao.bank.balance_of(&applicant, &TokenId::loot()).unwrap(), 40);

    // Late results are rejected once processed.
    assert!(dao
        .voting
        .submit_result(&dao.registry, &module("voting"), &p1, tally, &done)
        .is_err());

    let processed = dao.registry.events().query(&EventQuery {
        kind: Some("proposal-processed"),
        ..Default::default()
    });
    assert_eq!(processed.len(), 1);
}

#[test]
fn test_sponsor_requires_active_member() {
    let mut dao = bootstrap();
    let p2 = ProposalId::from_label("P2");
    let ctx = BlockContext::new(2, 1_010);
    let request = FundingRequest {
        applicant: Address::from_label("applicant"),
        token: TokenId::loot(),
        amount: 1,
    };
    dao.financing.submit(&mut dao.registry, p2, request, &ctx).unwrap();

    let outsider = Address::from_label("outsider");
    assert!(matches!(
        dao.financing.sponsor(&mut dao.registry, &p2, &outsider, &ctx),
        Err(DaoError::Unauthorized { .. })
    ));
    assert_eq!(dao.registry.proposal_state(&p2), ProposalState::Submitted);

    let voter = dao.voters[2].address();
    dao.financing.sponsor(&mut dao.registry, &p2, &voter, &ctx).unwrap();
    assert_eq!(
        dao.financing.sponsor(&mut dao.registry, &p2, &voter, &ctx).unwrap_err(),
        DaoError::InvalidState(StateViolation::AlreadySponsored)
    );
}
