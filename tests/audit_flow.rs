use ballot_audit::{
    hash, hash_pair, verify_proof, verify_proof_json, verify_replay_bundle,
    verify_snapshot_checksum, AuditConfig, BallotVerificationManager, Digest, FixedClock,
    MerkleProof, MerkleTree, ReplayBundle, SnapshotChecksum,
};
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;

fn setup() -> (BallotVerificationManager, Arc<FixedClock>) {
    let start = Utc.with_ymd_and_hms(2025, 1, 20, 9, 30, 0).single().unwrap();
    let clock = Arc::new(FixedClock::new(start));
    let manager = BallotVerificationManager::with_clock(AuditConfig::default(), clock.clone());
    (manager, clock)
}

#[test]
fn ballots_stay_provable_across_later_additions() {
    let (manager, clock) = setup();
    let ballots = [
        ("B1", json!({"rank": ["alice", "bob", "carol"]})),
        ("B2", json!({"rank": ["bob", "alice"]})),
        ("B3", json!({"rank": ["carol"]})),
        ("B4", json!({"rank": ["alice", "carol"]})),
    ];
    for (id, payload) in &ballots[..3] {
        manager.add_ballot("P1", id, payload).unwrap();
        clock.advance(Duration::milliseconds(250));
    }
    let root1 = manager.get_root("P1").unwrap();
    manager.add_ballot("P1", ballots[3].0, &ballots[3].1).unwrap();
    let root2 = manager.get_root("P1").unwrap();
    assert_ne!(root1, root2);

    let (b1_id, b1_payload) = &ballots[0];
    assert!(manager
        .verify_ballot_inclusion("P1", b1_id, b1_payload, &root2)
        .unwrap());
    assert!(manager
        .verify_ballot_inclusion("P1", b1_id, b1_payload, &root1)
        .unwrap());
}

#[test]
fn missing_ballot_is_absent_not_an_error() {
    let (manager, _) = setup();
    manager.add_ballot("P1", "B1", &json!({"rank": ["x"]})).unwrap();
    assert!(manager
        .generate_proof("P1", "nonexistent-ballot", &json!({}))
        .unwrap()
        .is_none());
    let root = manager.get_root("P1").unwrap();
    assert!(!manager
        .verify_ballot_inclusion("P1", "nonexistent-ballot", &json!({}), &root)
        .unwrap());
}

#[test]
fn issued_proofs_remain_valid_out_of_band() {
    let (manager, clock) = setup();
    manager.add_ballot("P1", "B1", &json!(1)).unwrap();
    clock.advance(Duration::seconds(1));
    manager.add_ballot("P1", "B2", &json!(2)).unwrap();
    let proof = manager.generate_proof("P1", "B1", &json!(1)).unwrap().unwrap();
    let published = proof.to_json_string().unwrap();

    clock.advance(Duration::seconds(1));
    manager.add_ballot("P1", "B3", &json!(3)).unwrap();

    let received = MerkleProof::from_json_str(&published).unwrap();
    assert!(verify_proof(&received));
    assert!(verify_proof_json(&published));
    assert_ne!(Some(received.root), manager.get_root("P1"));
}

#[test]
fn three_leaf_root_matches_explicit_computation() {
    let leaves: Vec<Digest> = ["L1", "L2", "L3"].iter().map(|l| hash(l.as_bytes())).collect();
    let mut tree = MerkleTree::from_leaves(leaves.clone());
    let left = hash(format!("{}{}", leaves[0], leaves[1]).as_bytes());
    let right = hash(format!("{}{}", leaves[2], leaves[2]).as_bytes());
    let root = hash(format!("{left}{right}").as_bytes());
    assert_eq!(tree.root(), root);
    assert_eq!(root, hash_pair(&left, &right));
}

#[test]
fn closing_artifacts_survive_a_json_roundtrip() {
    let (manager, clock) = setup();
    for n in 0..7 {
        manager
            .add_ballot("P1", &format!("B{n}"), &json!({"rank": [n % 3]}))
            .unwrap();
        clock.advance(Duration::seconds(2));
    }
    let candidates = vec!["2".to_string(), "0".to_string(), "1".to_string()];
    let snapshot = manager
        .generate_snapshot_checksum(
            "P1",
            &candidates,
            &hash(b"ballot-set").to_hex(),
            &json!([{"round": 1, "eliminated": "2"}, {"round": 2, "winner": "0"}]),
        )
        .unwrap();
    let bundle = manager.generate_replay_data("P1", "irv-v1").unwrap();
    assert_eq!(snapshot.merkle_root, bundle.merkle_root);

    let snapshot: SnapshotChecksum =
        serde_json::from_str(&serde_json::to_string(&snapshot).unwrap()).unwrap();
    let bundle: ReplayBundle =
        serde_json::from_str(&serde_json::to_string(&bundle).unwrap()).unwrap();
    assert!(verify_snapshot_checksum(&snapshot));
    assert!(verify_replay_bundle(&bundle));
    assert_eq!(bundle.commitments.len(), 7);
    assert_eq!(bundle.commitments[3].ballot_id, "B3");
}

#[test]
fn snapshot_checksum_ignores_candidate_order() {
    let (manager, _) = setup();
    let rounds = json!({"winner": "X"});
    let ordered: Vec<String> = ["X", "Y", "Z"].iter().map(|s| s.to_string()).collect();
    let shuffled: Vec<String> = ["Z", "X", "Y"].iter().map(|s| s.to_string()).collect();
    let a = manager
        .generate_snapshot_checksum("P1", &ordered, "00", &rounds)
        .unwrap();
    let b = manager
        .generate_snapshot_checksum("P1", &shuffled, "00", &rounds)
        .unwrap();
    assert_eq!(a.checksum, b.checksum);
    assert_ne!(a.candidate_ids, b.candidate_ids);
}
