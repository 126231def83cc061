// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::checkpoint::{ObservedFiles, ScanCheckpoint};
use crate::types::ArtifactKind;

fn cp(leaf: &str, env: Option<&str>, rcpt: Option<&str>) -> ScanCheckpoint {
    ScanCheckpoint {
        last_scanned_leaf: leaf.to_string(),
        last_envelope: env.map(String::from),
        last_receipt: rcpt.map(String::from),
    }
}

fn walked(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

#[test]
fn test_admits_child_on_branch_only() {
    let c = cp("/2024/03/02/10/15", None, None);

    // Year level: everything from 2024 on.
    assert!(!c.admits_child(&[], "2023"));
    assert!(c.admits_child(&[], "2024"));
    assert!(c.admits_child(&[], "2025"));

    // Inside 2024/03/02/10 only minutes >= 15.
    let branch = walked(&["2024", "03", "02", "10"]);
    assert!(!c.admits_child(&branch, "14"));
    assert!(c.admits_child(&branch, "15"));
    assert!(c.admits_child(&branch, "16"));

    // Off the branch (a later hour) every minute counts.
    let later = walked(&["2024", "03", "02", "11"]);
    assert!(c.admits_child(&later, "00"));
}

#[test]
fn test_admits_file_only_filters_checkpoint_leaf() {
    let c = cp("/2024/03/02/10/15", Some("msg-30123000"), None);

    assert!(!c.admits_file("/2024/03/02/10/15", ArtifactKind::Envelope, "msg-30123000"));
    assert!(!c.admits_file("/2024/03/02/10/15", ArtifactKind::Envelope, "msg-10000000"));
    assert!(c.admits_file("/2024/03/02/10/15", ArtifactKind::Envelope, "msg-30123001"));
    assert!(c.admits_file("/2024/03/02/10/15", ArtifactKind::Receipt, "rcpt-00000000"));
    assert!(c.admits_file("/2024/03/02/10/16", ArtifactKind::Envelope, "msg-00000000"));
}

#[test]
fn test_advance_first_walk() {
    let observed = ObservedFiles { envelope: Some("msg-1".into()), receipt: None };
    let next = ScanCheckpoint::advance(None, "/2024/03/02/10/15", observed).unwrap();
    assert_eq!(next, cp("/2024/03/02/10/15", Some("msg-1"), None));
}

#[test]
fn test_advance_same_leaf_keeps_untouched_cursor() {
    let prev = cp("/2024/03/02/10/15", Some("msg-30123000"), Some("rcpt-10000000"));

    let observed = ObservedFiles { envelope: Some("msg-30123001".into()), receipt: None };
    let next = ScanCheckpoint::advance(Some(&prev), "/2024/03/02/10/15", observed).unwrap();
    assert_eq!(next, cp("/2024/03/02/10/15", Some("msg-30123001"), Some("rcpt-10000000")));

    assert!(ScanCheckpoint::advance(Some(&prev), "/2024/03/02/10/15", ObservedFiles::default()).is_none());
}

#[test]
fn test_advance_new_leaf_replaces_cursors() {
    let prev = cp("/2024/03/02/10/15", Some("msg-30123000"), Some("rcpt-10000000"));
    let observed = ObservedFiles { envelope: Some("msg-00001000".into()), receipt: None };

    let next = ScanCheckpoint::advance(Some(&prev), "/2024/03/02/10/16", observed).unwrap();
    assert_eq!(next, cp("/2024/03/02/10/16", Some("msg-00001000"), None));
    assert!(next.last_scanned_leaf >= prev.last_scanned_leaf);
}

#[test]
fn test_checkpoint_serde_shape() {
    let c = cp("/2024/03/02/10/15", Some("msg-30123000"), None);
    let json = serde_json::to_value(&c).unwrap();
    assert_eq!(json["last_scanned_leaf"], "/2024/03/02/10/15");
    assert!(json["last_receipt"].is_null());
}
