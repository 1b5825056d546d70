use super::*;
use chrono::{Duration, TimeZone};

fn stamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap() + Duration::milliseconds(42)
}

#[test]
fn test_archive_name_format() {
    assert_eq!(
        archive_name("users", stamp()),
        "lhma_2024_03_07_14_05_09_042_users"
    );
}

#[test]
fn test_provisional_and_trigger_names() {
    assert_eq!(provisional_name("users"), "lhmn_users");
    assert_eq!(trigger_name("users", TriggerEvent::Insert), "lhmt_ins_users");
    assert_eq!(trigger_name("users", TriggerEvent::Update), "lhmt_upd_users");
    assert_eq!(trigger_name("users", TriggerEvent::Delete), "lhmt_del_users");
}

#[test]
fn test_archive_round_trip() {
    let times = [
        stamp(),
        Utc.with_ymd_and_hms(1999, 12, 31, 23, 59, 59).unwrap() + Duration::milliseconds(999),
        Utc.with_ymd_and_hms(2038, 1, 1, 0, 0, 0).unwrap(),
    ];
    for table in ["users", "order_items", "a", "lhma_nested"] {
        for timestamp in times {
            let name = archive_name(table, timestamp);
            let record = parse(&name).unwrap();
            assert_eq!(record.kind, ArtifactKind::Archive);
            assert_eq!(record.table, table);
            assert_eq!(record.timestamp, Some(timestamp));
            assert_eq!(record.name, name);
            assert!(round_trips(&record));
        }
    }
}

#[test]
fn test_provisional_and_trigger_round_trip() {
    for table in ["users", "permissions", "with_under_scores"] {
        let record = parse(&provisional_name(table)).unwrap();
        assert_eq!(record.kind, ArtifactKind::Provisional);
        assert_eq!(record.table, table);
        assert_eq!(record.timestamp, None);
        assert!(record.round_trips());

        for event in TriggerEvent::ALL {
            let record = parse(&trigger_name(table, event)).unwrap();
            assert_eq!(record.kind, ArtifactKind::Trigger(event));
            assert_eq!(record.table, table);
            assert!(record.round_trips());
        }
    }
}

#[test]
fn test_kinds_never_cross_parse() {
    let table = "users";
    let names = [
        (ArtifactKind::Archive, archive_name(table, stamp())),
        (ArtifactKind::Provisional, provisional_name(table)),
        (ArtifactKind::Trigger(TriggerEvent::Insert), trigger_name(table, TriggerEvent::Insert)),
        (ArtifactKind::Trigger(TriggerEvent::Update), trigger_name(table, TriggerEvent::Update)),
        (ArtifactKind::Trigger(TriggerEvent::Delete), trigger_name(table, TriggerEvent::Delete)),
    ];
    for (kind, name) in &names {
        assert_eq!(parse(name).map(|r| r.kind), Some(*kind), "{name}");
    }
}

#[test]
fn test_distinct_timestamps_give_distinct_names() {
    let a = archive_name("users", stamp());
    let b = archive_name("users", stamp() + Duration::milliseconds(1));
    assert_ne!(a, b);
    // Fixed-width stamps sort chronologically.
    assert!(a < b);
}

#[test]
fn test_parse_rejects_non_artifacts() {
    for name in [
        "users",
        "lhm_users",
        "lhmn_",
        "lhmt_ins_",
        "lhmt_xyz_users",
        "lhmt_insusers",
        "lhma_users",
        "lhma_2024_03_07_14_05_09_042",
        "lhma_2024_03_07_14_05_09_042_",
        "lhma_2024_03_07_14_05_09_042users",
        "lhma_2024_13_07_14_05_09_042_users",
        "lhma_2024_03_07_14_05_09_04x_users",
        "lhma_24_03_07_14_05_09_0042_users",
        "LHMA_2024_03_07_14_05_09_042_users",
    ] {
        assert!(parse(name).is_none(), "{name} should not parse");
    }
}

#[test]
fn test_long_names_keep_a_digest_of_the_table() {
    let (sixty, eighty) = ("t".repeat(60), "t".repeat(80));
    for table in ["customer_notification_preferences_x_a", sixty.as_str(), eighty.as_str()] {
        let name = archive_name(table, stamp());
        assert_eq!(name.chars().count(), MAX_IDENTIFIER_LEN);

        let record = parse(&name).unwrap();
        assert_eq!(record.kind, ArtifactKind::Archive);
        assert_eq!(record.timestamp, Some(stamp()));
        assert_eq!(record.table_digest.as_ref().map(String::len), Some(DIGEST_LEN));
        assert!(table.starts_with(&record.table));
        assert!(record.round_trips());
        assert!(record.owned_by(table));
        assert!(!record.owned_by(&record.table));

        for event in TriggerEvent::ALL {
            let record = parse(&trigger_name(table, event)).unwrap();
            assert_eq!(record.kind, ArtifactKind::Trigger(event));
            assert!(record.round_trips());
            assert!(record.owned_by(table));
        }
    }
}

#[test]
fn test_long_table_names_do_not_collide() {
    let a = "customer_notification_preferences_x_a";
    let b = "customer_notification_preferences_x_b";
    assert_ne!(archive_name(a, stamp()), archive_name(b, stamp()));
    assert_ne!(provisional_name(&a.repeat(2)), provisional_name(&b.repeat(2)));

    let record = parse(&archive_name(a, stamp())).unwrap();
    assert!(record.owned_by(a));
    assert!(!record.owned_by(b));
}

#[test]
fn test_plain_names_stay_below_limit() {
    // 55 characters after the 9-character trigger prefix reaches the limit.
    let fits = "t".repeat(54);
    assert_eq!(trigger_name(&fits, TriggerEvent::Insert), format!("lhmt_ins_{fits}"));
    let record = parse(&trigger_name(&fits, TriggerEvent::Insert)).unwrap();
    assert_eq!(record.table, fits);
    assert_eq!(record.table_digest, None);

    let reaches = "t".repeat(55);
    let name = trigger_name(&reaches, TriggerEvent::Insert);
    assert_eq!(name.chars().count(), MAX_IDENTIFIER_LEN);
    assert_ne!(name, format!("lhmt_ins_{reaches}"));
}

#[test]
fn test_names_cut_at_limit_do_not_round_trip() {
    let cut: String = format!("lhmt_del_{}", "t".repeat(80))
        .chars()
        .take(MAX_IDENTIFIER_LEN)
        .collect();
    let record = parse(&cut).unwrap();
    assert_eq!(record.table_digest, None);
    assert!(!record.round_trips());
    assert!(!record.owned_by(&"t".repeat(80)));
    assert!(may_belong_to(&cut, &"t".repeat(80)));
    assert!(!may_belong_to(&cut, "users"));
}

#[test]
fn test_digested_names_respect_char_boundaries() {
    let table = "é".repeat(70);
    let name = provisional_name(&table);
    assert_eq!(name.chars().count(), MAX_IDENTIFIER_LEN);
    assert!(name.starts_with(PROVISIONAL_PREFIX));
    assert!(parse(&name).unwrap().owned_by(&table));
}

#[test]
fn test_has_artifact_prefix() {
    assert!(has_artifact_prefix("lhma_whatever"));
    assert!(has_artifact_prefix("lhmn_users"));
    assert!(has_artifact_prefix("lhmt_bogus"));
    assert!(!has_artifact_prefix("users"));
    assert!(!has_artifact_prefix("lhm_users"));
}

#[test]
fn test_migration_identity() {
    let started = stamp() + Duration::microseconds(750);
    let identity = MigrationIdentity::at("users", started, true);

    assert_eq!(identity.table(), "users");
    assert_eq!(identity.started_at(), stamp());
    assert!(identity.atomic_switch());
    assert_eq!(identity.archive_name(), archive_name("users", stamp()));
    assert_eq!(identity.provisional_name(), "lhmn_users");
    assert_eq!(
        identity.trigger_names(),
        ["lhmt_ins_users", "lhmt_upd_users", "lhmt_del_users"].map(String::from)
    );

    let record = parse(&identity.archive_name()).unwrap();
    assert_eq!(record.timestamp, Some(identity.started_at()));
}

#[test]
fn test_artifact_kind_object() {
    assert_eq!(ArtifactKind::Archive.object(), ObjectKind::Table);
    assert_eq!(ArtifactKind::Provisional.object(), ObjectKind::Table);
    assert_eq!(
        ArtifactKind::Trigger(TriggerEvent::Update).object(),
        ObjectKind::Trigger
    );
}
