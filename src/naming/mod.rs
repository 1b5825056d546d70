//! Names of migration artifacts.
//!
//! Every schema object the migration tool creates carries its identity in its
//! name; there is no tracking table. This module is the single owner of that
//! grammar:
//!
//! ```text
//! archive      lhma_<YYYY>_<MM>_<DD>_<hh>_<mm>_<ss>_<mmm>_<table>
//! provisional  lhmn_<table>
//! trigger      lhmt_<ins|upd|del>_<table>
//! ```
//!
//! The archive stamp is UTC with millisecond precision and fixed width, so it
//! sorts lexicographically and the table portion after it is unambiguous.
//!
//! A name that would reach [`MAX_IDENTIFIER_LEN`] characters instead keeps a
//! bounded head of the table name followed by `_` and an 8-character digest of
//! the full table name, filling the limit exactly:
//!
//! ```text
//! lhmt_ins_<table head>_<digest>
//! ```
//!
//! Plain names are always shorter than the limit and digested names are
//! exactly at it, so the two forms never collide. A digested name does not
//! carry the full table name; [`ArtifactRecord::owned_by`] checks ownership by
//! re-encoding with the candidate table.

use std::fmt;

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use sha2::{Digest, Sha256};

/// MySQL identifier length limit, in characters.
pub const MAX_IDENTIFIER_LEN: usize = 64;

pub const ARCHIVE_PREFIX: &str = "lhma_";
pub const PROVISIONAL_PREFIX: &str = "lhmn_";
pub const TRIGGER_PREFIX: &str = "lhmt_";

/// Width of the archive timestamp component.
const STAMP_LEN: usize = 23;
const STAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S_%3f";
const STAMP_WIDTHS: [usize; 7] = [4, 2, 2, 2, 2, 2, 3];
/// Hex characters of table digest in names at the limit.
pub const DIGEST_LEN: usize = 8;

/// Row event a change-capture trigger fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
}

impl TriggerEvent {
    pub const ALL: [TriggerEvent; 3] = [
        TriggerEvent::Insert,
        TriggerEvent::Update,
        TriggerEvent::Delete,
    ];

    /// Abbreviation used in trigger names.
    pub fn abbreviation(self) -> &'static str {
        match self {
            TriggerEvent::Insert => "ins",
            TriggerEvent::Update => "upd",
            TriggerEvent::Delete => "del",
        }
    }

    fn from_abbreviation(s: &str) -> Option<Self> {
        match s {
            "ins" => Some(TriggerEvent::Insert),
            "upd" => Some(TriggerEvent::Update),
            "del" => Some(TriggerEvent::Delete),
            _ => None,
        }
    }
}

/// Kind of migration artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// The pre-migration table, renamed out of the way after a switch.
    Archive,
    /// A table mid-rename during an in-progress or interrupted switch.
    Provisional,
    /// A change-capture trigger on the original table.
    Trigger(TriggerEvent),
}

impl ArtifactKind {
    /// Which schema object list the artifact lives in.
    pub fn object(self) -> ObjectKind {
        match self {
            ArtifactKind::Archive | ArtifactKind::Provisional => ObjectKind::Table,
            ArtifactKind::Trigger(_) => ObjectKind::Trigger,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Archive => write!(f, "archive table"),
            ArtifactKind::Provisional => write!(f, "provisional table"),
            ArtifactKind::Trigger(event) => write!(f, "{} trigger", event.abbreviation()),
        }
    }
}

/// Schema object category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Table,
    Trigger,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Table => write!(f, "table"),
            ObjectKind::Trigger => write!(f, "trigger"),
        }
    }
}

/// A live schema object recognized as a migration artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub kind: ArtifactKind,
    /// Owning original table as encoded in the name. For a digested name
    /// this is only the head of the table name.
    pub table: String,
    /// Digest of the full table name, present only in names at the limit.
    pub table_digest: Option<String>,
    /// Only archive names carry a timestamp.
    pub timestamp: Option<DateTime<Utc>>,
    /// The live object name.
    pub name: String,
}

impl ArtifactRecord {
    /// True when re-encoding the record reproduces its name exactly.
    ///
    /// A name at the limit without a well-formed digest (for example a name
    /// cut at the limit by an older tool) never round-trips.
    pub fn round_trips(&self) -> bool {
        let Some(prefix) = self.name_prefix() else {
            return false;
        };
        let encoded = match &self.table_digest {
            Some(digest) => format!("{prefix}{}_{digest}", self.table),
            None => encode(&prefix, &self.table),
        };
        encoded == self.name
    }

    /// True when this artifact belongs to `table`: encoding the record's kind
    /// and timestamp for `table` reproduces the live name.
    pub fn owned_by(&self, table: &str) -> bool {
        self.name_prefix()
            .is_some_and(|prefix| encode(&prefix, table) == self.name)
    }

    fn name_prefix(&self) -> Option<String> {
        match (self.kind, self.timestamp) {
            (ArtifactKind::Archive, Some(timestamp)) => Some(archive_prefix(timestamp)),
            (ArtifactKind::Archive, None) => None,
            (ArtifactKind::Provisional, _) => Some(PROVISIONAL_PREFIX.to_string()),
            (ArtifactKind::Trigger(event), _) => Some(trigger_prefix(event)),
        }
    }
}

/// Name of the archive table for `table` created at `timestamp`.
pub fn archive_name(table: &str, timestamp: DateTime<Utc>) -> String {
    encode(&archive_prefix(timestamp), table)
}

/// Name of the provisional table for `table`.
pub fn provisional_name(table: &str) -> String {
    encode(PROVISIONAL_PREFIX, table)
}

/// Name of the change-capture trigger for `table` firing on `event`.
pub fn trigger_name(table: &str, event: TriggerEvent) -> String {
    encode(&trigger_prefix(event), table)
}

/// True if `name` may be an artifact of `table`, even one this module cannot
/// attribute exactly: the name contains `table`, or the table portion it
/// encodes is a head of `table`.
pub fn may_belong_to(name: &str, table: &str) -> bool {
    name.contains(table) || parse(name).is_some_and(|record| table.starts_with(&record.table))
}

/// Recover the artifact a name encodes, or `None` if it matches no grammar.
pub fn parse(name: &str) -> Option<ArtifactRecord> {
    if let Some(rest) = name.strip_prefix(ARCHIVE_PREFIX) {
        let stamp = rest.get(..STAMP_LEN)?;
        let table = rest.get(STAMP_LEN..)?.strip_prefix('_')?;
        let timestamp = parse_stamp(stamp)?;
        return record(ArtifactKind::Archive, table, Some(timestamp), name);
    }

    if let Some(table) = name.strip_prefix(PROVISIONAL_PREFIX) {
        return record(ArtifactKind::Provisional, table, None, name);
    }

    if let Some(rest) = name.strip_prefix(TRIGGER_PREFIX) {
        let (abbreviation, table) = rest.split_once('_')?;
        let event = TriggerEvent::from_abbreviation(abbreviation)?;
        return record(ArtifactKind::Trigger(event), table, None, name);
    }

    None
}

/// Free-function form of [`ArtifactRecord::round_trips`].
pub fn round_trips(record: &ArtifactRecord) -> bool {
    record.round_trips()
}

/// True if `name` starts with any artifact prefix, whether or not it parses.
pub fn has_artifact_prefix(name: &str) -> bool {
    [ARCHIVE_PREFIX, PROVISIONAL_PREFIX, TRIGGER_PREFIX]
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

fn record(
    kind: ArtifactKind,
    table: &str,
    timestamp: Option<DateTime<Utc>>,
    name: &str,
) -> Option<ArtifactRecord> {
    let (table, table_digest) = match split_digest(table) {
        Some((head, digest)) if name.chars().count() == MAX_IDENTIFIER_LEN => {
            (head, Some(digest.to_string()))
        }
        _ => (table, None),
    };
    if table.is_empty() {
        return None;
    }
    Some(ArtifactRecord {
        kind,
        table: table.to_string(),
        table_digest,
        timestamp,
        name: name.to_string(),
    })
}

fn archive_prefix(timestamp: DateTime<Utc>) -> String {
    format!("{ARCHIVE_PREFIX}{}_", timestamp.format(STAMP_FORMAT))
}

fn trigger_prefix(event: TriggerEvent) -> String {
    format!("{TRIGGER_PREFIX}{}_", event.abbreviation())
}

/// `prefix` followed by `table`, or by a head of `table` and its digest when
/// the plain form would reach the limit.
fn encode(prefix: &str, table: &str) -> String {
    let plain = format!("{prefix}{table}");
    if plain.chars().count() < MAX_IDENTIFIER_LEN {
        return plain;
    }

    let room = MAX_IDENTIFIER_LEN - prefix.chars().count() - DIGEST_LEN - 1;
    let head: String = table.chars().take(room).collect();
    format!("{prefix}{head}_{}", table_digest(table))
}

/// First four bytes of the SHA-256 of `table`, as lowercase hex.
fn table_digest(table: &str) -> String {
    let hash = Sha256::digest(table.as_bytes());
    hex::encode(&hash[..DIGEST_LEN / 2])
}

/// Split `<head>_<digest>` when the tail is a well-formed digest.
fn split_digest(table: &str) -> Option<(&str, &str)> {
    let (head, digest) = table.rsplit_once('_')?;
    let well_formed = digest.len() == DIGEST_LEN
        && digest
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    well_formed.then_some((head, digest))
}

fn parse_stamp(stamp: &str) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = stamp.split('_').collect();
    if parts.len() != STAMP_WIDTHS.len() {
        return None;
    }

    let mut fields = [0u32; 7];
    for ((part, width), field) in parts.iter().zip(STAMP_WIDTHS).zip(fields.iter_mut()) {
        if part.len() != width || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *field = part.parse().ok()?;
    }

    let [year, month, day, hour, minute, second, milli] = fields;
    let naive = NaiveDate::from_ymd_opt(year as i32, month, day)?
        .and_hms_milli_opt(hour, minute, second, milli)?;
    Some(naive.and_utc())
}

/// Immutable identity of one migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationIdentity {
    table: String,
    started_at: DateTime<Utc>,
    atomic_switch: bool,
}

impl MigrationIdentity {
    /// Identity for a migration of `table` starting now.
    pub fn new(table: impl Into<String>, atomic_switch: bool) -> Self {
        Self::at(table, Utc::now(), atomic_switch)
    }

    /// Identity with an explicit start time, truncated to milliseconds.
    pub fn at(table: impl Into<String>, started_at: DateTime<Utc>, atomic_switch: bool) -> Self {
        Self {
            table: table.into(),
            started_at: started_at.trunc_subsecs(3),
            atomic_switch,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Rename-based (atomic) switch rather than copy-then-rename-original-out.
    pub fn atomic_switch(&self) -> bool {
        self.atomic_switch
    }

    pub fn archive_name(&self) -> String {
        archive_name(&self.table, self.started_at)
    }

    pub fn provisional_name(&self) -> String {
        provisional_name(&self.table)
    }

    pub fn trigger_name(&self, event: TriggerEvent) -> String {
        trigger_name(&self.table, event)
    }

    /// Insert, update and delete trigger names, in that order.
    pub fn trigger_names(&self) -> [String; 3] {
        TriggerEvent::ALL.map(|event| self.trigger_name(event))
    }
}

#[cfg(test)]
mod tests;
