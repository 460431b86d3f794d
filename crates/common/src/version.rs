// Version history ledger for artifacts.
//
// The ledger owns an artifact's live state plus a bounded, newest-first
// sequence of historical snapshots. Every title/content-changing
// mutation snapshots the pre-mutation state before the live fields are
// overwritten; metadata-only changes never bump the version or record
// history. `total_edit_count` keeps counting past the retention cap, so
// it reflects lifetime edits even after old snapshots are evicted.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::types::{
    Metadata, VersionDiff, VersionSnapshot, VersionSummary, RETENTION_CAP, VERSION_PAGE_LIMIT,
};

/// The live (current) state of an artifact as the ledger sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentState {
    pub title: String,
    pub content: String,
    pub metadata: Metadata,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Result of applying a mutation through the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Title and content unchanged: no snapshot, no version bump.
    /// Metadata and `updated_at` may still have been refreshed.
    Unchanged { metadata_changed: bool },
    /// Title or content changed: pre-mutation state snapshotted,
    /// version advanced by one.
    Edited { new_version: i64, title_changed: bool, content_changed: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VersionLedger {
    current: CurrentState,
    /// Newest-first, capped at [`RETENTION_CAP`].
    history: VecDeque<VersionSnapshot>,
    total_edit_count: i64,
}

impl VersionLedger {
    /// Ledger for a freshly created artifact: version 1, no history.
    pub fn new_artifact(
        title: String,
        content: String,
        metadata: Metadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            current: CurrentState { title, content, metadata, version: 1, updated_at: now },
            history: VecDeque::new(),
            total_edit_count: 0,
        }
    }

    /// Rebuilds a ledger from persisted row state. `history` is expected
    /// newest-first, as the stores persist it.
    pub fn from_parts(
        current: CurrentState,
        history: Vec<VersionSnapshot>,
        total_edit_count: i64,
    ) -> Self {
        let mut history: VecDeque<VersionSnapshot> = history.into();
        history.truncate(RETENTION_CAP);
        Self { current, history, total_edit_count }
    }

    pub fn current(&self) -> &CurrentState {
        &self.current
    }

    pub fn version(&self) -> i64 {
        self.current.version
    }

    pub fn total_edit_count(&self) -> i64 {
        self.total_edit_count
    }

    /// Snapshots persisted with the artifact row, newest first.
    pub fn history(&self) -> impl Iterator<Item = &VersionSnapshot> {
        self.history.iter()
    }

    /// Applies a mutation: snapshots the pre-mutation state and advances
    /// the version when title or content changed, otherwise leaves the
    /// version and history untouched. The live fields are updated either
    /// way so metadata-only changes still persist.
    pub fn record_mutation(
        &mut self,
        new_title: String,
        new_content: String,
        new_metadata: Metadata,
        now: DateTime<Utc>,
    ) -> MutationOutcome {
        let title_changed = self.current.title != new_title;
        let content_changed = self.current.content != new_content;
        let metadata_changed = self.current.metadata != new_metadata;

        if !title_changed && !content_changed {
            if metadata_changed {
                self.current.metadata = new_metadata;
                self.current.updated_at = now;
            }
            return MutationOutcome::Unchanged { metadata_changed };
        }

        self.history.push_front(VersionSnapshot {
            version: self.current.version,
            title: self.current.title.clone(),
            content: self.current.content.clone(),
            metadata: self.current.metadata.clone(),
            updated_at: self.current.updated_at,
            content_length: self.current.content.chars().count(),
            title_changed,
            content_changed,
        });
        self.history.truncate(RETENTION_CAP);

        let new_version = self.current.version + 1;
        self.current = CurrentState {
            title: new_title,
            content: new_content,
            metadata: new_metadata,
            version: new_version,
            updated_at: now,
        };
        self.total_edit_count += 1;

        MutationOutcome::Edited { new_version, title_changed, content_changed }
    }

    /// Looks up a version by number. The current version is synthesized
    /// from live state (change flags false: there is nothing to compare
    /// against within this call); older versions are scanned from
    /// history. Versions evicted by the retention cap are gone — that is
    /// the accepted lossy-history tradeoff.
    pub fn get_version(&self, version_number: i64) -> Option<VersionSnapshot> {
        if version_number == self.current.version {
            return Some(VersionSnapshot {
                version: self.current.version,
                title: self.current.title.clone(),
                content: self.current.content.clone(),
                metadata: self.current.metadata.clone(),
                updated_at: self.current.updated_at,
                content_length: self.current.content.chars().count(),
                title_changed: false,
                content_changed: false,
            });
        }

        self.history.iter().find(|snapshot| snapshot.version == version_number).cloned()
    }

    /// Newest-first version summaries, at most `limit` (default page
    /// size [`VERSION_PAGE_LIMIT`] — intentionally smaller than the
    /// retention depth).
    pub fn list_versions(&self, limit: Option<usize>) -> Vec<VersionSummary> {
        self.history
            .iter()
            .take(limit.unwrap_or(VERSION_PAGE_LIMIT))
            .map(|snapshot| VersionSummary {
                version: snapshot.version,
                title: snapshot.title.clone(),
                updated_at: snapshot.updated_at,
                content_length: snapshot.content_length,
                changes: change_tags(snapshot),
            })
            .collect()
    }

    /// Restores to a prior version by replaying its fields through the
    /// normal mutation path: the pre-restore state is snapshotted and
    /// the version moves forward, never backward.
    pub fn restore(&mut self, version_number: i64, now: DateTime<Utc>) -> Option<MutationOutcome> {
        let target = self.get_version(version_number)?;
        Some(self.record_mutation(target.title, target.content, target.metadata, now))
    }

    /// Summary-level comparison of two versions.
    pub fn diff(&self, from_version: i64, to_version: i64) -> Option<VersionDiff> {
        let from = self.get_version(from_version)?;
        let to = self.get_version(to_version)?;

        let title_changed = from.title != to.title;
        Some(VersionDiff {
            from_version,
            to_version,
            title_changed,
            old_title: title_changed.then(|| from.title.clone()),
            new_title: title_changed.then(|| to.title.clone()),
            content_length_change: to.content_length as i64 - from.content_length as i64,
            metadata_changed: from.metadata != to.metadata,
        })
    }
}

fn change_tags(snapshot: &VersionSnapshot) -> Vec<String> {
    let mut changes = Vec::new();
    if snapshot.title_changed {
        changes.push("title".to_owned());
    }
    if snapshot.content_changed {
        changes.push("content".to_owned());
    }
    changes
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).single().expect("valid timestamp")
    }

    fn metadata(pairs: &[(&str, &str)]) -> Metadata {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), json!(v))).collect()
    }

    fn fresh() -> VersionLedger {
        VersionLedger::new_artifact(
            "Title".to_owned(),
            "original content".to_owned(),
            Metadata::new(),
            at(0),
        )
    }

    #[test]
    fn new_artifact_starts_at_version_one() {
        let ledger = fresh();
        assert_eq!(ledger.version(), 1);
        assert_eq!(ledger.total_edit_count(), 0);
        assert_eq!(ledger.history().count(), 0);
    }

    #[test]
    fn n_content_edits_advance_version_by_n() {
        let mut ledger = fresh();
        for i in 1..=5 {
            let outcome = ledger.record_mutation(
                "Title".to_owned(),
                format!("content rev {i}"),
                Metadata::new(),
                at(i),
            );
            assert!(matches!(outcome, MutationOutcome::Edited { .. }));
        }
        assert_eq!(ledger.version(), 6);
        assert_eq!(ledger.total_edit_count(), 5);
        assert_eq!(ledger.history().count(), 5);
    }

    #[test]
    fn metadata_only_mutation_does_not_bump_version() {
        let mut ledger = fresh();
        let outcome = ledger.record_mutation(
            "Title".to_owned(),
            "original content".to_owned(),
            metadata(&[("tag", "draft")]),
            at(1),
        );

        assert_eq!(outcome, MutationOutcome::Unchanged { metadata_changed: true });
        assert_eq!(ledger.version(), 1);
        assert_eq!(ledger.total_edit_count(), 0);
        assert_eq!(ledger.history().count(), 0);
        assert_eq!(ledger.current().metadata, metadata(&[("tag", "draft")]));
        assert_eq!(ledger.current().updated_at, at(1));
    }

    #[test]
    fn identical_mutation_is_a_full_noop() {
        let mut ledger = fresh();
        let outcome = ledger.record_mutation(
            "Title".to_owned(),
            "original content".to_owned(),
            Metadata::new(),
            at(1),
        );

        assert_eq!(outcome, MutationOutcome::Unchanged { metadata_changed: false });
        // Not even updated_at moves for a complete no-op.
        assert_eq!(ledger.current().updated_at, at(0));
    }

    #[test]
    fn snapshot_preserves_pre_mutation_state() {
        let mut ledger = fresh();
        ledger.record_mutation(
            "New Title".to_owned(),
            "new content".to_owned(),
            Metadata::new(),
            at(1),
        );

        let snapshot = ledger.get_version(1).expect("version 1 should be retained");
        assert_eq!(snapshot.title, "Title");
        assert_eq!(snapshot.content, "original content");
        assert_eq!(snapshot.updated_at, at(0));
        assert_eq!(snapshot.content_length, "original content".chars().count());
        assert!(snapshot.title_changed);
        assert!(snapshot.content_changed);
    }

    #[test]
    fn get_current_version_reflects_live_state() {
        let mut ledger = fresh();
        ledger.record_mutation(
            "Title".to_owned(),
            "second draft".to_owned(),
            Metadata::new(),
            at(1),
        );

        let current = ledger.get_version(2).expect("current version is addressable");
        assert_eq!(current.content, "second draft");
        assert!(!current.title_changed);
        assert!(!current.content_changed);
    }

    #[test]
    fn unknown_version_is_not_found() {
        let ledger = fresh();
        assert!(ledger.get_version(0).is_none());
        assert!(ledger.get_version(7).is_none());
    }

    #[test]
    fn retention_cap_evicts_oldest_snapshots() {
        let mut ledger = fresh();
        for i in 1..=25 {
            ledger.record_mutation(
                "Title".to_owned(),
                format!("rev {i}"),
                Metadata::new(),
                at(i),
            );
        }

        assert_eq!(ledger.version(), 26);
        assert_eq!(ledger.total_edit_count(), 25);
        assert_eq!(ledger.history().count(), RETENTION_CAP);

        // Page size stays below the retention depth.
        let summaries = ledger.list_versions(None);
        assert_eq!(summaries.len(), VERSION_PAGE_LIMIT);
        assert_eq!(summaries[0].version, 25);

        // Version 3 fell off the back of the 20-entry window.
        assert!(ledger.get_version(3).is_none());
        assert!(ledger.get_version(6).is_some());
    }

    #[test]
    fn list_versions_is_newest_first_with_change_tags() {
        let mut ledger = fresh();
        ledger.record_mutation(
            "Renamed".to_owned(),
            "original content".to_owned(),
            Metadata::new(),
            at(1),
        );
        ledger.record_mutation(
            "Renamed".to_owned(),
            "reworked content".to_owned(),
            Metadata::new(),
            at(2),
        );

        let summaries = ledger.list_versions(None);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].version, 2);
        assert_eq!(summaries[0].changes, vec!["content"]);
        assert_eq!(summaries[1].version, 1);
        assert_eq!(summaries[1].changes, vec!["title"]);
    }

    #[test]
    fn restore_moves_the_version_forward() {
        let mut ledger = fresh();
        for i in 1..=5 {
            ledger.record_mutation(
                "Title".to_owned(),
                format!("rev {i}"),
                Metadata::new(),
                at(i),
            );
        }
        assert_eq!(ledger.version(), 6);

        let outcome = ledger.restore(1, at(10)).expect("version 1 should be restorable");
        assert!(matches!(outcome, MutationOutcome::Edited { new_version: 7, .. }));
        assert_eq!(ledger.version(), 7);
        assert_eq!(ledger.current().content, "original content");
        // The pre-restore state became a snapshot.
        assert_eq!(ledger.get_version(6).expect("version 6 retained").content, "rev 5");
    }

    #[test]
    fn restore_of_current_version_is_a_noop() {
        let mut ledger = fresh();
        let outcome = ledger.restore(1, at(1)).expect("current version resolves");
        assert_eq!(outcome, MutationOutcome::Unchanged { metadata_changed: false });
        assert_eq!(ledger.version(), 1);
    }

    #[test]
    fn restore_of_missing_version_is_none() {
        let mut ledger = fresh();
        assert!(ledger.restore(9, at(1)).is_none());
    }

    #[test]
    fn diff_reports_title_and_length_changes() {
        let mut ledger = fresh();
        ledger.record_mutation(
            "Renamed".to_owned(),
            "longer content than before".to_owned(),
            metadata(&[("stage", "final")]),
            at(1),
        );

        let diff = ledger.diff(1, 2).expect("both versions resolve");
        assert!(diff.title_changed);
        assert_eq!(diff.old_title.as_deref(), Some("Title"));
        assert_eq!(diff.new_title.as_deref(), Some("Renamed"));
        assert_eq!(
            diff.content_length_change,
            "longer content than before".chars().count() as i64
                - "original content".chars().count() as i64
        );
        assert!(diff.metadata_changed);
    }

    #[test]
    fn diff_is_antisymmetric_in_length_change() {
        let mut ledger = fresh();
        ledger.record_mutation("Title".to_owned(), "short".to_owned(), Metadata::new(), at(1));

        let forward = ledger.diff(1, 2).expect("diff forward");
        let backward = ledger.diff(2, 1).expect("diff backward");
        assert_eq!(forward.content_length_change, -backward.content_length_change);
        assert!(forward.old_title.is_none());
        assert!(forward.new_title.is_none());
    }

    #[test]
    fn diff_with_missing_version_is_none() {
        let ledger = fresh();
        assert!(ledger.diff(1, 2).is_none());
        assert!(ledger.diff(2, 1).is_none());
    }

    #[test]
    fn from_parts_truncates_oversized_history() {
        let snapshots: Vec<VersionSnapshot> = (1..=30)
            .rev()
            .map(|version| VersionSnapshot {
                version,
                title: "t".to_owned(),
                content: "c".to_owned(),
                metadata: Metadata::new(),
                updated_at: at(0),
                content_length: 1,
                title_changed: false,
                content_changed: true,
            })
            .collect();

        let ledger = VersionLedger::from_parts(
            CurrentState {
                title: "t".to_owned(),
                content: "c".to_owned(),
                metadata: Metadata::new(),
                version: 31,
                updated_at: at(0),
            },
            snapshots,
            30,
        );
        assert_eq!(ledger.history().count(), RETENTION_CAP);
        assert_eq!(ledger.total_edit_count(), 30);
    }
}
