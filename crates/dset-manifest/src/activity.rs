//! Human-readable summaries and activity records for manifest changes.

use dset_ledger::{
    ActivityAction, ActivityDetailRecord, ActivityDetailType, ActivityRecord, ActivityType,
};
use dset_types::is_dir_key;

use crate::entry::StatusResult;

fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}

/// Summary line for a status, e.g. `2 new files, 1 deleted file`.
///
/// Files are counted when any file changed; otherwise directories are.
pub fn summarize(status: &StatusResult) -> String {
    let count = |keys: &[String], dirs: bool| keys.iter().filter(|k| is_dir_key(k) == dirs).count();
    let dirs = !status.has_file_changes();
    let (noun, nouns) = if dirs {
        ("directory", "directories")
    } else {
        ("file", "files")
    };

    let mut parts = Vec::new();
    let created = count(&status.created, dirs);
    if created > 0 {
        parts.push(plural(created, &format!("new {noun}"), &format!("new {nouns}")));
    }
    let modified = count(&status.modified, dirs);
    if modified > 0 {
        parts.push(plural(
            modified,
            &format!("modified {noun}"),
            &format!("modified {nouns}"),
        ));
    }
    let deleted = count(&status.deleted, dirs);
    if deleted > 0 {
        parts.push(plural(
            deleted,
            &format!("deleted {noun}"),
            &format!("deleted {nouns}"),
        ));
    }
    parts.join(", ")
}

/// Full activity/commit message for a sweep.
pub fn sweep_message(status: &StatusResult, upload: bool, extra_msg: Option<&str>) -> String {
    let summary = summarize(status);
    let summary = match (upload, summary.is_empty()) {
        (_, true) => String::new(),
        (true, false) => format!("Uploaded {summary}"),
        (false, false) => summary,
    };
    match (extra_msg, summary.is_empty()) {
        (Some(extra), true) => extra.to_string(),
        (Some(extra), false) => format!("{extra}\n\n{summary}"),
        (None, true) => "Updated dataset manifest".to_string(),
        (None, false) => summary,
    }
}

/// Activity record with one hidden detail per changed key.
///
/// Detail importance decreases with position so the first changes listed
/// are shown first.
pub fn sweep_record(status: &StatusResult, upload: bool, message: &str) -> ActivityRecord {
    let tag = if upload { "upload" } else { "save" };
    let mut record = ActivityRecord::new(ActivityType::Dataset, message)
        .with_importance(255)
        .with_tags([tag]);

    let changes = status
        .created
        .iter()
        .map(|k| (k, ActivityAction::Create, "Created"))
        .chain(status.modified.iter().map(|k| (k, ActivityAction::Edit, "Modified")))
        .chain(status.deleted.iter().map(|k| (k, ActivityAction::Delete, "Deleted")));
    for (i, (key, action, verb)) in changes.enumerate() {
        let importance = u8::try_from(255usize.saturating_sub(i)).unwrap_or(0);
        record.add_detail(
            ActivityDetailRecord::new(ActivityDetailType::Dataset, action)
                .with_importance(importance)
                .hidden()
                .add_value("text/markdown", format!("{verb} `{key}`")),
        );
    }
    record
}

/// Low-importance record for an explicit directory creation.
pub fn directory_record(key: &str, message: &str) -> ActivityRecord {
    let mut record = ActivityRecord::new(ActivityType::Dataset, message)
        .with_importance(0)
        .with_tags(["directory"]);
    record.add_detail(
        ActivityDetailRecord::new(ActivityDetailType::Dataset, ActivityAction::Create)
            .with_importance(0)
            .hidden()
            .add_value("text/markdown", format!("Created new empty directory `{key}`")),
    );
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(created: &[&str], modified: &[&str], deleted: &[&str]) -> StatusResult {
        let v = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect();
        StatusResult {
            created: v(created),
            modified: v(modified),
            deleted: v(deleted),
        }
    }

    #[test]
    fn singular_and_plural_files() {
        assert_eq!(summarize(&status(&["a"], &[], &[])), "1 new file");
        assert_eq!(
            summarize(&status(&["a", "b"], &["c"], &["d", "e", "f"])),
            "2 new files, 1 modified file, 3 deleted files"
        );
    }

    #[test]
    fn directories_counted_only_without_file_changes() {
        assert_eq!(summarize(&status(&["d/"], &[], &[])), "1 new directory");
        assert_eq!(
            summarize(&status(&[], &[], &["d/", "e/"])),
            "2 deleted directories"
        );
        assert_eq!(summarize(&status(&["d/", "d/a"], &[], &[])), "1 new file");
    }

    #[test]
    fn upload_prefix_and_headline() {
        let st = status(&["a", "b"], &[], &[]);
        assert_eq!(sweep_message(&st, true, None), "Uploaded 2 new files");
        assert_eq!(
            sweep_message(&st, false, Some("Moved file `a` to `b`")),
            "Moved file `a` to `b`\n\n2 new files"
        );
        assert_eq!(
            sweep_message(&StatusResult::default(), false, Some("headline")),
            "headline"
        );
    }

    #[test]
    fn detail_importance_decreases() {
        let st = status(&["a"], &["b"], &["c"]);
        let record = sweep_record(&st, false, "msg");
        assert_eq!(record.tags, vec!["save"]);
        let importances: Vec<u8> = record.details.iter().map(|d| d.importance).collect();
        assert_eq!(importances, vec![255, 254, 253]);
        assert!(record.details.iter().all(|d| !d.show));
        assert_eq!(record.details[2].action, ActivityAction::Delete);
    }

    #[test]
    fn detail_importance_saturates() {
        let keys: Vec<String> = (0..300).map(|i| format!("f{i}")).collect();
        let st = StatusResult {
            created: keys,
            ..Default::default()
        };
        let record = sweep_record(&st, true, "msg");
        assert_eq!(record.details.last().unwrap().importance, 0);
        assert_eq!(record.tags, vec!["upload"]);
    }
}
