use fileferry_core::{Entry, EntryId, EntryKind, StoreError, TaskConfig};
use std::time::Duration;

#[test]
fn test_entry_id_operations() {
    let id = EntryId::new("/home/user/docs");

    assert_eq!(id.as_str(), "/home/user/docs");
    assert_eq!(id.len(), 15);
    assert_eq!(id.parent(), Some("/home/user"));
    assert_eq!(id.join("a.txt"), EntryId::from("/home/user/docs/a.txt"));
    assert_eq!(id.to_string(), "/home/user/docs");
}

#[test]
fn test_entry_kind_discrimination() {
    let file = Entry::file("/data/report.pdf", 2048);
    assert!(file.is_file());
    assert!(!file.is_directory());
    assert_eq!(file.kind, EntryKind::File);
    assert_eq!(file.size, 2048);

    let dir = Entry::directory("/data/photos/");
    assert!(dir.is_directory());
    assert_eq!(dir.name, "photos");
    assert_eq!(dir.size, 0);
}

#[test]
fn test_entry_stem() {
    assert_eq!(Entry::file("/a/archive.tar.gz", 1).stem(), "archive.tar");
    assert_eq!(Entry::file("/a/README", 1).stem(), "README");
    assert_eq!(Entry::file("/a/.profile", 1).stem(), ".profile");
}

#[test]
fn test_entry_serialization() {
    let entry = Entry::file("/tmp/x.bin", 7);
    let json = serde_json::to_string(&entry).unwrap();
    assert!(json.contains("\"id\":\"/tmp/x.bin\""));

    let back: Entry = serde_json::from_str(&json).unwrap();
    assert_eq!(back, entry);
}

#[test]
fn test_store_error_kinds() {
    let denied = StoreError::io(
        "/root/secret",
        std::io::Error::from(std::io::ErrorKind::PermissionDenied),
    );
    assert!(matches!(denied, StoreError::PermissionDenied { .. }));
    assert!(!denied.is_not_found());
    assert_eq!(denied.to_string(), "Permission denied: /root/secret");

    let other = StoreError::other("disk on fire");
    assert_eq!(other.to_string(), "disk on fire");
}

#[test]
fn test_task_config_builder() {
    let config = TaskConfig::builder()
        .concurrency_limit(8usize)
        .progress_interval_ms(50u64)
        .build()
        .unwrap();

    assert_eq!(config.concurrency_limit, 8);
    assert_eq!(config.progress_interval(), Duration::from_millis(50));
    assert_eq!(config.entry_changed_interval(), Duration::from_millis(500));
    assert_eq!(config.consecutive_error_limit, 100);
    assert_eq!(config.max_copy_number, 10_000);
}
