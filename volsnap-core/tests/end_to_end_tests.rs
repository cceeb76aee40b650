//! Backup and restore through the public API with a local destination.

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use volsnap_core::{BackupEngine, Config, RestoreEngine, TargetStatus};

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn config_json(source: &Path, backups: &Path, tmp: &Path) -> String {
    serde_json::json!({
        "tmp": tmp,
        "backups": [
            { "dest": "s3://documentation-only/ignored" },
            {
                "path": source,
                "dest": format!("file://{}/app", backups.display()),
                "exclude": ["\\.log$"],
            },
        ],
    })
    .to_string()
}

#[test]
fn test_backup_then_restore_into_empty_directory() {
    let source = TempDir::new().unwrap();
    let backups = TempDir::new().unwrap();
    let tmp = TempDir::new().unwrap();
    write(source.path(), "a.txt", "alpha");
    write(source.path(), "b.log", "noise");
    write(source.path(), "sub/c.txt", "gamma");

    let config = Config::from_json(&config_json(source.path(), backups.path(), tmp.path())).unwrap();
    config.validate().unwrap();

    let outcomes = BackupEngine::new(&config.tmp).run_all(&config.backups).unwrap();
    assert_eq!(outcomes[0].status, TargetStatus::Skipped);
    let TargetStatus::BackedUp { snapshot, .. } = &outcomes[1].status else {
        panic!("unexpected outcome {}", outcomes[1]);
    };
    assert!(Path::new(snapshot).starts_with(backups.path()));
    assert!(Path::new(snapshot).is_file());

    // Wipe the source and restore it from the snapshot
    fs::remove_dir_all(source.path()).unwrap();

    let outcomes = RestoreEngine::new(&config.tmp).run_all(&config.backups).unwrap();
    assert_eq!(
        outcomes[1].status,
        TargetStatus::Restored {
            snapshot: snapshot.clone()
        }
    );

    assert_eq!(fs::read_to_string(source.path().join("a.txt")).unwrap(), "alpha");
    assert_eq!(
        fs::read_to_string(source.path().join("sub/c.txt")).unwrap(),
        "gamma"
    );
    assert!(!source.path().join("b.log").exists());
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[test]
fn test_restore_picks_latest_of_several_backups() {
    let source = TempDir::new().unwrap();
    let backups = TempDir::new().unwrap();
    let tmp = TempDir::new().unwrap();

    let config = Config::from_json(&config_json(source.path(), backups.path(), tmp.path())).unwrap();
    let engine = BackupEngine::new(&config.tmp);

    let first = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    let second = first + chrono::Duration::seconds(1);

    write(source.path(), "state.txt", "one");
    engine.run_all_at(&config.backups, &first).unwrap();
    write(source.path(), "state.txt", "two");
    engine.run_all_at(&config.backups, &second).unwrap();

    write(source.path(), "state.txt", "local edit");
    let outcomes = RestoreEngine::new(&config.tmp).run_all(&config.backups).unwrap();

    assert!(matches!(
        &outcomes[1].status,
        TargetStatus::Restored { snapshot } if snapshot.ends_with("app-20240301-120001.tar.gz")
    ));
    assert_eq!(
        fs::read_to_string(source.path().join("state.txt")).unwrap(),
        "two"
    );
}
