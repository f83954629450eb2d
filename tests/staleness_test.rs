mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{age_tree, set_tree_mtime, FakeEngine};
use filetime::FileTime;
use rebuildr::record::{write_record, BuildRecord};
use rebuildr::staleness::check;
use rebuildr::{BuildError, StaleReason, Verdict};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const IMAGE: &str = "team/app:latest";

struct Fixture {
    _dir: TempDir,
    context: PathBuf,
    record: PathBuf,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let context = dir.path().join("ctx");
    fs::create_dir_all(context.join("src")).unwrap();
    fs::write(context.join("app.py"), "print('hi')").unwrap();
    fs::write(context.join("src").join("util.py"), "X = 1").unwrap();
    let record = dir.path().join("state").join("images").join("team-app-latest");
    Fixture {
        _dir: dir,
        context,
        record,
    }
}

async fn verdict(engine: &FakeEngine, fx: &Fixture) -> Result<Verdict, BuildError> {
    check(engine, IMAGE, &fx.context, &fx.record, &CancellationToken::new()).await
}

#[tokio::test]
async fn test_missing_image_without_record_is_stale() {
    let fx = fixture();
    let engine = FakeEngine::new();
    assert_eq!(
        verdict(&engine, &fx).await.unwrap(),
        Verdict::Stale(StaleReason::ImageMissing)
    );
}

#[tokio::test]
async fn test_missing_image_short_circuits_context_walk() {
    let fx = fixture();
    fs::remove_dir_all(&fx.context).unwrap();
    let engine = FakeEngine::new();
    assert_eq!(
        verdict(&engine, &fx).await.unwrap(),
        Verdict::Stale(StaleReason::ImageMissing)
    );
}

#[tokio::test]
async fn test_image_newer_than_context_without_record_is_fresh() {
    let fx = fixture();
    age_tree(&fx.context, 3600);
    let engine = FakeEngine::new();
    engine.insert_image(IMAGE, "sha256:a", Utc::now());

    assert_eq!(verdict(&engine, &fx).await.unwrap(), Verdict::Fresh);
}

#[tokio::test]
async fn test_image_older_than_context_without_record_is_stale() {
    let fx = fixture();
    age_tree(&fx.context, 3600);
    let engine = FakeEngine::new();
    engine.insert_image(IMAGE, "sha256:a", Utc::now() - Duration::hours(2));

    assert_eq!(
        verdict(&engine, &fx).await.unwrap(),
        Verdict::Stale(StaleReason::ImageOlderThanContext)
    );
}

#[tokio::test]
async fn test_record_for_other_image_is_stale() {
    let fx = fixture();
    age_tree(&fx.context, 3600);
    write_record(&fx.record, &BuildRecord::new("old")).unwrap();
    let engine = FakeEngine::new();
    engine.insert_image(IMAGE, "new", Utc::now());

    assert_eq!(
        verdict(&engine, &fx).await.unwrap(),
        Verdict::Stale(StaleReason::ImageChanged)
    );
}

#[tokio::test]
async fn test_record_older_than_context_is_stale() {
    let fx = fixture();
    age_tree(&fx.context, 3600);
    write_record(&fx.record, &BuildRecord::new("sha256:a")).unwrap();
    filetime::set_file_mtime(
        &fx.record,
        FileTime::from_unix_time(Utc::now().timestamp() - 7200, 0),
    )
    .unwrap();
    let engine = FakeEngine::new();
    engine.insert_image(IMAGE, "sha256:a", Utc::now());

    assert_eq!(
        verdict(&engine, &fx).await.unwrap(),
        Verdict::Stale(StaleReason::RecordOlderThanContext)
    );
}

#[tokio::test]
async fn test_record_touching_context_mtime_is_fresh() {
    let fx = fixture();
    let instant = FileTime::from_unix_time(1_700_000_000, 0);
    set_tree_mtime(&fx.context, instant);
    write_record(&fx.record, &BuildRecord::new("sha256:a")).unwrap();
    filetime::set_file_mtime(&fx.record, instant).unwrap();
    let engine = FakeEngine::new();
    engine.insert_image(
        IMAGE,
        "sha256:a",
        Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
    );

    assert_eq!(verdict(&engine, &fx).await.unwrap(), Verdict::Fresh);
}

#[tokio::test]
async fn test_corrupt_record_falls_back_to_image_age() {
    let fx = fixture();
    age_tree(&fx.context, 3600);
    fs::create_dir_all(fx.record.parent().unwrap()).unwrap();
    fs::write(&fx.record, "{ not json").unwrap();
    let engine = FakeEngine::new();
    engine.insert_image(IMAGE, "sha256:a", Utc::now());

    assert_eq!(verdict(&engine, &fx).await.unwrap(), Verdict::Fresh);
}

#[tokio::test]
async fn test_lookup_failure_propagates() {
    let fx = fixture();
    let engine = FakeEngine::new();
    engine.fail_lookups("Cannot connect to the Docker daemon");

    let err = verdict(&engine, &fx).await.unwrap_err();
    assert!(matches!(err, BuildError::EngineLookup { .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_unwalkable_context_propagates() {
    let fx = fixture();
    fs::remove_dir_all(&fx.context).unwrap();
    let engine = FakeEngine::new();
    engine.insert_image(IMAGE, "sha256:a", Utc::now());

    let err = verdict(&engine, &fx).await.unwrap_err();
    assert!(matches!(err, BuildError::FilesystemWalk { .. }));
}

#[tokio::test]
async fn test_cancelled_check() {
    let fx = fixture();
    let engine = FakeEngine::new();
    engine.insert_image(IMAGE, "sha256:a", Utc::now());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = check(&engine, IMAGE, &fx.context, &fx.record, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::Cancelled));
}
