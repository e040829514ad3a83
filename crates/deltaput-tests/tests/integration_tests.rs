//! End-to-end runs of the upload engine against scripted and directory stores

use deltaput_config::{HeaderRuleConfig, RunFlags, CACHE_CONTROL, CONTENT_ENCODING};
use deltaput_engine::{DirectoryTransport, RunOutcome, RunReport, Transport};
use deltaput_sync::{DiffEngine, Snapshot};
use deltaput_types::Error;
use deltaput_tests::test_utils::{
    list_files, quiet_engine, Behavior, ScriptedTransport, SiteFixture,
};
use flate2::read::GzDecoder;
use std::io::Read;
use std::sync::Arc;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn finished(outcome: RunOutcome) -> RunReport {
    match outcome {
        RunOutcome::Finished(report) => report,
        RunOutcome::NothingToDo => panic!("expected the run to have work"),
    }
}

fn gunzip(bytes: &[u8]) -> String {
    let mut decoded = String::new();
    GzDecoder::new(bytes)
        .read_to_string(&mut decoded)
        .expect("body should be gzip");
    decoded
}

#[tokio::test]
async fn test_first_run_uploads_and_caches_everything() -> TestResult {
    let site = SiteFixture::new();
    site.write("index.html", "<html><body>home</body></html>")
        .write("logo.png", [0x89, b'P', b'N', b'G', 0, 1, 2, 3]);

    let transport = Arc::new(DirectoryTransport::new(&site.store));
    let engine = quiet_engine(site.config(), RunFlags::default(), transport);
    let report = finished(engine.run().await?);

    assert_eq!(report.completed, vec!["index.html", "logo.png"]);
    assert!(report.rejected.is_empty());
    assert!(report.cache_written);
    assert_eq!(list_files(&site.store), vec!["index.html", "logo.png"]);

    // html goes out gzipped, images as they are
    let stored_html = std::fs::read(site.store.join("index.html"))?;
    assert_eq!(gunzip(&stored_html), "<html><body>home</body></html>");
    let stored_png = std::fs::read(site.store.join("logo.png"))?;
    assert_eq!(stored_png, std::fs::read(site.source.join("logo.png"))?);

    let cached = Snapshot::load(&site.cache_file).await?;
    assert_eq!(cached.len(), 2);
    assert_eq!(
        cached.get("index.html"),
        Some(blake3_of(&site.source.join("index.html"))?.as_str())
    );
    Ok(())
}

fn blake3_of(path: &std::path::Path) -> std::io::Result<String> {
    Ok(blake3::hash(&std::fs::read(path)?).to_hex().to_string())
}

#[tokio::test]
async fn test_unchanged_tree_is_idempotent() -> TestResult {
    let site = SiteFixture::new();
    site.write("index.html", "<p>v1</p>")
        .write("css/site.css", "body { margin: 0 }")
        .write("js/app.js", "console.log(1)");

    let transport = Arc::new(ScriptedTransport::new(Behavior::Succeed));
    let first = quiet_engine(site.config(), RunFlags::default(), transport.clone());
    finished(first.run().await?);
    assert_eq!(transport.total_calls(), 3);
    let cache_after_first = site.cache_contents();

    let second = quiet_engine(site.config(), RunFlags::default(), transport.clone());
    assert!(matches!(second.run().await?, RunOutcome::NothingToDo));
    assert_eq!(transport.total_calls(), 3);
    assert_eq!(site.cache_contents(), cache_after_first);
    Ok(())
}

#[tokio::test]
async fn test_only_changed_files_are_sent_again() -> TestResult {
    let site = SiteFixture::new();
    site.write("index.html", "<p>v1</p>")
        .write("about.html", "<p>about</p>");

    let transport = Arc::new(ScriptedTransport::new(Behavior::Succeed));
    finished(
        quiet_engine(site.config(), RunFlags::default(), transport.clone())
            .run()
            .await?,
    );

    site.write("index.html", "<p>v2</p>").write("new.html", "<p>new</p>");
    let report = finished(
        quiet_engine(site.config(), RunFlags::default(), transport.clone())
            .run()
            .await?,
    );

    assert_eq!(report.diff_size, 2);
    assert_eq!(report.completed, vec!["index.html", "new.html"]);
    assert_eq!(transport.calls("about.html"), 1);
    assert_eq!(transport.calls("index.html"), 2);
    Ok(())
}

#[tokio::test]
async fn test_deleted_files_drop_out_of_the_cache() -> TestResult {
    let site = SiteFixture::new();
    site.write("keep.html", "keep").write("gone.html", "gone");

    let transport = Arc::new(ScriptedTransport::new(Behavior::Succeed));
    finished(
        quiet_engine(site.config(), RunFlags::default(), transport.clone())
            .run()
            .await?,
    );

    site.remove("gone.html");
    site.write("keep.html", "keep v2");
    finished(
        quiet_engine(site.config(), RunFlags::default(), transport.clone())
            .run()
            .await?,
    );

    let cached = Snapshot::load(&site.cache_file).await?;
    assert!(cached.contains("keep.html"));
    assert!(!cached.contains("gone.html"));
    Ok(())
}

#[tokio::test]
async fn test_rejected_files_come_back_next_run() -> TestResult {
    let site = SiteFixture::new();
    site.write("index.html", "<p>home</p>")
        .write("broken.css", "p {}")
        .write("ok.js", "1");

    let transport = Arc::new(
        ScriptedTransport::new(Behavior::Succeed).with("broken.css", Behavior::Fatal),
    );
    let report = finished(
        quiet_engine(site.config(), RunFlags::default(), transport.clone())
            .run()
            .await?,
    );

    assert_eq!(report.completed, vec!["index.html", "ok.js"]);
    assert_eq!(report.rejected, vec!["broken.css"]);
    // non-recoverable errors are not retried
    assert_eq!(transport.calls("broken.css"), 1);

    let cached = Snapshot::load(&site.cache_file).await?;
    assert!(!cached.contains("broken.css"));
    assert!(cached.contains("index.html"));

    let current = Snapshot::build(&site.source).await?;
    let diff = DiffEngine::new().diff(&current, &cached);
    assert_eq!(diff.paths().collect::<Vec<_>>(), vec!["broken.css"]);
    Ok(())
}

#[tokio::test]
async fn test_recoverable_failures_stop_at_the_ceiling() -> TestResult {
    let site = SiteFixture::new();
    site.write("flaky.html", "<p>flaky</p>").write("fine.html", "<p>fine</p>");

    let transport = Arc::new(
        ScriptedTransport::new(Behavior::Succeed).with("flaky.html", Behavior::Recoverable),
    );
    let report = finished(
        quiet_engine(site.config(), RunFlags::default(), transport.clone())
            .run()
            .await?,
    );

    assert_eq!(transport.calls("flaky.html"), 10);
    assert_eq!(transport.calls("fine.html"), 1);
    assert_eq!(report.rejected, vec!["flaky.html"]);
    assert_eq!(report.stats.retries, 9);
    Ok(())
}

#[tokio::test]
async fn test_transient_failures_are_retried_to_success() -> TestResult {
    let site = SiteFixture::new();
    site.write("a.html", "a").write("b.html", "b");

    let transport = Arc::new(
        ScriptedTransport::new(Behavior::Succeed).with("a.html", Behavior::FailTimes(3)),
    );
    let report = finished(
        quiet_engine(site.config(), RunFlags::default(), transport.clone())
            .run()
            .await?,
    );

    assert_eq!(report.completed, vec!["a.html", "b.html"]);
    assert_eq!(transport.calls("a.html"), 4);
    assert!(Snapshot::load(&site.cache_file).await?.contains("a.html"));
    Ok(())
}

#[tokio::test]
async fn test_worker_panic_still_saves_finished_uploads() -> TestResult {
    let site = SiteFixture::new();
    site.write("a.html", "a")
        .write("boom.html", "boom")
        .write("c.html", "c");

    let transport = Arc::new(
        ScriptedTransport::new(Behavior::Succeed).with("boom.html", Behavior::Panic),
    );
    let engine = quiet_engine(site.config(), RunFlags::default(), transport.clone());
    let result = tokio::time::timeout(std::time::Duration::from_secs(10), engine.run()).await?;

    assert!(matches!(result, Err(Error::Scheduler { .. })));
    let cached = Snapshot::load(&site.cache_file).await?;
    assert!(site.cache_contents().is_some());
    assert!(!cached.contains("boom.html"));
    for name in ["a.html", "c.html"] {
        if transport.stored(name).is_some() {
            assert!(cached.contains(name), "{} was uploaded but not cached", name);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_dry_run_touches_nothing() -> TestResult {
    let site = SiteFixture::new();
    site.write("index.html", "<p>home</p>").write("logo.png", "png");

    let transport = Arc::new(ScriptedTransport::new(Behavior::Succeed));
    let flags = RunFlags {
        dry_run: true,
        ..RunFlags::default()
    };
    let report = finished(
        quiet_engine(site.config(), flags, transport.clone())
            .run()
            .await?,
    );

    assert!(report.dry_run);
    assert_eq!(report.stats.files_skipped, 2);
    assert_eq!(transport.total_calls(), 0);
    assert!(site.cache_contents().is_none());
    Ok(())
}

#[tokio::test]
async fn test_dry_run_keeps_an_existing_cache() -> TestResult {
    let site = SiteFixture::new();
    site.write("index.html", "<p>v1</p>");

    let transport = Arc::new(ScriptedTransport::new(Behavior::Succeed));
    finished(
        quiet_engine(site.config(), RunFlags::default(), transport.clone())
            .run()
            .await?,
    );
    let before = site.cache_contents();

    site.write("index.html", "<p>v2</p>");
    let flags = RunFlags {
        dry_run: true,
        ..RunFlags::default()
    };
    finished(
        quiet_engine(site.config(), flags, transport.clone())
            .run()
            .await?,
    );

    assert_eq!(site.cache_contents(), before);
    assert_eq!(transport.calls("index.html"), 1);
    Ok(())
}

#[tokio::test]
async fn test_first_matching_rule_wins() -> TestResult {
    let site = SiteFixture::new();
    site.write("index.html", "<p>home</p>")
        .write("page.html", "<p>page</p>")
        .write("images/articole/photo.jpg", "jpg")
        .write("data.bin", "raw");

    let transport = Arc::new(ScriptedTransport::new(Behavior::Succeed));
    finished(
        quiet_engine(site.config(), RunFlags::default(), transport.clone())
            .run()
            .await?,
    );

    let index = transport.stored("index.html").ok_or("index.html missing")?;
    assert_eq!(index.header(CACHE_CONTROL), Some("max-age=1800"));
    assert_eq!(index.header(CONTENT_ENCODING), Some("gzip"));
    assert_eq!(index.header("Content-Type"), Some("text/html; charset=utf-8"));

    let page = transport.stored("page.html").ok_or("page.html missing")?;
    assert_eq!(page.header(CACHE_CONTROL), Some("max-age=3600"));

    let photo = transport
        .stored("images/articole/photo.jpg")
        .ok_or("photo missing")?;
    assert_eq!(photo.header(CACHE_CONTROL), Some("max-age=31536000"));
    assert_eq!(photo.header(CONTENT_ENCODING), None);
    assert_eq!(photo.body, b"jpg");

    let data = transport.stored("data.bin").ok_or("data.bin missing")?;
    assert_eq!(data.header(CACHE_CONTROL), None);
    assert_eq!(data.header("Content-Type"), Some("application/octet-stream"));
    Ok(())
}

#[tokio::test]
async fn test_custom_rules_and_flags() -> TestResult {
    let site = SiteFixture::new();
    site.write("feed.xml", "<rss/>");

    let mut config = site.config();
    config.header_rules = vec![HeaderRuleConfig::new(
        r"\.xml$",
        &[(CONTENT_ENCODING, "gzip"), (CACHE_CONTROL, "no-cache")],
    )];
    config.gzip = false;
    config.encrypt = true;

    let transport = Arc::new(ScriptedTransport::new(Behavior::Succeed));
    finished(
        quiet_engine(config, RunFlags::default(), transport.clone())
            .run()
            .await?,
    );

    let feed = transport.stored("feed.xml").ok_or("feed.xml missing")?;
    assert_eq!(feed.header(CACHE_CONTROL), Some("no-cache"));
    assert_eq!(feed.header(CONTENT_ENCODING), None);
    assert_eq!(feed.header("x-amz-server-side-encryption"), Some("AES256"));
    assert_eq!(feed.body, b"<rss/>");
    Ok(())
}

#[tokio::test]
async fn test_no_upload_marks_everything_cached() -> TestResult {
    let site = SiteFixture::new();
    site.write("index.html", "x").write("logo.png", "y");

    let transport = Arc::new(ScriptedTransport::new(Behavior::Succeed));
    let flags = RunFlags {
        do_upload: false,
        ..RunFlags::default()
    };
    let report = finished(
        quiet_engine(site.config(), flags, transport.clone())
            .run()
            .await?,
    );

    assert!(!report.uploaded);
    assert_eq!(transport.total_calls(), 0);
    let next = quiet_engine(site.config(), RunFlags::default(), transport.clone());
    assert!(next.plan().await?.diff.is_empty());
    Ok(())
}

#[test]
fn test_engine_runs_on_a_blocking_executor() {
    let site = SiteFixture::new();
    site.write("index.html", "<p>home</p>");

    let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport::new(Behavior::Succeed));
    let engine = quiet_engine(site.config(), RunFlags::default(), transport);
    let outcome = tokio_test::block_on(engine.run());

    tokio_test::assert_ok!(outcome);
    assert!(site.cache_contents().is_some());
}
