//! Database-backed tests for the import pipeline and its loaders.
//!
//! ```bash
//! cargo test -p numport-ingest --test pipeline_tests -- --ignored --nocapture
//! ```

mod common;

use common::{
    init_test_tracing, numbered_lines, phone, record_line, row_count, test_config, write_source,
    TestPostgres,
};
use numport_ingest::bulk::BulkLoader;
use numport_ingest::fallback::FallbackLoader;
use numport_ingest::heartbeat::{read_liveness, request_cancel, BeatSignal, HeartbeatWriter};
use numport_ingest::reset::full_reset;
use numport_ingest::resume::{skipped_line_count, ResumeTracker};
use numport_ingest::splitter::ChunkSplitter;
use numport_ingest::status::ImportPhase;
use numport_ingest::{
    ImportController, ImportPipeline, IngestError, PipelineOutcome, StartOutcome, StatusHandle,
};
use sqlx::PgPool;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

type Row = (
    Option<String>,
    Option<i64>,
    Option<String>,
    Option<i64>,
    Option<String>,
    Option<String>,
);

async fn sample_rows(pool: &PgPool) -> Vec<Row> {
    sqlx::query_as(
        "SELECT origin_spid, flag_1, created_label, phone_number, cleared_at_1, cleared_at_2
         FROM portability_history ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .expect("fetch rows")
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_bulk_loads_a_clean_chunk() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let dir = TempDir::new().unwrap();
    let chunk = dir.path().join("chunk_0001.csv");
    std::fs::write(&chunk, numbered_lines(10).join("\n") + "\n").unwrap();

    let loader = BulkLoader::new(pg.pool_clone(), "portability_staging").unwrap();
    loader.ensure_staging().await.unwrap();
    let inserted = loader.load_chunk(1, &chunk).await.unwrap();

    assert_eq!(inserted, 10);
    assert_eq!(row_count(pg.pool()).await, 10);

    let staged: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM portability_staging")
        .fetch_one(pg.pool())
        .await
        .unwrap();
    assert_eq!(staged, 0, "staging is truncated inside the chunk transaction");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_bulk_and_fallback_persist_identical_rows() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let lines = vec![
        record_line("11987654321"),
        // 16 digits: not a phone
        record_line("1198765432100000"),
        // non-digit numeric and over-long text
        "ABCDEFGHIJKLMNOP;x1;label;11912345678;;SPID;OP;CC;0;1;STATUS;2;upd;4;2020-05-05 10:00:00;5;6;7;0000-00-00 00:00:00".to_string(),
        // literal double quote survives COPY
        "55;1;say \"hi\";11911111111;3;T;O;C;0;1;S;2;U;4;0000-00-00 00:00:00;5;6;7;0000-00-00 00:00:00".to_string(),
    ];
    let chunk = dir.path().join("chunk_0001.csv");
    std::fs::write(&chunk, lines.join("\n") + "\n").unwrap();

    let bulk_pg = TestPostgres::start().await.expect("postgres");
    let loader = BulkLoader::new(bulk_pg.pool_clone(), "portability_staging").unwrap();
    loader.ensure_staging().await.unwrap();
    loader.load_chunk(1, &chunk).await.unwrap();

    let fallback_pg = TestPostgres::start().await.expect("postgres");
    let stats = FallbackLoader::new(fallback_pg.pool_clone(), 2)
        .load_chunk(1, &chunk, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.inserted, 4);

    let bulk_rows = sample_rows(bulk_pg.pool()).await;
    let fallback_rows = sample_rows(fallback_pg.pool()).await;
    assert_eq!(bulk_rows, fallback_rows);

    assert_eq!(bulk_rows[0].3, Some(11_987_654_321));
    assert_eq!(bulk_rows[0].4, None, "zero timestamp becomes NULL");
    assert_eq!(bulk_rows[1].3, None, "16-digit phone becomes NULL");
    assert_eq!(bulk_rows[2].0.as_deref(), Some("ABCDEFGHIJ"));
    assert_eq!(bulk_rows[2].1, None);
    assert_eq!(bulk_rows[2].5, None);
    assert_eq!(bulk_rows[3].2.as_deref(), Some("say \"hi\""));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_malformed_line_sends_chunk_to_fallback() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let dir = TempDir::new().unwrap();

    let mut lines = numbered_lines(25);
    // 18 fields on line 14 (chunk 2)
    let truncated: Vec<&str> = lines[13].split(';').take(18).collect();
    lines[13] = truncated.join(";");
    let source = write_source(dir.path(), &lines);

    let config = test_config(dir.path(), 24);
    let pipeline = ImportPipeline::new(pg.pool_clone(), config.clone(), StatusHandle::new());
    let summary = pipeline.run(&source, CancellationToken::new()).await.unwrap();

    assert_eq!(summary.outcome, PipelineOutcome::Completed);
    assert_eq!(summary.bulk_chunks, 2);
    assert_eq!(summary.fallback_chunks, 1);
    assert_eq!(summary.malformed_rows, 1);
    assert_eq!(summary.inserted_rows, 24);
    assert_eq!(row_count(pg.pool()).await, 24);

    let missing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM portability_history WHERE phone_number = $1",
    )
    .bind(phone(14).parse::<i64>().unwrap())
    .fetch_one(pg.pool())
    .await
    .unwrap();
    assert_eq!(missing, 0);

    let status = pipeline.status().snapshot().await;
    assert_eq!(status.phase, ImportPhase::Completed);
    assert_eq!(status.malformed_rows, 1);
    assert!(status.last_error.is_some());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_full_run_then_idempotent_rerun() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), &numbered_lines(25));
    let config = test_config(dir.path(), 25);

    let pipeline = ImportPipeline::new(pg.pool_clone(), config.clone(), StatusHandle::new());
    let first = pipeline.run(&source, CancellationToken::new()).await.unwrap();

    assert_eq!(first.total_chunks, 3);
    assert_eq!(first.bulk_chunks, 3);
    assert_eq!(first.inserted_rows, 25);
    assert_eq!(row_count(pg.pool()).await, 25);

    let splitter = ChunkSplitter::new(&config.chunk_dir, config.chunk_size);
    assert!(splitter.existing_chunks().await.unwrap().is_empty(), "loaded chunks are deleted");

    let liveness = read_liveness(pg.pool(), Duration::from_secs(30)).await.unwrap();
    assert!(!liveness.active, "heartbeat removed at the end of the run");

    let second = pipeline.run(&source, CancellationToken::new()).await.unwrap();
    assert_eq!(second.outcome, PipelineOutcome::AlreadyComplete);
    assert_eq!(row_count(pg.pool()).await, 25);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_resume_skips_applied_chunks() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let dir = TempDir::new().unwrap();
    let lines = numbered_lines(25);
    let source = write_source(dir.path(), &lines);
    let config = test_config(dir.path(), 25);

    // chunk 1 applied by an earlier run
    let chunk_one = dir.path().join("applied.csv");
    std::fs::write(&chunk_one, lines[..10].join("\n") + "\n").unwrap();
    let loader = BulkLoader::new(pg.pool_clone(), "portability_staging").unwrap();
    loader.ensure_staging().await.unwrap();
    loader.load_chunk(1, &chunk_one).await.unwrap();

    let point = ResumeTracker::new(pg.pool_clone()).resume_point(10, 25).await.unwrap();
    assert_eq!(point.next_chunk, 2);

    let pipeline = ImportPipeline::new(pg.pool_clone(), config, StatusHandle::new());
    let summary = pipeline.run(&source, CancellationToken::new()).await.unwrap();

    assert_eq!(summary.resumed_from_chunk, 2);
    assert_eq!(summary.chunks_loaded, 2);
    assert_eq!(row_count(pg.pool()).await, 25);

    let distinct: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT phone_number) FROM portability_history")
            .fetch_one(pg.pool())
            .await
            .unwrap();
    assert_eq!(distinct, 25, "no chunk applied twice");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_cancelled_run_keeps_chunks_for_resume() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), &numbered_lines(25));
    let config = test_config(dir.path(), 25);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let pipeline = ImportPipeline::new(pg.pool_clone(), config, StatusHandle::new());
    let summary = pipeline.run(&source, cancel).await.unwrap();

    assert_eq!(summary.outcome, PipelineOutcome::Cancelled);
    assert_eq!(row_count(pg.pool()).await, 0);
    assert_eq!(pipeline.status().snapshot().await.phase, ImportPhase::Cancelled);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_missing_source_fails_the_run() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), 25);

    let pipeline = ImportPipeline::new(pg.pool_clone(), config, StatusHandle::new());
    let err = pipeline
        .run(&dir.path().join("nope.csv"), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::SourceNotFound(_)));
    let status = pipeline.status().snapshot().await;
    assert_eq!(status.phase, ImportPhase::Failed);
    assert!(status.last_error.unwrap().contains("nope.csv"));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_full_reset_returns_to_chunk_one() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), &numbered_lines(25));
    let config = test_config(dir.path(), 25);

    ImportPipeline::new(pg.pool_clone(), config.clone(), StatusHandle::new())
        .run(&source, CancellationToken::new())
        .await
        .unwrap();
    // leftover chunk files from an interrupted split
    ChunkSplitter::new(&config.chunk_dir, config.chunk_size)
        .split(&source, 1, &CancellationToken::new())
        .await
        .unwrap();
    HeartbeatWriter::new(pg.pool_clone(), Uuid::new_v4())
        .beat(ImportPhase::Loading)
        .await
        .unwrap();
    // staging left by the low-memory loader and a recorded skip
    sqlx::query("CREATE TABLE temp_import (line TEXT)")
        .execute(pg.pool())
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO portability_skipped (chunk_index, line_number, reason) VALUES (2, 4, 'bad')",
    )
    .execute(pg.pool())
    .await
    .unwrap();

    let report = full_reset(pg.pool(), &config).await;

    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(report.rows_deleted, 25);
    assert_eq!(report.skipped_lines_deleted, 1);
    assert_eq!(report.chunk_files_removed, 3);
    assert!(report.heartbeat_cleared);
    assert!(report.staging_tables_dropped.contains(&"temp_import".to_string()));
    assert_eq!(row_count(pg.pool()).await, 0);
    assert_eq!(skipped_line_count(pg.pool()).await.unwrap(), 0);
    assert!(!config.chunk_dir.exists());

    let leftover: Option<String> = sqlx::query_scalar("SELECT to_regclass('temp_import')::text")
        .fetch_one(pg.pool())
        .await
        .unwrap();
    assert_eq!(leftover, None);

    let point = ResumeTracker::new(pg.pool_clone()).resume_point(10, 25).await.unwrap();
    assert_eq!(point.next_chunk, 1);

    // nothing to reset is fine too
    let again = full_reset(pg.pool(), &config).await;
    assert!(again.is_clean());
    assert_eq!(again.rows_deleted, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_heartbeat_liveness() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let writer = HeartbeatWriter::new(pg.pool_clone(), Uuid::new_v4());

    assert!(!read_liveness(pg.pool(), Duration::from_secs(30)).await.unwrap().active);

    writer.beat(ImportPhase::Loading).await.unwrap();
    let liveness = read_liveness(pg.pool(), Duration::from_secs(30)).await.unwrap();
    assert!(liveness.active);
    assert_eq!(liveness.run_id, Some(writer.run_id()));
    assert_eq!(liveness.phase.as_deref(), Some("loading"));

    sqlx::query("UPDATE import_heartbeat SET beat_at = NOW() - INTERVAL '5 minutes'")
        .execute(pg.pool())
        .await
        .unwrap();
    assert!(!read_liveness(pg.pool(), Duration::from_secs(30)).await.unwrap().active);

    assert_eq!(writer.refresh(ImportPhase::Loading).await.unwrap(), BeatSignal::Continue);
    assert!(request_cancel(pg.pool()).await.unwrap());
    assert_eq!(
        writer.refresh(ImportPhase::Loading).await.unwrap(),
        BeatSignal::CancelRequested
    );
    assert!(read_liveness(pg.pool(), Duration::from_secs(30)).await.unwrap().cancel_requested);

    writer.clear().await.unwrap();
    assert!(read_liveness(pg.pool(), Duration::from_secs(30)).await.unwrap().run_id.is_none());

    // a refresh never recreates a deleted row
    assert_eq!(writer.refresh(ImportPhase::Loading).await.unwrap(), BeatSignal::Released);
    assert!(read_liveness(pg.pool(), Duration::from_secs(30)).await.unwrap().run_id.is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_controller_refuses_second_start_while_heartbeat_is_fresh() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let dir = TempDir::new().unwrap();
    write_source(dir.path(), &numbered_lines(25));
    let controller = ImportController::new(pg.pool_clone(), test_config(dir.path(), 25));

    // Another process is importing
    HeartbeatWriter::new(pg.pool_clone(), Uuid::new_v4())
        .beat(ImportPhase::Loading)
        .await
        .unwrap();

    let outcome = controller.start(None).await.unwrap();
    assert!(matches!(outcome, StartOutcome::AlreadyRunning { .. }), "{outcome:?}");
    assert_eq!(row_count(pg.pool()).await, 0);
    assert!(!controller.cancel().await, "nothing runs locally");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_controller_start_is_idempotent() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let dir = TempDir::new().unwrap();
    write_source(dir.path(), &numbered_lines(25));
    let controller = ImportController::new(pg.pool_clone(), test_config(dir.path(), 25));

    let first = controller.start(None).await.unwrap();
    assert!(matches!(first, StartOutcome::Started { .. }));

    let mut phase = ImportPhase::Idle;
    for _ in 0..120 {
        phase = controller.status().await.phase;
        if phase.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    assert_eq!(phase, ImportPhase::Completed);

    let again = controller.start(None).await.unwrap();
    assert_eq!(again, StartOutcome::AlreadyComplete { row_count: 25 });

    let progress = controller.progress().await.unwrap();
    assert!(progress.complete);
    assert_eq!(progress.eta_secs, Some(0));

    let report = controller.reset().await;
    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(report.rows_deleted, 25);
    assert_eq!(controller.status().await.phase, ImportPhase::Idle);
}

fn source_with_short_line(count: u64, line: usize) -> Vec<String> {
    let mut lines = numbered_lines(count);
    let truncated: Vec<&str> = lines[line - 1].split(';').take(18).collect();
    lines[line - 1] = truncated.join(";");
    lines
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_rerun_after_skipped_rows_adds_nothing() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), &source_with_short_line(25, 14));
    let config = test_config(dir.path(), 25);

    let pipeline = ImportPipeline::new(pg.pool_clone(), config.clone(), StatusHandle::new());
    let first = pipeline.run(&source, CancellationToken::new()).await.unwrap();
    assert_eq!(first.outcome, PipelineOutcome::Completed);
    assert_eq!(first.malformed_rows, 1);
    assert_eq!(row_count(pg.pool()).await, 24);

    let skipped: Vec<(i64, i64)> =
        sqlx::query_as("SELECT chunk_index, line_number FROM portability_skipped")
            .fetch_all(pg.pool())
            .await
            .unwrap();
    assert_eq!(skipped, vec![(2, 4)]);

    let point = ResumeTracker::new(pg.pool_clone()).resume_point(10, 25).await.unwrap();
    assert_eq!(point.row_count, 25);
    assert!(point.is_complete);

    let second = pipeline.run(&source, CancellationToken::new()).await.unwrap();
    assert_eq!(second.outcome, PipelineOutcome::AlreadyComplete);
    assert_eq!(second.chunks_loaded, 0);
    assert_eq!(row_count(pg.pool()).await, 24);

    let distinct: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT phone_number) FROM portability_history")
            .fetch_one(pg.pool())
            .await
            .unwrap();
    assert_eq!(distinct, 24);

    // the controller agrees the import is done
    let controller = ImportController::new(pg.pool_clone(), config);
    assert_eq!(
        controller.start(None).await.unwrap(),
        StartOutcome::AlreadyComplete { row_count: 25 }
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_interrupted_fallback_resumes_mid_chunk() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let dir = TempDir::new().unwrap();
    let lines = source_with_short_line(25, 14);
    let source = write_source(dir.path(), &lines);
    let config = test_config(dir.path(), 25);

    // chunk 1 applied in bulk by an earlier run
    let chunk_one = dir.path().join("applied.csv");
    std::fs::write(&chunk_one, lines[..10].join("\n") + "\n").unwrap();
    let loader = BulkLoader::new(pg.pool_clone(), "portability_staging").unwrap();
    loader.ensure_staging().await.unwrap();
    loader.load_chunk(1, &chunk_one).await.unwrap();

    // chunk 2 interrupted after its first batch of 4 lines
    let chunk_two = dir.path().join("interrupted.csv");
    std::fs::write(&chunk_two, lines[10..20].join("\n") + "\n").unwrap();
    let stopped = CancellationToken::new();
    stopped.cancel();
    let err = FallbackLoader::new(pg.pool_clone(), 4)
        .load_chunk(2, &chunk_two, &stopped)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Cancelled));
    assert_eq!(row_count(pg.pool()).await, 13);
    assert_eq!(skipped_line_count(pg.pool()).await.unwrap(), 1);

    let point = ResumeTracker::new(pg.pool_clone()).resume_point(10, 25).await.unwrap();
    assert_eq!(point.next_chunk, 2);
    assert_eq!(point.applied_in_next, 4);

    let pipeline = ImportPipeline::new(pg.pool_clone(), config, StatusHandle::new());
    let summary = pipeline.run(&source, CancellationToken::new()).await.unwrap();

    assert_eq!(summary.outcome, PipelineOutcome::Completed);
    assert_eq!(summary.resumed_from_chunk, 2);
    assert_eq!(summary.fallback_chunks, 1);
    assert_eq!(summary.bulk_chunks, 1);
    assert_eq!(summary.inserted_rows, 11);
    assert_eq!(row_count(pg.pool()).await, 24);

    let distinct: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT phone_number) FROM portability_history")
            .fetch_one(pg.pool())
            .await
            .unwrap();
    assert_eq!(distinct, 24, "no line applied twice");
}

/// Enough chunks that a run is still loading when the test acts on it.
fn long_running_config(dir: &std::path::Path, reset_wait_secs: u64) -> numport_ingest::IngestConfig {
    numport_ingest::IngestConfig {
        chunk_size: 1_000,
        maintenance_every: 0,
        reset_wait_secs,
        ..test_config(dir, 100_000)
    }
}

async fn wait_for_fresh_heartbeat(pool: &PgPool) {
    for _ in 0..100 {
        if read_liveness(pool, Duration::from_secs(30)).await.unwrap().active {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("import never claimed the heartbeat");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_reset_aborting_a_local_run_frees_the_heartbeat() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let dir = TempDir::new().unwrap();
    write_source(dir.path(), &numbered_lines(100_000));
    // no grace period: the run is aborted rather than cancelled
    let controller = ImportController::new(pg.pool_clone(), long_running_config(dir.path(), 0));

    assert!(matches!(controller.start(None).await.unwrap(), StartOutcome::Started { .. }));
    wait_for_fresh_heartbeat(pg.pool()).await;

    let report = controller.reset().await;
    assert!(report.cancelled_run);
    assert!(!report.cancelled_remote_run);
    assert!(report.heartbeat_cleared);

    // several heartbeat intervals later nothing has reclaimed the row
    tokio::time::sleep(Duration::from_secs(3)).await;
    let liveness = read_liveness(pg.pool(), Duration::from_secs(30)).await.unwrap();
    assert!(liveness.run_id.is_none(), "{liveness:?}");
    assert_eq!(row_count(pg.pool()).await, 0);

    let again = controller.start(None).await.unwrap();
    assert!(matches!(again, StartOutcome::Started { .. }), "{again:?}");
    assert!(controller.shutdown().await);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_reset_stops_an_import_owned_by_another_process() {
    init_test_tracing();
    let pg = TestPostgres::start().await.expect("postgres");
    let dir = TempDir::new().unwrap();
    write_source(dir.path(), &numbered_lines(100_000));

    // two controllers sharing only the database stand in for two processes
    let importer = ImportController::new(pg.pool_clone(), long_running_config(dir.path(), 10));
    let operator = ImportController::new(pg.pool_clone(), long_running_config(dir.path(), 10));

    assert!(matches!(importer.start(None).await.unwrap(), StartOutcome::Started { .. }));
    wait_for_fresh_heartbeat(pg.pool()).await;

    let report = operator.reset().await;
    assert!(report.is_clean(), "{:?}", report.errors);
    assert!(!report.cancelled_run);
    assert!(report.cancelled_remote_run);
    assert!(report.rows_deleted < 100_000);

    let mut phase = ImportPhase::Loading;
    for _ in 0..40 {
        phase = importer.status().await.phase;
        if phase.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    assert_eq!(phase, ImportPhase::Cancelled);

    // the stopped import commits nothing after the wipe
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(row_count(pg.pool()).await, 0);
    assert!(!read_liveness(pg.pool(), Duration::from_secs(30)).await.unwrap().active);
}
