#![cfg(feature = "test-utils")]

use std::path::Path;
use std::time::Duration;

use config::shared::{OutputOrdering, PipelineConfig, TransformConfig};
use pipeline::container::{
    MemoryOutput, MemorySource, Output, OutputWriter, RecordFileOutput, RecordFileSource, Source,
    map_paths,
};
use pipeline::concurrency::shutdown::create_shutdown_channel;
use pipeline::error::{ErrorKind, PipelineResult};
use pipeline::pipeline::Pipeline;
use pipeline::test_utils::notify::wait_for_progress;
use pipeline::test_utils::output::NotifyingOutput;
use pipeline::test_utils::pipeline::{create_pipeline, test_pipeline_config};
use pipeline::test_utils::records::{record_id, records_with_ids, sorted_ids};
use pipeline::test_utils::source::CountingSource;
use pipeline::test_utils::transforms::{
    BROKEN, DOUBLING, FAILING, FailingTransform, PANICKING, SLOW, slow_registry, test_registry,
};
use pipeline::transform::IdentityTransform;
use pipeline::types::{Record, Schema, Stats};
use serde_json::json;
use telemetry::tracing::init_test_tracing;

/// Upper bound for a run that is expected to finish on its own.
const RUN_TIMEOUT: Duration = Duration::from_secs(30);

async fn run_to_completion<S, O>(pipeline: Pipeline<S, O>) -> PipelineResult<Stats>
where
    S: Source,
    O: Output,
{
    tokio::time::timeout(RUN_TIMEOUT, pipeline.run())
        .await
        .expect("pipeline run did not complete")
}

fn stats(count_input: u64, count_output: u64, count_error: u64) -> Stats {
    Stats {
        count_input,
        count_output,
        count_error,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn every_record_is_written_once() {
    init_test_tracing();

    let output = MemoryOutput::new();
    let pipeline = create_pipeline(4, IdentityTransform::NAME, 250, output.clone());

    let stats = run_to_completion(pipeline).await.unwrap();

    assert_eq!(stats, self::stats(250, 250, 0));
    let records = output.records().await;
    assert_eq!(sorted_ids(&records), (0..250).collect::<Vec<_>>());
    assert!(output.is_finished().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn single_worker_run_completes() {
    init_test_tracing();

    let output = MemoryOutput::new();
    let pipeline = create_pipeline(1, IdentityTransform::NAME, 3, output.clone());

    let stats = run_to_completion(pipeline).await.unwrap();

    assert_eq!(stats, self::stats(3, 3, 0));
    assert_eq!(sorted_ids(&output.records().await), vec![0, 1, 2]);
    assert!(output.is_finished().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_records_are_counted_and_dropped() {
    init_test_tracing();

    let output = MemoryOutput::new();
    let pipeline = create_pipeline(3, FAILING, 101, output.clone());

    let stats = run_to_completion(pipeline).await.unwrap();

    let failing = records_with_ids(101)
        .iter()
        .filter(|record| FailingTransform::fails(record))
        .count() as u64;
    assert_eq!(failing, 50);
    assert_eq!(stats, self::stats(101, 101 - failing, failing));

    let records = output.records().await;
    assert_eq!(records.len() as u64, stats.count_output);
    assert!(!records.iter().any(FailingTransform::fails));
}

#[tokio::test(flavor = "multi_thread")]
async fn doubling_writes_two_records_per_input() {
    init_test_tracing();

    let output = MemoryOutput::new();
    let pipeline = create_pipeline(3, DOUBLING, 5, output.clone());

    let stats = run_to_completion(pipeline).await.unwrap();

    assert_eq!(stats, self::stats(5, 10, 0));

    let records = output.records().await;
    assert_eq!(records.len(), 10);
    for id in 0..5 {
        let copies = records
            .iter()
            .filter(|record| record_id(record) == Some(id))
            .count();
        assert_eq!(copies, 2, "record {id} should have two copies");
    }
    assert_eq!(output.schema().await.map(|schema| schema.name), Some(DOUBLING.to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn transform_panics_only_fail_their_record() {
    init_test_tracing();

    let output = MemoryOutput::new();
    let pipeline = create_pipeline(2, PANICKING, 20, output.clone());

    let stats = run_to_completion(pipeline).await.unwrap();

    assert_eq!(stats, self::stats(20, 10, 10));
    assert!(
        output
            .records()
            .await
            .iter()
            .all(|record| record_id(record).is_some_and(|id| id % 2 == 1))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn input_ordering_writes_in_sequence_order() {
    init_test_tracing();

    let output = MemoryOutput::new();
    let config = PipelineConfig {
        ordering: OutputOrdering::Input,
        ..test_pipeline_config(4)
    };
    let pipeline = Pipeline::new(
        config,
        TransformConfig::builtin(SLOW),
        slow_registry(Duration::from_millis(1)),
        MemorySource::new(records_with_ids(200)),
        output.clone(),
    );

    run_to_completion(pipeline).await.unwrap();

    let ids = output
        .records()
        .await
        .iter()
        .filter_map(record_id)
        .collect::<Vec<_>>();
    assert_eq!(ids, (0..200).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn interrupted_run_deletes_the_output() {
    init_test_tracing();

    let output = NotifyingOutput::new();
    let mut pipeline = Pipeline::new(
        test_pipeline_config(2),
        TransformConfig::builtin(SLOW),
        slow_registry(Duration::from_millis(20)),
        MemorySource::new(records_with_ids(1000)),
        output.clone(),
    );

    let written = output.notify_on_records(10).await;
    let shutdown_tx = pipeline.shutdown_tx();

    pipeline.start().await.unwrap();
    let run = tokio::spawn(pipeline.wait());

    written.notified().await;
    shutdown_tx.shutdown().unwrap();

    let err = run.await.unwrap().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Interrupted);
    assert!(!output.exists().await.unwrap());
    assert!(output.records().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn interrupted_run_deletes_the_record_file() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("records.jsonl");
    let output = RecordFileOutput::new(&path);

    let mut pipeline = Pipeline::new(
        test_pipeline_config(2),
        TransformConfig::builtin(SLOW),
        slow_registry(Duration::from_millis(20)),
        MemorySource::new(records_with_ids(1000)),
        output.clone(),
    );
    let shutdown_tx = pipeline.shutdown_tx();
    let mut progress_rx = pipeline.subscribe_progress();

    pipeline.start().await.unwrap();
    let run = tokio::spawn(pipeline.wait());

    let snapshot = wait_for_progress(&mut progress_rx, |stats| stats.count_input >= 10).await;
    assert!(path.exists());
    shutdown_tx.shutdown().unwrap();

    let err = run.await.unwrap().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Interrupted);
    assert!(snapshot.count_input < 1000);
    assert!(!output.exists().await.unwrap());
    assert!(!path.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn shared_shutdown_interrupts_the_run() {
    init_test_tracing();

    let (shutdown_tx, _shutdown_rx) = create_shutdown_channel();
    let output = MemoryOutput::new();
    let mut pipeline = Pipeline::new(
        test_pipeline_config(2),
        TransformConfig::builtin(SLOW),
        slow_registry(Duration::from_millis(20)),
        MemorySource::new(records_with_ids(1000)),
        output.clone(),
    )
    .with_shutdown_tx(shutdown_tx.clone());
    let mut progress_rx = pipeline.subscribe_progress();

    pipeline.start().await.unwrap();
    let run = tokio::spawn(pipeline.wait());

    wait_for_progress(&mut progress_rx, |stats| stats.count_input >= 5).await;
    shutdown_tx.shutdown().unwrap();

    let err = tokio::time::timeout(RUN_TIMEOUT, run)
        .await
        .expect("interrupted run did not complete")
        .unwrap()
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Interrupted);
    assert!(!output.exists().await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_workers_bound_the_records_read_ahead() {
    init_test_tracing();

    const CAPACITY: usize = 4;
    const WORKERS: usize = 1;
    // One task in the worker and one held by the blocked coordinator.
    const READ_AHEAD: usize = CAPACITY + WORKERS + 1;

    let source = CountingSource::new(records_with_ids(100));
    let pulled = source.pulled();
    let config = PipelineConfig {
        queue_capacity: Some(CAPACITY),
        ..test_pipeline_config(WORKERS)
    };
    let mut pipeline = Pipeline::new(
        config,
        TransformConfig::builtin(SLOW),
        slow_registry(Duration::from_millis(300)),
        source,
        MemoryOutput::new(),
    );
    let shutdown_tx = pipeline.shutdown_tx();

    pipeline.start().await.unwrap();
    let run = tokio::spawn(pipeline.wait());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let early = pulled.get();
    assert!(early >= CAPACITY, "only {early} records were read");
    assert!(early <= READ_AHEAD, "{early} records were read ahead");

    tokio::time::sleep(Duration::from_millis(800)).await;
    let later = pulled.get();
    assert!(later > early, "reading stalled at {early} records");
    assert!(later < 20, "{later} records were read while the worker was slow");

    shutdown_tx.shutdown().unwrap();
    let err = run.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Interrupted);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_before_wait_interrupts_the_run() {
    init_test_tracing();

    let output = MemoryOutput::new();
    let mut pipeline = create_pipeline(2, IdentityTransform::NAME, 10, output.clone());

    pipeline.start().await.unwrap();
    let err = pipeline.shutdown_and_wait().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Interrupted);
    assert!(!output.exists().await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_startup_failure_processes_nothing() {
    init_test_tracing();

    let output = MemoryOutput::new();
    let mut pipeline = create_pipeline(3, BROKEN, 10, output.clone());

    let err = pipeline.start().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WorkerStartupFailure);
    assert_eq!(err.detail(), Some("failed workers: [0, 1, 2]"));
    assert!(!output.exists().await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_transforms_are_rejected_before_start() {
    init_test_tracing();

    let output = MemoryOutput::new();
    let err = create_pipeline(2, "unknown", 10, output.clone())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnknownTransform);
    assert!(!output.exists().await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_workers_is_an_invalid_configuration() {
    init_test_tracing();

    let err = create_pipeline(0, IdentityTransform::NAME, 10, MemoryOutput::new())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
}

#[tokio::test(flavor = "multi_thread")]
async fn wait_requires_start() {
    init_test_tracing();

    let err = create_pipeline(1, IdentityTransform::NAME, 10, MemoryOutput::new())
        .wait()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_input_creates_an_empty_output() {
    init_test_tracing();

    let output = MemoryOutput::new();
    let stats = run_to_completion(create_pipeline(3, IdentityTransform::NAME, 0, output.clone()))
        .await
        .unwrap();

    assert_eq!(stats, Stats::default());
    assert!(output.exists().await.unwrap());
    assert!(output.is_finished().await);
}

async fn write_record_file(path: &Path, records: Vec<Record>) {
    let mut writer = RecordFileOutput::new(path)
        .create(&Schema::open("pages"))
        .await
        .unwrap();
    for record in records {
        writer.append(record).await.unwrap();
    }
    writer.finish().await.unwrap();
}

async fn read_record_file(path: &Path) -> (Option<Schema>, Vec<Record>) {
    let mut source = RecordFileSource::open(path).await.unwrap();
    let schema = source.schema().cloned();

    let mut records = vec![];
    while let Some(record) = source.next_record().await.unwrap() {
        records.push(record);
    }

    (schema, records)
}

#[tokio::test(flavor = "multi_thread")]
async fn script_transforms_run_from_file_to_file() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("offers.json");
    std::fs::write(
        &script,
        json!({
            "offers": {
                "schema": "offer",
                "explode": "offers",
                "fields": [
                    {"name": "url", "source": "url", "type": "string"},
                    {"name": "price", "source": "$item.price", "type": "double"}
                ]
            }
        })
        .to_string(),
    )
    .unwrap();

    let input = dir.path().join("pages.jsonl");
    write_record_file(
        &input,
        vec![
            Record::try_from(json!({"url": "https://a.example/1", "offers": [{"price": 1.5}, {"price": 2}]})).unwrap(),
            Record::try_from(json!({"url": "https://a.example/2", "offers": [{"price": "free"}]})).unwrap(),
            Record::try_from(json!({"url": "https://a.example/3"})).unwrap(),
        ],
    )
    .await;

    let output_path = dir.path().join("offers.jsonl");
    let stats = Pipeline::new(
        test_pipeline_config(2),
        TransformConfig::script(&script, "offers"),
        test_registry(),
        RecordFileSource::open(&input).await.unwrap(),
        RecordFileOutput::new(&output_path),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(stats, self::stats(3, 2, 1));

    let (schema, records) = read_record_file(&output_path).await;
    assert_eq!(schema.map(|schema| schema.name), Some("offer".to_string()));
    assert_eq!(records.len(), 2);
    assert!(
        records
            .iter()
            .all(|record| record.get("url") == Some(&json!("https://a.example/1")))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn stats_of_mapped_paths_add_up() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("input");
    std::fs::create_dir(&input_dir).unwrap();
    write_record_file(&input_dir.join("a.jsonl"), records_with_ids(3)).await;
    write_record_file(&input_dir.join("b.jsonl"), records_with_ids(4)).await;
    let output_dir = dir.path().join("output");

    let mut total = Stats::default();
    for (input, output) in map_paths(&input_dir, &output_dir).await.unwrap() {
        total += Pipeline::new(
            test_pipeline_config(2),
            TransformConfig::builtin(DOUBLING),
            test_registry(),
            RecordFileSource::open(&input).await.unwrap(),
            RecordFileOutput::new(&output),
        )
        .run()
        .await
        .unwrap();
    }

    assert_eq!(total, stats(7, 14, 0));
    let (_, records) = read_record_file(&output_dir.join("b.jsonl")).await;
    assert_eq!(records.len(), 8);
}
