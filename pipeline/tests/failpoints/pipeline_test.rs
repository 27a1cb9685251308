use std::error::Error;

use pipeline::container::{MemoryOutput, Output};
use pipeline::error::{ErrorKind, PipelineError};
use pipeline::failpoints::{
    COORDINATOR_BEFORE_ENQUEUE, TRANSFORM_WORKER_BEFORE_TASK, WRITER_BEFORE_APPEND,
};
use pipeline::test_utils::failpoints::CustomFailScenario;
use pipeline::test_utils::pipeline::create_pipeline;
use pipeline::test_utils::transforms::DOUBLING;
use telemetry::tracing::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn writer_failure_deletes_the_output() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(WRITER_BEFORE_APPEND, "1*off->return(disk full)")]);

    let output = MemoryOutput::new();
    let err = create_pipeline(2, DOUBLING, 50, output.clone())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WriterFailure);
    assert!(err.detail().unwrap().contains("disk full"));

    let injected = err
        .source()
        .and_then(|source| source.downcast_ref::<PipelineError>())
        .map(PipelineError::kind);
    assert_eq!(injected, Some(ErrorKind::InjectedFailure));

    assert!(!output.exists().await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn coordinator_failure_deletes_the_output() {
    init_test_tracing();
    let _scenario =
        CustomFailScenario::setup(&[(COORDINATOR_BEFORE_ENQUEUE, "5*off->return")]);

    let output = MemoryOutput::new();
    let err = create_pipeline(2, DOUBLING, 50, output.clone())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InjectedFailure);
    assert!(!output.exists().await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_crash_deletes_the_output() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(
        TRANSFORM_WORKER_BEFORE_TASK,
        "5*off->return(worker lost)",
    )]);

    let output = MemoryOutput::new();
    let err = create_pipeline(2, DOUBLING, 50, output.clone())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WorkerCrash);

    let injected = err
        .source()
        .and_then(|source| source.downcast_ref::<PipelineError>())
        .expect("crash should carry the injected error");
    assert_eq!(injected.kind(), ErrorKind::InjectedFailure);
    assert!(injected.detail().unwrap().contains("worker lost"));

    assert!(!output.exists().await.unwrap());
}
