use std::path::Path;

use config::shared::{RunnerConfig, TransformConfig};
use pipeline::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use pipeline::container::{RecordFileOutput, RecordFileSource, map_paths};
use pipeline::error::ErrorKind;
use pipeline::filter::{BloomFilter, load_seen_filter, unseen, url_record_key};
use pipeline::pipeline::Pipeline;
use pipeline::pipeline_error;
use pipeline::transform::TransformRegistry;
use pipeline::types::Stats;
use tracing::{debug, info, warn};

use crate::error::RunnerResult;

/// Runs one pipeline per input file and returns the summed stats.
///
/// Pairs are processed one after the other. The first failing run stops the whole
/// command, its output having been deleted by the pipeline. A ctrl+c at any point
/// interrupts the current file and skips the remaining ones.
pub async fn run(
    config: RunnerConfig,
    transform_config: TransformConfig,
    input: &Path,
    output: &Path,
) -> RunnerResult<Stats> {
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let listener_tx = shutdown_tx.clone();
    let listener = tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl+c");
            return;
        }

        info!("ctrl+c received, shutting down");
        if let Err(err) = listener_tx.shutdown() {
            warn!(error = ?err, "failed to send shutdown signal");
        }
    });

    let result = run_pairs(
        config,
        transform_config,
        input,
        output,
        shutdown_tx,
        shutdown_rx,
    )
    .await;

    listener.abort();
    let _ = listener.await;

    result
}

async fn run_pairs(
    config: RunnerConfig,
    transform_config: TransformConfig,
    input: &Path,
    output: &Path,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
) -> RunnerResult<Stats> {
    let registry = TransformRegistry::with_builtins();
    registry.check(&transform_config)?;

    log_config(&config, &transform_config);

    let pairs = map_paths(input, output).await?;
    info!(files = pairs.len(), input = %input.display(), "starting runner");

    let mut total = Stats::default();
    for (input_path, output_path) in pairs {
        let source = RecordFileSource::open(&input_path).await?;
        let output = RecordFileOutput::new(&output_path);
        let mut pipeline = Pipeline::new(
            config.pipeline.clone(),
            transform_config.clone(),
            registry.clone(),
            source,
            output,
        )
        .with_shutdown_tx(shutdown_tx.clone());

        // The pipeline only observes shutdowns sent after it subscribed.
        if shutdown_rx.has_changed().unwrap_or(false) {
            return Err(pipeline_error!(
                ErrorKind::Interrupted,
                "Run was interrupted",
                format!("skipped {}", input_path.display())
            )
            .into());
        }

        pipeline.start().await?;
        let stats = pipeline.wait().await?;
        info!(
            input = %input_path.display(),
            output = %output_path.display(),
            %stats,
            "file processed"
        );
        total += stats;
    }

    info!(%total, "(done)");

    Ok(total)
}

/// Lists the names of the registered transforms.
pub fn transforms() -> Vec<String> {
    TransformRegistry::with_builtins()
        .names()
        .map(str::to_owned)
        .collect()
}

/// Returns the URLs listed in `urls` that the `seen` output has not recorded as successful.
///
/// When the previous output holds no successful record, every URL is returned.
pub async fn unseen_urls(config: &RunnerConfig, urls: &Path, seen: &Path) -> RunnerResult<Vec<String>> {
    let contents = tokio::fs::read_to_string(urls).await?;
    let urls = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect::<Vec<_>>();

    let mut source = RecordFileSource::open(seen).await?;
    let filter = BloomFilter::from_config(&config.filter)?;
    let Some(filter) = load_seen_filter(&mut source, url_record_key, filter).await? else {
        return Ok(urls);
    };

    let remaining = unseen(urls.iter(), &filter).cloned().collect::<Vec<_>>();
    info!(
        total = urls.len(),
        unseen = remaining.len(),
        "filtered urls against previous output"
    );

    Ok(remaining)
}

fn log_config(config: &RunnerConfig, transform_config: &TransformConfig) {
    let pipeline = &config.pipeline;
    debug!(
        workers = pipeline.workers,
        queue_capacity = ?pipeline.queue_capacity,
        progress_interval = pipeline.progress_interval,
        startup_grace_ms = pipeline.startup_grace_ms,
        shutdown_grace_ms = pipeline.shutdown_grace_ms,
        ordering = ?pipeline.ordering,
        transform = %transform_config,
        "pipeline config"
    );
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use config::shared::PipelineConfig;

    use super::*;

    fn config() -> RunnerConfig {
        RunnerConfig {
            pipeline: PipelineConfig::with_workers(2),
            ..RunnerConfig::default()
        }
    }

    #[test]
    fn lists_builtin_transforms() {
        assert_eq!(transforms(), vec!["identity".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runs_every_file_of_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("a.jsonl"), "{\"id\": 1}\n{\"id\": 2}\n").unwrap();
        fs::write(input.join("b.jsonl"), "{\"id\": 3}\n").unwrap();

        let stats = tokio::time::timeout(
            Duration::from_secs(30),
            run(
                config(),
                TransformConfig::builtin("identity"),
                &input,
                &output,
            ),
        )
        .await
        .expect("run did not complete")
        .unwrap();

        assert_eq!(stats.count_input, 3);
        assert_eq!(stats.count_output, 3);
        assert!(output.join("a.jsonl").is_file());
        assert!(output.join("b.jsonl").is_file());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_before_a_file_skips_it() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("a.jsonl"), "{\"id\": 1}\n").unwrap();

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        shutdown_tx.shutdown().unwrap();

        let err = run_pairs(
            config(),
            TransformConfig::builtin("identity"),
            &input,
            &output,
            shutdown_tx,
            shutdown_rx,
        )
        .await
        .unwrap_err();

        match err {
            crate::error::RunnerError::Pipeline(err) => {
                assert_eq!(err.kind(), ErrorKind::Interrupted)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!output.join("a.jsonl").exists());
    }

    #[tokio::test]
    async fn unknown_transforms_fail_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.jsonl");

        let err = run(
            config(),
            TransformConfig::builtin("upper"),
            &dir.path().join("missing.jsonl"),
            &output,
        )
        .await
        .unwrap_err();

        match err {
            crate::error::RunnerError::Pipeline(err) => {
                assert_eq!(err.kind(), ErrorKind::UnknownTransform)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn unseen_skips_successful_urls() {
        let dir = tempfile::tempdir().unwrap();
        let urls = dir.path().join("urls.txt");
        let seen = dir.path().join("seen.jsonl");
        fs::write(
            &urls,
            "https://example.com/a\n\nhttps://example.com/b\nhttps://example.com/c\n",
        )
        .unwrap();
        fs::write(
            &seen,
            concat!(
                "{\"url\": \"https://example.com/a\", \"error\": null}\n",
                "{\"url\": \"https://example.com/b\", \"error\": \"timeout\"}\n",
            ),
        )
        .unwrap();

        let remaining = unseen_urls(&RunnerConfig::default(), &urls, &seen)
            .await
            .unwrap();

        assert_eq!(
            remaining,
            vec![
                "https://example.com/b".to_string(),
                "https://example.com/c".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn unseen_keeps_everything_without_successes() {
        let dir = tempfile::tempdir().unwrap();
        let urls = dir.path().join("urls.txt");
        let seen = dir.path().join("seen.jsonl");
        fs::write(&urls, "https://example.com/a\n").unwrap();
        fs::write(&seen, "").unwrap();

        let remaining = unseen_urls(&RunnerConfig::default(), &urls, &seen)
            .await
            .unwrap();

        assert_eq!(remaining, vec!["https://example.com/a".to_string()]);
    }
}
