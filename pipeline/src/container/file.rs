//! JSON Lines record files.
//!
//! The first line of a record file is a header object `{"schema": ...}` describing the
//! records that follow, one JSON object per line. Readers accept files without a header.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};
use tracing::debug;

use crate::container::{Output, OutputWriter, Source};
use crate::error::{ErrorKind, PipelineResult};
use crate::pipeline_error;
use crate::types::{Record, Schema};

/// First line of a record file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Header {
    schema: Schema,
}

/// Reads records from a record file.
#[derive(Debug)]
pub struct RecordFileSource {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_number: u64,
    schema: Option<Schema>,
    pending: Option<Record>,
}

impl RecordFileSource {
    /// Opens a record file and reads its header, if any.
    pub async fn open(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|err| {
            pipeline_error!(
                ErrorKind::InputReadFailed,
                "Failed to open record file",
                path.display(),
                source: err
            )
        })?;

        let mut source = Self {
            path,
            lines: BufReader::new(file).lines(),
            line_number: 0,
            schema: None,
            pending: None,
        };

        if let Some(line) = source.next_line().await? {
            match serde_json::from_str::<Header>(&line) {
                Ok(header) => source.schema = Some(header.schema),
                Err(_) => source.pending = Some(source.parse_record(&line)?),
            }
        }

        Ok(source)
    }

    /// Schema declared in the header.
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the next non-blank line.
    async fn next_line(&mut self) -> PipelineResult<Option<String>> {
        loop {
            let line = self.lines.next_line().await.map_err(|err| {
                pipeline_error!(
                    ErrorKind::InputReadFailed,
                    "Failed to read record file",
                    format!("{} after line {}", self.path.display(), self.line_number),
                    source: err
                )
            })?;

            let Some(line) = line else {
                return Ok(None);
            };

            self.line_number += 1;
            if !line.trim().is_empty() {
                return Ok(Some(line));
            }
        }
    }

    fn parse_record(&self, line: &str) -> PipelineResult<Record> {
        serde_json::from_str(line).map_err(|err| {
            pipeline_error!(
                ErrorKind::DeserializationError,
                "Invalid record in record file",
                format!("{}:{}: {err}", self.path.display(), self.line_number),
                source: err
            )
        })
    }
}

impl Source for RecordFileSource {
    async fn next_record(&mut self) -> PipelineResult<Option<Record>> {
        if let Some(record) = self.pending.take() {
            return Ok(Some(record));
        }

        match self.next_line().await? {
            Some(line) => self.parse_record(&line).map(Some),
            None => Ok(None),
        }
    }
}

/// Record file written by a pipeline.
#[derive(Debug, Clone)]
pub struct RecordFileOutput {
    path: PathBuf,
}

impl RecordFileOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn try_create(&self, schema: &Schema) -> io::Result<BufWriter<File>> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut writer = BufWriter::new(File::create(&self.path).await?);
        let mut header = serde_json::to_vec(&Header {
            schema: schema.clone(),
        })?;
        header.push(b'\n');
        writer.write_all(&header).await?;

        Ok(writer)
    }
}

impl Output for RecordFileOutput {
    type Writer = RecordFileWriter;

    async fn create(&self, schema: &Schema) -> PipelineResult<Self::Writer> {
        let writer = self.try_create(schema).await.map_err(|err| {
            pipeline_error!(
                ErrorKind::OutputWriteFailed,
                "Failed to create record file",
                self.path.display(),
                source: err
            )
        })?;

        debug!(path = %self.path.display(), schema = %schema.name, "created record file");

        Ok(RecordFileWriter {
            path: self.path.clone(),
            writer,
        })
    }

    async fn delete(&self) -> PipelineResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(pipeline_error!(
                ErrorKind::OutputDeleteFailed,
                "Failed to delete record file",
                self.path.display(),
                source: err
            )),
        }
    }

    async fn exists(&self) -> PipelineResult<bool> {
        Ok(tokio::fs::try_exists(&self.path).await?)
    }
}

/// Writer half of a [`RecordFileOutput`].
#[derive(Debug)]
pub struct RecordFileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl OutputWriter for RecordFileWriter {
    async fn append(&mut self, record: Record) -> PipelineResult<()> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        self.writer.write_all(&line).await.map_err(|err| {
            pipeline_error!(
                ErrorKind::OutputWriteFailed,
                "Failed to append to record file",
                self.path.display(),
                source: err
            )
        })
    }

    async fn finish(mut self) -> PipelineResult<()> {
        self.writer.flush().await.map_err(|err| {
            pipeline_error!(
                ErrorKind::OutputWriteFailed,
                "Failed to flush record file",
                self.path.display(),
                source: err
            )
        })?;

        Ok(self.writer.into_inner().sync_all().await?)
    }
}
