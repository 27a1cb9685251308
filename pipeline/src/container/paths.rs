use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, PipelineResult};
use crate::pipeline_error;

/// Pairs every input file with the output it should be written to.
///
/// A file input maps to `output` itself. A directory input maps each regular file it
/// contains, sorted by name, to `output/<file name>`; subdirectories are not descended.
pub async fn map_paths(input: &Path, output: &Path) -> PipelineResult<Vec<(PathBuf, PathBuf)>> {
    let metadata = tokio::fs::metadata(input).await.map_err(|err| {
        pipeline_error!(
            ErrorKind::InputReadFailed,
            "Input path is not accessible",
            input.display(),
            source: err
        )
    })?;

    if !metadata.is_dir() {
        return Ok(vec![(input.to_path_buf(), output.to_path_buf())]);
    }

    let mut entries = tokio::fs::read_dir(input).await?;
    let mut pairs = vec![];
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            pairs.push((entry.path(), output.join(entry.file_name())));
        }
    }
    pairs.sort();

    Ok(pairs)
}
