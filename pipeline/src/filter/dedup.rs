use std::fmt::Write;

use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::container::Source;
use crate::error::{ErrorKind, PipelineResult};
use crate::filter::BloomFilter;
use crate::pipeline_error;
use crate::types::Record;

/// Field holding the failure description of a record in a previous output.
const ERROR_FIELD: &str = "error";

/// Field holding the URL a record was produced from.
const URL_FIELD: &str = "url";

/// Derives the dedup key of a URL: `netloc:path:query`, lower-cased.
///
/// The netloc keeps credentials and an explicit non-default port. A URL without a path
/// (`https://example.com`) has an empty path segment, so it yields `example.com::`.
pub fn url_dedup_key(url: &str) -> PipelineResult<String> {
    let lowered = url.trim().to_lowercase();
    let parsed = Url::parse(&lowered).map_err(|err| {
        pipeline_error!(
            ErrorKind::InvalidData,
            "Invalid URL",
            format!("`{url}`: {err}"),
            source: err
        )
    })?;

    let mut key = String::with_capacity(lowered.len());
    if !parsed.username().is_empty() {
        key.push_str(parsed.username());
        if let Some(password) = parsed.password() {
            key.push(':');
            key.push_str(password);
        }
        key.push('@');
    }
    key.push_str(parsed.host_str().unwrap_or_default());
    if let Some(port) = parsed.port() {
        let _ = write!(key, ":{port}");
    }

    key.push(':');
    if has_explicit_path(&lowered) {
        key.push_str(parsed.path());
    }
    key.push(':');
    key.push_str(parsed.query().unwrap_or_default());

    Ok(key)
}

/// Returns `false` when nothing but a query or fragment follows the authority.
///
/// The parser reports `/` as the path of such URLs, which must not leak into the key.
fn has_explicit_path(url: &str) -> bool {
    let Some((_, rest)) = url.split_once("://") else {
        return true;
    };

    rest.find(['/', '?', '#'])
        .is_some_and(|index| rest[index..].starts_with('/'))
}

/// Dedup key of a record carrying its source URL in the `url` field.
pub fn url_record_key(record: &Record) -> Option<String> {
    let url = record.get(URL_FIELD).and_then(Value::as_str)?;

    url_dedup_key(url).ok()
}

/// Populates `filter` from the successful records of a previous output.
///
/// Records whose `error` field is present and not null are skipped, as are records for
/// which `key_fn` yields no key. Returns [`None`] when no key was added at all.
pub async fn load_seen_filter<S, F>(
    source: &mut S,
    key_fn: F,
    mut filter: BloomFilter,
) -> PipelineResult<Option<BloomFilter>>
where
    S: Source,
    F: Fn(&Record) -> Option<String>,
{
    let mut added = 0u64;
    let mut skipped = 0u64;

    while let Some(record) = source.next_record().await? {
        if !record.is_null(ERROR_FIELD) {
            skipped += 1;
            continue;
        }

        let Some(key) = key_fn(&record) else {
            skipped += 1;
            continue;
        };

        filter.add(&key);
        added += 1;
    }

    if added == 0 {
        info!(skipped, "no successful records in previous output, not using a dedup filter");
        return Ok(None);
    }

    info!(added, skipped, %filter, "loaded dedup filter from previous output");

    Ok(Some(filter))
}

/// Lazily yields the URLs whose key is definitely absent from `filter`.
///
/// URLs that cannot be parsed have no key and are always yielded.
pub fn unseen<'a, I>(urls: I, filter: &'a BloomFilter) -> impl Iterator<Item = I::Item> + 'a
where
    I: IntoIterator,
    I::IntoIter: 'a,
    I::Item: AsRef<str>,
{
    urls.into_iter().filter(move |url| match url_dedup_key(url.as_ref()) {
        Ok(key) => !filter.check(&key),
        Err(err) => {
            debug!(url = url.as_ref(), error = %err, "url has no dedup key");
            true
        }
    })
}
