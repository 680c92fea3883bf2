//! CLI helper functions

use crate::{
    client::{ClusterInfo, HttpSearchClient},
    config::SearchConfig,
    iter::CountedIterator,
    json::{DocumentFilter, DocumentStream, JsonArrayIterator},
    scroll::ScrollIterator,
    storage::{ArrayWriter, NdjsonWriter, read_query_file},
};
use clap::ValueEnum;
use eyre::{Result, WrapErr};
use owo_colors::OwoColorize;
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Documents between two progress log lines
pub const PROGRESS_INTERVAL: u64 = 1000;

/// How documents are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON document per line
    #[default]
    Ndjson,
    /// One `{"size", "totalSize", "array"}` document
    Array,
}

/// Load settings and build a search client
///
/// Settings come from the YAML `config_file` when given, otherwise from the
/// environment. See [`crate::config`] for both.
pub fn load_search_client(
    config_file: Option<&Path>,
) -> Result<(SearchConfig, HttpSearchClient)> {
    let config = match config_file {
        Some(path) => {
            log::debug!("Reading settings from {}", path.display());
            SearchConfig::read(path)?
        }
        None => SearchConfig::from_env()?,
    };
    let client = config.client()?;
    Ok((config, client))
}

/// Write the settings found in the environment to a YAML file
pub fn save_config(path: &Path) -> Result<SearchConfig> {
    let config = SearchConfig::from_env()?;
    config.write(path)?;
    log::info!(
        "✓ Saved settings for {} to {}",
        config.url.cyan(),
        path.display().bright_black()
    );
    Ok(config)
}

/// Connect and report what the cluster says about itself
pub fn ping(client: &mut HttpSearchClient) -> Result<ClusterInfo> {
    let url = client.url().clone();
    log::info!("Connecting to {}", url.as_str().bright_black());
    let info = client
        .cluster_info()
        .wrap_err_with(|| format!("Failed to connect to {}", url))?
        .clone();
    log::info!(
        "✓ Connected to {} {} cluster {}",
        info.distribution,
        info.version.cyan(),
        info.name.bright_black()
    );
    Ok(info)
}

/// Options of the `scroll` command
#[derive(Debug, Clone, Default)]
pub struct ScrollOptions {
    pub indices: Vec<String>,
    /// JSON5 file with the search request body
    pub query: Option<PathBuf>,
    /// Output file, stdout when absent
    pub output: Option<PathBuf>,
    /// Overrides the configured batch size
    pub batch_size: Option<usize>,
    pub max: Option<u64>,
    pub skip_duplicates: bool,
    pub format: OutputFormat,
}

/// Scroll through indices, writing the `_source` of every hit
///
/// Pipeline: ScrollIterator → SkippingIterator (optional) → MaxOffsetIterator
/// (optional) → NdjsonWriter or ArrayWriter
pub fn export_scroll(
    config: &SearchConfig,
    client: HttpSearchClient,
    options: &ScrollOptions,
) -> Result<u64> {
    let mut scroll = ScrollIterator::sources(client)
        .keep_alive(config.keep_alive)
        .batch_size(options.batch_size.unwrap_or(config.batch_size));
    let body = scroll.prepare_search(options.indices.iter().cloned());
    if let Some(query) = &options.query {
        log::info!("Reading query from {}", query.display().bright_black());
        body.extend(read_query_file(query)?);
    }

    let mut iter: Box<dyn CountedIterator<Item = Value>> = Box::new(scroll);
    if options.skip_duplicates {
        iter = Box::new(iter.skipping());
    }
    if options.max.is_some() {
        iter = Box::new(iter.max_offset(0, options.max));
    }

    log::info!("Scrolling {}", options.indices.join(",").cyan());
    let count = write_output(iter.as_mut(), options.output.as_deref(), options.format)?;
    log::info!("✓ Wrote {} document(s) to {}", count, describe(options.output.as_deref()));
    Ok(count)
}

/// Options of the `documents` command
#[derive(Debug, Clone)]
pub struct DocumentOptions {
    pub input: PathBuf,
    pub depth: usize,
    pub filter: DocumentFilter,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
}

/// Stream the documents at a fixed depth of a JSON file to the output
pub fn export_documents(options: &DocumentOptions) -> Result<u64> {
    let file = open(&options.input)?;
    let mut stream = DocumentStream::new(file, options.depth, options.filter.clone());
    log::info!(
        "Reading documents at depth {} from {}",
        options.depth.cyan(),
        options.input.display().bright_black()
    );
    let count = write_output(&mut stream, options.output.as_deref(), options.format)?;
    log::info!(
        "✓ Wrote {} of {} document(s) to {}",
        count,
        stream.count(),
        describe(options.output.as_deref())
    );
    Ok(count)
}

/// Stream the first array of a JSON file to the output
pub fn export_array(input: &Path, output: Option<&Path>, format: OutputFormat) -> Result<u64> {
    let file = open(input)?;
    let mut iter = JsonArrayIterator::<_, Value>::new(file)
        .wrap_err_with(|| format!("Failed to read array from {}", input.display()))?;
    match (iter.size(), iter.total_size()) {
        (Some(size), Some(total)) if size != total => {
            log::info!("Array of {} (total {})", size.cyan(), total.cyan())
        }
        (Some(size), _) => log::info!("Array of {}", size.cyan()),
        _ => log::debug!("Array size unknown"),
    }
    let count = write_output(&mut iter, output, format)?;
    log::info!("✓ Wrote {} element(s) to {}", count, describe(output));
    Ok(count)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).wrap_err_with(|| format!("Failed to open {}", path.display()))
}

fn describe(output: Option<&Path>) -> String {
    output
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "stdout".to_string())
}

fn write_output<I>(iter: &mut I, output: Option<&Path>, format: OutputFormat) -> Result<u64>
where
    I: CountedIterator<Item = Value> + ?Sized,
{
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path)
                .wrap_err_with(|| format!("Failed to create output file: {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };
    if format == OutputFormat::Array {
        return ArrayWriter::new(sink).pretty(true).write_all(iter);
    }
    let mut writer = NdjsonWriter::new(sink);
    writer.write_all(iter, |written, iter| {
        if written % PROGRESS_INTERVAL == 0 {
            match iter.total_size() {
                Some(total) => log::info!("{}/{} document(s)", written, total),
                None => log::info!("{} document(s)", written),
            }
        }
    })
}
