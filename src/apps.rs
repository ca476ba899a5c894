use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, error::ErrorKind};
use serde::Serialize;

use crate::attributes::AttributeFilter;
use crate::config::TaskConfig;
use crate::data::{ImageRecord, PairSet, TaskDraft};
use crate::design::{DesignParams, build_design};
use crate::errors::DesignError;
use crate::generator::TaskGenerator;
use crate::heuristics::{
    DesignCapacity, estimate_design_capacity, format_pair_utilization, format_u128_with_commas,
    trials_for_design,
};
use crate::metrics::ExposureSummary;
use crate::store::{FileRecordStore, PoolAdmin, RegistrationSummary};
use crate::types::ImageId;

#[derive(Debug, Parser)]
#[command(
    name = "generate_task",
    disable_help_subcommand = true,
    about = "Generate a tuple-design task from a persistent image pool",
    long_about = "Optionally register and activate images, then allocate a candidate pool, build a pair-disjoint design, and print the task draft as JSON.",
    after_help = "Set RUST_LOG (for example RUST_LOG=tuple_design=debug) to see allocation and design logs on stderr."
)]
struct GenerateTaskCli {
    #[arg(
        long = "store-path",
        value_name = "PATH",
        conflicts_with = "store_dir",
        help = "Record store file (a directory resolves to its default file name)"
    )]
    store_path: Option<PathBuf>,
    #[arg(
        long = "store-dir",
        value_name = "DIR",
        help = "Directory holding the default record store file"
    )]
    store_dir: Option<PathBuf>,
    #[arg(long, help = "Deterministic seed; defaults to the current time")]
    seed: Option<u64>,
    #[arg(long = "num-images", value_parser = parse_positive_usize, help = "Candidate images per task")]
    num_images: Option<usize>,
    #[arg(long = "tuple-size", value_parser = parse_positive_usize, help = "Images shown per trial")]
    tuple_size: Option<usize>,
    #[arg(long = "min-occurrences", value_parser = parse_positive_usize, help = "Minimum appearances per candidate")]
    min_occurrences: Option<usize>,
    #[arg(long = "keep-blocks", help = "Number of keep blocks")]
    keep_blocks: Option<usize>,
    #[arg(long = "reject-blocks", help = "Number of reject blocks")]
    reject_blocks: Option<usize>,
    #[arg(long, help = "Custom prompt shown above every trial")]
    prompt: Option<String>,
    #[arg(long, help = "Generate a practice task")]
    practice: bool,
    #[arg(long = "store-practice-pairs", help = "Record pairs from practice tasks too")]
    store_practice_pairs: bool,
    #[arg(long = "randomize-block-order", help = "Shuffle the interleaved block sequence")]
    randomize_block_order: bool,
    #[arg(long, help = "Task attribute label")]
    attribute: Option<String>,
    #[arg(
        long = "image-attribute",
        value_name = "TAG",
        help = "Restrict candidates to images carrying this tag, repeat as needed"
    )]
    image_attributes: Vec<String>,
    #[arg(long, help = "Commit the generated task to the store")]
    register: bool,
    #[arg(
        long = "register-images",
        value_name = "FILE",
        help = "Register images listed one per line as id[,url]"
    )]
    register_images: Option<PathBuf>,
    #[arg(
        long = "tag",
        value_name = "TAG",
        help = "Attribute tag applied to images from --register-images, repeat as needed"
    )]
    tags: Vec<String>,
    #[arg(
        long,
        value_name = "N",
        help = "Activate up to N inactive images matching --image-attribute"
    )]
    activate: Option<usize>,
    #[arg(long = "no-task", help = "Only run pool maintenance; do not generate a task")]
    no_task: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "estimate_design",
    disable_help_subcommand = true,
    about = "Combinatorial capacity of a tuple design",
    long_about = "Report pair and occurrence bounds for a design over N images with tuple size T and occurrence target J, optionally running the builder on a synthetic pool."
)]
struct EstimateDesignCli {
    #[arg(long = "num-images", default_value_t = crate::constants::design::DEFAULT_NUM_IMAGES, value_parser = parse_positive_usize)]
    num_images: usize,
    #[arg(long = "tuple-size", default_value_t = crate::constants::design::DEFAULT_TUPLE_SIZE, value_parser = parse_positive_usize)]
    tuple_size: usize,
    #[arg(long = "min-occurrences", default_value_t = crate::constants::design::DEFAULT_MIN_OCCURRENCES, value_parser = parse_positive_usize)]
    min_occurrences: usize,
    #[arg(long = "excluded-pairs", default_value_t = 0, help = "Historical pairs already used inside the pool")]
    excluded_pairs: u64,
    #[arg(long = "keep-blocks", default_value_t = crate::constants::blocks::DEFAULT_KEEP_BLOCKS)]
    keep_blocks: usize,
    #[arg(long = "reject-blocks", default_value_t = crate::constants::blocks::DEFAULT_REJECT_BLOCKS)]
    reject_blocks: usize,
    #[arg(long, help = "Run the design builder on a synthetic pool and report the result")]
    build: bool,
}

/// JSON document printed by `generate_task`.
#[derive(Debug, Serialize)]
struct GenerateReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    registered_images: Option<RegistrationSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    activated: Vec<ImageId>,
    exposure: Option<ExposureSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task: Option<TaskDraft>,
    registered: bool,
}

/// Run the `generate_task` command with `args_iter` (program name excluded), writing JSON to `out`.
pub fn run_generate_task<I, W>(args_iter: I, out: &mut W) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
    W: Write,
{
    let Some(cli) = parse_cli::<GenerateTaskCli, _>(
        std::iter::once("generate_task".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let store_path = match (&cli.store_path, &cli.store_dir) {
        (Some(path), _) => path.clone(),
        (None, Some(dir)) => FileRecordStore::default_path_in_dir(dir),
        (None, None) => FileRecordStore::default_path(),
    };
    let store = Arc::new(FileRecordStore::open(store_path)?);
    let filter = AttributeFilter::any_of(cli.image_attributes.iter().cloned());

    let registered_images = match &cli.register_images {
        Some(path) => {
            let contents = fs::read_to_string(path)?;
            let records = parse_image_manifest(&contents)?
                .into_iter()
                .map(|record| record.with_attributes(cli.tags.iter().cloned()))
                .collect();
            Some(store.register_images(records)?)
        }
        None => None,
    };
    let activated = match cli.activate {
        Some(n) => store.activate_n_images(n, &filter)?,
        None => Vec::new(),
    };

    let mut report = GenerateReport {
        registered_images,
        activated,
        exposure: None,
        task: None,
        registered: false,
    };

    if !cli.no_task {
        let base = if cli.practice {
            TaskConfig::practice()
        } else {
            TaskConfig::default()
        };
        let config = TaskConfig {
            num_images: cli.num_images.unwrap_or(base.num_images),
            tuple_size: cli.tuple_size.unwrap_or(base.tuple_size),
            min_occurrences: cli.min_occurrences.unwrap_or(base.min_occurrences),
            keep_blocks: cli.keep_blocks,
            reject_blocks: cli.reject_blocks,
            prompt: cli.prompt.clone().map(Into::into),
            randomize_block_order: cli.randomize_block_order,
            image_filter: filter.clone(),
            attribute: cli.attribute.clone().map(Into::into).unwrap_or(base.attribute.clone()),
            store_practice_pairs: cli.store_practice_pairs,
            ..base
        };
        let seed = cli
            .seed
            .unwrap_or_else(|| Utc::now().timestamp_micros().unsigned_abs());
        let generator = TaskGenerator::new(Arc::clone(&store), seed);
        let draft = generator.generate(&config)?;
        if cli.register {
            generator.register(&draft, &config)?;
            report.registered = true;
        }
        report.task = Some(draft);
    }

    report.exposure = store.exposure_stats(&filter)?;
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(())
}

/// Run the `estimate_design` command with `args_iter` (program name excluded).
pub fn run_estimate_design<I, W>(args_iter: I, out: &mut W) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
    W: Write,
{
    let Some(cli) = parse_cli::<EstimateDesignCli, _>(
        std::iter::once("estimate_design".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let capacity = estimate_design_capacity(
        cli.num_images as u128,
        cli.tuple_size as u128,
        cli.min_occurrences as u128,
        u128::from(cli.excluded_pairs),
    );
    print_capacity(out, &capacity, cli.keep_blocks, cli.reject_blocks)?;

    if cli.build {
        let candidates: Vec<ImageId> = (0..cli.num_images)
            .map(|idx| format!("img_{idx:05}"))
            .collect();
        let params = DesignParams::new(cli.tuple_size, cli.min_occurrences);
        match build_design(&candidates, params, &PairSet::new()) {
            Ok(design) => {
                let tuples = design.len() as u128;
                writeln!(out, "\n=== synthetic build ===")?;
                writeln!(out, "tuples built           : {}", format_u128_with_commas(tuples))?;
                writeln!(
                    out,
                    "trials per task        : {}",
                    format_u128_with_commas(trials_for_design(tuples, cli.keep_blocks, cli.reject_blocks))
                )?;
                writeln!(
                    out,
                    "max occurrences        : {}",
                    design.occurrences.iter().max().copied().unwrap_or_default()
                )?;
                writeln!(
                    out,
                    "pair utilization       : {}",
                    format_pair_utilization(design.pairs().len() as u128, capacity.available_pairs)
                )?;
            }
            Err(DesignError::DesignInfeasible { short, .. }) => {
                writeln!(out, "\n=== synthetic build ===")?;
                writeln!(out, "infeasible: {} image(s) below the occurrence target", short.len())?;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn print_capacity<W: Write>(
    out: &mut W,
    capacity: &DesignCapacity,
    keep_blocks: usize,
    reject_blocks: usize,
) -> Result<(), Box<dyn Error>> {
    writeln!(out, "=== design capacity ===")?;
    writeln!(out, "candidates             : {}", format_u128_with_commas(capacity.candidates))?;
    writeln!(out, "tuple size             : {}", capacity.tuple_size)?;
    writeln!(out, "occurrence target      : {}", capacity.min_occurrences)?;
    writeln!(out, "available pairs        : {}", format_u128_with_commas(capacity.available_pairs))?;
    writeln!(out, "max per image          : {}", capacity.max_occurrences_per_image)?;
    writeln!(out, "min tuples             : {}", format_u128_with_commas(capacity.min_tuples))?;
    writeln!(out, "max tuples             : {}", format_u128_with_commas(capacity.max_tuples))?;
    writeln!(
        out,
        "min trials per task    : {}",
        format_u128_with_commas(trials_for_design(capacity.min_tuples, keep_blocks, reject_blocks))
    )?;
    writeln!(
        out,
        "target reachable       : {}",
        if capacity.occurrence_target_reachable { "yes" } else { "no" }
    )?;
    Ok(())
}

/// Parse `id[,url]` lines. Blank lines and `#` comments are skipped.
fn parse_image_manifest(contents: &str) -> Result<Vec<ImageRecord>, String> {
    let mut records = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (id, url) = match line.split_once(',') {
            Some((id, url)) => (id.trim(), Some(url.trim())),
            None => (line, None),
        };
        if id.is_empty() {
            return Err(format!("line {}: missing image id", line_no + 1));
        }
        let record = ImageRecord::new(id);
        records.push(match url.filter(|url| !url.is_empty()) {
            Some(url) => record.with_url(url),
            None => record,
        });
    }
    Ok(records)
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{}' as a positive integer", raw))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}
