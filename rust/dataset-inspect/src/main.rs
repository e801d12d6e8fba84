//! Dataset Inspector
//!
//! This binary builds a dataset from one or more TOML configurations,
//! optionally wraps it, and prints its metadata, length and selected samples
//! as JSON. It can also export the committed record store so that sibling
//! processes map it instead of loading annotations themselves.
//!
//! # Usage
//!
//! ```bash
//! # Summarize a dataset and show two samples
//! dataset-inspect --config train.toml --show 0 --show 5
//!
//! # Concatenate two sources, oversample rare classes, repeat three times
//! dataset-inspect --config a.toml --config b.toml --category-key label \
//!     --class-balanced 0.1 --repeat 3
//!
//! # Annotations without a config file, exported for sibling readers
//! dataset-inspect --ann-file train.json --export /dev/shm/train.dsrs
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dataset_core::value::record_to_json;
use dataset_core::{
    AnnotationParser, BaseDataset, ClassBalancedDataset, ConcatDataset, Dataset, DatasetConfig,
    GroupedParser, PassthroughParser, RepeatDataset,
};

/// Dataset inspector
#[derive(Parser, Debug)]
#[command(name = "dataset-inspect")]
#[command(about = "Inspect, wrap and export annotation datasets")]
struct Args {
    /// Dataset configuration file (repeat to concatenate datasets)
    #[arg(short, long)]
    config: Vec<PathBuf>,

    /// Annotation file, used when no configuration file is given
    #[arg(long, conflicts_with = "config")]
    ann_file: Option<PathBuf>,

    /// Expansion step (passthrough, grouped)
    #[arg(long, default_value = "passthrough")]
    parser: String,

    /// List field expanded by the grouped parser
    #[arg(long, default_value = "instances")]
    group_key: String,

    /// Sample field holding category ids
    #[arg(long)]
    category_key: Option<String>,

    /// Metadata keys exempt from the concatenation check
    #[arg(long)]
    ignore_key: Vec<String>,

    /// Oversampling threshold for class-balanced resampling
    #[arg(long)]
    class_balanced: Option<f64>,

    /// Repeat the dataset this many times
    #[arg(long)]
    repeat: Option<usize>,

    /// Sample indices to print after the pipeline
    #[arg(long)]
    show: Vec<usize>,

    /// Export the serialized record store of a single dataset
    #[arg(long)]
    export: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let report = run(&args)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

fn run(args: &Args) -> dataset_core::Result<serde_json::Value> {
    let bases = build_bases(args)?;

    if let Some(path) = &args.export {
        match bases.as_slice() {
            [single] => {
                single.export_store(path)?;
                tracing::info!("Exported record store to {:?}", path);
            }
            _ => {
                return Err(dataset_core::DatasetError::config(
                    "--export requires exactly one dataset",
                ))
            }
        }
    }

    let dataset = wrap(args, bases)?;
    dataset.full_init()?;
    tracing::info!("Dataset ready with {} samples", dataset.len()?);
    report(dataset.as_ref(), &args.show)
}

fn build_parser(args: &Args) -> dataset_core::Result<Arc<dyn AnnotationParser>> {
    let parser: Arc<dyn AnnotationParser> = match args.parser.to_lowercase().as_str() {
        "passthrough" => {
            let mut parser = PassthroughParser::new();
            if let Some(key) = &args.category_key {
                parser = parser.with_category_key(key.as_str());
            }
            Arc::new(parser)
        }
        "grouped" => {
            let mut parser = GroupedParser::new(args.group_key.as_str());
            if let Some(key) = &args.category_key {
                parser = parser.with_category_key(key.as_str());
            }
            Arc::new(parser)
        }
        other => {
            return Err(dataset_core::DatasetError::config(format!(
                "unknown parser '{other}', expected passthrough or grouped"
            )))
        }
    };
    Ok(parser)
}

fn build_bases(args: &Args) -> dataset_core::Result<Vec<Arc<BaseDataset>>> {
    let configs = if args.config.is_empty() {
        let ann_file = args.ann_file.clone().ok_or_else(|| {
            dataset_core::DatasetError::config("either --config or --ann-file is required")
        })?;
        vec![DatasetConfig::new(ann_file).with_env_overrides()]
    } else {
        args.config
            .iter()
            .map(|path| Ok(DatasetConfig::from_file(path)?.with_env_overrides()))
            .collect::<dataset_core::Result<Vec<_>>>()?
    };

    let parser = build_parser(args)?;
    configs
        .into_iter()
        .map(|config| BaseDataset::new(config, parser.clone()).map(Arc::new))
        .collect()
}

/// Applies concatenation, class balancing and repetition, in that order.
fn wrap(args: &Args, bases: Vec<Arc<BaseDataset>>) -> dataset_core::Result<Arc<dyn Dataset>> {
    let mut dataset: Arc<dyn Dataset> = match bases.len() {
        1 => bases[0].clone() as Arc<dyn Dataset>,
        _ => {
            let datasets = bases
                .into_iter()
                .map(|d| d as Arc<dyn Dataset>)
                .collect();
            Arc::new(ConcatDataset::with_options(
                datasets,
                args.ignore_key.clone(),
                true,
            )?)
        }
    };

    if let Some(thr) = args.class_balanced {
        dataset = Arc::new(ClassBalancedDataset::new(dataset, thr)?);
    }
    if let Some(times) = args.repeat {
        dataset = Arc::new(RepeatDataset::new(dataset, times)?);
    }
    Ok(dataset)
}

fn report(dataset: &dyn Dataset, show: &[usize]) -> dataset_core::Result<serde_json::Value> {
    let samples = show
        .iter()
        .map(|&idx| {
            dataset
                .get(idx)
                .map(|sample| serde_json::Value::Object(record_to_json(sample)))
        })
        .collect::<dataset_core::Result<Vec<_>>>()?;

    Ok(serde_json::json!({
        "len": dataset.len()?,
        "metainfo": record_to_json(dataset.metainfo()),
        "samples": samples,
    }))
}
