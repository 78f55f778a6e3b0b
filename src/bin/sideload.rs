//! sideload: normalize nested JSON into sideloaded compound documents
//!
//! Usage:
//!   # Read from file, output to stdout
//!   sideload items data.json
//!
//!   # Read from stdin, output to stdout
//!   echo '{"id": 1, "oItem": {"id": 10}}' | sideload items
//!
//!   # One payload per NDJSON input line
//!   sideload --ndjson items events.jsonl
//!
//!   # Polymorphic and reciprocal associations
//!   sideload --polymorphic shapes --link-back childItem items data.json

// Use MiMalloc allocator for better performance on large documents
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::Value;
use sideload::{NormalizeConfig, ParentLink, PayloadBuilder, PayloadWriter};
use std::fs::File;
use std::io::{BufReader, Read};

#[derive(Parser, Debug)]
#[command(name = "sideload")]
#[command(about = "Normalize nested JSON into sideloaded compound documents", long_about = None)]
struct Args {
    /// Root type name (singular or plural)
    #[arg(value_name = "ROOT_TYPE")]
    root_type: String,

    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Process newline-delimited JSON (one payload per line)
    #[arg(long)]
    ndjson: bool,

    /// Pretty-print payloads instead of emitting compact lines
    #[arg(long)]
    pretty: bool,

    /// Configuration file (JSON, same shape as the builder options)
    #[arg(long, short = 'c')]
    config: Option<String>,

    /// Comma-separated property names to never traverse or link
    #[arg(long)]
    exclude: Option<String>,

    /// Comma-separated polymorphic base type names
    #[arg(long)]
    polymorphic: Option<String>,

    /// Comma-separated base type names that link back to their parent
    #[arg(long)]
    link_back: Option<String>,

    /// Bucket-type redirects as comma-separated key=type pairs
    #[arg(long)]
    map: Option<String>,

    /// Static parent link for every root entity, as JSON:
    /// {"type": "project", "link": 1}
    #[arg(long)]
    parent_link: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    let builder = PayloadBuilder::new(config);

    let stdout = std::io::stdout();
    let mut writer = if args.pretty {
        PayloadWriter::pretty(stdout.lock())
    } else {
        PayloadWriter::new(stdout.lock())
    };

    let content = read_input(args.input.as_deref())?;

    if args.ndjson {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line).context("Failed to parse JSON")?;
            let payload = builder.build(&args.root_type, value)?;
            writer.write_payload(&payload)?;
        }
    } else {
        let value: Value = serde_json::from_str(&content).context("Failed to parse JSON")?;
        let payload = builder.build(&args.root_type, value)?;
        writer.write_payload(&payload)?;
    }

    writer.flush()
}

/// Merge the optional configuration file with command-line overrides
fn build_config(args: &Args) -> Result<NormalizeConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path))?;
            serde_json::from_str(&raw).context("Failed to parse config file")?
        }
        None => NormalizeConfig::default(),
    };

    if let Some(keys) = &args.exclude {
        config.excluded_keys = split_list(keys);
    }
    if let Some(types) = &args.polymorphic {
        config.polymorphic_types = split_list(types);
    }
    if let Some(types) = &args.link_back {
        config.link_back_types = split_list(types);
    }
    if let Some(pairs) = &args.map {
        config.mappings.clear();
        for pair in pairs.split(',') {
            match pair.split_once('=') {
                Some((key, type_name)) => {
                    config
                        .mappings
                        .insert(key.trim().to_string(), type_name.trim().to_string());
                }
                None => bail!("--map entries must be key=type, got '{}'", pair),
            }
        }
    }
    if let Some(raw) = &args.parent_link {
        let parent_link: ParentLink =
            serde_json::from_str(raw).context("Failed to parse --parent-link JSON")?;
        config.parent_link = Some(parent_link);
    }

    Ok(config)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Read the whole input from a file or stdin
fn read_input(input_file: Option<&str>) -> Result<String> {
    let reader: Box<dyn Read> = if let Some(file_path) = input_file {
        let file =
            File::open(file_path).with_context(|| format!("Failed to open file: {}", file_path))?;
        Box::new(BufReader::new(file))
    } else {
        Box::new(std::io::stdin())
    };

    let mut content = String::new();
    let mut buf_reader = BufReader::new(reader);
    buf_reader
        .read_to_string(&mut content)
        .context("Failed to read input")?;
    Ok(content)
}
