//! amf-encode
//!
//! Encodes JSON documents into a framed AMF stream, one message per document

use amf_stream::{AmfStreamBuilder, EncoderConfig, SurrogateEncoding, Value, WriteTransport};
use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "amf-encode")]
#[command(about = "Encode JSON documents as framed AMF3 messages")]
struct Args {
    /// JSON files, one document each (reads one document per stdin line if empty)
    inputs: Vec<PathBuf>,

    /// Output file [default: stdout]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Encoder configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the flush threshold in bytes
    #[arg(long)]
    flush_threshold: Option<usize>,

    /// Supplementary character encoding (split, standard)
    #[arg(long)]
    surrogate_encoding: Option<String>,
}

/// Parse surrogate encoding from CLI string
fn parse_surrogate_encoding(s: &str) -> Result<SurrogateEncoding, String> {
    match s.to_lowercase().as_str() {
        "split" => Ok(SurrogateEncoding::Split),
        "standard" | "utf8" | "utf-8" => Ok(SurrogateEncoding::Standard),
        _ => Err(format!(
            "Invalid surrogate encoding '{}'. Valid options: split, standard",
            s
        )),
    }
}

fn read_documents(inputs: &[PathBuf]) -> anyhow::Result<Vec<(String, serde_json::Value)>> {
    let mut documents = Vec::new();

    if inputs.is_empty() {
        for (line_no, line) in io::stdin().lock().lines().enumerate() {
            let line = line.context("reading stdin")?;
            if line.trim().is_empty() {
                continue;
            }
            let json = serde_json::from_str(&line)
                .with_context(|| format!("stdin line {}", line_no + 1))?;
            documents.push((format!("stdin:{}", line_no + 1), json));
        }
    } else {
        for path in inputs {
            let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
            let json = serde_json::from_reader(io::BufReader::new(file))
                .with_context(|| format!("parsing {:?}", path))?;
            documents.push((path.display().to_string(), json));
        }
    }

    Ok(documents)
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout may carry the stream
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config: {:?}", path);
            EncoderConfig::load(path).with_context(|| format!("loading {:?}", path))?
        }
        None => EncoderConfig::default(),
    };
    if let Some(threshold) = args.flush_threshold {
        config.flush_threshold = threshold;
    }
    if let Some(encoding) = &args.surrogate_encoding {
        config.surrogate_encoding =
            parse_surrogate_encoding(encoding).map_err(anyhow::Error::msg)?;
    }

    let documents = read_documents(&args.inputs)?;
    info!("Encoding {} document(s)", documents.len());

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {:?}", path))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    let mut stream = AmfStreamBuilder::new()
        .config(config)
        .build(WriteTransport::new(writer))?;

    for (source, json) in documents {
        let length = stream
            .write_message(&Value::from(json))
            .with_context(|| format!("encoding {}", source))?;
        debug!(source = %source, length, "Encoded document");
    }
    stream.close()?;

    eprintln!(
        "{} block(s), {} byte(s), {} registry string(s)",
        stream.blocks_written(),
        stream.bytes_flushed(),
        stream.registry().len()
    );
    Ok(())
}
