use anyhow::{bail, Context, Result};
use blog_network::{BlogConfig, LoaderEvent, Network, NetworkEvent, RawPost, SelectOptions};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info};

/// Merge blogs stored as JSON arrays of post records and print a selection.
#[derive(Parser, Debug)]
#[command(name = "blog-network", version)]
struct Args {
    /// Blog to load, as NAME=PATH. Repeat for every blog; order decides ties.
    #[arg(long = "blog", value_name = "NAME=PATH", required = true)]
    blogs: Vec<String>,

    /// Select options as a JSON object, e.g. '{"limit": 5, "distinct": true}'
    #[arg(long, default_value = "{}")]
    options: String,

    /// Title given to posts that have none
    #[arg(long, default_value = "Untitled")]
    default_title: String,

    /// Print only the number of selected posts
    #[arg(long)]
    count: bool,
}

fn parse_blog_arg(arg: &str) -> Result<(String, PathBuf)> {
    match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => bail!("expected NAME=PATH, got {:?}", arg),
    }
}

fn read_records(path: &PathBuf) -> Result<Vec<RawPost>> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse posts in {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = BlogConfig {
        default_title: args.default_title.clone(),
        ..BlogConfig::default()
    };
    let options_json: serde_json::Value =
        serde_json::from_str(&args.options).context("--options is not valid JSON")?;
    let options = SelectOptions::from_json(&options_json)?;

    let mut network = Network::with_config(config);
    for arg in &args.blogs {
        let (name, path) = parse_blog_arg(arg)?;
        let records = read_records(&path)?;
        info!("Loaded {} records for blog {} from {}", records.len(), name, path.display());

        network.register(name.as_str())?;
        network.deliver(&name, LoaderEvent::Loaded(records))?;
    }

    for event in network.drain_events() {
        match event {
            NetworkEvent::Ready => info!("All {} blogs are ready", network.len()),
            NetworkEvent::Error { blog, error } => error!("Blog {} failed to load: {}", blog, error),
        }
    }

    if args.count {
        println!("{}", network.count(&options)?);
        return Ok(());
    }

    for selected in network.select(&options)? {
        println!("{}", serde_json::to_string(&selected)?);
    }
    Ok(())
}
