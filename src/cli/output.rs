use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use tokio::io::AsyncReadExt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// Prints `value` in the requested format; `human` renders the plain-text view.
pub fn emit<T, F>(format: OutputFormat, value: &T, human: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    let rendered = match format {
        OutputFormat::Human => human(value),
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

/// Reads a file, or stdin when `source` is `-`.
pub async fn read_source(source: &str) -> Result<String> {
    if source == "-" {
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .context("failed to read stdin")?;
        return Ok(buffer);
    }
    tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("failed to read {source}"))
}
