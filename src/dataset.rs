//! Catalog dataset download.
//!
//! Fetches the Scryfall bulk "all cards" export, filters it down to unique
//! English cards, and writes the JSONL file the ingestion pipeline consumes.
//! Maintenance glue, not part of the serving path.

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;

const BULK_DATA_URL: &str = "https://api.scryfall.com/bulk-data/all_cards";

/// Download the bulk catalog and write it as deduplicated JSONL.
///
/// Cards are kept when they are English and carry both a name and oracle
/// text; duplicates (same name and oracle text, e.g. reprints) keep only the
/// first printing encountered.
pub async fn run_fetch(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| config.catalog.path.clone());
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let client = reqwest::Client::new();

    let bulk: Value = client
        .get(BULK_DATA_URL)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
        .context("Failed to read bulk data descriptor")?;
    let download_uri = bulk
        .get("download_uri")
        .and_then(Value::as_str)
        .context("Bulk data descriptor has no download_uri")?;

    info!(uri = download_uri, "downloading card catalog");
    let raw_path = output.with_extension("raw.json");
    download_to(&client, download_uri, &raw_path).await?;

    let written = filter_to_jsonl(&raw_path, &output)?;
    std::fs::remove_file(&raw_path).ok();

    println!("fetch");
    println!("  unique cards: {}", written);
    println!("  written to: {}", output.display());
    println!("ok");
    Ok(())
}

async fn download_to(client: &reqwest::Client, uri: &str, path: &Path) -> Result<()> {
    let mut response = client.get(uri).send().await?.error_for_status()?;
    let mut file = BufWriter::new(File::create(path)?);
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk)?;
    }
    file.flush()?;
    Ok(())
}

/// Filter the raw bulk export (one big JSON array) down to unique English
/// cards, one JSON object per line.
fn filter_to_jsonl(raw_path: &Path, output: &Path) -> Result<usize> {
    let reader = BufReader::new(File::open(raw_path)?);
    let cards: Vec<Value> =
        serde_json::from_reader(reader).context("Failed to parse bulk export")?;

    let mut seen = std::collections::HashSet::new();
    let mut out = BufWriter::new(File::create(output)?);
    let mut written = 0usize;

    for card in &cards {
        if card.get("lang").and_then(Value::as_str) != Some("en") {
            continue;
        }
        let name = card.get("name").and_then(Value::as_str).unwrap_or_default();
        let oracle_text = card
            .get("oracle_text")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if name.is_empty() || oracle_text.is_empty() {
            continue;
        }
        if !seen.insert((name.to_string(), oracle_text.to_string())) {
            continue;
        }

        serde_json::to_writer(&mut out, card)?;
        out.write_all(b"\n")?;
        written += 1;
    }

    out.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_keeps_unique_english_cards() {
        let tmp = tempfile::TempDir::new().unwrap();
        let raw = tmp.path().join("bulk.json");
        let out = tmp.path().join("cards.jsonl");

        let cards = json!([
            {"lang": "en", "name": "Shock", "oracle_text": "Shock deals 2 damage."},
            {"lang": "de", "name": "Schock", "oracle_text": "Schock fügt 2 Schadenspunkte zu."},
            {"lang": "en", "name": "Shock", "oracle_text": "Shock deals 2 damage."},
            {"lang": "en", "name": "Island", "oracle_text": ""},
            {"lang": "en", "name": "Opt", "oracle_text": "Scry 1. Draw a card."},
        ]);
        std::fs::write(&raw, serde_json::to_string(&cards).unwrap()).unwrap();

        let written = filter_to_jsonl(&raw, &out).unwrap();
        assert_eq!(written, 2);

        let lines: Vec<String> = std::fs::read_to_string(&out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Shock"));
        assert!(lines[1].contains("Opt"));
    }
}
