//! `kbsync vault ...`: inspect a local vault without touching the store.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::vault::{Vault, VaultContent};

fn open_vault(config: &Config) -> Result<Vault> {
    let vault_cfg = config
        .vault
        .as_ref()
        .context("No [vault] section in config")?;
    Ok(Vault::new(vault_cfg)?)
}

fn print_items(items: &[VaultContent], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
        return Ok(());
    }

    println!(
        "{:<32} {:<7} {:<4} {:<10} {:>6} {:>5}",
        "THEME", "FORMAT", "LANG", "STATUS", "WORDS", "SCORE"
    );
    for item in items {
        println!(
            "{:<32} {:<7} {:<4} {:<10} {:>6} {:>5.1}",
            item.theme_id,
            item.format,
            item.language,
            item.status,
            item.metadata.word_count,
            item.overall_score()
        );
    }
    println!("{} file(s)", items.len());
    Ok(())
}

pub fn run_themes(config: &Config, json: bool) -> Result<()> {
    let themes = open_vault(config)?.themes()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&themes)?);
        return Ok(());
    }

    println!(
        "{:<32} {:<11} {:<18} {:>6} {:>5}",
        "THEME", "CORNERSTONE", "FORMATS", "WORDS", "BEST"
    );
    for t in &themes {
        println!(
            "{:<32} {:<11} {:<18} {:>6} {:>5.1}",
            t.theme_id,
            if t.is_cornerstone { "yes" } else { "" },
            t.formats.join(","),
            t.total_word_count,
            t.best_quality_score
        );
    }
    println!("{} theme(s)", themes.len());
    Ok(())
}

pub fn run_stats(config: &Config, json: bool) -> Result<()> {
    let vault = open_vault(config)?;
    let stats = vault.stats()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("vault {}", vault.root().display());
    println!("  files: {}", stats.total_files);
    println!("  themes: {}", stats.total_themes);
    println!("  words: {}", stats.total_words);
    println!("  cornerstone: {}", stats.cornerstone_count);
    let join = |m: &std::collections::BTreeMap<String, usize>| {
        m.iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    };
    println!("  formats: {}", join(&stats.formats));
    println!("  languages: {}", join(&stats.languages));
    println!("  quality: {}", join(&stats.quality_distribution));
    Ok(())
}

pub fn run_cornerstone(config: &Config, json: bool) -> Result<()> {
    print_items(&open_vault(config)?.cornerstone()?, json)
}

pub fn run_quality(config: &Config, min_score: Option<f64>, json: bool) -> Result<()> {
    print_items(&open_vault(config)?.high_quality(min_score)?, json)
}

pub fn run_show(
    config: &Config,
    theme_id: &str,
    format: Option<&str>,
    language: Option<&str>,
    json: bool,
) -> Result<()> {
    print_items(
        &open_vault(config)?.content_for_theme(theme_id, format, language)?,
        json,
    )
}

pub fn run_by_format(config: &Config, format: &str, language: &str, json: bool) -> Result<()> {
    print_items(&open_vault(config)?.content_by_format(format, language)?, json)
}
