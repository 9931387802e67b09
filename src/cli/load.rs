//! `load` and `clear-cache` commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use bundle_loader::cache::CacheStore;
use bundle_loader::hooks::InMemoryEventHost;
use bundle_loader::kinds::KindRegistry;
use bundle_loader::{ExtensionLoader, LoadReport, LoadSource, LoaderConfig};

fn source_label(source: LoadSource) -> &'static str {
    match source {
        LoadSource::Parsed => "parsed",
        LoadSource::Cache => "cache",
        LoadSource::Session => "session",
    }
}

/// Human-readable summary of a load run.
pub(crate) fn render_report(report: &LoadReport, verbose: bool) -> String {
    let mut out = String::new();
    for loaded in &report.extensions {
        out.push_str(&format!(
            "{} [{}] commands={} skipped={} failed={} hooks={}\n",
            loaded.extension.name,
            source_label(loaded.source),
            loaded.synthesis.len(),
            loaded.synthesis.skipped.len(),
            loaded.synthesis.failures.len(),
            loaded.hooks.registered.len(),
        ));
        if verbose {
            for (unique_name, artifact) in &loaded.synthesis.artifacts {
                out.push_str(&format!(
                    "  {} \"{}\" {:?}\n",
                    unique_name, artifact.title, artifact.dispatch
                ));
            }
            for skipped in &loaded.synthesis.skipped {
                out.push_str(&format!("  skipped {}: {}\n", skipped.unique_name, skipped.reason));
            }
            for failure in &loaded.synthesis.failures {
                out.push_str(&format!("  failed: {}\n", failure));
            }
        }
    }
    if !report.libraries.is_empty() {
        out.push_str(&format!("libraries: {}\n", report.libraries.join(", ")));
    }
    if !report.disabled.is_empty() {
        out.push_str(&format!("disabled: {}\n", report.disabled.join(", ")));
    }
    for failure in &report.failures {
        out.push_str(&format!("error: {}\n", failure));
    }
    out
}

pub(crate) fn cmd_load(config_path: Option<&Path>, roots: Vec<PathBuf>, verbose: bool) -> Result<()> {
    let config = LoaderConfig::load(config_path).context("Failed to load configuration")?;
    let mut loader = if roots.is_empty() {
        ExtensionLoader::new(config)
    } else {
        ExtensionLoader::with_parts(config, Box::new(roots), KindRegistry::with_builtin())
    };

    let mut host = InMemoryEventHost::new();
    let report = loader.load_all(&mut host);
    print!("{}", render_report(&report, verbose));
    println!(
        "{} extension(s), {} command(s), {} hook(s)",
        report.extensions.len(),
        report.artifact_count(),
        host.subscription_count()
    );
    Ok(())
}

pub(crate) fn cmd_clear_cache(config_path: Option<&Path>, extension: Option<&str>) -> Result<()> {
    let config = LoaderConfig::load(config_path).context("Failed to load configuration")?;
    let store = CacheStore::from_config(&config.cache);
    match extension {
        Some(name) => {
            let removed = store
                .invalidate(name)
                .with_context(|| format!("Failed to remove cache of {}", name))?;
            if removed {
                println!("Removed cache of {}", name);
            } else {
                println!("No cache for {}", name);
            }
        }
        None => {
            let removed = store
                .clear()
                .with_context(|| format!("Failed to clear {}", store.dir().display()))?;
            println!("Removed {} cache file(s) from {}", removed, store.dir().display());
        }
    }
    Ok(())
}
