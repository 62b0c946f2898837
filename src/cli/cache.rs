//! Static cache commands: `index`, `rewrite`, `sweep`, `reset-errors`.

use std::path::Path;

use anyhow::{Context, Result};

use super::common::{Engines, read_input, write_output};
use crate::asset::Discovery;
use crate::cache::DeferredRequest;
use crate::log;
use crate::logger;
use crate::utils::plural::plural_count;

/// Print the active URL → file map.
pub fn print_index(engines: &Engines, pretty: bool) -> Result<()> {
    let paths = engines.cache.paths();
    let json = if pretty {
        serde_json::to_string_pretty(&paths)
    } else {
        serde_json::to_string(&paths)
    }
    .context("cannot encode index")?;
    write_output(None, &format!("{json}\n"))
}

/// Rewrite one document and run discovery over the result.
pub fn rewrite_file(
    engines: &Engines,
    background: &DeferredRequest,
    file: &Path,
    uri: &str,
    output: Option<&Path>,
) -> Result<()> {
    let html = read_input(file)?;
    let rewritten = engines.cache.html_rewrite(&html, uri);

    let mut discovery = Discovery::new(&engines.registry);
    discovery.scan_document(&rewritten);
    let report = discovery.finish().context("asset discovery failed")?;

    write_output(output, &rewritten)?;

    if background.requests() > 0 {
        log!("rewrite"; "uploads pending, run `edgeshift sweep`");
    }
    if !report.created.is_empty() {
        log!("assets"; "{} discovered", plural_count(report.created.len(), "new asset"));
    }
    Ok(())
}

/// Upload everything pending: static files first, then asset children.
pub fn sweep(engines: &Engines) -> Result<()> {
    let Some(report) = engines.cache.upload_cache() else {
        logger::failure("another sweep is running", "try again in a few seconds");
        return Ok(());
    };

    let assets = engines.registry.sync_pending(engines.remote.as_ref());
    let failed = report.failed + assets.failed;
    let summary = format!(
        "{} and {} uploaded",
        plural_count(report.uploaded, "file"),
        plural_count(assets.uploaded, "asset")
    );
    if failed == 0 {
        logger::success(&summary);
    } else {
        logger::failure(
            &summary,
            &format!("{} failed, see `--verbose`", plural_count(failed, "upload")),
        );
    }
    Ok(())
}

/// Clear upload error counters.
pub fn reset_errors(engines: &Engines, file: Option<&Path>) -> Result<()> {
    let file = file.map(|f| {
        if f.is_relative() {
            engines.settings.site.root.join(f)
        } else {
            f.to_path_buf()
        }
    });
    let cleared = engines
        .cache
        .pipeline()
        .reset_errors(file.as_deref())
        .context("cannot reset error counters")?;
    logger::success(&format!("{} cleared", plural_count(cleared, "error counter")));
    Ok(())
}
