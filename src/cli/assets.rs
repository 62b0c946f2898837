//! Asset registry commands: `assets`, `purge`, `nonce`.

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;

use super::common::{Engines, write_output};
use crate::admin::{CLEAR_ACTION, OVERLAY_ACTION};
use crate::logger;
use crate::utils::plural::plural_count;

/// Run a registration pass and list the parents.
pub fn run_assets(engines: &Engines, sync: bool) -> Result<()> {
    let registry = &engines.registry;
    let report = registry.run_pass().context("registration pass failed")?;
    if report.deferred {
        logger::failure("asset registry is locked", "another pass is running, try again shortly");
        return Ok(());
    }

    let mut out = String::new();
    for parent in registry.records().parents() {
        let children = registry.records().child_count(parent.id);
        out.push_str(&format!(
            "{:>5}  {}  {}  {}\n",
            parent.id,
            parent.path.cyan(),
            format!("v{}", parent.version).dimmed(),
            plural_count(children, "file")
        ));
    }
    write_output(None, &out)?;
    logger::success(&format!(
        "{} active, {} purged",
        plural_count(report.registered, "parent"),
        report.purged
    ));

    if sync {
        let synced = registry.sync_pending(engines.remote.as_ref());
        logger::success(&format!(
            "{} uploaded, {} failed",
            plural_count(synced.uploaded, "asset"),
            synced.failed
        ));
    }
    Ok(())
}

/// Purge one parent, or all of them.
pub fn purge(engines: &Engines, id: Option<u64>, all: bool) -> Result<()> {
    let registry = &engines.registry;
    if all {
        let purged = registry.purge_all().context("purge failed")?;
        logger::success(&format!("{} purged", plural_count(purged, "parent")));
        return Ok(());
    }

    let Some(id) = id else {
        bail!("give a parent id or --all");
    };
    if registry.records().parent(id).is_none() {
        bail!("no asset parent with id {id}");
    }
    match registry.purge(id).context("purge failed")? {
        Some(removed) => logger::success(&format!(
            "parent {id} purged with {}",
            plural_count(removed, "file")
        )),
        None => logger::failure("asset registry is locked", "try again in a few seconds"),
    }
    Ok(())
}

/// Print a nonce for an admin action.
pub fn print_nonce(engines: &Engines, action: &str) -> Result<()> {
    if action != CLEAR_ACTION && action != OVERLAY_ACTION {
        bail!("unknown action `{action}`, expected {CLEAR_ACTION} or {OVERLAY_ACTION}");
    }
    let nonce = engines.admin.nonce(action)?;
    write_output(None, &format!("{nonce}\n"))
}
