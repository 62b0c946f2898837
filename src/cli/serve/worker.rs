//! Background sweep worker.
//!
//! Rewrites and the upload endpoint only *request* a sweep; the single worker
//! thread runs it. The job channel holds one slot, so requests arriving while
//! a sweep is queued collapse into it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::asset::AssetRegistry;
use crate::cache::{BackgroundRequest, SiteCache};
use crate::remote::RemoteStore;
use crate::{debug, log};

/// Sweep trigger backed by the worker's job channel.
pub struct ChannelBackground {
    tx: Sender<()>,
}

impl ChannelBackground {
    pub fn new() -> (Self, Receiver<()>) {
        let (tx, rx) = channel::bounded(1);
        (Self { tx }, rx)
    }
}

impl BackgroundRequest for ChannelBackground {
    fn request_sweep(&self) {
        match self.tx.try_send(()) {
            Ok(()) => debug!("worker"; "sweep queued"),
            Err(TrySendError::Full(())) => debug!("worker"; "sweep already queued"),
            Err(TrySendError::Disconnected(())) => log!("worker"; "worker stopped, sweep dropped"),
        }
    }
}

/// What one job runs.
pub struct SweepJob {
    pub cache: Arc<SiteCache>,
    pub registry: Arc<AssetRegistry>,
    pub remote: Arc<dyn RemoteStore>,
}

impl SweepJob {
    /// Static files first, then asset children without a remote copy.
    pub fn run(&self) {
        let Some(report) = self.cache.upload_cache() else {
            debug!("worker"; "sweep skipped, another one is running");
            return;
        };
        let assets = self.registry.sync_pending(self.remote.as_ref());
        log!(
            "worker";
            "sweep done: {} files, {} assets uploaded, {} failed",
            report.uploaded,
            assets.uploaded,
            report.failed + assets.failed
        );
    }
}

/// Spawn the worker; it exits when `shutdown` fires or every sender is gone.
pub fn spawn(job: SweepJob, jobs: Receiver<()>, shutdown: Receiver<()>) -> JoinHandle<()> {
    thread::spawn(move || {
        loop {
            crossbeam::select! {
                recv(jobs) -> msg => match msg {
                    Ok(()) => job.run(),
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
            }
        }
        debug!("worker"; "stopped");
    })
}
