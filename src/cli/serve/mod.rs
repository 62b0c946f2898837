//! Rewrite and admin server.
//!
//! | Route                        | Effect                                   |
//! |------------------------------|------------------------------------------|
//! | `POST /rewrite?uri=…`        | rewrite the posted document              |
//! | `POST /api/upload_cache`     | queue a sweep (bearer token)             |
//! | `GET /?cache-clear=<nonce>`  | clear remote copies, `302` to `Referer`  |
//! | `GET /?cache-overlay=<nonce>`| toggle the overlay, `302` to `Referer`   |
//! | `GET /status`                | cache report as JSON                     |

mod lifecycle;
mod response;
mod worker;

pub use lifecycle::{is_shutdown, setup_shutdown_handler};
pub use worker::{ChannelBackground, SweepJob};

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel;
use serde::Serialize;
use tiny_http::{Method, Request, Server};

use super::common::Engines;
use crate::admin::{AdminError, CLEAR_ACTION, OVERLAY_ACTION};
use crate::asset::Discovery;
use crate::config::Settings;
use crate::{debug, log};

/// Worker threads handling requests.
const POOL_THREADS: usize = 4;

/// A request, reduced to what the router looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Rewrite { uri: String },
    UploadCache,
    ClearCache { nonce: String },
    ToggleOverlay { nonce: String },
    Status,
    NotFound,
}

impl Route {
    fn parse(method: &Method, url: &str) -> Self {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        let param = |name: &str| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };

        match (method, path) {
            (Method::Post, "/rewrite") => Self::Rewrite {
                uri: param("uri").unwrap_or_else(|| "/".to_string()),
            },
            (Method::Post, "/api/upload_cache") => Self::UploadCache,
            (Method::Get, "/status") => Self::Status,
            (Method::Get, "/") => {
                if let Some(nonce) = param(CLEAR_ACTION) {
                    Self::ClearCache { nonce }
                } else if let Some(nonce) = param(OVERLAY_ACTION) {
                    Self::ToggleOverlay { nonce }
                } else {
                    Self::NotFound
                }
            }
            _ => Self::NotFound,
        }
    }
}

/// Outcome of the bearer check on the privileged endpoint.
#[derive(Debug, PartialEq, Eq)]
enum Auth {
    /// No token configured, the endpoint does not exist.
    Disabled,
    Denied,
    Granted,
}

fn authorize(token: &str, authorization: Option<&str>) -> Auth {
    if token.is_empty() {
        return Auth::Disabled;
    }
    let given = authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or_default();
    // blake3::Hash compares in constant time
    if blake3::hash(given.as_bytes()) == blake3::hash(token.as_bytes()) {
        Auth::Granted
    } else {
        Auth::Denied
    }
}

#[derive(Serialize)]
struct Queued {
    queued: bool,
    pending: usize,
}

/// Bound server ready to accept requests
pub struct BoundServer {
    server: Arc<Server>,
    engines: Arc<Engines>,
    worker: JoinHandle<()>,
}

/// Build the engines around the worker channel, run a registry pass and bind.
pub fn bind_server(settings: Settings) -> Result<BoundServer> {
    let (background, jobs) = ChannelBackground::new();
    let engines = Arc::new(Engines::open(settings, Arc::new(background))?);

    let pass = engines
        .registry
        .run_pass()
        .context("startup registration pass failed")?;
    debug!("assets"; "{} parents active, {} purged", pass.registered, pass.purged);

    let serve = &engines.settings.serve;
    let (server, addr) = lifecycle::bind_with_retry(serve.interface, serve.port)?;
    let server = Arc::new(server);

    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    lifecycle::register_server(Arc::clone(&server), shutdown_tx);

    let worker = worker::spawn(
        SweepJob {
            cache: engines.cache.clone(),
            registry: engines.registry.clone(),
            remote: engines.remote.clone(),
        },
        jobs,
        shutdown_rx,
    );

    log!("serve"; "http://{}", addr);
    Ok(BoundServer {
        server,
        engines,
        worker,
    })
}

impl BoundServer {
    /// Start the request loop (blocking).
    pub fn run(self) -> Result<()> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(POOL_THREADS)
            .build()
            .context("failed to create thread pool")?;

        for request in self.server.incoming_requests() {
            let engines = Arc::clone(&self.engines);
            pool.spawn(move || {
                if let Err(e) = handle_request(request, &engines) {
                    log!("serve"; "request error: {e:#}");
                }
            });
        }

        wait_for_worker(self.worker);
        Ok(())
    }
}

/// Give the worker up to two seconds to finish its sweep.
fn wait_for_worker(handle: JoinHandle<()>) {
    for _ in 0..40 {
        if handle.is_finished() {
            let _ = handle.join();
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
}

fn handle_request(mut request: Request, engines: &Engines) -> Result<()> {
    if is_shutdown() {
        return response::respond_unavailable(request);
    }

    let route = Route::parse(request.method(), request.url());
    debug!("serve"; "{} {} -> {:?}", request.method(), request.url(), route);

    match route {
        Route::Rewrite { uri } => {
            let mut html = String::new();
            request
                .as_reader()
                .read_to_string(&mut html)
                .context("cannot read request body")?;
            let rewritten = engines.cache.html_rewrite(&html, &uri);

            let mut discovery = Discovery::new(&engines.registry);
            discovery.scan_document(&rewritten);
            if let Err(e) = discovery.finish() {
                log!("assets"; "discovery failed for {}: {}", uri, e);
            }
            response::respond_html(request, rewritten)
        }
        Route::UploadCache => {
            let authorization = response::header(&request, "Authorization");
            match authorize(&engines.settings.serve.token, authorization.as_deref()) {
                Auth::Disabled => response::respond_not_found(request),
                Auth::Denied => response::respond_status(request, 401, "Unauthorized"),
                Auth::Granted => {
                    let pending = engines.cache.pending_count();
                    engines.background.request_sweep();
                    let body = Queued {
                        queued: true,
                        pending,
                    };
                    response::respond_json(request, 202, &body)
                }
            }
        }
        Route::ClearCache { nonce } => {
            let referer = response::header(&request, "Referer").unwrap_or_default();
            let outcome = engines.admin.clear_cache(&nonce, &referer);
            respond_admin(request, outcome)
        }
        Route::ToggleOverlay { nonce } => {
            let referer = response::header(&request, "Referer").unwrap_or_default();
            let outcome = engines.admin.toggle_overlay(&nonce, &referer);
            respond_admin(request, outcome)
        }
        Route::Status => response::respond_json(request, 200, &engines.admin.cache_report()),
        Route::NotFound => response::respond_not_found(request),
    }
}

fn respond_admin(
    request: Request,
    outcome: Result<crate::admin::Redirect, AdminError>,
) -> Result<()> {
    match outcome {
        Ok(redirect) => response::respond_redirect(request, &redirect.location),
        Err(AdminError::InvalidNonce(action)) => {
            log!("admin"; "rejected `{}`: invalid nonce", action);
            response::respond_status(request, 403, "Forbidden")
        }
        Err(AdminError::Disabled) => response::respond_not_found(request),
        Err(e) => {
            log!("admin"; "action failed: {}", e);
            response::respond_status(request, 500, "Internal Server Error")
        }
    }
}
