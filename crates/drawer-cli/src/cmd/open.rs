//! `drw open`: project a canvas into the host directory and make it the
//! working canvas.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::Args;
use drawer_core::Session;
use drawer_core::host::{FileHost, HostAdapter};
use serde::Serialize;

use super::CanvasSummary;
use super::canvas::resolve_canvas;
use crate::output::{OutputMode, fail, pretty_kv, render};

#[derive(Args, Debug)]
pub struct OpenArgs {
    pub canvas: String,

    /// Directory holding the host app's storage files.
    #[arg(long, value_name = "DIR")]
    pub host_dir: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenReport {
    canvas: CanvasSummary,
    host_dir: PathBuf,
    reload_requested: bool,
}

/// Open `dir` as host storage using the session's key names.
pub fn file_host(session: &Session, dir: &Path) -> anyhow::Result<HostAdapter> {
    let host = FileHost::open(dir)
        .with_context(|| format!("failed to open host directory {}", dir.display()))?;
    Ok(HostAdapter::new(Arc::new(host), &session.config().host))
}

pub async fn run_open(session: &Session, args: &OpenArgs, output: OutputMode) -> anyhow::Result<()> {
    let canvas = resolve_canvas(session, &args.canvas, output)?;
    let engine = session.engine(file_host(session, &args.host_dir)?);

    let opened = session
        .select_canvas(&engine, &canvas.id)
        .await
        .map_err(|e| fail(output, e))?;
    // The reload request is written after the configured delay.
    engine.settled().await;
    engine.shutdown();

    let report = OpenReport {
        canvas: CanvasSummary::of(session, &opened),
        host_dir: args.host_dir.clone(),
        reload_requested: true,
    };
    render(output, &report, |r, w| {
        writeln!(w, "✓ opened {} ({})", r.canvas.name, r.canvas.id)?;
        pretty_kv(w, "host", r.host_dir.display().to_string())?;
        pretty_kv(w, "elements", r.canvas.elements.to_string())
    })
}
