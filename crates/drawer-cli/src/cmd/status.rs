//! `drw status`: store location, probes, and the working canvas.

use std::path::PathBuf;

use clap::Args;
use drawer_core::Session;
use drawer_core::capabilities::{describe_capabilities, detect_capabilities};
use serde::Serialize;

use super::CanvasSummary;
use crate::output::{OutputMode, pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Also probe this host directory.
    #[arg(long, value_name = "DIR")]
    pub host_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CapabilityReport {
    name: &'static str,
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    store_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    degraded: Option<String>,
    canvases: usize,
    projects: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    open_canvas: Option<CanvasSummary>,
    capabilities: Vec<CapabilityReport>,
}

pub async fn run_status(
    session: &Session,
    args: &StatusArgs,
    output: OutputMode,
) -> anyhow::Result<()> {
    let caps = detect_capabilities(
        session.store(),
        !session.is_degraded(),
        args.host_dir.as_deref(),
    )
    .await;
    let capabilities = describe_capabilities(&caps)
        .into_iter()
        .filter(|c| args.host_dir.is_some() || !c.name.starts_with("host_"))
        .map(|c| CapabilityReport {
            name: c.name,
            available: c.available,
            fallback: (!c.available).then_some(c.fallback),
        })
        .collect();

    let (canvases, projects) = {
        let library = session.library().read();
        (library.canvases().len(), library.projects().len())
    };
    let report = StatusReport {
        store_path: session.config().store.resolved_path(),
        degraded: session.degraded_reason().map(str::to_owned),
        canvases,
        projects,
        open_canvas: session
            .current_canvas()
            .map(|c| CanvasSummary::of(session, &c)),
        capabilities,
    };

    render(output, &report, |r, w| {
        pretty_section(w, "drawer status")?;
        let store = r
            .store_path
            .as_ref()
            .map_or_else(|| "-".to_owned(), |p| p.display().to_string());
        pretty_kv(w, "store", store)?;
        if let Some(reason) = &r.degraded {
            pretty_kv(w, "degraded", reason)?;
        }
        pretty_kv(w, "canvases", r.canvases.to_string())?;
        pretty_kv(w, "projects", r.projects.to_string())?;
        let open = r
            .open_canvas
            .as_ref()
            .map_or_else(|| "none".to_owned(), |c| format!("{} ({})", c.name, c.id));
        pretty_kv(w, "open", open)?;
        for cap in &r.capabilities {
            match cap.fallback {
                None => writeln!(w, "  ✓ {}", cap.name)?,
                Some(fallback) => writeln!(w, "  ✗ {}: {fallback}", cap.name)?,
            }
        }
        Ok(())
    })
}
