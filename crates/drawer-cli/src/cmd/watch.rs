//! `drw watch`: run the sync engine against a host directory until Ctrl-C.
//!
//! Host edits to the working canvas are committed after the debounce window.
//! On exit, a change still inside its window is saved immediately rather than
//! dropped.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use drawer_core::Session;
use drawer_core::bus::DrawerEvent;
use serde_json::json;
use tracing::{info, warn};

use super::canvas::resolve_canvas;
use super::open::file_host;
use crate::output::{OutputMode, fail};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Directory holding the host app's storage files.
    #[arg(long, value_name = "DIR")]
    pub host_dir: PathBuf,

    /// Open this canvas before watching.
    #[arg(long)]
    pub canvas: Option<String>,

    /// Stop after this many milliseconds instead of waiting for Ctrl-C.
    #[arg(long, value_name = "MS")]
    pub exit_after_ms: Option<u64>,
}

fn print_event(event: &DrawerEvent, output: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match (event, output) {
        (DrawerEvent::CanvasSaved(canvas), OutputMode::Json) => writeln!(
            out,
            "{}",
            json!({
                "event": event.topic(),
                "canvasId": canvas.id,
                "elements": canvas.live_element_count(),
                "updatedAt": canvas.updated_at,
            })
        ),
        (DrawerEvent::CanvasSaved(canvas), _) => writeln!(
            out,
            "saved {} ({} elements)",
            canvas.name,
            canvas.live_element_count()
        ),
        (DrawerEvent::ErrorOccurred { error, details }, OutputMode::Json) => writeln!(
            out,
            "{}",
            json!({ "event": event.topic(), "error": error, "details": details })
        ),
        (DrawerEvent::ErrorOccurred { error, .. }, _) => {
            eprintln!("error: {error}");
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn wait_for_exit(exit_after: Option<Duration>) {
    let timer = async {
        match exit_after {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending().await,
        }
    };
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        () = ctrl_c => info!("interrupted"),
        () = timer => {}
    }
}

pub async fn run_watch(session: &Session, args: &WatchArgs, output: OutputMode) -> anyhow::Result<()> {
    let opening = args
        .canvas
        .as_deref()
        .map(|q| resolve_canvas(session, q, output))
        .transpose()?;

    let printer = session
        .bus()
        .subscribe(move |event| print_event(event, output).map_err(Into::into));
    let runtime = session.start(file_host(session, &args.host_dir)?);

    if let Some(canvas) = opening {
        session
            .select_canvas(runtime.engine(), &canvas.id)
            .await
            .map_err(|e| fail(output, e))?;
    }
    match session.current_canvas() {
        Some(canvas) => info!(canvas_id = %canvas.id, name = %canvas.name, "watching host"),
        None => warn!("no canvas is open; host edits will not be saved"),
    }

    wait_for_exit(args.exit_after_ms.map(Duration::from_millis)).await;

    let engine = runtime.engine();
    if session.current_canvas_id().is_some() && !engine.is_loading() && engine.has_document_changed() {
        match session.save_now(engine).await {
            Ok(outcome) => info!(committed = outcome.is_committed(), "final save"),
            Err(error) => warn!(error = %error, "final save failed"),
        }
    }
    runtime.shutdown().await;
    session.bus().unsubscribe(printer);
    Ok(())
}
