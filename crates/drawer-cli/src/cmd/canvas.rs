//! Canvas commands: `new`, `list`, `show`, `rename`, `rm`, `mv`, `dup`,
//! `export`, `import`.
//!
//! Canvas and project arguments accept a full id, a unique id prefix, or an
//! exact name.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use drawer_core::model::{Canvas, Project};
use drawer_core::Session;
use serde::Serialize;
use tracing::info;

use super::{CanvasSummary, local_time};
use crate::output::{
    OutputMode, Renderable, fail, pretty_kv, pretty_section, render, render_list, render_success,
};

#[derive(Args, Debug)]
pub struct NewArgs {
    pub name: String,

    /// Project to create the canvas in.
    #[arg(long, short)]
    pub project: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only canvases in this project.
    #[arg(long, short, conflicts_with = "unorganized")]
    pub project: Option<String>,

    /// Only canvases outside every project.
    #[arg(long)]
    pub unorganized: bool,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub canvas: String,
}

#[derive(Args, Debug)]
pub struct RenameArgs {
    pub canvas: String,
    pub name: String,
}

#[derive(Args, Debug)]
pub struct RmArgs {
    pub canvas: String,
}

#[derive(Args, Debug)]
#[group(id = "destination", required = true, multiple = false, args = ["project", "none"])]
pub struct MvArgs {
    pub canvas: String,

    /// Destination project.
    #[arg(long, short)]
    pub project: Option<String>,

    /// Remove the canvas from its project.
    #[arg(long)]
    pub none: bool,
}

#[derive(Args, Debug)]
pub struct DupArgs {
    pub canvas: String,

    /// Name of the copy. Defaults to "<name> (copy)".
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    pub canvas: String,

    /// File to write. Prints to stdout when omitted.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// An .excalidraw file or a JSON array of elements.
    pub file: PathBuf,

    /// Canvas name. Defaults to the file stem.
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, short)]
    pub project: Option<String>,
}

pub fn resolve_canvas(
    session: &Session,
    query: &str,
    output: OutputMode,
) -> anyhow::Result<Canvas> {
    session.find_canvas(query).map_err(|e| fail(output, e))
}

pub fn resolve_project(
    session: &Session,
    query: &str,
    output: OutputMode,
) -> anyhow::Result<Project> {
    session.find_project(query).map_err(|e| fail(output, e))
}

fn print_summary(summary: &CanvasSummary, w: &mut dyn Write) -> io::Result<()> {
    pretty_kv(w, "id", &summary.id)?;
    pretty_kv(w, "name", &summary.name)?;
    if let Some(project) = &summary.project_name {
        pretty_kv(w, "project", project)?;
    }
    pretty_kv(w, "elements", summary.elements.to_string())?;
    pretty_kv(w, "updated", local_time(summary.updated_at))
}

impl Renderable for CanvasSummary {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let project = self
            .project_name
            .as_deref()
            .map_or_else(String::new, |p| format!("  [{p}]"));
        writeln!(
            w,
            "{:<10} {:<32} {:>5}  {}{project}",
            short_id(&self.id),
            self.name,
            self.elements,
            local_time(self.updated_at)
        )
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self)?;
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            self.id,
            self.name,
            self.project_id.as_deref().unwrap_or("-"),
            self.elements,
            self.updated_at.to_rfc3339()
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "name", "project", "elements", "updated"]
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

pub async fn run_new(session: &Session, args: &NewArgs, output: OutputMode) -> anyhow::Result<()> {
    let project = args
        .project
        .as_deref()
        .map(|q| resolve_project(session, q, output))
        .transpose()?;
    let canvas = session
        .create_canvas(&args.name, project.map(|p| p.id))
        .await
        .map_err(|e| fail(output, e))?;
    render(output, &CanvasSummary::of(session, &canvas), |s, w| {
        writeln!(w, "✓ created canvas {} ({})", s.name, s.id)
    })
}

pub fn run_list(session: &Session, args: &ListArgs, output: OutputMode) -> anyhow::Result<()> {
    let project = args
        .project
        .as_deref()
        .map(|q| resolve_project(session, q, output))
        .transpose()?;
    let rows: Vec<CanvasSummary> = {
        let library = session.library().read();
        let canvases = if let Some(project) = &project {
            library.canvases_in(Some(&project.id))
        } else if args.unorganized {
            library.canvases_in(None)
        } else {
            library.canvases()
        };
        canvases
            .into_iter()
            .map(|c| {
                let project_name = c
                    .project_id
                    .as_ref()
                    .and_then(|pid| library.project(pid))
                    .map(|p| p.name.clone());
                CanvasSummary::new(c, project_name)
            })
            .collect()
    };

    if rows.is_empty() && !output.is_json() {
        println!("no canvases");
        return Ok(());
    }
    render_list(&rows, output)?;
    Ok(())
}

pub fn run_show(session: &Session, args: &ShowArgs, output: OutputMode) -> anyhow::Result<()> {
    let canvas = resolve_canvas(session, &args.canvas, output)?;
    let summary = CanvasSummary::of(session, &canvas);
    let current = session.current_canvas_id().as_ref() == Some(&canvas.id);
    render(output, &summary, |s, w| {
        pretty_section(w, &s.name)?;
        print_summary(s, w)?;
        pretty_kv(w, "created", local_time(s.created_at))?;
        if current {
            pretty_kv(w, "open", "yes")?;
        }
        Ok(())
    })
}

pub async fn run_rename(
    session: &Session,
    args: &RenameArgs,
    output: OutputMode,
) -> anyhow::Result<()> {
    let canvas = resolve_canvas(session, &args.canvas, output)?;
    let renamed = session
        .rename_canvas(&canvas.id, &args.name)
        .await
        .map_err(|e| fail(output, e))?;
    render(output, &CanvasSummary::of(session, &renamed), |s, w| {
        writeln!(w, "✓ renamed {} to {}", canvas.name, s.name)
    })
}

pub async fn run_rm(session: &Session, args: &RmArgs, output: OutputMode) -> anyhow::Result<()> {
    let canvas = resolve_canvas(session, &args.canvas, output)?;
    session
        .delete_canvas(&canvas.id)
        .await
        .map_err(|e| fail(output, e))?;
    render_success(output, &format!("deleted canvas {} ({})", canvas.name, canvas.id))
}

pub async fn run_mv(session: &Session, args: &MvArgs, output: OutputMode) -> anyhow::Result<()> {
    let canvas = resolve_canvas(session, &args.canvas, output)?;
    let target = if args.none {
        None
    } else {
        args.project
            .as_deref()
            .map(|q| resolve_project(session, q, output))
            .transpose()?
    };
    let moved = session
        .move_canvas(&canvas.id, target.as_ref().map(|p| p.id.clone()))
        .await
        .map_err(|e| fail(output, e))?;
    render(output, &CanvasSummary::of(session, &moved), |s, w| match &s.project_name {
        Some(project) => writeln!(w, "✓ moved {} into {project}", s.name),
        None => writeln!(w, "✓ {} is now unorganized", s.name),
    })
}

pub async fn run_dup(session: &Session, args: &DupArgs, output: OutputMode) -> anyhow::Result<()> {
    let canvas = resolve_canvas(session, &args.canvas, output)?;
    let copy = session
        .duplicate_canvas(&canvas.id, args.name.clone())
        .await
        .map_err(|e| fail(output, e))?;
    render(output, &CanvasSummary::of(session, &copy), |s, w| {
        writeln!(w, "✓ created {} ({})", s.name, s.id)
    })
}

#[derive(Debug, Serialize)]
struct ExportReport {
    id: String,
    path: PathBuf,
}

pub async fn run_export(
    session: &Session,
    args: &ExportArgs,
    output: OutputMode,
) -> anyhow::Result<()> {
    let canvas = resolve_canvas(session, &args.canvas, output)?;
    let document = session
        .export_canvas(&canvas.id)
        .await
        .map_err(|e| fail(output, e))?;
    let text = serde_json::to_string_pretty(&document)?;

    let Some(path) = &args.output else {
        println!("{text}");
        return Ok(());
    };
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    info!(canvas_id = %canvas.id, path = %path.display(), "canvas exported");
    let report = ExportReport {
        id: canvas.id.to_string(),
        path: path.clone(),
    };
    render(output, &report, |r, w| {
        writeln!(w, "✓ exported {} to {}", canvas.name, r.path.display())
    })
}

pub async fn run_import(
    session: &Session,
    args: &ImportArgs,
    output: OutputMode,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let name = args.name.clone().unwrap_or_else(|| {
        args.file
            .file_stem()
            .map_or_else(|| "Imported".to_owned(), |s| s.to_string_lossy().into_owned())
    });
    let project = args
        .project
        .as_deref()
        .map(|q| resolve_project(session, q, output))
        .transpose()?;
    let canvas = session
        .import_canvas(&text, name, project.map(|p| p.id))
        .await
        .map_err(|e| fail(output, e))?;
    render(output, &CanvasSummary::of(session, &canvas), |s, w| {
        writeln!(w, "✓ imported {} elements into {} ({})", s.elements, s.name, s.id)
    })
}
