//! `drw project`: create, list, rename, and delete projects.

use std::io::{self, Write};

use clap::{Args, Subcommand};
use drawer_core::model::Project;
use drawer_core::{ProjectDeletePolicy, Session};
use serde::Serialize;

use super::canvas::resolve_project;
use crate::output::{OutputMode, Renderable, fail, render, render_list, render_success};

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Create a project.
    New(NewProjectArgs),
    /// List projects with their canvas counts.
    List,
    /// Rename a project.
    Rename(RenameProjectArgs),
    /// Delete a project. Its canvases become unorganized unless
    /// `--delete-canvases` is given.
    Rm(RmProjectArgs),
}

#[derive(Args, Debug)]
pub struct NewProjectArgs {
    pub name: String,
}

#[derive(Args, Debug)]
pub struct RenameProjectArgs {
    pub project: String,
    pub name: String,
}

#[derive(Args, Debug)]
pub struct RmProjectArgs {
    pub project: String,

    /// Delete the project's canvases too.
    #[arg(long)]
    pub delete_canvases: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectSummary {
    id: String,
    name: String,
    canvases: usize,
}

impl ProjectSummary {
    fn new(project: &Project) -> Self {
        Self {
            id: project.id.to_string(),
            name: project.name.clone(),
            canvases: project.canvas_ids.len(),
        }
    }
}

impl Renderable for ProjectSummary {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{:<10} {:<32} {:>4} canvases", self.id.get(..8).unwrap_or(&self.id), self.name, self.canvases)
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self)?;
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}\t{}\t{}", self.id, self.name, self.canvases)
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "name", "canvases"]
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteReport {
    id: String,
    policy: &'static str,
    canvases: Vec<String>,
}

pub async fn run_project(
    session: &Session,
    command: ProjectCommand,
    output: OutputMode,
) -> anyhow::Result<()> {
    match command {
        ProjectCommand::New(args) => {
            let project = session
                .create_project(args.name)
                .await
                .map_err(|e| fail(output, e))?;
            render(output, &ProjectSummary::new(&project), |p, w| {
                writeln!(w, "✓ created project {} ({})", p.name, p.id)
            })
        }
        ProjectCommand::List => {
            let rows: Vec<ProjectSummary> = session
                .library()
                .read()
                .projects()
                .into_iter()
                .map(ProjectSummary::new)
                .collect();
            if rows.is_empty() && !output.is_json() {
                println!("no projects");
                return Ok(());
            }
            render_list(&rows, output)?;
            Ok(())
        }
        ProjectCommand::Rename(args) => {
            let project = resolve_project(session, &args.project, output)?;
            let renamed = session
                .rename_project(&project.id, args.name)
                .await
                .map_err(|e| fail(output, e))?;
            render(output, &ProjectSummary::new(&renamed), |p, w| {
                writeln!(w, "✓ renamed {} to {}", project.name, p.name)
            })
        }
        ProjectCommand::Rm(args) => {
            let project = resolve_project(session, &args.project, output)?;
            let (policy, label) = if args.delete_canvases {
                (ProjectDeletePolicy::DeleteMembers, "delete_members")
            } else {
                (ProjectDeletePolicy::DetachMembers, "detach_members")
            };
            let members = session
                .delete_project(&project.id, policy)
                .await
                .map_err(|e| fail(output, e))?;
            if !output.is_json() {
                let verb = if args.delete_canvases { "deleted" } else { "kept" };
                return render_success(
                    output,
                    &format!(
                        "deleted project {} ({verb} {} canvases)",
                        project.name,
                        members.len()
                    ),
                );
            }
            let report = DeleteReport {
                id: project.id.to_string(),
                policy: label,
                canvases: members.iter().map(ToString::to_string).collect(),
            };
            render(output, &report, |_, _| Ok(()))
        }
    }
}
