use std::io::{self, BufRead, Write};

use anyhow::Context;
use clap::ValueEnum;
use tracing::{debug, info, instrument, warn};

use crate::cli::{AddArgs, Command, EditArgs, ListArgs, SubtaskCommand};
use crate::config::Config;
use crate::controller::Controller;
use crate::datetime::{parse_due_date, today_local};
use crate::render::Renderer;
use crate::state::TaskError;
use crate::task::{Subtask, TaskDraft};
use crate::view::{SortMode, ViewQuery};

#[instrument(skip_all)]
pub async fn dispatch(
    ctl: &mut Controller,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Option<Command>,
) -> anyhow::Result<()> {
    let command = command.unwrap_or_else(|| Command::List(ListArgs::default()));
    debug!(?command, "dispatching command");

    match command {
        Command::Add(args) => cmd_add(ctl, args).await,
        Command::List(args) => cmd_list(ctl, cfg, renderer, args),
        Command::Show { id } => cmd_show(ctl, renderer, &id),
        Command::Edit(args) => cmd_edit(ctl, args),
        Command::Done { id } => cmd_toggle(ctl, renderer, &id, true).await,
        Command::Undo { id } => cmd_toggle(ctl, renderer, &id, false).await,
        Command::Delete { id, yes } => {
            let stdin = io::stdin();
            cmd_delete(ctl, &id, yes, &mut stdin.lock())
        }
        Command::Subtask(action) => cmd_subtask(ctl, action),
        Command::Suggest { id } => cmd_suggest(ctl, &id).await,
        Command::Breakdown { id } => cmd_breakdown(ctl, &id).await,
    }
}

#[instrument(skip(ctl, args))]
async fn cmd_add(ctl: &mut Controller, args: AddArgs) -> anyhow::Result<()> {
    info!("command add");

    ctl.open_create();
    let mut draft = TaskDraft::new(args.title.join(" "));
    if draft.title.trim().is_empty() {
        ctl.cancel();
        return Err(TaskError::EmptyTitle.into());
    }
    draft.description = args.description;
    draft.priority = args.priority.unwrap_or_default();
    draft.due_date = args
        .due
        .as_deref()
        .map(|expr| parse_due_date(expr, today_local()))
        .transpose()?;
    draft.tags = args.tags;
    draft.subtasks = args
        .subtasks
        .iter()
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
        .map(Subtask::new)
        .collect();

    if args.suggest_priority {
        match ctl
            .suggest_priority(&draft.title, draft.description.as_deref())
            .await
        {
            Ok(priority) => {
                println!("AI suggested priority {priority}.");
                draft.priority = priority;
            }
            Err(err) => {
                warn!(error = %err, "keeping requested priority");
                eprintln!("AI priority suggestion failed: {err}");
            }
        }
    }

    let task = ctl.create(draft)?;
    println!("Created task {}.", task.short_id());

    if args.breakdown {
        match ctl.breakdown(&task.id).await {
            Ok(added) => println!("Added {added} subtasks."),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "subtask generation skipped");
                eprintln!("AI subtask generation failed: {err:#}");
            }
        }
    }
    Ok(())
}

/// Builds the view criteria, falling back to `default.sort` when the command
/// line names no sort order.
pub fn view_query(cfg: &Config, args: &ListArgs) -> anyhow::Result<ViewQuery> {
    let sort = match args.sort {
        Some(sort) => sort,
        None => match cfg.get("default.sort") {
            Some(raw) => SortMode::from_str(raw.trim(), true)
                .map_err(|e| anyhow::anyhow!("invalid default.sort {raw:?}: {e}"))?,
            None => SortMode::default(),
        },
    };

    Ok(ViewQuery {
        status: args.status.unwrap_or_default(),
        priority: args.priority.unwrap_or_default(),
        sort,
        search: args.search.clone().unwrap_or_default(),
        tag: args.tag.clone(),
    })
}

#[instrument(skip(ctl, cfg, renderer, args))]
fn cmd_list(
    ctl: &mut Controller,
    cfg: &Config,
    renderer: &mut Renderer,
    args: ListArgs,
) -> anyhow::Result<()> {
    info!("command list");

    let query = view_query(cfg, &args)?;
    let view = ctl.view(&query);
    debug!(shown = view.len(), total = ctl.tasks().len(), "rendering view");

    if args.json {
        let json = serde_json::to_string_pretty(&view).context("failed serializing view")?;
        println!("{json}");
        return Ok(());
    }

    renderer.print_task_table(&view, ctl.tasks().len(), today_local())
}

fn cmd_show(ctl: &mut Controller, renderer: &mut Renderer, id: &str) -> anyhow::Result<()> {
    let id = ctl.resolve_id(id)?;
    let task = ctl
        .get(&id)
        .ok_or_else(|| TaskError::NotFound(id.clone()))?;
    renderer.print_task_info(task)
}

#[instrument(skip(ctl, args), fields(id = %args.id))]
fn cmd_edit(ctl: &mut Controller, args: EditArgs) -> anyhow::Result<()> {
    info!("command edit");

    let id = ctl.resolve_id(&args.id)?;
    ctl.open_edit(&id)?;
    let current = ctl
        .get(&id)
        .ok_or_else(|| TaskError::NotFound(id.clone()))?;

    let mut draft = TaskDraft::from_task(current);
    if let Some(title) = args.title {
        draft.title = title;
    }
    if let Some(description) = args.description {
        draft.description = Some(description);
    }
    if let Some(priority) = args.priority {
        draft.priority = priority;
    }
    if args.no_due {
        draft.due_date = None;
    } else if let Some(expr) = args.due.as_deref() {
        draft.due_date = Some(parse_due_date(expr, today_local())?);
    }
    if args.clear_tags {
        draft.tags.clear();
    }
    draft
        .tags
        .retain(|tag| !args.untags.iter().any(|u| u.eq_ignore_ascii_case(tag)));
    draft.tags.extend(args.tags);

    match ctl.edit(&id, draft) {
        Ok(Some(task)) => {
            println!("Updated task {}.", task.short_id());
            Ok(())
        }
        Ok(None) => Err(TaskError::NotFound(id).into()),
        Err(err) => {
            ctl.cancel();
            Err(err.into())
        }
    }
}

async fn cmd_toggle(
    ctl: &mut Controller,
    renderer: &mut Renderer,
    id: &str,
    completed: bool,
) -> anyhow::Result<()> {
    let id = ctl.resolve_id(id)?;
    let celebration = ctl.toggle_complete(&id, completed).await?;
    let short = id.get(..8).unwrap_or(&id);
    if completed {
        println!("Completed task {short}.");
    } else {
        println!("Reopened task {short}.");
    }
    if let Some(message) = celebration {
        renderer.print_celebration(&message)?;
    }
    Ok(())
}

#[instrument(skip(ctl, input))]
fn cmd_delete<R: BufRead>(
    ctl: &mut Controller,
    id: &str,
    yes: bool,
    input: &mut R,
) -> anyhow::Result<()> {
    info!("command delete");

    let task = ctl.request_delete(id)?;
    let title = task.title.clone();

    let confirmed = yes
        || confirm(
            &format!("Delete \"{title}\"? This cannot be undone. [y/N] "),
            input,
        )?;

    if !confirmed {
        ctl.cancel();
        println!("Kept \"{title}\".");
        return Ok(());
    }

    if let Some(removed) = ctl.confirm_delete() {
        println!("Deleted \"{}\".", removed.title);
    }
    Ok(())
}

fn confirm<R: BufRead>(prompt: &str, input: &mut R) -> anyhow::Result<bool> {
    let mut out = io::stdout().lock();
    write!(out, "{prompt}")?;
    out.flush()?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("failed reading confirmation")?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn cmd_subtask(ctl: &mut Controller, action: SubtaskCommand) -> anyhow::Result<()> {
    match action {
        SubtaskCommand::Add { id, text } => {
            let id = ctl.resolve_id(&id)?;
            let added = ctl.add_subtask(&id, &text.join(" "))?;
            if added == 0 {
                println!("Nothing to add.");
            } else {
                println!("Added subtask.");
            }
        }
        SubtaskCommand::Toggle { id, subtask } => {
            let id = ctl.resolve_id(&id)?;
            let done = ctl.toggle_subtask(&id, &subtask)?;
            println!("Subtask {}.", if done { "done" } else { "reopened" });
        }
        SubtaskCommand::Remove { id, subtask } => {
            let id = ctl.resolve_id(&id)?;
            let text = ctl.remove_subtask(&id, &subtask)?;
            println!("Removed subtask \"{text}\".");
        }
    }
    Ok(())
}

async fn cmd_suggest(ctl: &mut Controller, id: &str) -> anyhow::Result<()> {
    let id = ctl.resolve_id(id)?;
    let priority = ctl
        .apply_suggested_priority(&id)
        .await
        .context("AI priority suggestion failed")?;
    println!("Priority set to {priority}.");
    Ok(())
}

async fn cmd_breakdown(ctl: &mut Controller, id: &str) -> anyhow::Result<()> {
    let id = ctl.resolve_id(id)?;
    let added = ctl
        .breakdown(&id)
        .await
        .context("AI subtask generation failed")?;
    println!("Added {added} subtasks.");
    Ok(())
}
