use crate::output::{clip, print_json, print_table, short_time, signed};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use weave_core::binder::{NewWorkItem, WorkOutcome};
use weave_core::store::WorkItem;

#[derive(Subcommand)]
pub enum WorkSubcommand {
    /// Create a work item (fires `created`)
    Create {
        #[arg(required = true)]
        title: Vec<String>,
        /// Explicit id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        assign: Option<String>,
        /// Creating agent
        #[arg(long)]
        by: String,
        /// Metadata as a JSON object (e.g. {"harmony":"vitality"})
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Set progress 0-100 and fire every transition crossed
    Progress {
        id: String,
        progress: i64,
        /// Broadcast a note before the transitions
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        by: Option<String>,
    },
    /// Block a work item
    Block {
        id: String,
        #[arg(required = true)]
        reason: Vec<String>,
        #[arg(long, default_value = "")]
        by: String,
    },
    /// Unblock a work item
    Unblock {
        id: String,
        #[arg(required = true)]
        reason: Vec<String>,
        #[arg(long, default_value = "")]
        by: String,
    },
    /// Assign to an agent, or clear the assignee when omitted
    Assign { id: String, agent: Option<String> },
    /// Show a single work item
    Show { id: String },
    /// List open work items
    List {
        /// Include completed items
        #[arg(long)]
        all: bool,
    },
    /// Ledger rows for a work item, newest first
    Transitions { id: String },
    /// Messages synthesized for a work item, oldest first
    History { id: String },
}

pub fn run(root: &Path, subcmd: WorkSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        WorkSubcommand::Create {
            title,
            id,
            description,
            assign,
            by,
            metadata,
        } => {
            let metadata = match metadata {
                Some(raw) => serde_json::from_str(&raw).context("--metadata must be valid JSON")?,
                None => serde_json::json!({}),
            };
            let new = NewWorkItem {
                id,
                title: title.join(" "),
                description,
                assigned_to: assign,
                created_by: by,
                metadata,
            };
            create(root, new, json)
        }
        WorkSubcommand::Progress {
            id,
            progress,
            notes,
            by,
        } => update_progress(root, &id, progress, notes.as_deref(), by.as_deref(), json),
        WorkSubcommand::Block { id, reason, by } => {
            let weave = super::open(root)?;
            let outcome = weave.block_work(&id, &reason.join(" "), &by)?;
            report(&id, outcome, json)
        }
        WorkSubcommand::Unblock { id, reason, by } => {
            let weave = super::open(root)?;
            let outcome = weave.unblock_work(&id, &reason.join(" "), &by)?;
            report(&id, outcome, json)
        }
        WorkSubcommand::Assign { id, agent } => assign(root, &id, agent.as_deref(), json),
        WorkSubcommand::Show { id } => show(root, &id, json),
        WorkSubcommand::List { all } => list(root, all, json),
        WorkSubcommand::Transitions { id } => transitions(root, &id, json),
        WorkSubcommand::History { id } => history(root, &id, json),
    }
}

fn create(root: &Path, new: NewWorkItem, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let outcome = weave
        .create_work_item(new)
        .context("failed to create work item")?;
    let id = outcome.item.id.clone();
    report(&id, Some(outcome), json)
}

fn update_progress(
    root: &Path,
    id: &str,
    progress: i64,
    notes: Option<&str>,
    by: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let outcome = weave.update_work_progress(id, progress, notes, by)?;
    report(id, outcome, json)
}

/// Print the transitions an operation fired. `None` means the item was not found.
fn report(id: &str, outcome: Option<WorkOutcome>, json: bool) -> anyhow::Result<()> {
    let outcome = outcome.with_context(|| format!("work item '{id}' not found"))?;
    if json {
        return print_json(&outcome);
    }

    let item = &outcome.item;
    println!("{} [{}] {}% {}", item.id, item.status, item.progress, item.title);
    if let Some(note) = outcome.note_message_id {
        println!("  note sent as message {note}");
    }
    if outcome.transitions.is_empty() {
        println!("  no transitions");
    }
    for t in &outcome.transitions {
        let label = match t.milestone {
            Some(m) => format!("{} {m}%", t.transition),
            None => t.transition.to_string(),
        };
        let warn = if t.recorded { "" } else { " (ledger write failed)" };
        println!(
            "  {label}: message {} impact {} coherence {:.4} -> {:.4}{warn}",
            t.message_id,
            signed(t.field_impact),
            t.coherence_before,
            t.coherence_after
        );
    }
    Ok(())
}

fn assign(root: &Path, id: &str, agent: Option<&str>, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let item = weave
        .assign_work(id, agent)?
        .with_context(|| format!("work item '{id}' not found"))?;
    if json {
        print_json(&item)?;
    } else {
        match &item.assigned_to {
            Some(a) => println!("{} assigned to {a}", item.id),
            None => println!("{} unassigned", item.id),
        }
    }
    Ok(())
}

fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let item = weave
        .get_work_item(id)?
        .with_context(|| format!("work item '{id}' not found"))?;
    if json {
        return print_json(&item);
    }

    println!("Work:       {}", item.id);
    println!("Title:      {}", item.title);
    if !item.description.is_empty() {
        println!("About:      {}", item.description);
    }
    println!("Status:     {} ({}%)", item.status, item.progress);
    println!(
        "Assigned:   {}",
        item.assigned_to.as_deref().unwrap_or("(nobody)")
    );
    println!("Created:    {} by {}", short_time(item.created_at), item.created_by);
    println!("Updated:    {}", short_time(item.updated_at));
    if let Some(b) = &item.metadata.blocked {
        println!("Blocked:    {} ({} at {})", b.reason, b.by, short_time(b.at));
    }
    println!(
        "Impact:     {} across {} messages",
        signed(item.metadata.cumulative_field_impact),
        item.metadata.message_history.len()
    );
    Ok(())
}

fn list(root: &Path, all: bool, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let items = if all {
        weave.list_work()?
    } else {
        weave.list_active_work()?
    };
    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("No work items.");
        return Ok(());
    }
    let rows = items.iter().map(work_row).collect();
    print_table(&["ID", "STATUS", "PROGRESS", "ASSIGNED", "TITLE"], rows);
    Ok(())
}

fn work_row(w: &WorkItem) -> Vec<String> {
    vec![
        w.id.clone(),
        w.status.to_string(),
        format!("{}%", w.progress),
        w.assigned_to.clone().unwrap_or_else(|| "-".to_string()),
        clip(&w.title, 48),
    ]
}

fn transitions(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    if weave.get_work_item(id)?.is_none() {
        anyhow::bail!("work item '{id}' not found");
    }
    let rows = weave.work_transitions(id)?;
    if json {
        return print_json(&rows);
    }
    let table = rows
        .iter()
        .map(|r| {
            vec![
                short_time(r.created_at),
                r.transition.to_string(),
                r.milestone.map(|m| format!("{m}%")).unwrap_or_default(),
                signed(r.field_impact),
                format!("{:.4}", r.coherence_before),
                format!("{:.4}", r.coherence_after),
            ]
        })
        .collect();
    print_table(&["AT", "TRANSITION", "MILESTONE", "IMPACT", "BEFORE", "AFTER"], table);
    Ok(())
}

fn history(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let messages = weave
        .work_message_history(id)?
        .with_context(|| format!("work item '{id}' not found"))?;
    if json {
        return print_json(&messages);
    }
    for m in &messages {
        println!(
            "{} {} {} -> {} [{}] {}",
            m.id,
            short_time(m.created_at),
            m.from_agent,
            m.to_agent,
            m.message_type,
            m.content
        );
    }
    Ok(())
}
