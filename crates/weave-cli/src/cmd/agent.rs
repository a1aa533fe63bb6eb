use crate::output::{print_json, print_table, short_time};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use weave_core::store::Agent;

#[derive(Subcommand)]
pub enum AgentSubcommand {
    /// Register an agent, or refresh an existing registration
    Register {
        id: String,
        /// Capability tags, comma-separated (e.g. code,harmony:wisdom)
        #[arg(long, value_delimiter = ',')]
        capabilities: Vec<String>,
        /// Session info as a JSON object
        #[arg(long)]
        session: Option<String>,
    },
    /// List agents
    List {
        /// Only agents currently active
        #[arg(long)]
        active: bool,
    },
    /// Show a single agent
    Show { id: String },
    /// Refresh an agent's last-seen time
    Heartbeat { id: String },
    /// Level and progress toward the next one
    Progress { id: String },
}

pub fn run(root: &Path, subcmd: AgentSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        AgentSubcommand::Register {
            id,
            capabilities,
            session,
        } => register(root, &id, &capabilities, session.as_deref(), json),
        AgentSubcommand::List { active } => list(root, active, json),
        AgentSubcommand::Show { id } => show(root, &id, json),
        AgentSubcommand::Heartbeat { id } => heartbeat(root, &id, json),
        AgentSubcommand::Progress { id } => progress(root, &id, json),
    }
}

fn register(
    root: &Path,
    id: &str,
    capabilities: &[String],
    session: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let session_info = match session {
        Some(raw) => serde_json::from_str(raw).context("--session must be valid JSON")?,
        None => serde_json::json!({}),
    };
    let weave = super::open(root)?;
    let agent = weave
        .register_agent(id, capabilities, &session_info)
        .with_context(|| format!("failed to register agent '{id}'"))?;

    if json {
        print_json(&agent)?;
    } else {
        println!("Registered agent {} ({})", agent.id, agent.status);
    }
    Ok(())
}

fn list(root: &Path, active: bool, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let agents = if active {
        weave.active_agents()?
    } else {
        weave.list_agents()?
    };

    if json {
        return print_json(&agents);
    }
    if agents.is_empty() {
        println!("No agents.");
        return Ok(());
    }
    let rows = agents.iter().map(agent_row).collect();
    print_table(&["ID", "STATUS", "CAPABILITIES", "LAST SEEN"], rows);
    Ok(())
}

fn agent_row(a: &Agent) -> Vec<String> {
    vec![
        a.id.clone(),
        a.status.to_string(),
        a.capabilities.join(","),
        short_time(a.last_seen),
    ]
}

fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let agent = weave
        .get_agent(id)?
        .with_context(|| format!("agent '{id}' not found"))?;

    if json {
        return print_json(&agent);
    }
    println!("Agent:        {}", agent.id);
    println!("Status:       {}", agent.status);
    println!("Capabilities: {}", agent.capabilities.join(", "));
    let harmonies: Vec<String> = agent.harmonies().iter().map(|h| h.to_string()).collect();
    if !harmonies.is_empty() {
        println!("Harmonies:    {}", harmonies.join(", "));
    }
    println!("Last seen:    {}", short_time(agent.last_seen));
    println!("Registered:   {}", short_time(agent.created_at));
    Ok(())
}

fn heartbeat(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    if !weave.heartbeat(id)? {
        anyhow::bail!("agent '{id}' not found");
    }
    if json {
        print_json(&serde_json::json!({ "id": id, "active": true }))?;
    } else {
        println!("Heartbeat recorded for {id}");
    }
    Ok(())
}

fn progress(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let p = weave.agent_progress(id)?;

    if json {
        return print_json(&p);
    }
    println!("Agent {}: {}", p.agent_id, p.level);
    match p.next_level {
        Some(next) => {
            println!("Progress toward {next}: {:.0}%", p.overall);
            let rows = [
                ("messages", &p.messages),
                ("relationships", &p.relationships),
                ("days active", &p.days_active),
            ]
            .iter()
            .map(|(name, c)| {
                vec![
                    name.to_string(),
                    c.current.to_string(),
                    c.required.to_string(),
                    format!("{:.0}%", c.percentage),
                ]
            })
            .collect();
            print_table(&["CRITERION", "CURRENT", "REQUIRED", "DONE"], rows);
        }
        None => println!("Highest level reached."),
    }
    Ok(())
}
