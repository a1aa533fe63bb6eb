use crate::output::{clip, print_json, print_table, short_time, signed};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use weave_core::types::{Harmony, MessageType};
use weave_core::SendMessage;

#[derive(Subcommand)]
pub enum MessageSubcommand {
    /// Send a message and apply its impact to the field
    Send {
        from: String,
        /// Recipient agent id, or `all` to broadcast
        to: String,
        #[arg(required = true)]
        content: Vec<String>,
        /// Message type (gratitude, healing, inquiry, ...)
        #[arg(long = "type", value_name = "TYPE", default_value = "general")]
        message_type: MessageType,
        #[arg(long)]
        harmony: Option<Harmony>,
        /// Metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Messages addressed to an agent, including broadcasts, newest first
    List {
        agent: String,
        #[arg(long)]
        unread: bool,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Mark a message as read
    Read { id: i64 },
    /// Acknowledge a message (sets the blessing flag)
    Ack { id: i64 },
}

pub fn run(root: &Path, subcmd: MessageSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        MessageSubcommand::Send {
            from,
            to,
            content,
            message_type,
            harmony,
            metadata,
        } => {
            let mut req = SendMessage::new(&from, &to, &content.join(" "), message_type);
            if let Some(h) = harmony {
                req = req.with_harmony(h);
            }
            if let Some(raw) = metadata {
                let value = serde_json::from_str(&raw).context("--metadata must be valid JSON")?;
                req = req.with_metadata(value);
            }
            send(root, &req, json)
        }
        MessageSubcommand::List {
            agent,
            unread,
            limit,
        } => list(root, &agent, unread, limit, json),
        MessageSubcommand::Read { id } => flag(root, id, false, json),
        MessageSubcommand::Ack { id } => flag(root, id, true, json),
    }
}

fn send(root: &Path, req: &SendMessage, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let sent = weave.send_message(req).context("failed to send message")?;

    if json {
        return print_json(&sent);
    }
    println!(
        "Sent message {} ({} impact, coherence {:.4} -> {:.4})",
        sent.message_id,
        signed(sent.field_impact),
        sent.previous_coherence,
        sent.new_coherence
    );
    println!("  {}", sent.explanation.summary());
    Ok(())
}

fn list(root: &Path, agent: &str, unread: bool, limit: usize, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let messages = weave.get_messages(agent, unread, limit)?;

    if json {
        return print_json(&messages);
    }
    if messages.is_empty() {
        println!("No messages.");
        return Ok(());
    }
    let rows = messages
        .iter()
        .map(|m| {
            vec![
                m.id.to_string(),
                short_time(m.created_at),
                m.from_agent.clone(),
                m.to_agent.clone(),
                m.message_type.to_string(),
                signed(m.field_impact),
                if m.read { "read" } else { "new" }.to_string(),
                clip(&m.content, 48),
            ]
        })
        .collect();
    print_table(
        &["ID", "AT", "FROM", "TO", "TYPE", "IMPACT", "", "CONTENT"],
        rows,
    );
    Ok(())
}

fn flag(root: &Path, id: i64, acknowledge: bool, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let found = if acknowledge {
        weave.acknowledge_message(id)?
    } else {
        weave.mark_read(id)?
    };
    if !found {
        anyhow::bail!("message {id} not found");
    }

    let verb = if acknowledge { "acknowledged" } else { "read" };
    if json {
        print_json(&serde_json::json!({ "id": id, "marked": verb }))?;
    } else {
        println!("Message {id} marked {verb}");
    }
    Ok(())
}
