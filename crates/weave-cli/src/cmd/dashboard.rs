use crate::output::{clip, print_json, short_time, signed};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let d = weave.dashboard_summary()?;
    if json {
        return print_json(&d);
    }

    println!(
        "Field: {:.4} ({})",
        d.field.coherence,
        d.field.quality.label()
    );
    let c = &d.work_counts;
    println!(
        "Work: {} pending, {} in progress, {} blocked, {} completed",
        c.pending, c.in_progress, c.blocked, c.completed
    );
    println!("Messages in lookback: {}", d.messages_in_lookback);

    println!("\nActive agents ({}):", d.active_agents.len());
    for a in &d.active_agents {
        println!("  {} (seen {})", a.id, short_time(a.last_seen));
    }

    println!("\nOpen work ({}):", d.pending_work.len());
    for w in &d.pending_work {
        println!("  {} [{}] {}% {}", w.id, w.status, w.progress, clip(&w.title, 48));
    }

    println!("\nRecent activity:");
    for m in &d.recent_activity {
        println!(
            "  {} {} -> {} {} {} {}",
            short_time(m.created_at),
            m.from_agent,
            m.to_agent,
            m.message_type,
            signed(m.field_impact),
            clip(&m.content, 48)
        );
    }
    Ok(())
}
