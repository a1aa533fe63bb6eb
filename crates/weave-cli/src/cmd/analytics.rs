use crate::output::{print_json, print_table, short_time, signed};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum AnalyticsSubcommand {
    /// Transition ledger rollup
    Transitions {
        /// Restrict to one work item
        #[arg(long)]
        work: Option<String>,
    },
    /// Message rollup over the configured lookback window
    Messages,
}

pub fn run(root: &Path, subcmd: AnalyticsSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        AnalyticsSubcommand::Transitions { work } => transitions(root, work.as_deref(), json),
        AnalyticsSubcommand::Messages => messages(root, json),
    }
}

fn transitions(root: &Path, work: Option<&str>, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let a = weave.work_transition_analytics(work)?;
    if json {
        return print_json(&a);
    }

    let o = &a.overall;
    println!(
        "{} transitions across {} work item(s), total impact {}, mean coherence delta {}",
        o.total_transitions,
        o.unique_work_items,
        signed(o.total_impact),
        signed(o.average_coherence_delta)
    );
    if a.by_transition.is_empty() {
        return Ok(());
    }
    let rows = a
        .by_transition
        .iter()
        .map(|s| {
            vec![
                s.transition.to_string(),
                s.count.to_string(),
                signed(s.average_impact),
                signed(s.total_impact),
                signed(s.max_coherence_delta),
            ]
        })
        .collect();
    println!();
    print_table(&["TRANSITION", "COUNT", "AVG", "TOTAL", "MAX DELTA"], rows);
    Ok(())
}

fn messages(root: &Path, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let a = weave.message_analytics()?;
    if json {
        return print_json(&a);
    }

    let o = &a.overview;
    println!("Since {}", short_time(a.since));
    println!(
        "{} messages, {} blessed ({:.0}%), total impact {}, mean {}",
        o.total,
        o.blessed,
        o.blessing_rate * 100.0,
        signed(o.total_impact),
        signed(o.average_impact)
    );
    if !a.by_type.is_empty() {
        println!();
        let rows = a
            .by_type
            .iter()
            .map(|t| {
                vec![
                    t.message_type.to_string(),
                    t.count.to_string(),
                    signed(t.average_impact),
                    signed(t.total_impact),
                ]
            })
            .collect();
        print_table(&["TYPE", "COUNT", "AVG", "TOTAL"], rows);
    }
    if !a.by_harmony.is_empty() {
        println!();
        let rows = a
            .by_harmony
            .iter()
            .map(|h| vec![h.harmony.to_string(), h.count.to_string(), signed(h.average_impact)])
            .collect();
        print_table(&["HARMONY", "COUNT", "AVG"], rows);
    }
    Ok(())
}
