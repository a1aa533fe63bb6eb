use crate::output::print_json;
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let report = weave.cleanup().context("cleanup failed")?;
    if json {
        return print_json(&report);
    }
    println!(
        "Demoted {} inactive agent(s), pruned {} message(s)",
        report.agents_demoted.len(),
        report.messages_pruned
    );
    for id in &report.agents_demoted {
        println!("  inactive: {id}");
    }
    Ok(())
}
