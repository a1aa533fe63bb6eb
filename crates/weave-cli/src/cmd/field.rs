use crate::output::{print_json, short_time};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let field = weave.field_state();
    if json {
        return print_json(&field);
    }
    println!(
        "Field coherence {:.4} ({}) as of {}",
        field.coherence,
        field.quality.label(),
        short_time(field.updated_at)
    );
    Ok(())
}
