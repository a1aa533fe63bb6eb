use crate::output::{clip, print_json, print_table, short_time};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use weave_core::store::{SharedStateEntry, StateValue};

#[derive(Subcommand)]
pub enum StateSubcommand {
    /// Set a key. The value is parsed as JSON, else stored as a string.
    Set {
        key: String,
        value: String,
        #[arg(long)]
        by: Option<String>,
    },
    /// Read a key
    Get { key: String },
    /// List every key
    List,
}

pub fn run(root: &Path, subcmd: StateSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        StateSubcommand::Set { key, value, by } => set(root, &key, &value, by.as_deref(), json),
        StateSubcommand::Get { key } => get(root, &key, json),
        StateSubcommand::List => list(root, json),
    }
}

fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn render(value: &StateValue) -> String {
    match value {
        StateValue::Json(v) => v.to_string(),
        StateValue::Raw(s) => s.clone(),
    }
}

fn set(root: &Path, key: &str, raw: &str, by: Option<&str>, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let entry = weave
        .set_state(key, &parse_value(raw), by)
        .with_context(|| format!("failed to set '{key}'"))?;
    if json {
        print_json(&entry)?;
    } else {
        println!("{} = {}", entry.key, render(&entry.value));
    }
    Ok(())
}

fn get(root: &Path, key: &str, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let entry = weave
        .get_state(key)?
        .with_context(|| format!("state key '{key}' not found"))?;
    if json {
        print_json(&entry)?;
    } else {
        println!("{}", render(&entry.value));
    }
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let weave = super::open(root)?;
    let entries = weave.all_state()?;
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No shared state.");
        return Ok(());
    }
    let rows = entries.iter().map(entry_row).collect();
    print_table(&["KEY", "VALUE", "BY", "UPDATED"], rows);
    Ok(())
}

fn entry_row(e: &SharedStateEntry) -> Vec<String> {
    vec![
        e.key.clone(),
        clip(&render(&e.value), 48),
        e.updated_by.clone().unwrap_or_else(|| "-".to_string()),
        short_time(e.updated_at),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_parse_as_json_when_possible() {
        assert_eq!(parse_value("42"), serde_json::json!(42));
        assert_eq!(parse_value(r#"{"a":1}"#), serde_json::json!({"a": 1}));
        assert_eq!(parse_value("hello"), serde_json::json!("hello"));
    }
}
