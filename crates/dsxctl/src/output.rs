//! Report output selection: JSON (default), YAML, or a rendered table.

use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};

#[derive(clap::Args, Clone, Debug, Default)]
pub struct Output {
    #[clap(global = true, short, long, value_enum)]
    pub output: Option<OutputType>,
}

#[derive(clap::ValueEnum, Debug, Copy, Clone, PartialEq)]
pub enum OutputType {
    /// Pretty-printed JSON with stable (sorted) keys
    Json,
    /// YAML
    Yaml,
    /// A table, for list-shaped results
    Table,
}

/// Prints a single report document as JSON or YAML. Table output only
/// applies to list-shaped results; report-shaped ones fall back to JSON.
pub fn print_report(output: &Output, report: &impl Serialize) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    match output.output.unwrap_or(OutputType::Json) {
        OutputType::Yaml => serde_yaml::to_writer(&mut stdout, report)?,
        OutputType::Json | OutputType::Table => {
            serde_json::to_writer_pretty(&mut stdout, report)?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// Renders rows of a serializable item by pulling the listed JSON pointers
/// out of each.
pub fn print_table<T: Serialize>(
    headers: &[&str],
    pointers: &[&str],
    items: impl IntoIterator<Item = T>,
) -> anyhow::Result<()> {
    let mut table = comfy_table::Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(headers.to_vec());

    for item in items {
        let mut json = serde_json::to_value(item)?;
        let row: Vec<comfy_table::Cell> = pointers
            .iter()
            .map(|pointer| cell(json.pointer_mut(pointer).map(Value::take)))
            .collect();
        table.add_row(row);
    }

    let mut stdout = io::stdout().lock();
    for line in table.lines() {
        stdout.write_all(line.as_bytes())?;
        stdout.write_all(b"\n")?;
    }
    Ok(())
}

fn cell(value: Option<Value>) -> comfy_table::Cell {
    match value {
        None | Some(Value::Null) => comfy_table::Cell::new(String::new()),
        Some(Value::String(text)) => comfy_table::Cell::new(text),
        Some(other) => comfy_table::Cell::new(other),
    }
}
