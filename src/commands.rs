use owo_colors::OwoColorize;
use scrapestore::config::{self, StoreConfig};
use scrapestore::output::{OutputMode, emit_success};
use scrapestore::status::{self, Status};
use scrapestore::ui::{self, Icons, header, info, result_table, section, stats_table, success, summary_row, warn};
use scrapestore::{Batch, Params, SqliteStore, Value};
use std::path::Path;

/// `--param` values are JSON scalars when they parse as one, plain text otherwise
pub fn parse_params(raw: &[String]) -> anyhow::Result<Params> {
    let values = raw
        .iter()
        .map(|p| match serde_json::from_str::<serde_json::Value>(p) {
            Ok(json) if !json.is_array() && !json.is_object() => Ok(Value::from_json(json)?),
            _ => Ok(Value::from(p.as_str())),
        })
        .collect::<anyhow::Result<Vec<Value>>>()?;
    Ok(Params::from(values))
}

pub fn run_init(config_path: &Path, config: &StoreConfig, force: bool, output_mode: OutputMode) -> anyhow::Result<()> {
    config::write_config(config_path, config, force)?;
    config::ensure_db_dir(&config.database)?;
    SqliteStore::from_config(config)?.close()?;

    if output_mode.is_human() {
        header("Scrapestore initialized");
        success(&format!("Wrote {}", config_path.display()));
        info("Database", &config.database.display().to_string());
    } else {
        emit_success(output_mode, "init", serde_json::json!({
            "config": config_path,
            "database": config.database,
        }))?;
    }
    Ok(())
}

pub fn run_save(
    store: &mut SqliteStore,
    table: Option<&str>,
    unique_keys: &[String],
    records: &str,
    output_mode: OutputMode,
) -> anyhow::Result<()> {
    let json: serde_json::Value = serde_json::from_str(records)?;
    let batch = Batch::from_json(json)?;
    let count = batch.len();
    let table = table.unwrap_or(store.default_table()).to_string();
    let keys: Vec<&str> = unique_keys.iter().map(String::as_str).collect();

    store.save_into(&table, &keys, batch)?;
    store.flush()?;

    if output_mode.is_human() {
        success(&format!("Saved {} record(s) into {}", count, table));
    } else {
        emit_success(output_mode, "save", serde_json::json!({ "table": table, "records": count }))?;
    }
    Ok(())
}

pub fn run_select(store: &mut SqliteStore, fragment: &str, params: &[String], output_mode: OutputMode) -> anyhow::Result<()> {
    let params = parse_params(params)?;
    let result = store.execute(&format!("SELECT {}", fragment), params)?;

    if output_mode.is_human() {
        if result.is_empty() {
            println!("{} No rows.", Icons::EMPTY);
        } else {
            println!("{}", result_table(&result));
            summary_row("Rows:", &result.len().to_string());
        }
    } else {
        emit_success(output_mode, "select", serde_json::to_value(result.into_records())?)?;
    }
    Ok(())
}

pub fn run_execute(store: &mut SqliteStore, sql: &str, params: &[String], output_mode: OutputMode) -> anyhow::Result<()> {
    let params = parse_params(params)?;
    let result = store.execute(sql, params)?;

    if output_mode.is_human() {
        if result.keys.is_empty() {
            success("Statement executed");
        } else if result.is_empty() {
            println!("{} No rows.", Icons::EMPTY);
        } else {
            println!("{}", result_table(&result));
        }
    } else {
        emit_success(output_mode, "execute", serde_json::to_value(&result)?)?;
    }
    Ok(())
}

pub fn run_get_var(store: &mut SqliteStore, name: &str, output_mode: OutputMode) -> anyhow::Result<()> {
    let value = store.get_var(name)?;

    if output_mode.is_human() {
        match value {
            Some(value) => println!("{} = {} {}", name.bold(), ui::value(&value), ui::label(&format!("({})", value.kind()))),
            None => warn(&format!("{} is not set", name)),
        }
    } else {
        emit_success(output_mode, "get-var", serde_json::json!({ "name": name, "value": value }))?;
    }
    Ok(())
}

pub fn run_save_var(store: &mut SqliteStore, name: &str, value: &str, output_mode: OutputMode) -> anyhow::Result<()> {
    let json: serde_json::Value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    let value = Value::from_json(json)?;
    store.save_var(name, value.clone())?;
    store.flush()?;

    if output_mode.is_human() {
        success(&format!("Saved {} ({})", name, value.kind()));
    } else {
        emit_success(output_mode, "save-var", serde_json::json!({ "name": name, "value": value }))?;
    }
    Ok(())
}

pub fn run_tables(store: &mut SqliteStore, output_mode: OutputMode) -> anyhow::Result<()> {
    let stats = store.stats()?;

    if output_mode.is_human() {
        section(&format!(" {} Tables ", Icons::STATS));
        if stats.is_empty() {
            println!("{} No tables yet.", Icons::EMPTY);
        } else {
            println!("{}", stats_table(&stats));
        }
    } else {
        let tables: Vec<serde_json::Value> = stats
            .iter()
            .map(|t| {
                let columns: Vec<serde_json::Value> = t
                    .columns
                    .iter()
                    .map(|c| serde_json::json!({ "name": c.name, "type": c.tag.map(|tag| tag.as_str()) }))
                    .collect();
                serde_json::json!({
                    "name": t.name,
                    "rows": t.rows,
                    "columns": columns,
                    "unique_key": t.unique_key,
                })
            })
            .collect();
        emit_success(output_mode, "tables", serde_json::Value::Array(tables))?;
    }
    Ok(())
}

pub fn run_status(status: &str, message: Option<&str>, output_mode: OutputMode) -> anyhow::Result<()> {
    let status: Status = status.parse()?;
    status::report_status(status, message)?;

    if output_mode.is_human() {
        match std::env::var(status::STATUS_URL_VAR) {
            Ok(url) if !url.is_empty() => success(&format!("Reported status '{}'", status)),
            _ => info(
                "Not reported",
                &ui::label(&format!("{} is not set (status '{}')", status::STATUS_URL_VAR, status)),
            ),
        }
    } else {
        emit_success(output_mode, "status", serde_json::json!({ "status": status.as_str() }))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let raw = vec!["42".to_string(), "apple".to_string(), "\"quoted\"".to_string(), "[1]".to_string(), "null".to_string()];
        let params = parse_params(&raw).unwrap();
        let values: Vec<Value> = params.iter().cloned().collect();
        assert_eq!(
            values,
            vec![
                Value::Integer(42),
                Value::from("apple"),
                Value::from("quoted"),
                Value::from("[1]"),
                Value::Null,
            ]
        );
    }
}
