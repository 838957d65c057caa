use tabled::{builder::Builder, settings::Style, Table, Tabled};
use crate::query::QueryResult;
use crate::storage::TableStats;

#[derive(Tabled)]
pub struct StatsRow {
    #[tabled(rename = "Table")]
    pub name: String,
    #[tabled(rename = "Rows")]
    pub rows: usize,
    #[tabled(rename = "Columns")]
    pub columns: String,
    #[tabled(rename = "Unique key")]
    pub unique_key: String,
}

impl From<&TableStats> for StatsRow {
    fn from(stats: &TableStats) -> Self {
        Self {
            name: stats.name.clone(),
            rows: stats.rows,
            columns: stats.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", "),
            unique_key: stats.unique_key.as_ref().map(|k| k.join(", ")).unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// One row per table
pub fn stats_table(stats: &[TableStats]) -> String {
    if stats.is_empty() {
        return String::new();
    }
    let rows: Vec<StatsRow> = stats.iter().map(StatsRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Statement output with column names as the header
pub fn result_table(result: &QueryResult) -> String {
    if result.keys.is_empty() {
        return String::new();
    }
    let mut builder = Builder::default();
    builder.push_record(result.keys.iter().cloned());
    for row in &result.data {
        builder.push_record(row.iter().map(|v| v.to_string()));
    }
    builder.build().with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_result_table_has_header_and_cells() {
        let result = QueryResult {
            keys: vec!["name".into(), "score".into()],
            data: vec![vec![Value::from("Ada"), Value::Null]],
        };
        let rendered = result_table(&result);
        assert!(rendered.contains("name"));
        assert!(rendered.contains("Ada"));
        assert!(rendered.contains("NULL"));
    }

    #[test]
    fn test_empty_results_render_nothing() {
        assert!(result_table(&QueryResult::default()).is_empty());
        assert!(stats_table(&[]).is_empty());
    }
}
