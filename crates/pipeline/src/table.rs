use serde::Serialize;
use serde_json::{Map, Value};

/// Rows returned by a query, row-major, in the order the database produced them.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Each row as a column name -> value mapping, keeping column order.
    pub fn records(&self) -> impl Iterator<Item = Map<String, Value>> + '_ {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect::<Map<String, Value>>()
        })
    }

    /// Fixed-width text dump with a leading row index, cells right-aligned.
    ///
    /// ```text
    ///    count
    /// 0     42
    /// ```
    pub fn to_text(&self) -> String {
        if self.columns.is_empty() {
            return "Empty table".to_string();
        }

        let index: Vec<String> = (0..self.rows.len()).map(|i| i.to_string()).collect();
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();

        let index_width = index.iter().map(|s| s.chars().count()).max().unwrap_or(0);
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                cells
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|c| c.chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        let mut header = " ".repeat(index_width);
        for (name, width) in self.columns.iter().zip(&widths) {
            header.push_str(&format!("  {:>width$}", name, width = *width));
        }
        lines.push(header);

        for (idx, row) in index.iter().zip(&cells) {
            let mut line = format!("{:<width$}", idx, width = index_width);
            for (i, width) in widths.iter().enumerate() {
                let cell = row.get(i).map(String::as_str).unwrap_or("");
                line.push_str(&format!("  {:>width$}", cell, width = *width));
            }
            lines.push(line);
        }

        lines.join("\n")
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
