use crate::cert::CaColumn;
use std::fmt::Display;

/// Trait for types that can provide column values
pub trait GetColumnValue {
    fn get_column_value(&self, column: &CaColumn) -> String;
}

/// Output format configuration
#[derive(Clone, Debug)]
pub struct OutputFormat {
    pub raw: bool,
}

/// Build table data from records and columns
pub fn build_table_data<T>(records: &[T], columns: &[CaColumn]) -> Vec<Vec<String>>
where
    T: GetColumnValue,
{
    records
        .iter()
        .map(|record| columns.iter().map(|col| record.get_column_value(col)).collect())
        .collect()
}

impl OutputFormat {
    pub fn new(raw: bool) -> Self {
        Self { raw }
    }

    /// Print tabular data - either raw (tab-separated) or formatted (column-aligned)
    pub fn print_table<T>(&self, data: &[Vec<T>])
    where
        T: Display + AsRef<str>,
    {
        for line in self.render_table(data) {
            println!("{line}");
        }
    }

    /// Render table lines without printing them
    pub fn render_table<T>(&self, data: &[Vec<T>]) -> Vec<String>
    where
        T: Display + AsRef<str>,
    {
        if data.is_empty() {
            return Vec::new();
        }

        if self.raw {
            data.iter()
                .map(|row| {
                    row.iter()
                        .map(|cell| cell.as_ref())
                        .collect::<Vec<_>>()
                        .join("\t")
                })
                .collect()
        } else {
            Self::render_formatted_table(data)
        }
    }

    /// Print single-column data
    pub fn print_list<T>(&self, items: &[T])
    where
        T: Display,
    {
        for item in items {
            println!("{item}");
        }
    }

    /// Print key-value pairs
    pub fn print_key_value<K, V>(&self, pairs: &[(K, V)])
    where
        K: Display + AsRef<str>,
        V: Display + AsRef<str>,
    {
        let data: Vec<Vec<String>> = pairs
            .iter()
            .map(|(k, v)| vec![k.to_string(), v.to_string()])
            .collect();

        self.print_table(&data);
    }

    // Column-aligned like `column -t`
    fn render_formatted_table<T>(data: &[Vec<T>]) -> Vec<String>
    where
        T: Display + AsRef<str>,
    {
        let num_cols = data.iter().map(|row| row.len()).max().unwrap_or(0);
        let mut col_widths = vec![0; num_cols];

        for row in data {
            for (i, cell) in row.iter().enumerate() {
                col_widths[i] = col_widths[i].max(cell.as_ref().chars().count());
            }
        }

        data.iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, cell)| {
                        if i == row.len() - 1 {
                            cell.to_string()
                        } else {
                            format!("{:<width$}", cell.as_ref(), width = col_widths[i])
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("  ")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_output() {
        let format = OutputFormat::new(true);
        let data = vec![
            vec!["short", "medium", "very_long_column"],
            vec!["a", "bb", "ccc"],
        ];

        assert_eq!(
            format.render_table(&data),
            vec!["short\tmedium\tvery_long_column", "a\tbb\tccc"]
        );
    }

    #[test]
    fn test_formatted_output() {
        let format = OutputFormat::new(false);
        let data = vec![
            vec!["short", "medium", "very_long_column"],
            vec!["a", "bb", "ccc"],
        ];

        assert_eq!(
            format.render_table(&data),
            vec!["short  medium  very_long_column", "a      bb      ccc"]
        );
    }

    #[test]
    fn test_formatted_output_counts_characters() {
        let format = OutputFormat::new(false);
        let data = vec![vec!["Кот", "x"], vec!["ab", "y"]];

        assert_eq!(format.render_table(&data), vec!["Кот  x", "ab   y"]);
    }
}
