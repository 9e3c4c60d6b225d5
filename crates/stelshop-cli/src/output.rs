use clap::ValueEnum;

/// How `validate` and `stats` print their results
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Styled text for a terminal
    #[default]
    Pretty,
    Json,
    /// Comma-separated rows
    Table,
}

/// Make a value safe for one cell of the comma-separated table output
pub fn table_cell(value: &str) -> String {
    value
        .replace(',', ";")
        .replace(['\r', '\n'], " ")
        .trim()
        .to_string()
}
