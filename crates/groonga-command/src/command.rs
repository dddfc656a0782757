use std::collections::BTreeMap;
use std::fmt;

/// A Groonga command: a name plus named arguments.
///
/// Arguments are kept sorted by name, which is also the order used by
/// [`Command::to_command_format`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    name: String,
    arguments: BTreeMap<String, String>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: BTreeMap::new(),
        }
    }

    /// Builder form of [`Command::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.arguments.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.arguments.remove(name)
    }

    pub fn arguments(&self) -> &BTreeMap<String, String> {
        &self.arguments
    }

    pub fn table(&self) -> Option<&str> {
        self.get("table")
    }

    /// Column names given by `--columns`, split on commas.
    pub fn columns(&self) -> Option<Vec<String>> {
        self.get("columns").map(|columns| {
            columns
                .split(',')
                .map(|column| column.trim().to_string())
                .filter(|column| !column.is_empty())
                .collect()
        })
    }

    /// Render as a single command line.
    ///
    /// ```
    /// use groonga_command::Command;
    ///
    /// let delete = Command::new("delete").with("table", "Items").with("key", "a\"b");
    /// assert_eq!(delete.to_command_format(), r#"delete --key "a\"b" --table "Items""#);
    /// ```
    pub fn to_command_format(&self) -> String {
        let mut line = self.name.clone();
        for (name, value) in &self.arguments {
            line.push_str(" --");
            line.push_str(name);
            line.push(' ');
            line.push_str(&quote(value));
        }
        line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_command_format())
    }
}

fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sorts_and_quotes_arguments() {
        let command = Command::new("column_create")
            .with("table", "Items")
            .with("name", "price")
            .with("type", "UInt32")
            .with("flags", "COLUMN_SCALAR");
        assert_eq!(
            command.to_command_format(),
            r#"column_create --flags "COLUMN_SCALAR" --name "price" --table "Items" --type "UInt32""#
        );
    }

    #[test]
    fn test_format_escapes_newline_and_backslash() {
        let command = Command::new("delete").with("key", "a\\b\nc");
        assert_eq!(command.to_command_format(), r#"delete --key "a\\b\nc""#);
    }

    #[test]
    fn test_columns_are_split() {
        let load = Command::new("load").with("columns", "_key, name,price");
        assert_eq!(
            load.columns(),
            Some(vec![
                "_key".to_string(),
                "name".to_string(),
                "price".to_string()
            ])
        );
        assert_eq!(Command::new("load").columns(), None);
    }
}
