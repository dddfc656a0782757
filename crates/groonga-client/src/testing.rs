//! In-memory Groonga for tests.
//!
//! `MemoryGroonga` understands the subset of commands that delta entries
//! contain (`table_create`, `table_remove`, `column_create`,
//! `column_remove`, `load`, `delete`) plus `dump` and `status`, and dumps
//! itself in the same layout `groonga <db> dump` uses.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, TimeZone};
use groonga_command::Command;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::response::INVALID_ARGUMENT;
use crate::{GroongaClient, Response};

#[derive(Debug, Clone)]
struct Column {
    name: String,
    flags: String,
    value_type: String,
    source: Option<String>,
}

impl Column {
    fn is_index(&self) -> bool {
        self.flags.contains("COLUMN_INDEX")
    }
}

#[derive(Debug, Clone)]
struct Row {
    key: Value,
    values: Map<String, Value>,
}

#[derive(Debug, Clone)]
struct Table {
    name: String,
    flags: String,
    key_type: Option<String>,
    value_type: Option<String>,
    default_tokenizer: Option<String>,
    normalizer: Option<String>,
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl Table {
    fn has_key(&self) -> bool {
        !self.flags.contains("TABLE_NO_KEY")
    }

    fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    fn find_row(&self, key: &Value) -> Option<usize> {
        self.rows.iter().position(|row| &row.key == key)
    }

    fn data_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|column| !column.is_index())
    }
}

#[derive(Debug, Default)]
struct Database {
    tables: Vec<Table>,
    executed: Vec<Command>,
}

type Outcome = std::result::Result<Value, String>;

impl Database {
    fn table_index(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|table| table.name == name)
    }

    fn table_mut(&mut self, name: &str) -> std::result::Result<&mut Table, String> {
        match self.table_index(name) {
            Some(index) => Ok(&mut self.tables[index]),
            None => Err(format!("nonexistent table: <{name}>")),
        }
    }

    fn execute(&mut self, command: &Command) -> Outcome {
        match command.name() {
            "table_create" => self.table_create(command),
            "table_remove" => self.table_remove(command),
            "column_create" => self.column_create(command),
            "column_remove" => self.column_remove(command),
            "load" => self.load(command),
            "delete" => self.delete(command),
            "dump" => Ok(Value::String(self.dump())),
            "status" => Ok(Value::Object(Map::new())),
            other => Err(format!("unknown command: <{other}>")),
        }
    }

    fn table_create(&mut self, command: &Command) -> Outcome {
        let name = required(command, "name")?;
        if self.table_index(name).is_some() {
            return Err(format!("already used name: <{name}>"));
        }
        let flags = command.get("flags").unwrap_or("TABLE_HASH_KEY").to_string();
        let key_type = if flags.contains("TABLE_NO_KEY") {
            None
        } else {
            Some(command.get("key_type").unwrap_or("ShortText").to_string())
        };
        self.tables.push(Table {
            name: name.to_string(),
            flags,
            key_type,
            value_type: command.get("value_type").map(str::to_string),
            default_tokenizer: command.get("default_tokenizer").map(str::to_string),
            normalizer: command.get("normalizer").map(str::to_string),
            columns: Vec::new(),
            rows: Vec::new(),
        });
        Ok(Value::Bool(true))
    }

    fn table_remove(&mut self, command: &Command) -> Outcome {
        let name = required(command, "name")?;
        let index = self
            .table_index(name)
            .ok_or_else(|| format!("nonexistent table: <{name}>"))?;
        self.tables.remove(index);
        Ok(Value::Bool(true))
    }

    fn column_create(&mut self, command: &Command) -> Outcome {
        let table = self.table_mut(required(command, "table")?)?;
        let name = required(command, "name")?;
        if table.column(name).is_some() {
            return Err(format!("already used name: <{}.{name}>", table.name));
        }
        table.columns.push(Column {
            name: name.to_string(),
            flags: command.get("flags").unwrap_or("COLUMN_SCALAR").to_string(),
            value_type: required(command, "type")?.to_string(),
            source: command.get("source").map(str::to_string),
        });
        Ok(Value::Bool(true))
    }

    fn column_remove(&mut self, command: &Command) -> Outcome {
        let table = self.table_mut(required(command, "table")?)?;
        let name = required(command, "name")?;
        let index = table
            .columns
            .iter()
            .position(|column| column.name == name)
            .ok_or_else(|| format!("nonexistent column: <{}.{name}>", table.name))?;
        table.columns.remove(index);
        for row in &mut table.rows {
            row.values.remove(name);
        }
        Ok(Value::Bool(true))
    }

    fn load(&mut self, command: &Command) -> Outcome {
        let table = self.table_mut(required(command, "table")?)?;
        let values: Value = serde_json::from_str(required(command, "values")?)
            .map_err(|e| format!("invalid values: {e}"))?;
        let Value::Array(values) = values else {
            return Err("values must be an array".to_string());
        };

        let mut columns = command.columns();
        let mut n_loaded = 0;
        for value in values {
            let record = match value {
                Value::Object(record) => record,
                Value::Array(items) => match &columns {
                    None => {
                        let header = items
                            .iter()
                            .map(|item| item.as_str().map(str::to_string))
                            .collect::<Option<Vec<_>>>()
                            .ok_or_else(|| "invalid columns header".to_string())?;
                        columns = Some(header);
                        continue;
                    }
                    Some(columns) => columns.iter().cloned().zip(items).collect(),
                },
                other => return Err(format!("invalid record: {other}")),
            };
            upsert(table, record)?;
            n_loaded += 1;
        }
        Ok(Value::from(n_loaded))
    }

    fn delete(&mut self, command: &Command) -> Outcome {
        let table = self.table_mut(required(command, "table")?)?;
        let key = required(command, "key")?;
        let key = match &table.key_type {
            Some(key_type) => cast(key_type, Value::String(key.to_string()))?,
            None => return Err(format!("{} has no key", table.name)),
        };
        if let Some(index) = table.find_row(&key) {
            table.rows.remove(index);
        }
        Ok(Value::Bool(true))
    }

    fn dump(&self) -> String {
        let mut dump = String::new();
        for table in &self.tables {
            dump.push_str(&format!("table_create {} {}", table.name, table.flags));
            if let Some(key_type) = &table.key_type {
                dump.push_str(&format!(" {key_type}"));
            }
            if let Some(value_type) = &table.value_type {
                dump.push_str(&format!(" --value_type {value_type}"));
            }
            if let Some(tokenizer) = &table.default_tokenizer {
                dump.push_str(&format!(" --default_tokenizer {tokenizer}"));
            }
            if let Some(normalizer) = &table.normalizer {
                dump.push_str(&format!(" --normalizer {normalizer}"));
            }
            dump.push('\n');
            for column in table.data_columns() {
                dump.push_str(&format!(
                    "column_create {} {} {} {}\n",
                    table.name, column.name, column.flags, column.value_type
                ));
            }
        }

        for table in self.tables.iter().filter(|table| !table.rows.is_empty()) {
            let mut header = Vec::new();
            if table.has_key() {
                header.push(Value::from("_key"));
            } else {
                header.push(Value::from("_id"));
            }
            header.extend(table.data_columns().map(|column| Value::from(column.name.as_str())));

            let mut lines = vec![Value::Array(header).to_string()];
            for (id, row) in table.rows.iter().enumerate() {
                let mut line = Vec::new();
                if table.has_key() {
                    line.push(row.key.clone());
                } else {
                    line.push(Value::from(id + 1));
                }
                for column in table.data_columns() {
                    line.push(
                        row.values
                            .get(&column.name)
                            .cloned()
                            .unwrap_or_else(|| default_value(&column.value_type)),
                    );
                }
                lines.push(Value::Array(line).to_string());
            }

            dump.push('\n');
            dump.push_str(&format!("load --table {}\n[\n", table.name));
            dump.push_str(&lines.join(",\n"));
            dump.push_str("\n]\n");
        }

        for table in &self.tables {
            for column in table.columns.iter().filter(|column| column.is_index()) {
                dump.push('\n');
                dump.push_str(&format!(
                    "column_create {} {} {} {}",
                    table.name, column.name, column.flags, column.value_type
                ));
                if let Some(source) = &column.source {
                    dump.push_str(&format!(" {source}"));
                }
                dump.push('\n');
            }
        }
        dump
    }
}

fn required<'a>(command: &'a Command, name: &str) -> std::result::Result<&'a str, String> {
    command
        .get(name)
        .ok_or_else(|| format!("{}: --{name} is missing", command.name()))
}

fn upsert(table: &mut Table, mut record: Map<String, Value>) -> std::result::Result<(), String> {
    let key = match (&table.key_type, record.remove("_key")) {
        (Some(key_type), Some(key)) => cast(key_type, key)?,
        (Some(_), None) => return Err(format!("{}: _key is missing", table.name)),
        (None, _) => Value::Null,
    };

    let mut values = Map::new();
    for (name, value) in record {
        let column = table
            .column(&name)
            .ok_or_else(|| format!("nonexistent column: <{}.{name}>", table.name))?;
        values.insert(name, cast(&column.value_type, value)?);
    }

    match table.key_type.as_ref().and_then(|_| table.find_row(&key)) {
        Some(index) => table.rows[index].values.extend(values),
        None => table.rows.push(Row { key, values }),
    }
    Ok(())
}

fn default_value(value_type: &str) -> Value {
    match value_type {
        "Int8" | "Int16" | "Int32" | "Int64" | "UInt8" | "UInt16" | "UInt32" | "UInt64" => {
            Value::from(0)
        }
        "Float" | "Time" => Value::from(0.0),
        "Bool" => Value::Bool(false),
        _ => Value::from(""),
    }
}

fn cast(value_type: &str, value: Value) -> std::result::Result<Value, String> {
    let invalid = |value: &Value| format!("invalid {value_type} value: {value}");
    match value_type {
        "Int8" | "Int16" | "Int32" | "Int64" => match &value {
            Value::Null => Ok(Value::from(0)),
            Value::Bool(b) => Ok(Value::from(i64::from(*b))),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Value::from)
                .ok_or_else(|| invalid(&value)),
            Value::String(s) if s.is_empty() => Ok(Value::from(0)),
            Value::String(s) => s.parse::<i64>().map(Value::from).map_err(|_| invalid(&value)),
            _ => Err(invalid(&value)),
        },
        "UInt8" | "UInt16" | "UInt32" | "UInt64" => match &value {
            Value::Null => Ok(Value::from(0)),
            Value::Bool(b) => Ok(Value::from(u64::from(*b))),
            Value::Number(n) => n.as_u64().map(Value::from).ok_or_else(|| invalid(&value)),
            Value::String(s) if s.is_empty() => Ok(Value::from(0)),
            Value::String(s) => s.parse::<u64>().map(Value::from).map_err(|_| invalid(&value)),
            _ => Err(invalid(&value)),
        },
        "Float" => match &value {
            Value::Null => Ok(Value::from(0.0)),
            Value::Number(n) => n.as_f64().map(Value::from).ok_or_else(|| invalid(&value)),
            Value::String(s) => s.parse::<f64>().map(Value::from).map_err(|_| invalid(&value)),
            _ => Err(invalid(&value)),
        },
        "Bool" => Ok(Value::Bool(match &value {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64() != Some(0.0),
            Value::String(s) => !(s.is_empty() || s == "false" || s == "0"),
            _ => true,
        })),
        "Time" => match &value {
            Value::Null => Ok(Value::from(0.0)),
            Value::Number(n) => n.as_f64().map(Value::from).ok_or_else(|| invalid(&value)),
            Value::String(s) => parse_local_time(s)
                .map(Value::from)
                .ok_or_else(|| invalid(&value)),
            _ => Err(invalid(&value)),
        },
        _ => Ok(match value {
            Value::Null => Value::from(""),
            Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        }),
    }
}

fn parse_local_time(text: &str) -> Option<f64> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|time| time.timestamp() as f64 + f64::from(time.timestamp_subsec_micros()) / 1e6)
}

/// In-memory Groonga implementing [`GroongaClient`].
#[derive(Debug, Default)]
pub struct MemoryGroonga {
    database: Mutex<Database>,
}

impl MemoryGroonga {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command executed so far, in order.
    pub async fn executed(&self) -> Vec<Command> {
        self.database.lock().await.executed.clone()
    }

    /// Number of records in `table`, if the table exists.
    pub async fn n_records(&self, table: &str) -> Option<usize> {
        let database = self.database.lock().await;
        database
            .table_index(table)
            .map(|index| database.tables[index].rows.len())
    }
}

#[async_trait]
impl GroongaClient for MemoryGroonga {
    async fn execute(&self, command: &Command) -> Result<Response> {
        let mut database = self.database.lock().await;
        database.executed.push(command.clone());
        Ok(match database.execute(command) {
            Ok(body) => Response::success(body),
            Err(message) => Response::failure(INVALID_ARGUMENT, message),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(groonga: &MemoryGroonga, command: Command) -> Response {
        groonga.execute(&command).await.unwrap()
    }

    async fn create_items(groonga: &MemoryGroonga) {
        run(
            groonga,
            Command::new("table_create")
                .with("name", "Items")
                .with("flags", "TABLE_HASH_KEY")
                .with("key_type", "ShortText"),
        )
        .await;
        for (name, value_type) in [("name", "ShortText"), ("price", "UInt32")] {
            run(
                groonga,
                Command::new("column_create")
                    .with("table", "Items")
                    .with("name", name)
                    .with("flags", "COLUMN_SCALAR")
                    .with("type", value_type),
            )
            .await;
        }
    }

    #[tokio::test]
    async fn test_dump_materializes_defaults() {
        let groonga = MemoryGroonga::new();
        create_items(&groonga).await;
        let response = run(
            &groonga,
            Command::new("load").with("table", "Items").with(
                "values",
                r#"[{"_key":"item1","name":"Shoes"},{"_key":"item2","name":"Hat"}]"#,
            ),
        )
        .await;
        assert!(response.is_success());

        assert_eq!(
            groonga.dump().await.unwrap(),
            "table_create Items TABLE_HASH_KEY ShortText\n\
             column_create Items name COLUMN_SCALAR ShortText\n\
             column_create Items price COLUMN_SCALAR UInt32\n\
             \n\
             load --table Items\n\
             [\n\
             [\"_key\",\"name\",\"price\"],\n\
             [\"item1\",\"Shoes\",0],\n\
             [\"item2\",\"Hat\",0]\n\
             ]\n"
        );
    }

    #[tokio::test]
    async fn test_load_is_upsert_by_key() {
        let groonga = MemoryGroonga::new();
        create_items(&groonga).await;
        let load = Command::new("load")
            .with("table", "Items")
            .with("values", r#"[["_key","price"],["item1",100]]"#);
        run(&groonga, load.clone()).await;
        run(&groonga, load).await;
        assert_eq!(groonga.n_records("Items").await, Some(1));
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_not_an_error() {
        let groonga = MemoryGroonga::new();
        create_items(&groonga).await;
        let delete = Command::new("delete")
            .with("table", "Items")
            .with("key", "nonexistent");
        assert!(run(&groonga, delete).await.is_success());
    }

    #[tokio::test]
    async fn test_failures_are_responses() {
        let groonga = MemoryGroonga::new();
        let response = run(
            &groonga,
            Command::new("column_create")
                .with("table", "Missing")
                .with("name", "x")
                .with("type", "ShortText"),
        )
        .await;
        assert!(!response.is_success());
        assert_eq!(
            response.error_message.as_deref(),
            Some("nonexistent table: <Missing>")
        );
        assert_eq!(groonga.executed().await.len(), 1);
    }
}
