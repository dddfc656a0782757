//! Mapping definition parsing.
//!
//! ```yaml
//! items:
//!   restriction:
//!     time:
//!       min: "1970-01-01T00:00:00Z"
//!       max: "2100-01-01T00:00:00Z"
//!   sources:
//!     - database: shop
//!       table: shoes
//!       filter: "deleted = 0"
//!       columns:
//!         _key: "shoes-%{id}"
//!         name: "%{name}"
//!         price:
//!           template: "%{price}"
//!           type: UInt32
//!         description:
//!           expression: html_untag(description)
//!           type: Text
//!           source_column_names: [description]
//! ```

use delta_core::ColumnType;
use serde_yaml::Value as Yaml;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::expression::Expression;
use crate::restriction::Restriction;
use crate::table::{ColumnGenerator, GroongaColumn, GroongaTable};
use crate::template::Template;

/// All source databases, in order of first appearance.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    source_databases: Vec<SourceDatabase>,
}

#[derive(Debug, Clone)]
pub struct SourceDatabase {
    pub name: String,
    pub source_tables: Vec<SourceTable>,
}

/// One source table feeding one destination table.
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub name: String,
    /// Columns to read from the source, without duplicates.
    pub source_column_names: Vec<String>,
    /// SQL condition appended to bulk exports.
    pub filter: Option<String>,
    pub groonga_table: Arc<GroongaTable>,
}

impl Mapping {
    /// Parse the `mapping` section of a configuration.
    pub fn parse(value: &Yaml) -> Result<Self, ConfigError> {
        let mut mapping = Mapping::default();
        let tables = match value {
            Yaml::Null => return Ok(mapping),
            Yaml::Mapping(tables) => tables,
            other => {
                return Err(ConfigError::new(format!(
                    "mapping must be a mapping: {other:?}"
                )))
            }
        };

        for (name, details) in tables {
            let name = string(name, "table name")?;
            let restriction = Restriction::parse(details.get("restriction"))?;
            let sources = match details.get("sources") {
                None | Some(Yaml::Null) => continue,
                Some(Yaml::Sequence(sources)) => sources,
                Some(other) => {
                    return Err(ConfigError::new(format!(
                        "{name}: sources must be a list: {other:?}"
                    )))
                }
            };
            for source in sources {
                let (database, table) = parse_source(&name, &restriction, source)?;
                mapping.add(database, table);
            }
        }
        Ok(mapping)
    }

    fn add(&mut self, database: String, table: SourceTable) {
        match self
            .source_databases
            .iter_mut()
            .find(|source_database| source_database.name == database)
        {
            Some(source_database) => source_database.source_tables.push(table),
            None => self.source_databases.push(SourceDatabase {
                name: database,
                source_tables: vec![table],
            }),
        }
    }

    pub fn source_databases(&self) -> &[SourceDatabase] {
        &self.source_databases
    }

    pub fn is_empty(&self) -> bool {
        self.source_databases.is_empty()
    }

    pub fn database(&self, name: &str) -> Option<&SourceDatabase> {
        self.source_databases
            .iter()
            .find(|database| database.name == name)
    }

    pub fn source_table(&self, database: &str, table: &str) -> Option<&SourceTable> {
        self.database(database)?
            .source_tables
            .iter()
            .find(|source_table| source_table.name == table)
    }
}

fn parse_source(
    groonga_table_name: &str,
    restriction: &Restriction,
    source: &Yaml,
) -> Result<(String, SourceTable), ConfigError> {
    let field = |key: &str| -> Result<String, ConfigError> {
        let value = source.get(key).ok_or_else(|| {
            ConfigError::new(format!("{groonga_table_name}: source {key} is missing"))
        })?;
        string(value, key)
    };
    let database = field("database")?;
    let table = field("table")?;
    let filter = match source.get("filter") {
        None | Some(Yaml::Null) => None,
        Some(filter) => Some(string(filter, "filter")?),
    };

    let raw_columns = match source.get("columns") {
        Some(Yaml::Mapping(columns)) => columns,
        _ => {
            return Err(ConfigError::new(format!(
                "{groonga_table_name}: columns of {database}.{table} must be a mapping"
            )))
        }
    };

    let mut columns = Vec::new();
    let mut source_column_names: Vec<String> = Vec::new();
    for (name, definition) in raw_columns {
        let name = string(name, "column name")?;
        let column = parse_column(&name, definition)?;
        if let Yaml::Mapping(options) = definition {
            if let Some(Yaml::Sequence(names)) = options.get("source_column_names") {
                for name in names {
                    source_column_names.push(string(name, "source column name")?);
                }
            }
        }
        match &column.generator {
            ColumnGenerator::Template(template) => {
                source_column_names.extend(template.field_names().map(str::to_string))
            }
            ColumnGenerator::Expression(expression) => {
                source_column_names.extend(expression.field_names().into_iter().map(str::to_string))
            }
        }
        columns.push(column);
    }
    let mut seen = std::collections::HashSet::new();
    source_column_names.retain(|name| seen.insert(name.clone()));

    let groonga_table = GroongaTable::new(groonga_table_name, columns, restriction.clone());
    Ok((
        database,
        SourceTable {
            name: table,
            source_column_names,
            filter,
            groonga_table: Arc::new(groonga_table),
        },
    ))
}

fn parse_column(name: &str, definition: &Yaml) -> Result<GroongaColumn, ConfigError> {
    if let Yaml::String(template) = definition {
        return Ok(GroongaColumn {
            name: name.to_string(),
            generator: ColumnGenerator::Template(Template::parse(template)?),
            column_type: None,
        });
    }
    let column_type = match definition.get("type") {
        None | Some(Yaml::Null) => None,
        Some(column_type) => Some(string(column_type, "type")?.parse::<ColumnType>()?),
    };
    let generator = match (definition.get("template"), definition.get("expression")) {
        (Some(template), _) => ColumnGenerator::Template(Template::parse(&string(template, "template")?)?),
        (None, Some(expression)) => {
            ColumnGenerator::Expression(Expression::parse(&string(expression, "expression")?)?)
        }
        (None, None) => {
            return Err(ConfigError::new(format!(
                "column {name} needs a template or an expression"
            )))
        }
    };
    Ok(GroongaColumn {
        name: name.to_string(),
        generator,
        column_type,
    })
}

fn string(value: &Yaml, what: &str) -> Result<String, ConfigError> {
    match value {
        Yaml::String(s) => Ok(s.clone()),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        other => Err(ConfigError::new(format!(
            "{what} must be a string: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<Mapping, ConfigError> {
        Mapping::parse(&serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_sources_are_grouped_by_database() {
        let mapping = parse(
            r#"
items:
  sources:
    - database: shop
      table: shoes
      filter: "deleted = 0"
      columns:
        _key: "shoes-%{id}"
        name: "%{name}"
        description:
          expression: html_untag(description)
          source_column_names: [id]
    - database: shop
      table: hats
      columns:
        _key: "hats-%{id}"
tags:
  sources:
    - database: blog
      table: tags
      columns:
        _key: "%{name}"
"#,
        )
        .unwrap();

        let names: Vec<_> = mapping
            .source_databases()
            .iter()
            .map(|database| database.name.as_str())
            .collect();
        assert_eq!(names, vec!["shop", "blog"]);

        let shoes = mapping.source_table("shop", "shoes").unwrap();
        assert_eq!(shoes.filter.as_deref(), Some("deleted = 0"));
        assert_eq!(shoes.source_column_names, vec!["id", "name", "description"]);
        assert_eq!(shoes.groonga_table.name(), "items");
        let columns: Vec<_> = shoes
            .groonga_table
            .columns()
            .iter()
            .map(|column| column.name.as_str())
            .collect();
        assert_eq!(columns, vec!["_key", "name", "description"]);

        assert_eq!(
            mapping.source_table("shop", "hats").unwrap().groonga_table.name(),
            "items"
        );
        assert!(mapping.source_table("shop", "tags").is_none());
    }

    #[test]
    fn test_unknown_type_is_a_config_error() {
        let error = parse(
            r#"
items:
  sources:
    - database: shop
      table: shoes
      columns:
        price:
          template: "%{price}"
          type: Money
"#,
        )
        .unwrap_err();
        assert_eq!(error, ConfigError::new("Unknown type: Money"));
    }

    #[test]
    fn test_column_without_generator() {
        assert!(parse(
            r#"
items:
  sources:
    - database: shop
      table: shoes
      columns:
        price:
          type: UInt32
"#,
        )
        .is_err());
    }

    #[test]
    fn test_empty_mapping() {
        assert!(Mapping::parse(&Yaml::Null).unwrap().is_empty());
    }
}
