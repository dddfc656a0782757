//! Record generation for one destination table.

use arrow::record_batch::RecordBatch;
use delta_core::columnar::records_to_batch;
use delta_core::types::{cast_text, coerce};
use delta_core::{ColumnType, Record, SourceRow, Value};

use crate::error::{GenerationCause, GenerationError};
use crate::expression::Expression;
use crate::restriction::Restriction;
use crate::template::Template;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnGenerator {
    Template(Template),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroongaColumn {
    pub name: String,
    pub generator: ColumnGenerator,
    pub column_type: Option<ColumnType>,
}

impl GroongaColumn {
    fn generate_value(&self, row: &SourceRow) -> Result<Value, GenerationCause> {
        match &self.generator {
            ColumnGenerator::Template(template) => {
                let text = template.render(row)?;
                Ok(cast_text(self.column_type, &text)?)
            }
            ColumnGenerator::Expression(expression) => {
                let value = expression.evaluate(row)?;
                Ok(coerce(self.column_type, value)?)
            }
        }
    }
}

/// A destination table and the columns generated for it.
#[derive(Debug, Clone, PartialEq)]
pub struct GroongaTable {
    name: String,
    columns: Vec<GroongaColumn>,
    restriction: Restriction,
}

impl GroongaTable {
    pub fn new(name: impl Into<String>, columns: Vec<GroongaColumn>, restriction: Restriction) -> Self {
        Self {
            name: name.into(),
            columns,
            restriction,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[GroongaColumn] {
        &self.columns
    }

    /// `(name, declared type)` of every column, in mapping order.
    pub fn column_types(&self) -> Vec<(String, Option<ColumnType>)> {
        self.columns
            .iter()
            .map(|column| (column.name.clone(), column.column_type))
            .collect()
    }

    pub fn generate_record(&self, row: &SourceRow) -> Result<Record, GenerationError> {
        let mut record = Record::new();
        for column in &self.columns {
            let value = column
                .generate_value(row)
                .map_err(|cause| GenerationError {
                    table: self.name.clone(),
                    column: column.name.clone(),
                    source_row: row.clone(),
                    cause,
                })?;
            let value = match column.column_type {
                Some(ColumnType::Time) => self.restriction.time.clamp(value),
                _ => value,
            };
            record.insert(column.name.clone(), value);
        }
        Ok(record)
    }

    pub fn generate_records(&self, rows: &[SourceRow]) -> Result<Vec<Record>, GenerationError> {
        rows.iter().map(|row| self.generate_record(row)).collect()
    }

    /// Generate a columnar batch with one column per mapping column.
    pub fn generate_batch(&self, rows: &[SourceRow]) -> anyhow::Result<RecordBatch> {
        let records = self.generate_records(rows)?;
        Ok(records_to_batch(&self.column_types(), &records)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::{GenerationCause, Mapping};
    use chrono::{DateTime, Local, TimeZone};
    use delta_core::{SourceRow, Value};

    fn mapping(yaml: &str) -> Mapping {
        Mapping::parse(&serde_yaml::from_str(yaml).unwrap()).unwrap()
    }

    fn row(fields: &[(&str, Value)]) -> SourceRow {
        fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn local(rfc3339: &str) -> DateTime<Local> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Local)
    }

    // =========================================================================
    // Text
    // =========================================================================

    fn short_text_mapping() -> Mapping {
        mapping(
            r#"
items:
  sources:
    - database: source
      table: shoes
      columns:
        _key:
          expression: name
          type: ShortText
"#,
        )
    }

    #[test]
    fn test_utf8_bytes_become_text() {
        let mapping = short_text_mapping();
        let table = &mapping.source_table("source", "shoes").unwrap().groonga_table;
        let record = table
            .generate_record(&row(&[("name", Value::Bytes("あ".as_bytes().to_vec()))]))
            .unwrap();
        assert_eq!(record.get("_key"), Some(&Value::from("あ")));
    }

    #[test]
    fn test_invalid_utf8_is_a_generation_error() {
        let mapping = short_text_mapping();
        let table = &mapping.source_table("source", "shoes").unwrap().groonga_table;
        // U+3042 in EUC-JP
        let source_row = row(&[("name", Value::Bytes(vec![0xa4, 0xa2]))]);
        let error = table.generate_record(&source_row).unwrap_err();
        assert_eq!(error.table, "items");
        assert_eq!(error.column, "_key");
        assert_eq!(error.source_row, source_row);
        assert!(matches!(error.cause, GenerationCause::Cast(_)));
    }

    #[test]
    fn test_template_cast() {
        let mapping = mapping(
            r#"
items:
  sources:
    - database: source
      table: shoes
      columns:
        _key: "shoes-%{id}"
        price:
          template: "%{price}"
          type: UInt32
        available:
          template: "%{stock}"
          type: Bool
"#,
        );
        let table = &mapping.source_table("source", "shoes").unwrap().groonga_table;
        let record = table
            .generate_record(&row(&[
                ("id", Value::Int(1)),
                ("price", Value::from("")),
                ("stock", Value::Int(0)),
            ]))
            .unwrap();
        assert_eq!(
            record.to_json_string(),
            r#"{"_key":"shoes-1","price":0,"available":false}"#
        );

        let error = table
            .generate_record(&row(&[("id", Value::Int(1))]))
            .unwrap_err();
        assert_eq!(error.column, "price");
        assert!(matches!(error.cause, GenerationCause::MissingField(ref name) if name == "price"));
    }

    // =========================================================================
    // Time restriction
    // =========================================================================

    fn time_mapping() -> Mapping {
        mapping(
            r#"
items:
  restriction:
    time:
      max: "2100-01-01T00:00:00Z"
      min: "1970-01-01T00:00:00Z"
  sources:
    - database: source
      table: shoes
      columns:
        release_time:
          expression: release_time
          type: Time
"#,
        )
    }

    #[test]
    fn test_time_too_large_is_clamped_to_max() {
        let mapping = time_mapping();
        let table = &mapping.source_table("source", "shoes").unwrap().groonga_table;
        let year_2300 = Local.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap();
        let record = table
            .generate_record(&row(&[("release_time", Value::Time(year_2300))]))
            .unwrap();
        assert_eq!(
            record.get("release_time"),
            Some(&Value::Time(local("2100-01-01T00:00:00Z")))
        );
    }

    #[test]
    fn test_time_too_small_is_clamped_to_min() {
        let mapping = time_mapping();
        let table = &mapping.source_table("source", "shoes").unwrap().groonga_table;
        let year_1900 = Local.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).unwrap();
        let record = table
            .generate_record(&row(&[("release_time", Value::Time(year_1900))]))
            .unwrap();
        assert_eq!(
            record.get("release_time"),
            Some(&Value::Time(local("1970-01-01T00:00:00Z")))
        );
    }

    #[test]
    fn test_time_in_range_passes_through() {
        let mapping = time_mapping();
        let table = &mapping.source_table("source", "shoes").unwrap().groonga_table;
        let time = Local.with_ymd_and_hms(2022, 1, 19, 0, 0, 1).unwrap();
        let record = table
            .generate_record(&row(&[("release_time", Value::Time(time))]))
            .unwrap();
        assert_eq!(record.get("release_time"), Some(&Value::Time(time)));
    }

    // =========================================================================
    // Batches
    // =========================================================================

    #[test]
    fn test_batch_matches_records() {
        let mapping = mapping(
            r#"
items:
  sources:
    - database: source
      table: shoes
      columns:
        _key: "shoes-%{id}"
        price:
          expression: price
          type: Int32
"#,
        );
        let table = &mapping.source_table("source", "shoes").unwrap().groonga_table;
        let rows = vec![
            row(&[("id", Value::Int(1)), ("price", Value::Int(100))]),
            row(&[("id", Value::Int(2)), ("price", Value::Int(200))]),
        ];
        let batch = table.generate_batch(&rows).unwrap();
        let (columns, values) = delta_core::columnar::batch_to_rows(&batch).unwrap();
        assert_eq!(columns, vec!["_key", "price"]);
        assert_eq!(
            values,
            vec![
                vec![serde_json::json!("shoes-1"), serde_json::json!(100)],
                vec![serde_json::json!("shoes-2"), serde_json::json!(200)],
            ]
        );
    }

    #[test]
    fn test_batch_keeps_time_beyond_nanosecond_range() {
        let mapping = mapping(
            r#"
items:
  sources:
    - database: source
      table: shoes
      columns:
        _key: "shoes-%{id}"
        release_time:
          expression: release_time
          type: Time
"#,
        );
        let table = &mapping.source_table("source", "shoes").unwrap().groonga_table;
        let year_2300 = Local.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap();
        let rows = vec![row(&[
            ("id", Value::Int(1)),
            ("release_time", Value::Time(year_2300)),
        ])];

        let record = table.generate_record(&rows[0]).unwrap();
        let batch = table.generate_batch(&rows).unwrap();
        let (_, values) = delta_core::columnar::batch_to_rows(&batch).unwrap();
        assert_eq!(
            values,
            vec![vec![
                serde_json::json!("shoes-1"),
                record.get("release_time").unwrap().to_json(),
            ]]
        );
        assert_ne!(values[0][1], serde_json::Value::Null);
    }
}
