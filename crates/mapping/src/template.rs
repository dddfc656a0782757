//! `%{field}` templates.

use delta_core::{SourceRow, Value};

use crate::error::{ConfigError, GenerationCause};

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Field(String),
}

/// A parsed template. `%{name}` is replaced by the field value and `%%`
/// produces a literal `%`.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = source;
        while let Some(index) = rest.find('%') {
            literal.push_str(&rest[..index]);
            let after = &rest[index + 1..];
            if let Some(after) = after.strip_prefix('%') {
                literal.push('%');
                rest = after;
            } else if let Some(after) = after.strip_prefix('{') {
                let end = after.find('}').ok_or_else(|| {
                    ConfigError::new(format!("unterminated placeholder in template: {source}"))
                })?;
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(Part::Field(after[..end].to_string()));
                rest = &after[end + 1..];
            } else {
                literal.push('%');
                rest = after;
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Field names referenced by placeholders, in order of appearance.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            Part::Field(name) => Some(name.as_str()),
            Part::Literal(_) => None,
        })
    }

    pub fn render(&self, row: &SourceRow) -> Result<String, GenerationCause> {
        let mut output = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => output.push_str(text),
                Part::Field(name) => {
                    let value = row
                        .get(name)
                        .ok_or_else(|| GenerationCause::MissingField(name.clone()))?;
                    output.push_str(&render_value(name, value)?);
                }
            }
        }
        Ok(output)
    }
}

fn render_value(name: &str, value: &Value) -> Result<String, GenerationCause> {
    value
        .to_template_string()
        .map_err(|source| GenerationCause::InvalidText {
            field: name.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[(&str, Value)]) -> SourceRow {
        fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_render_placeholders() {
        let template = Template::parse("shoes-%{id}: %{name} 100%%").unwrap();
        assert_eq!(template.field_names().collect::<Vec<_>>(), vec!["id", "name"]);
        let rendered = template
            .render(&row(&[("id", Value::Int(1)), ("name", Value::from("a"))]))
            .unwrap();
        assert_eq!(rendered, "shoes-1: a 100%");
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let template = Template::parse("%{id}").unwrap();
        let error = template.render(&row(&[])).unwrap_err();
        assert!(matches!(error, GenerationCause::MissingField(name) if name == "id"));
    }

    #[test]
    fn test_invalid_utf8_is_an_error() {
        let template = Template::parse("%{name}").unwrap();
        let error = template
            .render(&row(&[("name", Value::Bytes(vec![0xa4, 0xa2]))]))
            .unwrap_err();
        assert!(matches!(error, GenerationCause::InvalidText { .. }));
    }

    #[test]
    fn test_unterminated_placeholder() {
        assert!(Template::parse("%{id").is_err());
    }
}
