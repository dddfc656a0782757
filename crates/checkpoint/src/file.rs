//! The status document.

use anyhow::Context;
use serde_yaml::{Mapping, Value};

use crate::Checkpoint;

/// Parsed `status.yaml`.
///
/// Sections this process does not know about are kept as they are, so that
/// an importer updating `mysql` never drops `local` and vice versa.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusFile {
    sections: Mapping,
}

impl StatusFile {
    /// Parse a status document. An empty document is an empty status.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_yaml::from_str(content).context("Invalid status document")?;
        match value {
            Value::Null => Ok(Self::default()),
            Value::Mapping(sections) => Ok(Self { sections }),
            other => anyhow::bail!("Status document must be a mapping, got: {other:?}"),
        }
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(&self.sections)?)
    }

    /// Get the raw value of a section.
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    /// Parse a section into its checkpoint type.
    ///
    /// Returns `None` when the section is absent.
    pub fn parse_section<C: Checkpoint>(&self) -> anyhow::Result<Option<C>> {
        match self.sections.get(C::SECTION) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_yaml::from_value(value.clone())
                .map(Some)
                .with_context(|| format!("Invalid '{}' status", C::SECTION)),
        }
    }

    /// Replace a section with a checkpoint.
    pub fn set_section<C: Checkpoint>(&mut self, checkpoint: &C) -> anyhow::Result<()> {
        let value = serde_yaml::to_value(checkpoint)?;
        self.sections.insert(Value::from(C::SECTION), value);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
