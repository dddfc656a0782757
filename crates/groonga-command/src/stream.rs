//! Incremental parser for Groonga command logs.
//!
//! Command logs are fed in arbitrary pieces (usually line by line). Ordinary
//! commands are reported once their line is complete. `load` commands
//! without inline `--values` are followed by a JSON array; its elements are
//! reported one by one as they complete.

use crate::parser::{parse_command_line, ParseError};
use crate::Command;

/// Something the parser recognized.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    /// A command other than `load`
    Command(Command),

    /// A `load` command whose values follow
    LoadStart(Command),

    /// The values array started with a header row of column names
    LoadColumns(Vec<String>),

    /// One record of the values array
    LoadValue(serde_json::Value),

    /// The `load` command is complete. Inline `--values` loads are reported
    /// only with this event.
    LoadComplete(Command),
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Command,
    Values(LoadState),
}

#[derive(Debug)]
struct LoadState {
    command: Command,
    scanner: ArrayScanner,
    n_values: usize,
}

/// Incremental command log parser.
#[derive(Debug, Default)]
pub struct Parser {
    state: State,
    line: String,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next piece of the log.
    pub fn feed(&mut self, text: &str) -> Result<Vec<ParseEvent>, ParseError> {
        let mut events = Vec::new();
        let mut rest = text;

        while !rest.is_empty() {
            match &mut self.state {
                State::Command => match rest.find('\n') {
                    Some(end) => {
                        self.line.push_str(&rest[..end]);
                        rest = &rest[end + 1..];
                        if self.line.ends_with('\\') {
                            self.line.pop();
                            continue;
                        }
                        let line = std::mem::take(&mut self.line);
                        self.process_line(&line, &mut events)?;
                    }
                    None => {
                        self.line.push_str(rest);
                        rest = "";
                    }
                },
                State::Values(load) => {
                    let mut elements = Vec::new();
                    let consumed = load.scanner.scan(rest, &mut elements)?;
                    rest = &rest[consumed..];
                    for element in elements {
                        let value: serde_json::Value = serde_json::from_str(&element)?;
                        if load.n_values == 0 && load.command.get("columns").is_none() {
                            if let serde_json::Value::Array(header) = &value {
                                let columns = header_columns(header)?;
                                load.command.set("columns", columns.join(","));
                                events.push(ParseEvent::LoadColumns(columns));
                                load.n_values += 1;
                                continue;
                            }
                        }
                        load.n_values += 1;
                        events.push(ParseEvent::LoadValue(value));
                    }
                    if load.scanner.done {
                        if let State::Values(load) = std::mem::take(&mut self.state) {
                            events.push(ParseEvent::LoadComplete(load.command));
                        }
                    }
                }
            }
        }

        Ok(events)
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Result<Vec<ParseEvent>, ParseError> {
        if let State::Values(_) = self.state {
            return Err(ParseError::IncompleteLoad);
        }
        let mut events = Vec::new();
        let line = std::mem::take(&mut self.line);
        self.process_line(&line, &mut events)?;
        if let State::Values(_) = self.state {
            return Err(ParseError::IncompleteLoad);
        }
        Ok(events)
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<ParseEvent>) -> Result<(), ParseError> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(());
        }

        let command = parse_command_line(trimmed)?;
        if command.name() != "load" {
            events.push(ParseEvent::Command(command));
        } else if command.get("values").is_some() {
            events.push(ParseEvent::LoadComplete(command));
        } else {
            events.push(ParseEvent::LoadStart(command.clone()));
            self.state = State::Values(LoadState {
                command,
                scanner: ArrayScanner::default(),
                n_values: 0,
            });
        }
        Ok(())
    }
}

fn header_columns(header: &[serde_json::Value]) -> Result<Vec<String>, ParseError> {
    header
        .iter()
        .map(|column| {
            column
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ParseError::InvalidLoadValues(format!("invalid column: {column}")))
        })
        .collect()
}

/// Splits a top-level JSON array into its element texts without parsing
/// the whole array.
#[derive(Debug, Default)]
struct ArrayScanner {
    started: bool,
    done: bool,
    depth: usize,
    in_string: bool,
    escaped: bool,
    element: String,
}

impl ArrayScanner {
    /// Scan `text`, pushing complete elements. Returns the number of bytes
    /// consumed; scanning stops right after the closing bracket.
    fn scan(&mut self, text: &str, elements: &mut Vec<String>) -> Result<usize, ParseError> {
        for (i, c) in text.char_indices() {
            if !self.started {
                match c {
                    '[' => {
                        self.started = true;
                        self.depth = 1;
                    }
                    c if c.is_whitespace() => {}
                    c => {
                        return Err(ParseError::InvalidLoadValues(format!(
                            "expected '[' but got {c:?}"
                        )))
                    }
                }
                continue;
            }

            if self.in_string {
                self.element.push(c);
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == '"' {
                    self.in_string = false;
                }
                continue;
            }

            match c {
                '"' if self.depth >= 2 => {
                    self.in_string = true;
                    self.element.push(c);
                }
                '[' | '{' => {
                    self.depth += 1;
                    self.element.push(c);
                }
                ']' if self.depth == 1 => {
                    self.done = true;
                    return Ok(i + c.len_utf8());
                }
                ']' | '}' if self.depth >= 2 => {
                    self.element.push(c);
                    self.depth -= 1;
                    if self.depth == 1 {
                        elements.push(std::mem::take(&mut self.element));
                    }
                }
                c if self.depth >= 2 => self.element.push(c),
                ',' => {}
                c if c.is_whitespace() => {}
                c => {
                    return Err(ParseError::InvalidLoadValues(format!(
                        "unexpected {c:?} between values"
                    )))
                }
            }
        }
        Ok(text.len())
    }
}
