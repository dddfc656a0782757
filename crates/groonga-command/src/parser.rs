//! Parsing a single Groonga command.
//!
//! Two forms are accepted:
//!
//! - command-line: `table_create Items TABLE_HASH_KEY --key_type ShortText`
//! - URI: `/d/table_create?name=Items&flags=TABLE_HASH_KEY`

use crate::Command;

/// Error while parsing Groonga commands.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unterminated quote: {0}")]
    UnterminatedQuote(String),

    #[error("missing value for --{argument}: {line}")]
    MissingValue { argument: String, line: String },

    #[error("{command} doesn't accept positional argument: {value:?}")]
    UnexpectedPositional { command: String, value: String },

    #[error("invalid load values: {0}")]
    InvalidLoadValues(String),

    #[error("invalid load value: {0}")]
    Json(#[from] serde_json::Error),

    #[error("load values aren't terminated")]
    IncompleteLoad,
}

/// Positional argument names, in order, for the commands that take them.
fn positional_names(command: &str) -> &'static [&'static str] {
    match command {
        "table_create" => &[
            "name",
            "flags",
            "key_type",
            "value_type",
            "default_tokenizer",
            "normalizer",
            "token_filters",
        ],
        "table_remove" => &["name", "dependent"],
        "table_rename" => &["name", "new_name"],
        "column_create" => &["table", "name", "flags", "type", "source"],
        "column_remove" => &["table", "name"],
        "column_rename" => &["table", "name", "new_name"],
        "delete" => &["table", "key", "id", "filter"],
        "load" => &["values", "table", "columns", "ifexists", "input_type"],
        "truncate" => &["target_name"],
        "plugin_register" | "plugin_unregister" => &["name"],
        "select" => &[
            "table",
            "match_columns",
            "query",
            "filter",
            "scorer",
            "sortby",
            "output_columns",
            "offset",
            "limit",
        ],
        _ => &[],
    }
}

/// Parse one command.
pub fn parse_command_line(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.starts_with('/') {
        return parse_uri(line);
    }

    let tokens = tokenize(line)?;
    let mut tokens = tokens.into_iter();
    let name = tokens.next().ok_or(ParseError::Empty)?;
    let mut command = Command::new(name.as_str());
    let positional = positional_names(&name);
    let mut n_positional = 0;

    while let Some(token) = tokens.next() {
        if let Some(argument) = token.strip_prefix("--") {
            let value = tokens.next().ok_or_else(|| ParseError::MissingValue {
                argument: argument.to_string(),
                line: line.to_string(),
            })?;
            command.set(argument, value);
            continue;
        }
        // Positional arguments skip names already given explicitly.
        while n_positional < positional.len() && command.get(positional[n_positional]).is_some() {
            n_positional += 1;
        }
        let argument = positional
            .get(n_positional)
            .ok_or_else(|| ParseError::UnexpectedPositional {
                command: name.clone(),
                value: token.clone(),
            })?;
        command.set(*argument, token);
        n_positional += 1;
    }

    Ok(command)
}

fn parse_uri(line: &str) -> Result<Command, ParseError> {
    let path_and_query = line.strip_prefix("/d/").unwrap_or(line.trim_start_matches('/'));
    let (path, query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, query),
        None => (path_and_query, ""),
    };
    let name = path.split('.').next().unwrap_or(path);
    if name.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut command = Command::new(name);
    for (argument, value) in url::form_urlencoded::parse(query.as_bytes()) {
        command.set(argument.into_owned(), value.into_owned());
    }
    Ok(command)
}

fn tokenize(line: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            break;
        };

        let mut token = String::new();
        if first == '"' || first == '\'' {
            chars.next();
            let mut terminated = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some(escaped) => token.push(unescape(escaped)),
                        None => break,
                    },
                    c if c == first => {
                        terminated = true;
                        break;
                    }
                    c => token.push(c),
                }
            }
            if !terminated {
                return Err(ParseError::UnterminatedQuote(line.to_string()));
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            token.push(unescape(escaped));
                        }
                    }
                    c => token.push(c),
                }
            }
        }
        tokens.push(token);
    }

    Ok(tokens)
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        c => c,
    }
}
