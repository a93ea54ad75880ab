//! Wire format spoken over the daemon socket.
//!
//! One request per connection: ASCII fields joined by the unit separator
//! (0x1F). The peer half-closes after writing; the daemon answers with a
//! text payload and closes.
//!
//! ```text
//! SUGGEST <US> query <US> scope <US> context <US> success(0|1) [<US> terminal_width]
//! RECORD  <US> cmd <US> session <US> cwd <US> exit_code <US> duration_ms
//! ```

use memchr::memchr_iter;
use thiserror::Error;

use crate::storage::SearchScope;

/// Field separator (ASCII unit separator).
pub const DELIMITER: u8 = 0x1F;

/// Reply to an accepted RECORD.
pub const OK: &str = "OK";
/// Reply to a RECORD dropped because the write queue is full.
pub const BUSY: &str = "BUSY";
/// Reply to a request the daemon could not serve.
pub const ERR: &str = "ERR";

/// BRANCH scope could not resolve a branch; the client shows nothing.
pub const SKIP_SENTINEL: &str = "##SKIP##";
/// Prefix of the line naming the branch a BRANCH query resolved to.
pub const BRANCH_PREFIX: &str = "##BRANCH##";
/// The search itself failed.
pub const ERROR_SENTINEL: &str = "##ERR##";
/// Separates raw result lines from the boxed rendering.
pub const BOX_SENTINEL: &str = "##BOX##";

const SUGGEST: &str = "SUGGEST";
const RECORD: &str = "RECORD";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,

    #[error("message is not valid UTF-8")]
    InvalidUtf8,

    #[error("message exceeds {0} bytes")]
    TooLarge(usize),

    #[error("unknown message kind: {0:?}")]
    UnknownKind(String),

    #[error("{kind} expects {expected} fields, got {actual}")]
    FieldCount {
        kind: &'static str,
        expected: &'static str,
        actual: usize,
    },

    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("field {0} contains a reserved control byte")]
    ReservedByte(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestRequest {
    pub query: String,
    pub scope: SearchScope,
    /// Directory for `dir` and `branch` scopes; ignored for `global`.
    pub context: String,
    pub only_success: bool,
    pub terminal_width: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRequest {
    pub command: String,
    pub session_id: String,
    pub cwd: String,
    pub exit_code: i32,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Suggest(SuggestRequest),
    Record(RecordRequest),
}

impl Request {
    /// Serialize for the socket. Fails if a field contains the delimiter or NUL.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let fields: Vec<(&'static str, String)> = match self {
            Self::Suggest(req) => {
                let mut fields = vec![
                    ("kind", SUGGEST.to_string()),
                    ("query", req.query.clone()),
                    ("scope", req.scope.as_str().to_string()),
                    ("context", req.context.clone()),
                    ("success", if req.only_success { "1" } else { "0" }.to_string()),
                ];
                if let Some(width) = req.terminal_width {
                    fields.push(("terminal_width", width.to_string()));
                }
                fields
            }
            Self::Record(req) => vec![
                ("kind", RECORD.to_string()),
                ("cmd", req.command.clone()),
                ("session", req.session_id.clone()),
                ("cwd", req.cwd.clone()),
                ("exit_code", req.exit_code.to_string()),
                ("duration_ms", req.duration_ms.to_string()),
            ],
        };

        let mut out = Vec::with_capacity(fields.iter().map(|(_, v)| v.len() + 1).sum());
        for (i, (name, value)) in fields.iter().enumerate() {
            if value.bytes().any(|b| b == DELIMITER || b == 0) {
                return Err(ProtocolError::ReservedByte(name));
            }
            if i > 0 {
                out.push(DELIMITER);
            }
            out.extend_from_slice(value.as_bytes());
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.is_empty() {
            return Err(ProtocolError::Empty);
        }
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
        let fields = split_fields(text);

        match fields[0] {
            SUGGEST => decode_suggest(&fields),
            RECORD => decode_record(&fields),
            other => Err(ProtocolError::UnknownKind(other.to_string())),
        }
    }
}

fn split_fields(text: &str) -> Vec<&str> {
    let mut fields = Vec::with_capacity(6);
    let mut start = 0;
    for pos in memchr_iter(DELIMITER, text.as_bytes()) {
        fields.push(&text[start..pos]);
        start = pos + 1;
    }
    fields.push(&text[start..]);
    fields
}

fn decode_suggest(fields: &[&str]) -> Result<Request, ProtocolError> {
    if !(5..=6).contains(&fields.len()) {
        return Err(ProtocolError::FieldCount {
            kind: SUGGEST,
            expected: "5 or 6",
            actual: fields.len(),
        });
    }

    let scope = SearchScope::parse(fields[2]).ok_or_else(|| ProtocolError::InvalidField {
        field: "scope",
        value: fields[2].to_string(),
    })?;
    let only_success = match fields[4] {
        "1" => true,
        "0" | "" => false,
        other => {
            return Err(ProtocolError::InvalidField {
                field: "success",
                value: other.to_string(),
            });
        }
    };
    let terminal_width = match fields.get(5).map(|w| w.trim()) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<u16>().map_err(|_| ProtocolError::InvalidField {
            field: "terminal_width",
            value: raw.to_string(),
        })?),
    };

    Ok(Request::Suggest(SuggestRequest {
        query: fields[1].to_string(),
        scope,
        context: fields[3].to_string(),
        only_success,
        terminal_width,
    }))
}

fn decode_record(fields: &[&str]) -> Result<Request, ProtocolError> {
    if fields.len() != 6 {
        return Err(ProtocolError::FieldCount {
            kind: RECORD,
            expected: "6",
            actual: fields.len(),
        });
    }

    Ok(Request::Record(RecordRequest {
        command: fields[1].to_string(),
        session_id: fields[2].to_string(),
        cwd: fields[3].to_string(),
        exit_code: parse_number("exit_code", fields[4])?,
        duration_ms: parse_number("duration_ms", fields[5])?,
    }))
}

/// Empty means zero.
fn parse_number<T>(field: &'static str, raw: &str) -> Result<T, ProtocolError>
where
    T: std::str::FromStr + Default,
{
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(T::default());
    }
    raw.parse().map_err(|_| ProtocolError::InvalidField {
        field,
        value: raw.to_string(),
    })
}

/// Render a command as one response line.
///
/// Backslashes double, line breaks become `\n` / `\r`, and a leading `##`
/// gets a `\` in front so it never reads as an out-of-band line. Undoing
/// the escapes gives back the exact command.
pub fn escape_line(command: &str) -> String {
    let mut line = String::with_capacity(command.len() + 1);
    if command.starts_with("##") {
        line.push('\\');
    }
    for ch in command.chars() {
        match ch {
            '\\' => line.push_str("\\\\"),
            '\n' => line.push_str("\\n"),
            '\r' => line.push_str("\\r"),
            other => line.push(other),
        }
    }
    line
}
