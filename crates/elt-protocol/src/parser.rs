use crate::message::Message;

/// Parse a single non-empty line into a [`Message`].
///
/// Per §4.1 "Parsing rule", a malformed line must be logged and skipped
/// rather than aborting the stream — callers use [`parse_lines`] (or the
/// connector executor's line-at-a-time reader) to get that behavior; this
/// function itself just reports success or failure for one line.
pub fn parse_line(line: &str) -> Result<Message, serde_json::Error> {
    serde_json::from_str(line)
}

/// Outcome of parsing one line: either a message, or a note that the line
/// was malformed and skipped.
#[derive(Debug)]
pub enum ParsedLine {
    Message(Message),
    Malformed { line: String, error: String },
}

/// Parse every non-empty line in `text`, preserving order and never
/// aborting on a malformed line (§4.1, §8 "Protocol round-trip").
pub fn parse_lines(text: &str) -> Vec<ParsedLine> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| match parse_line(line) {
            Ok(msg) => ParsedLine::Message(msg),
            Err(err) => {
                tracing::warn!(line, error = %err, "skipping malformed connector message");
                ParsedLine::Malformed {
                    line: line.to_string(),
                    error: err.to_string(),
                }
            }
        })
        .collect()
}

/// Serialize a message as a single NDJSON line (no trailing newline).
pub fn write_line(message: &Message) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{LogLevel, LogPayload};

    #[test]
    fn malformed_line_does_not_abort_valid_ones() {
        let text = "{\"type\":\"LOG\",\"level\":\"INFO\",\"message\":\"hi\"}\nnot json\n{\"type\":\"LOG\",\"level\":\"WARN\",\"message\":\"bye\"}";
        let parsed = parse_lines(text);
        assert_eq!(parsed.len(), 3);
        assert!(matches!(parsed[0], ParsedLine::Message(_)));
        assert!(matches!(parsed[1], ParsedLine::Malformed { .. }));
        assert!(matches!(parsed[2], ParsedLine::Message(_)));
    }

    #[test]
    fn blank_lines_are_skipped_entirely() {
        let text = "\n\n{\"type\":\"LOG\",\"level\":\"INFO\",\"message\":\"hi\"}\n\n";
        assert_eq!(parse_lines(text).len(), 1);
    }

    #[test]
    fn write_then_parse_round_trips() {
        let msg = crate::message::Message::Log(LogPayload {
            level: LogLevel::Debug,
            message: "x".into(),
        });
        let line = write_line(&msg).unwrap();
        let parsed = parse_line(&line).unwrap();
        assert!(matches!(parsed, crate::message::Message::Log(_)));
    }
}
