//! Request decoding/encoding and response envelopes for both transports.

use super::{Body, Method, Request, Response, Status, DEFAULT_PATH, MAX_PATH_LEN};
use crate::error::ProtocolError;

/// A decoded datagram: the sequence number always parsed, the request may not have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub seq: u32,
    pub request: Result<Request, ProtocolError>,
}

/// Strips one trailing line terminator (`\r\n` or `\n`).
fn strip_terminator(text: &str) -> &str {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.strip_suffix('\r').unwrap_or(text)
}

/// Parses `METHOD [SP PATH]` from text that carries no sequence number.
///
/// Spaces between method and path are skipped; the path itself runs to the
/// end of the line, trailing spaces included.
fn parse_method_and_path(text: &str) -> Result<Request, ProtocolError> {
    let text = text.trim_start_matches(' ');
    if text.is_empty() {
        return Err(ProtocolError::Empty);
    }

    let (name, rest) = text.split_once(' ').unwrap_or((text, ""));
    let method =
        Method::from_name(name).ok_or_else(|| ProtocolError::UnknownMethod(name.to_string()))?;

    let path = rest.trim_start_matches(' ');
    if path.len() > MAX_PATH_LEN {
        return Err(ProtocolError::PathTooLong(path.len()));
    }
    let path = if path.is_empty() { DEFAULT_PATH } else { path };

    Ok(Request::new(method, path))
}

/// Decodes one request line received on the stream transport.
///
/// The trailing terminator is optional; a line that is not UTF-8, names an
/// unknown method or carries an over-long argument is rejected.
pub fn decode_request(line: &[u8]) -> Result<Request, ProtocolError> {
    let text = std::str::from_utf8(line).map_err(|_| ProtocolError::NotUtf8)?;
    parse_method_and_path(strip_terminator(text))
}

/// Decodes one datagram: `SEQ SP METHOD [SP PATH]`.
///
/// Fails outright only when no positive sequence number can be read, since
/// without one no reply can be correlated by the client.
pub fn decode_datagram(payload: &[u8]) -> Result<Datagram, ProtocolError> {
    let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::NotUtf8)?;
    let text = strip_terminator(text).trim_start();

    let (seq_token, rest) = text.split_once(' ').unwrap_or((text, ""));
    let seq = seq_token
        .parse::<u32>()
        .ok()
        .filter(|seq| *seq != 0)
        .ok_or(ProtocolError::MissingSequence)?;

    let request = parse_method_and_path(rest).map(|req| req.with_seq(seq));
    Ok(Datagram { seq, request })
}

/// Encodes a request line, including the sequence prefix when present.
#[cfg(test)]
pub fn encode_request(request: &Request) -> String {
    match request.seq {
        Some(seq) => format!("{} {} {}\r\n", seq, request.method, request.path),
        None => format!("{} {}\r\n", request.method, request.path),
    }
}

/// Status line and `LENGTH` header that open every full stream response.
pub fn envelope_head(status: Status, body_len: usize) -> String {
    format!(
        "{} {}\r\nLENGTH: {}\r\n\r\n",
        status.code(),
        status.text(),
        body_len
    )
}

/// Status line only, used when no request could be decoded.
pub fn minimal_reply(status: Status) -> String {
    format!("{} {}\r\n", status.code(), status.text())
}

/// Minimal datagram reply for payloads without a usable sequence number.
pub fn minimal_datagram_reply(status: Status) -> String {
    format!("0 {} {}\r\n", status.code(), status.text())
}

/// Frames a response as a single datagram of at most `limit` bytes.
///
/// Listing bodies are cut at the last whole line that fits; messages are cut at
/// the last character boundary that fits.
pub fn encode_datagram_reply(seq: u32, response: &Response, limit: usize) -> Vec<u8> {
    let mut frame = format!(
        "{} {} {}\r\n",
        seq,
        response.status.code(),
        response.status.text()
    );

    match &response.body {
        Body::Empty => {}
        Body::Message(msg) if msg.is_empty() => {}
        Body::Message(msg) => {
            frame.push_str("\r\n");
            for ch in msg.chars() {
                if frame.len() + ch.len_utf8() > limit {
                    tracing::debug!(seq, limit, "datagram message truncated");
                    break;
                }
                frame.push(ch);
            }
        }
        Body::Lines(lines) => {
            frame.push_str("\r\n");
            for (idx, line) in lines.iter().enumerate() {
                if frame.len() + line.len() > limit {
                    tracing::info!(
                        seq,
                        limit,
                        dropped = lines.len() - idx,
                        "datagram listing truncated"
                    );
                    break;
                }
                frame.push_str(line);
            }
        }
    }

    let mut bytes = frame.into_bytes();
    bytes.truncate(limit);
    bytes
}

/// Parses a response status line: `[SEQ SP] CODE SP TEXT`.
///
/// Returns the sequence number (if the line carried one) and the status.
#[cfg(test)]
pub fn parse_status_line(line: &str) -> Option<(Option<u32>, Status)> {
    let (first, rest) = strip_terminator(line).split_once(' ')?;

    if let Some(status) = Status::from_code(first) {
        if rest == status.text() {
            return Some((None, status));
        }
    }

    let seq = first.parse::<u32>().ok()?;
    let (code, text) = rest.split_once(' ')?;
    let status = Status::from_code(code)?;
    (text == status.text()).then_some((Some(seq), status))
}

/// Parses a `LENGTH: n` header line.
#[cfg(test)]
pub fn parse_length_header(line: &str) -> Option<usize> {
    strip_terminator(line)
        .strip_prefix("LENGTH:")?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
#[path = "../tests/codec_tests.rs"]
mod tests;
