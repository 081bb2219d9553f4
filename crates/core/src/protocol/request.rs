use crate::error::{ParseErrorKind, RtspError};

/// A parsed RTSP request (RFC 2326 §6).
///
/// RTSP requests follow HTTP/1.1 syntax:
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2. The body is only
/// present when the client sent `Content-Length`; the connection reads it
/// and attaches it with [`with_body`](Self::with_body).
#[derive(Debug)]
pub struct RtspRequest {
    /// RTSP method (OPTIONS, DESCRIBE, SETUP, PLAY, etc.).
    pub method: String,
    /// Request-URI (e.g. `rtsp://host:port/camera/track0`).
    pub uri: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    /// Headers as ordered (name, value) pairs. Names are stored as-received;
    /// lookups via [`get_header`](Self::get_header) are case-insensitive.
    pub headers: Vec<(String, String)>,
    /// Message body, empty when none was sent.
    pub body: String,
}

impl RtspRequest {
    /// Parse the request line and header block of an RTSP request.
    ///
    /// Parsing stops at the first blank line. Returns [`RtspError::Parse`]
    /// on malformed input.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let mut lines = raw.lines();

        let request_line = lines.next().ok_or(RtspError::Parse {
            kind: ParseErrorKind::EmptyRequest,
        })?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();

        if parts.len() != 3 {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidRequestLine,
            });
        }

        let method = parts[0].to_string();
        let uri = parts[1].to_string();
        let version = parts[2].to_string();

        if version != "RTSP/1.0" {
            tracing::warn!(version, "client sent non-RTSP/1.0 version");
        }

        let mut headers = Vec::new();

        for line in lines {
            if line.is_empty() {
                break;
            }

            let colon_pos = line.find(':').ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;

            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();

            headers.push((name, value));
        }

        Ok(RtspRequest {
            method,
            uri,
            version,
            headers,
            body: String::new(),
        })
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = body;
        self
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the CSeq header value, which numbers and orders RTSP
    /// request/response pairs (RFC 2326 §12.17).
    ///
    /// Only values that parse as an unsigned integer are returned.
    pub fn cseq(&self) -> Option<&str> {
        self.get_header("CSeq")
            .filter(|value| value.parse::<u32>().is_ok())
    }

    /// Declared body length (RFC 2326 §12.14). Absent means zero.
    pub fn content_length(&self) -> crate::error::Result<usize> {
        match self.get_header("Content-Length") {
            None => Ok(0),
            Some(value) => value.parse().map_err(|_| RtspError::Parse {
                kind: ParseErrorKind::InvalidContentLength,
            }),
        }
    }

    /// Find a `name: value` parameter line, first among the headers, then
    /// in the body (the text/parameters body of SET_PARAMETER, RFC 2326 §10.9).
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.get_header(name).or_else(|| {
            self.body.lines().find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case(name)
                    .then(|| value.trim())
            })
        })
    }
}
