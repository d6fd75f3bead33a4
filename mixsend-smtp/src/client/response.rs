//! SMTP reply parsing and representation.

use super::error::{ClientError, Result};

/// A single line of an SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    /// The SMTP status code (e.g., 220, 250, 550).
    pub code: u16,
    /// Whether this is the last line in a multi-line reply.
    pub is_last: bool,
    /// The text following the status code.
    pub message: String,
}

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The SMTP status code.
    pub code: u16,
    /// All text lines in the reply.
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// The reply text with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// 2xx
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, 200..=299)
    }

    /// 3xx, e.g. 354 after DATA or 334 during AUTH.
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        matches!(self.code, 300..=399)
    }

    /// 4xx
    #[must_use]
    pub const fn is_temporary_error(&self) -> bool {
        matches!(self.code, 400..=499)
    }

    /// 5xx
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        matches!(self.code, 500..=599)
    }

    /// Extension keywords advertised in an EHLO reply, upper-cased.
    ///
    /// The first line of an EHLO reply is the server's greeting and is not
    /// an extension.
    pub fn extensions(&self) -> impl Iterator<Item = String> + '_ {
        self.lines.iter().skip(1).filter_map(|line| {
            line.split_whitespace()
                .next()
                .map(str::to_ascii_uppercase)
        })
    }

    /// Whether an EHLO reply advertises `keyword`.
    #[must_use]
    pub fn has_extension(&self, keyword: &str) -> bool {
        self.extensions()
            .any(|extension| extension.eq_ignore_ascii_case(keyword))
    }

    /// Parses a single reply line, without its line terminator.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let code = line
            .get(..3)
            .filter(|code| code.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| ClientError::ParseError(format!("Invalid reply line: '{line}'")))?
            .parse::<u16>()
            .map_err(|_| ClientError::ParseError(format!("Invalid status code: '{line}'")))?;

        let is_last = match line.as_bytes().get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(&c) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{}'",
                    char::from(c)
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            message: line.get(4..).unwrap_or_default().to_string(),
        })
    }

    /// Parses a complete reply from the front of `buffer`.
    ///
    /// Returns the reply and the number of bytes consumed, or `None` when the
    /// buffer does not yet hold a complete reply.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the reply is malformed.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut lines = Vec::new();
        let mut consumed = 0;
        let mut first_code = None;

        while let Some(newline) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + newline];
            consumed += newline + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let parsed = Self::parse_line(std::str::from_utf8(raw)?)?;

            match first_code {
                Some(code) if code != parsed.code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line reply: expected {code}, got {}",
                        parsed.code
                    )));
                }
                Some(_) => {}
                None => first_code = Some(parsed.code),
            }

            lines.push(parsed.message);

            if parsed.is_last {
                return Ok(first_code.map(|code| (Self::new(code, lines), consumed)));
            }
        }

        Ok(None)
    }
}
