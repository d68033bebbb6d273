use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use time::OffsetDateTime;

/// A message accepted by the local listener or built for an alert.
///
/// Immutable once created; the relay client consumes it by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    from: String,
    to: Vec<String>,
    subject: String,
    body: String,
    created_at: OffsetDateTime,
}

impl MailMessage {
    pub fn new(
        from: impl Into<String>,
        to: Vec<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to,
            subject: subject.into(),
            body: body.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Builds a message from the envelope and the raw `DATA` block of a session.
    pub fn from_data(from: impl Into<String>, to: Vec<String>, data: &str) -> Self {
        let (subject, body) = parse_data(data);
        Self::new(from, to, subject, body)
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &[String] {
        &self.to
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }
}

/// Splits a raw message into its decoded `Subject` header and body.
///
/// Header names match case-insensitively and folded continuation lines are
/// joined. RFC 2047 encoded words in the subject are decoded, and the body is
/// decoded according to its `Content-Transfer-Encoding`. The body is
/// everything after the first empty line, trimmed. A block without an empty
/// line has no body.
pub fn parse_data(data: &str) -> (String, String) {
    let data = data.replace("\r\n", "\n");
    let (headers, body) = match data.split_once("\n\n") {
        Some((headers, body)) => (headers, body),
        None => (data.as_str(), ""),
    };
    let headers = unfold_headers(headers);

    let subject = header(&headers, "subject")
        .map(decode_encoded_words)
        .unwrap_or_default();
    let body = match header(&headers, "content-transfer-encoding") {
        Some(enc) if enc.eq_ignore_ascii_case("base64") => {
            let compact: String = body.split_whitespace().collect();
            match STANDARD.decode(compact) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(_) => body.to_string(),
            }
        }
        Some(enc) if enc.eq_ignore_ascii_case("quoted-printable") => {
            String::from_utf8_lossy(&decode_quoted(body.as_bytes())).into_owned()
        }
        _ => body.to_string(),
    };

    (subject, body.replace("\r\n", "\n").trim().to_string())
}

fn unfold_headers(block: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in block.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
        } else if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }
    headers
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

/// Decodes `=?charset?B|Q?text?=` words. Whitespace between two adjacent
/// encoded words is dropped; anything malformed is kept as-is.
fn decode_encoded_words(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        match decode_word(candidate) {
            Some((text, used)) => {
                if !(after_word && before.trim().is_empty()) {
                    out.push_str(before);
                }
                out.push_str(&text);
                rest = &candidate[used..];
                after_word = true;
            }
            None => {
                out.push_str(before);
                out.push_str("=?");
                rest = &candidate[2..];
                after_word = false;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decodes one encoded word at the start of `s`, returning the text and the
/// number of bytes consumed.
fn decode_word(s: &str) -> Option<(String, usize)> {
    let inner = s.strip_prefix("=?")?;
    let (charset, inner) = inner.split_once('?')?;
    let (encoding, inner) = inner.split_once('?')?;
    let end = inner.find("?=")?;
    let text = &inner[..end];
    let used = s.len() - inner[end + 2..].len();
    if text.contains(char::is_whitespace) {
        return None;
    }

    let charset = charset.split('*').next().unwrap_or_default();
    if !(charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("us-ascii")) {
        return None;
    }
    let bytes = match encoding {
        "B" | "b" => STANDARD.decode(text).ok()?,
        "Q" | "q" => decode_quoted(text.replace('_', " ").as_bytes()),
        _ => return None,
    };
    Some((String::from_utf8(bytes).ok()?, used))
}

/// Quoted-printable decoding: `=XX` escapes and soft line breaks.
fn decode_quoted(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] != b'=' {
            out.push(input[i]);
            i += 1;
            continue;
        }
        let rest = &input[i + 1..];
        if rest.starts_with(b"\r\n") {
            i += 3;
        } else if rest.starts_with(b"\n") {
            i += 2;
        } else if let Some(byte) = rest
            .get(..2)
            .and_then(|h| std::str::from_utf8(h).ok())
            .and_then(|h| u8::from_str_radix(h, 16).ok())
        {
            out.push(byte);
            i += 3;
        } else {
            out.push(b'=');
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_and_body_are_extracted() {
        let raw = "From: a@b\r\nsubject: Server down\r\nTo: c@d\r\n\r\n\r\nLine one\r\nLine two\r\n\r\n";
        let (subject, body) = parse_data(raw);
        assert_eq!(subject, "Server down");
        assert_eq!(body, "Line one\nLine two");
    }

    #[test]
    fn folded_subject_is_unfolded() {
        let raw = "Subject: a very\r\n  long subject\r\nFrom: x@y\r\n\r\nbody";
        assert_eq!(parse_data(raw).0, "a very long subject");
    }

    #[test]
    fn encoded_subject_words_are_decoded() {
        let raw = "Subject: ALERT: Serveur =?utf-8?b?w6k=?= is DOWN\r\n\r\nbody";
        assert_eq!(parse_data(raw).0, "ALERT: Serveur \u{e9} is DOWN");

        let raw = "Subject: =?UTF-8?Q?caf=C3=A9?=\r\n =?utf-8?b?IG91dmVydA==?=\r\n\r\n";
        assert_eq!(parse_data(raw).0, "caf\u{e9} ouvert");

        let raw = "Subject: =?bogus\r\n\r\n";
        assert_eq!(parse_data(raw).0, "=?bogus");
    }

    #[test]
    fn transfer_encoded_bodies_are_decoded() {
        let raw = "Subject: s\r\nContent-Transfer-Encoding: quoted-printable\r\n\r\nServer 'Serveur =C3=A9' is=\r\n now DOWN.\r\n";
        assert_eq!(parse_data(raw).1, "Server 'Serveur \u{e9}' is now DOWN.");

        let raw = "Content-Transfer-Encoding: base64\r\n\r\nU2VydmV1ciDDqQ==\r\n";
        assert_eq!(parse_data(raw).1, "Serveur \u{e9}");

        let raw = "Content-Transfer-Encoding: 8bit\r\n\r\nServeur \u{e9}\r\n";
        assert_eq!(parse_data(raw).1, "Serveur \u{e9}");
    }

    #[test]
    fn missing_parts_are_empty() {
        assert_eq!(parse_data("From: x@y"), (String::new(), String::new()));
    }

    #[test]
    fn message_keeps_its_envelope() {
        let msg = MailMessage::from_data(
            "alert@local",
            vec!["ops@example.org".to_string()],
            "Subject: hi\r\n\r\nhello",
        );
        assert_eq!(msg.from(), "alert@local");
        assert_eq!(msg.to(), ["ops@example.org".to_string()]);
        assert_eq!(msg.subject(), "hi");
        assert_eq!(msg.body(), "hello");
    }
}
