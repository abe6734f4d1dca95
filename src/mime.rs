//! Raw RFC 822 message decoding

use mailparse::{DispositionType, MailHeaderMap, ParsedMail};

use crate::error::{Result, WatchError};
use crate::models::{Message, MessageId};

/// Parse a raw message fetched from the mailbox.
///
/// Subject and sender are RFC 2047 decoded. The body is the first `text/plain`
/// part that decodes, falling back to the first decodable `text/html` part.
pub fn parse_message(id: MessageId, raw: &[u8]) -> Result<Message> {
    let parsed = mailparse::parse_mail(raw).map_err(|e| WatchError::Parse {
        id: id.to_string(),
        reason: e.to_string(),
    })?;

    let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();
    let sender = parsed.headers.get_first_value("From").unwrap_or_default();

    Ok(Message {
        id,
        subject,
        sender,
        body: extract_body(&parsed),
    })
}

fn extract_body(mail: &ParsedMail) -> String {
    if mail.subparts.is_empty() {
        return match mail.get_body() {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!("Body did not decode ({}), using raw payload", e);
                mail.get_body_raw()
                    .map(|raw| String::from_utf8_lossy(&raw).into_owned())
                    .unwrap_or_default()
            }
        };
    }

    first_text_part(mail, "text/plain")
        .or_else(|| first_text_part(mail, "text/html"))
        .unwrap_or_default()
}

/// Depth-first search for the first non-attachment part of `mimetype` that decodes
fn first_text_part(mail: &ParsedMail, mimetype: &str) -> Option<String> {
    for part in &mail.subparts {
        if part.get_content_disposition().disposition == DispositionType::Attachment {
            continue;
        }

        if !part.subparts.is_empty() {
            if let Some(body) = first_text_part(part, mimetype) {
                return Some(body);
            }
            continue;
        }

        if part.ctype.mimetype.eq_ignore_ascii_case(mimetype) {
            match part.get_body() {
                Ok(body) => return Some(body),
                Err(e) => tracing::debug!("Skipping undecodable {} part: {}", mimetype, e),
            }
        }
    }

    None
}
