// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Message normalization — one raw mail unit in, one canonical record out.
//
// `mail-parser` does the heavy lifting (RFC 2047 header charsets, multipart
// trees, transfer decoding); this module reduces its output to the
// client-independent form the evidence pipeline hashes: one text body, an
// optional HTML body, and attachments in source order. Archives routinely
// mix encodings across messages, so every unit is decoded on its own.

use chrono::{DateTime, Utc};
use mail_parser::{Addr, HeaderValue, MessageParser, MimeHeaders};

use beweiswerk_core::{
    AttachmentRef, HashAlgorithm, NormalizedMessage, ParseFailure, ParseFailureKind, RawMailUnit,
};

use crate::hash;

/// Subject recorded when a message carries none.
const MISSING_SUBJECT: &str = "(제목없음)";

/// Normalize one raw unit into a [`NormalizedMessage`].
///
/// Returns a [`ParseFailure`] for units that are not recognizable mail;
/// callers skip the unit and continue the stream. A missing or unparsable
/// Date header is not a failure: the message is kept with `sent_at: None`
/// and flagged `timestamp_unreliable`.
pub fn normalize(
    unit: &RawMailUnit,
    algorithm: HashAlgorithm,
) -> Result<NormalizedMessage, ParseFailure> {
    let message = MessageParser::default()
        .parse(&unit.bytes)
        .ok_or_else(|| syntax_failure(unit, "not parseable as an RFC 5322 message"))?;

    // mail-parser accepts almost anything; a unit with none of the headers
    // that identify a mail message is resync garbage, not evidence.
    if message.from().is_none() && message.subject().is_none() && message.date().is_none() {
        return Err(syntax_failure(unit, "no recognizable message headers"));
    }

    let sender = message
        .from()
        .and_then(|addresses| addresses.iter().next())
        .and_then(format_addr)
        .unwrap_or_default();

    let mut recipients = Vec::new();
    collect_addresses(message.to(), &mut recipients);
    collect_addresses(message.cc(), &mut recipients);

    let sent_at = message
        .date()
        .and_then(|date| DateTime::<Utc>::from_timestamp(date.to_timestamp(), 0));
    let timestamp_unreliable = sent_at.is_none();

    let subject = message.subject().unwrap_or(MISSING_SUBJECT).to_owned();

    let body_text = message
        .body_text(0)
        .map(|text| text.into_owned())
        .unwrap_or_default();
    let body_html = if message.html_body.is_empty() {
        None
    } else {
        message.body_html(0).map(|html| html.into_owned())
    };

    let mut attachments = Vec::new();
    for (index, part) in message.attachments().enumerate() {
        let data = part.contents();
        let filename = part
            .attachment_name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("attachment-{}", index + 1));
        let mime_type = part
            .content_type()
            .map(|ct| match ct.subtype() {
                Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                None => ct.ctype().to_owned(),
            })
            .unwrap_or_else(|| {
                mime_guess::from_path(&filename)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_owned()
            });
        attachments.push(AttachmentRef {
            content_hash: hash::hash_bytes(algorithm, data),
            length: data.len() as u64,
            index: index as u32,
            filename,
            mime_type,
        });
    }
    let attachment_hashes: Vec<String> = attachments
        .iter()
        .map(|a| a.content_hash.clone())
        .collect();

    let header_message_id = message.message_id().map(str::to_owned);
    let in_reply_to = first_header_text(&message, "In-Reply-To");
    let references = header_id_list(&message, "References");

    let fields = hash::MessageFields {
        sender: &sender,
        recipients: &recipients,
        sent_at,
        subject: &subject,
        body_text: &body_text,
        body_html: body_html.as_deref(),
        attachment_hashes: &attachment_hashes,
    };
    let content_hash = hash::content_hash(algorithm, &fields);
    let message_id = hash::derive_message_id(algorithm, &fields);

    Ok(NormalizedMessage {
        message_id,
        subject,
        sender,
        recipients,
        sent_at,
        timestamp_unreliable,
        body_text,
        body_html,
        attachments,
        content_hash,
        header_message_id,
        in_reply_to,
        references,
        source_offset: unit.offset,
    })
}

fn syntax_failure(unit: &RawMailUnit, detail: &str) -> ParseFailure {
    ParseFailure {
        offset: unit.offset,
        length: unit.len(),
        kind: ParseFailureKind::Syntax,
        detail: detail.to_owned(),
    }
}

/// "Name <addr>" when a display name is present, bare address otherwise.
fn format_addr(addr: &Addr<'_>) -> Option<String> {
    let address = addr.address()?;
    match addr.name() {
        Some(name) if !name.is_empty() => Some(format!("{name} <{address}>")),
        _ => Some(address.to_owned()),
    }
}

/// Push lowercased addresses from a To/Cc header, source order preserved.
fn collect_addresses(list: Option<&mail_parser::Address<'_>>, out: &mut Vec<String>) {
    if let Some(addresses) = list {
        for addr in addresses.iter() {
            if let Some(address) = addr.address() {
                out.push(address.to_ascii_lowercase());
            }
        }
    }
}

/// First text value of a header, angle brackets trimmed.
fn first_header_text(message: &mail_parser::Message<'_>, name: &str) -> Option<String> {
    message
        .headers()
        .iter()
        .find(|header| header.name().eq_ignore_ascii_case(name))
        .and_then(|header| match header.value() {
            HeaderValue::Text(text) => Some(trim_message_id(text)),
            HeaderValue::TextList(list) => list.first().map(|text| trim_message_id(text)),
            _ => None,
        })
        .filter(|text| !text.is_empty())
}

/// All message ids carried by a References-style header.
fn header_id_list(message: &mail_parser::Message<'_>, name: &str) -> Vec<String> {
    message
        .headers()
        .iter()
        .find(|header| header.name().eq_ignore_ascii_case(name))
        .map(|header| match header.value() {
            HeaderValue::Text(text) => text
                .split_whitespace()
                .map(trim_message_id)
                .filter(|id| !id.is_empty())
                .collect(),
            HeaderValue::TextList(list) => list
                .iter()
                .map(|text| trim_message_id(text))
                .filter(|id| !id.is_empty())
                .collect(),
            _ => Vec::new(),
        })
        .unwrap_or_default()
}

fn trim_message_id(raw: &str) -> String {
    raw.trim().trim_matches(['<', '>']).trim().to_owned()
}
