// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Canonical content hashing — SHA-256 digests over semantic message fields.
//
// The digest input is a domain-tagged, length-prefixed serialization of the
// fields a court cares about: sender, recipients, sent_at, subject, bodies,
// and the exact decoded bytes of each attachment. Parse-time artifacts
// (MIME boundaries, transfer encodings, header order, line endings) never
// reach the hasher, so re-parsing identical source bytes on a different
// machine or decoder yields identical digests — the property independent
// forensic re-verification depends on.

use std::borrow::Cow;

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use beweiswerk_core::{HashAlgorithm, MessageId};

/// Domain tag for message content digests.
const MESSAGE_DOMAIN: &str = "beweiswerk.message.v1";

/// Domain tag for derived message ids.
const MESSAGE_ID_DOMAIN: &str = "beweiswerk.message-id.v1";

/// Domain tag for body digests (feeds message-id derivation).
const BODY_DOMAIN: &str = "beweiswerk.body.v1";

/// Length of a derived message id in hex characters (128 bits).
const MESSAGE_ID_LEN: usize = 32;

/// Incremental hasher that feeds tagged, length-prefixed fields.
///
/// Length prefixes make the serialization injective: no combination of
/// field values can collide with a different combination by shifting bytes
/// across field boundaries.
pub struct FieldHasher {
    inner: Sha256,
}

impl FieldHasher {
    pub fn new(algorithm: HashAlgorithm, domain: &str) -> Self {
        // Single algorithm today; the match keeps migration explicit.
        match algorithm {
            HashAlgorithm::Sha256 => {}
        }
        let mut inner = Sha256::new();
        inner.update(domain.as_bytes());
        inner.update([0u8]);
        Self { inner }
    }

    /// Feed one field as (tag, length, bytes).
    pub fn field(&mut self, tag: &str, value: &[u8]) {
        self.inner.update(tag.as_bytes());
        self.inner.update([0u8]);
        self.inner.update((value.len() as u64).to_le_bytes());
        self.inner.update(value);
    }

    /// Finalize into a lowercase hex digest.
    pub fn finish(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// SHA-256 hex digest of raw bytes. Used for attachment payloads, which are
/// hashed exactly as decoded — no canonicalization of binary content.
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            hex::encode(hasher.finalize())
        }
    }
}

/// Borrowed view of the semantic fields that feed a message digest.
#[derive(Debug, Clone, Copy)]
pub struct MessageFields<'a> {
    pub sender: &'a str,
    pub recipients: &'a [String],
    pub sent_at: Option<DateTime<Utc>>,
    pub subject: &'a str,
    pub body_text: &'a str,
    pub body_html: Option<&'a str>,
    pub attachment_hashes: &'a [String],
}

/// Normalize line endings so that CRLF/LF differences introduced by
/// re-serialization do not change the digest.
fn canonical_text(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Canonical timestamp field: RFC 3339 UTC at whole-second precision, or
/// the empty string for messages flagged timestamp-unreliable.
fn timestamp_field(sent_at: Option<DateTime<Utc>>) -> String {
    sent_at
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Digest over the message bodies alone. Feeds message-id derivation.
pub fn body_digest(algorithm: HashAlgorithm, body_text: &str, body_html: Option<&str>) -> String {
    let mut hasher = FieldHasher::new(algorithm, BODY_DOMAIN);
    hasher.field("body_text", canonical_text(body_text).as_bytes());
    hasher.field(
        "body_html",
        canonical_text(body_html.unwrap_or_default()).as_bytes(),
    );
    hasher.finish()
}

/// Content hash of a full normalized message.
///
/// Pure function of the semantic fields; the attachment digests are bound
/// in attachment order, so reordering attachments changes the hash.
pub fn content_hash(algorithm: HashAlgorithm, fields: &MessageFields<'_>) -> String {
    let mut hasher = FieldHasher::new(algorithm, MESSAGE_DOMAIN);
    hasher.field("sender", fields.sender.as_bytes());
    hasher.field(
        "recipient_count",
        &(fields.recipients.len() as u64).to_le_bytes(),
    );
    for recipient in fields.recipients {
        hasher.field("recipient", recipient.as_bytes());
    }
    hasher.field("sent_at", timestamp_field(fields.sent_at).as_bytes());
    hasher.field("subject", fields.subject.as_bytes());
    hasher.field("body_text", canonical_text(fields.body_text).as_bytes());
    hasher.field(
        "body_html",
        canonical_text(fields.body_html.unwrap_or_default()).as_bytes(),
    );
    hasher.field(
        "attachment_count",
        &(fields.attachment_hashes.len() as u64).to_le_bytes(),
    );
    for attachment_hash in fields.attachment_hashes {
        hasher.field("attachment", attachment_hash.as_bytes());
    }
    hasher.finish()
}

/// Derive the stable message id from (sender, sent_at, subject, body digest).
///
/// Deliberately independent of the `Message-ID` header: clients forge,
/// duplicate, or omit that header, while this id reproduces from content.
pub fn derive_message_id(algorithm: HashAlgorithm, fields: &MessageFields<'_>) -> MessageId {
    let body = body_digest(algorithm, fields.body_text, fields.body_html);
    let mut hasher = FieldHasher::new(algorithm, MESSAGE_ID_DOMAIN);
    hasher.field("sender", fields.sender.as_bytes());
    hasher.field("sent_at", timestamp_field(fields.sent_at).as_bytes());
    hasher.field("subject", fields.subject.as_bytes());
    hasher.field("body", body.as_bytes());
    let digest = hasher.finish();
    MessageId(digest[..MESSAGE_ID_LEN].to_owned())
}
