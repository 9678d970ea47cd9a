//! Canonical ballot encoding.
//!
//! A ballot is committed as the JSON object
//! `{"ballotId", "pollId", "payload", "timestamp"}` with the fields in that
//! order.  The payload is first lowered into a [`serde_json::Value`], which
//! stores objects with sorted keys, so two callers holding the same logical
//! payload produce byte-identical encodings regardless of the map type they
//! built it with.
//!
//! The submission timestamp is part of the committed bytes: the same payload
//! submitted at two different instants yields two different leaf digests.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::AuditResult;
use crate::hash::{hash, Digest};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BallotEnvelope<'a> {
    ballot_id: &'a str,
    poll_id: &'a str,
    payload: serde_json::Value,
    timestamp: String,
}

/// Renders a timestamp the way it is committed inside a ballot encoding.
pub fn canonical_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serializes a ballot tuple into its canonical byte form.
///
/// Fails only when the payload cannot be represented as JSON (for example a
/// map keyed by something other than strings).
pub fn encode_ballot<P>(
    ballot_id: &str,
    poll_id: &str,
    payload: &P,
    timestamp: &DateTime<Utc>,
) -> AuditResult<Vec<u8>>
where
    P: Serialize + ?Sized,
{
    let envelope = BallotEnvelope {
        ballot_id,
        poll_id,
        payload: serde_json::to_value(payload)?,
        timestamp: canonical_timestamp(timestamp),
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Encodes and hashes a ballot, producing its leaf digest.
pub fn leaf_digest<P>(
    ballot_id: &str,
    poll_id: &str,
    payload: &P,
    timestamp: &DateTime<Utc>,
) -> AuditResult<Digest>
where
    P: Serialize + ?Sized,
{
    let bytes = encode_ballot(ballot_id, poll_id, payload, timestamp)?;
    Ok(hash(&bytes))
}
