//! Decoding of the raw event queue payloads.
//!
//! The queue delivers kills in one of two shapes:
//!
//! * Wrapped: `{"package": {"killID": 1, "zkb": {...}, ...}}`
//! * Flat: `{"killmail_id": 1, "zkb": {...}, ...}`
//!
//! A `package` object always wins; top-level fields are ignored when it is present.
//! Anything without a `zkb` block is not a kill and is skipped.
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::killmail::KillReference;

/// Reasons a payload does not produce a `KillReference`. None of them are fatal.
#[derive(Error, Debug)]
pub enum PayloadSkip {
    #[error("payload could not be decoded: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("payload carries no zkb block")]
    NotAKill,
    #[error("payload is missing its kill identity (killmail_id={killmail_id}, hash={hash:?})")]
    MissingIdentity { killmail_id: i64, hash: String },
}

impl PayloadSkip {
    /// Short label used in logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            PayloadSkip::Malformed(_) => "malformed",
            PayloadSkip::NotAKill => "not_a_kill",
            PayloadSkip::MissingIdentity { .. } => "missing_identity",
        }
    }
}

/// The valuation block attached to every kill by the queue service.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zkb {
    pub hash: Option<String>,
    pub destroyed_value: Option<f64>,
    pub dropped_value: Option<f64>,
    pub fitted_value: Option<f64>,
    pub total_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct WrappedPackage {
    #[serde(rename = "killID")]
    pub kill_id: Option<i64>,
    pub zkb: Option<Zkb>,
}

#[derive(Debug, Deserialize)]
pub struct FlatPayload {
    pub killmail_id: Option<i64>,
    pub zkb: Option<Zkb>,
}

#[derive(Debug)]
pub enum Envelope {
    Wrapped(WrappedPackage),
    Flat(FlatPayload),
}

impl Envelope {
    /// Pick the payload shape once and decode it.
    pub fn resolve(document: Value) -> Result<Self, PayloadSkip> {
        let Value::Object(mut fields) = document else {
            return Err(PayloadSkip::NotAKill);
        };

        match fields.remove("package") {
            Some(package @ Value::Object(_)) => {
                Ok(Envelope::Wrapped(serde_json::from_value(package)?))
            }
            _ => Ok(Envelope::Flat(serde_json::from_value(Value::Object(fields))?)),
        }
    }

    fn into_parts(self) -> (Option<i64>, Option<Zkb>) {
        match self {
            Envelope::Wrapped(package) => (package.kill_id, package.zkb),
            Envelope::Flat(payload) => (payload.killmail_id, payload.zkb),
        }
    }
}

/// Extract a `KillReference` from a raw queue body.
pub fn parse(body: &str) -> Result<KillReference, PayloadSkip> {
    let document: Value = serde_json::from_str(body)?;
    let (killmail_id, zkb) = Envelope::resolve(document)?.into_parts();

    let zkb = zkb.ok_or(PayloadSkip::NotAKill)?;
    let killmail_id = killmail_id.unwrap_or(0);
    let hash = zkb.hash.unwrap_or_default();

    if killmail_id <= 0 || hash.is_empty() {
        return Err(PayloadSkip::MissingIdentity { killmail_id, hash });
    }

    Ok(KillReference {
        killmail_id,
        hash,
        destroyed_value: zkb.destroyed_value.unwrap_or(0.0),
        dropped_value: zkb.dropped_value.unwrap_or(0.0),
        fitted_value: zkb.fitted_value.unwrap_or(0.0),
        total_value: zkb.total_value.unwrap_or(0.0),
    })
}
