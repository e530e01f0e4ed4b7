use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::timestamp::{parse_utc_datetime, InvalidTimestamp};

/// The minimal reference to a kill carried by a queue event: enough to fetch the authoritative
/// killmail, plus the valuation computed by the queue service.
#[derive(Debug, Clone, PartialEq)]
pub struct KillReference {
    pub killmail_id: i64,
    pub hash: String,
    pub destroyed_value: f64,
    pub dropped_value: f64,
    pub fitted_value: f64,
    pub total_value: f64,
}

impl KillReference {
    /// A reference with all values defaulted to zero.
    pub fn new(killmail_id: i64, hash: &str) -> Self {
        Self {
            killmail_id,
            hash: hash.to_owned(),
            destroyed_value: 0.0,
            dropped_value: 0.0,
            fitted_value: 0.0,
            total_value: 0.0,
        }
    }
}

/// A killmail ready to be stored: authoritative location, time and ships,
/// plus the values carried over from the `KillReference`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedKillmail {
    pub killmail_id: i64,
    pub hash: String,
    pub solar_system_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub victim_ship_id: i64,
    /// Zero when no attacker carried the final blow or its ship is unknown.
    pub killer_ship_id: i64,
    pub destroyed_value: f64,
    pub dropped_value: f64,
    pub fitted_value: f64,
    pub total_value: f64,
}

/// Errors found while validating an authoritative killmail document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("authoritative killmail is missing {0}")]
    MissingField(&'static str),
    #[error("authoritative killmail has an invalid killmail_time: {0}")]
    InvalidTime(#[from] InvalidTimestamp),
}

/// The subset of the authoritative killmail document we consume.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KillmailDocument {
    pub killmail_time: Option<String>,
    pub solar_system_id: Option<i64>,
    pub victim: Option<Victim>,
    pub attackers: Option<Vec<Attacker>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Victim {
    pub ship_type_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attacker {
    pub final_blow: Option<bool>,
    pub ship_type_id: Option<i64>,
}

impl KillmailDocument {
    /// Ship of the first attacker flagged with the final blow. Later flagged attackers are
    /// ignored, and a flagged attacker without a ship yields 0 rather than moving on.
    pub fn final_blow_ship(&self) -> i64 {
        self.attackers
            .iter()
            .flatten()
            .find(|attacker| attacker.final_blow.unwrap_or(false))
            .and_then(|attacker| attacker.ship_type_id)
            .unwrap_or(0)
    }

    /// Validate this document and merge it with the reference it was fetched for.
    ///
    /// Time, solar system and victim ship are required and checked before the time is parsed.
    /// The killer ship is optional.
    pub fn into_killmail(self, reference: KillReference) -> Result<EnrichedKillmail, DocumentError> {
        let killer_ship_id = self.final_blow_ship();

        let killmail_time = self
            .killmail_time
            .filter(|time| !time.is_empty())
            .ok_or(DocumentError::MissingField("killmail_time"))?;
        let solar_system_id = self
            .solar_system_id
            .filter(|id| *id > 0)
            .ok_or(DocumentError::MissingField("solar_system_id"))?;
        let victim_ship_id = self
            .victim
            .and_then(|victim| victim.ship_type_id)
            .filter(|id| *id > 0)
            .ok_or(DocumentError::MissingField("victim.ship_type_id"))?;

        let occurred_at = parse_utc_datetime(&killmail_time)?;

        Ok(EnrichedKillmail {
            killmail_id: reference.killmail_id,
            hash: reference.hash,
            solar_system_id,
            occurred_at,
            victim_ship_id,
            killer_ship_id,
            destroyed_value: reference.destroyed_value,
            dropped_value: reference.dropped_value,
            fitted_value: reference.fitted_value,
            total_value: reference.total_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn document(json: &str) -> KillmailDocument {
        serde_json::from_str(json).expect("failed to decode test document")
    }

    #[test]
    fn test_into_killmail() {
        let doc = document(
            r#"{
                "killmail_id": 123,
                "killmail_time": "2024-01-01T00:00:00Z",
                "solar_system_id": 30000142,
                "victim": {"ship_type_id": 587, "character_id": 1},
                "attackers": [
                    {"final_blow": false, "ship_type_id": 11},
                    {"final_blow": true, "ship_type_id": 22, "damage_done": 100}
                ]
            }"#,
        );
        let mut reference = KillReference::new(123, "abc");
        reference.total_value = 1000.0;

        let killmail = doc.into_killmail(reference).unwrap();

        assert_eq!(killmail.killmail_id, 123);
        assert_eq!(killmail.hash, "abc");
        assert_eq!(killmail.solar_system_id, 30000142);
        assert_eq!(
            killmail.occurred_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(killmail.victim_ship_id, 587);
        assert_eq!(killmail.killer_ship_id, 22);
        assert_eq!(killmail.total_value, 1000.0);
        assert_eq!(killmail.destroyed_value, 0.0);
    }

    #[test]
    fn test_first_final_blow_wins() {
        let doc = document(
            r#"{"attackers": [
                {"final_blow": true, "ship_type_id": 1},
                {"final_blow": true, "ship_type_id": 2}
            ]}"#,
        );

        assert_eq!(doc.final_blow_ship(), 1);
    }

    #[test]
    fn test_final_blow_without_ship_stops_the_scan() {
        let doc = document(
            r#"{"attackers": [
                {"final_blow": true},
                {"final_blow": true, "ship_type_id": 2}
            ]}"#,
        );

        assert_eq!(doc.final_blow_ship(), 0);
    }

    #[test]
    fn test_missing_killer_is_not_an_error() {
        let doc = document(
            r#"{
                "killmail_time": "2024-01-01T00:00:00Z",
                "solar_system_id": 30000142,
                "victim": {"ship_type_id": 587},
                "attackers": [{"final_blow": false, "ship_type_id": 11}, {"ship_type_id": 12}]
            }"#,
        );

        let killmail = doc.into_killmail(KillReference::new(1, "abc")).unwrap();

        assert_eq!(killmail.victim_ship_id, 587);
        assert_eq!(killmail.killer_ship_id, 0);
    }

    #[test]
    fn test_required_fields() {
        let cases = [
            (
                r#"{"solar_system_id": 1, "victim": {"ship_type_id": 587}}"#,
                "killmail_time",
            ),
            (
                r#"{"killmail_time": "", "solar_system_id": 1, "victim": {"ship_type_id": 587}}"#,
                "killmail_time",
            ),
            (
                r#"{"killmail_time": "2024-01-01T00:00:00Z", "solar_system_id": 0, "victim": {"ship_type_id": 587}}"#,
                "solar_system_id",
            ),
            (
                r#"{"killmail_time": "2024-01-01T00:00:00Z", "solar_system_id": 1}"#,
                "victim.ship_type_id",
            ),
            (
                r#"{"killmail_time": "2024-01-01T00:00:00Z", "solar_system_id": 1, "victim": {"ship_type_id": null}}"#,
                "victim.ship_type_id",
            ),
        ];

        for (json, field) in cases {
            assert_eq!(
                document(json).into_killmail(KillReference::new(1, "abc")),
                Err(DocumentError::MissingField(field)),
                "{json}"
            );
        }
    }

    #[test]
    fn test_invalid_time() {
        let doc = document(
            r#"{"killmail_time": "2024-01-01T00:00:00.5Z", "solar_system_id": 1, "victim": {"ship_type_id": 587}}"#,
        );

        assert_eq!(
            doc.into_killmail(KillReference::new(1, "abc")),
            Err(DocumentError::InvalidTime(InvalidTimestamp(
                "2024-01-01T00:00:00.5Z".to_owned()
            )))
        );
    }
}
