use crate::config::RedisConfig;
use chrono::Utc;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Prefix of every public team identifier
const TEAM_ID_PREFIX: &str = "OW";

/// Lifecycle status assigned at creation; reserved for future states
const STATUS_REGISTERED: &str = "registered";

/// Counter key backing team id allocation
pub const COUNTER_KEY: &str = "team:counter";

/// Chronological list of all registered team ids
pub const ALL_REGISTRATIONS_KEY: &str = "registrations:all";

/// A persisted team registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// Public team identifier (OW_<N>)
    pub id: String,
    pub team_name: String,
    pub university: String,
    pub contact_email: String,
    /// Team roster, leader first
    #[serde(rename = "teamMembers")]
    pub members: Vec<TeamMember>,
    /// ISO-8601 creation timestamp, never mutated
    pub registration_date: String,
    pub status: String,
}

/// One member of a team roster, embedded in the registration record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub year_of_study: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ieee_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kaggle_id: Option<String>,
}

/// A validated registration payload, ready to persist
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub team_name: String,
    pub university: String,
    pub contact_email: String,
    pub members: Vec<TeamMember>,
}

/// Registration store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("registration {id} carries malformed member data: {source}")]
    Corrupt {
        id: String,
        source: serde_json::Error,
    },
}

/// Derive the public team id for a counter value
pub fn team_id_for(counter: u64) -> String {
    format!("{}_{}", TEAM_ID_PREFIX, counter)
}

fn registration_key(id: &str) -> String {
    format!("registration:{}", id)
}

fn university_key(name: &str) -> String {
    format!("university:{}", name)
}

fn email_key(address: &str) -> String {
    format!("email:{}", address)
}

fn member_email_key(address: &str) -> String {
    format!("member_email:{}", address)
}

/// Redis-backed registration store
///
/// Constructed once at startup and shared through the application state.
/// The connection manager handles reconnection and guarantees a single
/// in-flight connection attempt, so callers never coordinate connects
/// themselves.
pub struct RegistrationStore {
    conn: ConnectionManager,
    /// TTL applied to primary records; 0 disables expiry
    ttl_secs: u64,
}

impl RegistrationStore {
    /// Connect to Redis and build the store
    pub async fn connect(config: &RedisConfig, ttl_secs: u64) -> Result<Self, StoreError> {
        let manager_config = ConnectionManagerConfig::new()
            .set_number_of_retries(config.connect_retries)
            .set_connection_timeout(Duration::from_millis(config.connect_timeout_ms));

        let client = Client::open(config.connection_url())?;
        let conn = client
            .get_connection_manager_with_config(manager_config)
            .await?;

        info!(
            host = %config.host,
            ttl_secs = ttl_secs,
            "Connected to Redis registration store"
        );

        Ok(Self { conn, ttl_secs })
    }

    /// Liveness probe against the store
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Current counter value, 0 when unset
    pub async fn counter(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = conn.get(COUNTER_KEY).await?;
        Ok(value.unwrap_or(0))
    }

    /// Overwrite the counter (admin reset/set)
    ///
    /// Does not relabel already-issued ids; the registration path's
    /// exists-check disambiguates any resulting collision.
    pub async fn set_counter(&self, value: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(COUNTER_KEY, value).await?;
        Ok(())
    }

    /// Number of registrations in the chronological list
    pub async fn registration_count(&self) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let count: usize = conn.llen(ALL_REGISTRATIONS_KEY).await?;
        Ok(count)
    }

    /// Allocate a team id and persist a registration
    ///
    /// The counter increment is atomic in Redis, so concurrent callers can
    /// never observe the same value. The record and all secondary indexes
    /// are written in one MULTI/EXEC pipeline; a crash can at worst burn a
    /// counter value, never leave a half-indexed record.
    #[instrument(skip(self, submission), fields(team_name = %submission.team_name, university = %submission.university))]
    pub async fn create_registration(
        &self,
        submission: NewRegistration,
    ) -> Result<Registration, StoreError> {
        let mut conn = self.conn.clone();

        let counter: u64 = conn.incr(COUNTER_KEY, 1u64).await?;
        let mut id = team_id_for(counter);

        // Only reachable after an admin counter reset; never overwrite the
        // record that already owns this id.
        let taken: bool = conn.exists(registration_key(&id)).await?;
        if taken {
            let fallback = format!("{}_{}", id, Utc::now().timestamp_millis());
            warn!(
                id = %id,
                fallback = %fallback,
                "Team id already taken, falling back to timestamp suffix"
            );
            id = fallback;
        }

        let registration = Registration {
            id,
            team_name: submission.team_name,
            university: submission.university,
            contact_email: submission.contact_email,
            members: submission.members,
            registration_date: Utc::now().to_rfc3339(),
            status: STATUS_REGISTERED.to_string(),
        };

        let members_json =
            serde_json::to_string(&registration.members).map_err(|source| StoreError::Corrupt {
                id: registration.id.clone(),
                source,
            })?;

        let key = registration_key(&registration.id);
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(
                &key,
                &[
                    ("id", registration.id.as_str()),
                    ("teamName", registration.team_name.as_str()),
                    ("university", registration.university.as_str()),
                    ("contactEmail", registration.contact_email.as_str()),
                    ("teamMembers", members_json.as_str()),
                    ("registrationDate", registration.registration_date.as_str()),
                    ("status", registration.status.as_str()),
                ],
            )
            .sadd(university_key(&registration.university), &registration.id)
            .set(email_key(&registration.contact_email), &registration.id)
            .rpush(ALL_REGISTRATIONS_KEY, &registration.id);

        for member in &registration.members {
            pipe.set(member_email_key(&member.email), &registration.id);
        }

        if self.ttl_secs > 0 {
            pipe.expire(&key, self.ttl_secs as i64);
        }

        let _: () = pipe.query_async(&mut conn).await?;

        metrics::counter!("octwave.registrations.created").increment(1);
        info!(
            id = %registration.id,
            members = registration.members.len(),
            "Registration persisted"
        );

        Ok(registration)
    }

    /// Fetch a registration by team id
    pub async fn registration(&self, id: &str) -> Result<Option<Registration>, StoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(registration_key(id)).await?;

        if fields.is_empty() {
            return Ok(None);
        }

        parse_registration(id, fields).map(Some)
    }

    /// Resolve an email address to a team id
    ///
    /// Checks the contact-email index first, then the member-email index.
    pub async fn find_team_by_email(&self, email: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();

        let by_contact: Option<String> = conn.get(email_key(email)).await?;
        if by_contact.is_some() {
            return Ok(by_contact);
        }

        let by_member: Option<String> = conn.get(member_email_key(email)).await?;
        Ok(by_member)
    }

    /// Fetch all registrations in insertion order
    ///
    /// Records with malformed member data are logged and skipped.
    #[instrument(skip(self))]
    pub async fn list_registrations(&self) -> Result<Vec<Registration>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.lrange(ALL_REGISTRATIONS_KEY, 0, -1).await?;

        let mut registrations = Vec::with_capacity(ids.len());
        for id in ids {
            let fields: HashMap<String, String> = conn.hgetall(registration_key(&id)).await?;
            if fields.is_empty() {
                // Expired or deleted since it was listed
                debug!(id = %id, "Listed registration has no record, skipping");
                continue;
            }

            match parse_registration(&id, fields) {
                Ok(registration) => registrations.push(registration),
                Err(err) => {
                    warn!(id = %id, error = %err, "Skipping registration with malformed member data");
                }
            }
        }

        Ok(registrations)
    }
}

/// Rebuild a registration from its stored hash fields
fn parse_registration(
    id: &str,
    mut fields: HashMap<String, String>,
) -> Result<Registration, StoreError> {
    let members_json = fields
        .remove("teamMembers")
        .unwrap_or_else(|| "[]".to_string());
    let members: Vec<TeamMember> =
        serde_json::from_str(&members_json).map_err(|source| StoreError::Corrupt {
            id: id.to_string(),
            source,
        })?;

    Ok(Registration {
        id: fields.remove("id").unwrap_or_else(|| id.to_string()),
        team_name: fields.remove("teamName").unwrap_or_default(),
        university: fields.remove("university").unwrap_or_default(),
        contact_email: fields.remove("contactEmail").unwrap_or_default(),
        members,
        registration_date: fields.remove("registrationDate").unwrap_or_default(),
        status: fields.remove("status").unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_member() -> TeamMember {
        TeamMember {
            full_name: "Amara Perera".to_string(),
            email: "amara@example.com".to_string(),
            phone: "0711234567".to_string(),
            year_of_study: "2nd Year".to_string(),
            ieee_number: Some("99887766".to_string()),
            kaggle_id: None,
        }
    }

    fn stored_fields(members_json: &str) -> HashMap<String, String> {
        HashMap::from([
            ("id".to_string(), "OW_7".to_string()),
            ("teamName".to_string(), "Alpha".to_string()),
            ("university".to_string(), "U1".to_string()),
            ("contactEmail".to_string(), "lead@x.com".to_string()),
            ("teamMembers".to_string(), members_json.to_string()),
            (
                "registrationDate".to_string(),
                "2026-08-05T10:30:00+00:00".to_string(),
            ),
            ("status".to_string(), "registered".to_string()),
        ])
    }

    #[test]
    fn test_team_id_format() {
        assert_eq!(team_id_for(1), "OW_1");
        assert_eq!(team_id_for(42), "OW_42");
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(registration_key("OW_3"), "registration:OW_3");
        assert_eq!(university_key("U1"), "university:U1");
        assert_eq!(email_key("lead@x.com"), "email:lead@x.com");
        assert_eq!(member_email_key("a@x.com"), "member_email:a@x.com");
    }

    #[test]
    fn test_parse_registration_roundtrip() {
        let members = vec![sample_member()];
        let members_json = serde_json::to_string(&members).unwrap();

        let registration = parse_registration("OW_7", stored_fields(&members_json)).unwrap();

        assert_eq!(registration.id, "OW_7");
        assert_eq!(registration.team_name, "Alpha");
        assert_eq!(registration.members, members);
        assert_eq!(registration.status, "registered");
    }

    #[test]
    fn test_parse_registration_malformed_members() {
        let err = parse_registration("OW_7", stored_fields("not json")).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref id, .. } if id == "OW_7"));
    }

    #[test]
    fn test_parse_registration_missing_members_field() {
        let mut fields = stored_fields("[]");
        fields.remove("teamMembers");

        let registration = parse_registration("OW_7", fields).unwrap();
        assert!(registration.members.is_empty());
    }

    #[test]
    fn test_member_serde_shape() {
        let member = sample_member();
        let json = serde_json::to_value(&member).unwrap();

        assert_eq!(json["fullName"], "Amara Perera");
        assert_eq!(json["yearOfStudy"], "2nd Year");
        assert_eq!(json["ieeeNumber"], "99887766");
        // Absent optionals are omitted from the stored JSON entirely
        assert!(json.get("kaggleId").is_none());
    }

    #[test]
    fn test_registration_serde_uses_team_members_field() {
        let registration = Registration {
            id: "OW_1".to_string(),
            team_name: "Alpha".to_string(),
            university: "U1".to_string(),
            contact_email: "lead@x.com".to_string(),
            members: vec![sample_member()],
            registration_date: "2026-08-05T10:30:00+00:00".to_string(),
            status: "registered".to_string(),
        };

        let json = serde_json::to_value(&registration).unwrap();
        assert!(json.get("teamMembers").is_some());
        assert!(json.get("members").is_none());
        assert_eq!(json["contactEmail"], "lead@x.com");
    }
}
