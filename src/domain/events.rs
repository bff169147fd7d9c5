use serde::{Deserialize, Serialize};

use crate::shared::errors::DomainError;

/// Tags recognized by the pipeline. `UserEvent::event_type` stays a free-form string.
pub struct EventType;

impl EventType {
    pub const CREATED: &'static str = "CREATED";
    pub const UPDATED: &'static str = "UPDATED";
    pub const DELETED: &'static str = "DELETED";

    pub fn is_known(tag: &str) -> bool {
        matches!(tag, Self::CREATED | Self::UPDATED | Self::DELETED)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEvent {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub user_data: Option<User>,
}

impl UserEvent {
    pub fn new(event_type: impl Into<String>, user: User) -> Self {
        Self {
            event_type: event_type.into(),
            user_data: Some(user),
        }
    }

    pub fn created(user: User) -> Self {
        Self::new(EventType::CREATED, user)
    }

    pub fn updated(user: User) -> Self {
        Self::new(EventType::UPDATED, user)
    }

    pub fn deleted(user: User) -> Self {
        Self::new(EventType::DELETED, user)
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user_data.as_ref().and_then(|user| user.id)
    }

    pub fn event_type_or_unknown(&self) -> &str {
        if self.event_type.is_empty() {
            "UNKNOWN"
        } else {
            &self.event_type
        }
    }

    /// Returns the user id when the event carries user data with an id.
    pub fn validate(&self) -> Result<i64, DomainError> {
        self.user_id().ok_or_else(|| DomainError::InvalidEvent {
            event_type: self.event_type_or_unknown().to_string(),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Channel key: the decimal form of the user id.
    pub fn partition_key(&self) -> Result<String, DomainError> {
        self.validate().map(|id| id.to_string())
    }

    pub fn display_user_id(&self) -> String {
        self.user_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }

    /// Channel payload encoding.
    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_wire(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub company: Option<Company>,
}

impl User {
    pub fn with_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub suite: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zipcode: Option<String>,
    #[serde(default)]
    pub geo: Option<Geo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    #[serde(default)]
    pub lat: Option<String>,
    #[serde(default)]
    pub lng: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub catch_phrase: Option<String>,
    #[serde(default)]
    pub bs: Option<String>,
}


#[cfg(test)]
mod tests {
    use super::{fixtures::ann, *};

    #[test]
    fn valid_event_yields_partition_key() {
        let event = UserEvent::created(ann());
        assert!(event.is_valid());
        assert_eq!(event.partition_key().unwrap(), "42");
        assert_eq!(event.display_user_id(), "42");
    }

    #[test]
    fn event_without_user_data_is_invalid() {
        let event = UserEvent {
            event_type: "X".into(),
            user_data: None,
        };
        assert!(matches!(
            event.validate(),
            Err(DomainError::InvalidEvent { ref event_type }) if event_type == "X"
        ));
        assert_eq!(event.display_user_id(), "N/A");
    }

    #[test]
    fn event_without_user_id_is_invalid() {
        let event = UserEvent::updated(User {
            id: None,
            name: Some("nobody".into()),
            ..Default::default()
        });
        assert!(!event.is_valid());
        assert!(event.partition_key().is_err());
    }

    #[test]
    fn wire_format_uses_camel_case() {
        let json = serde_json::to_value(UserEvent::created(ann())).unwrap();
        assert_eq!(json["eventType"], "CREATED");
        assert_eq!(json["userData"]["id"], 42);
        assert_eq!(
            json["userData"]["company"]["catchPhrase"],
            "Multi-layered client-server neural-net"
        );
    }

    #[test]
    fn decodes_partial_payloads() {
        let event: UserEvent =
            serde_json::from_str(r#"{"eventType":"DELETED","userData":{"id":7}}"#).unwrap();
        assert_eq!(event.user_id(), Some(7));
        assert_eq!(event.user_data.unwrap().address, None);

        let empty: UserEvent = serde_json::from_str("{}").unwrap();
        assert!(!empty.is_valid());
        assert_eq!(empty.event_type_or_unknown(), "UNKNOWN");
    }

    #[test]
    fn unrecognized_event_types_are_kept() {
        assert!(EventType::is_known("UPDATED"));
        assert!(!EventType::is_known("ARCHIVED"));
        let event = UserEvent::new("ARCHIVED", User::with_id(1));
        assert!(event.is_valid());
        assert_eq!(event.event_type, "ARCHIVED");
    }
}
