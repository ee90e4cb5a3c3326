use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::audit::{FieldChanges, History};
use crate::ids::{RouteId, SectorId, TicketId, UserId};

use super::state::TransferState;

/// Unit of tracked work (a "pendência").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub number: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub situation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_deadline_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<RouteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_id: Option<SectorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub transfer: TransferState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_proposals: Option<serde_json::Value>,
    #[serde(default)]
    pub history: History,
}

impl Ticket {
    /// A blank ticket; the service fills the remaining fields on creation.
    pub fn new(id: TicketId, number: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            number,
            created_at: now,
            updated_at: now,
            equipment: None,
            situation: None,
            status: None,
            priority: None,
            response_deadline_days: None,
            origin: None,
            notes: None,
            version: None,
            route_id: None,
            sector_id: None,
            user_id: None,
            transfer: TransferState::None,
            modified_by: None,
            client: None,
            linked_proposals: None,
            history: History::default(),
        }
    }

    pub fn assignment(&self) -> Assignment {
        Assignment {
            sector_id: self.sector_id,
            user_id: self.user_id,
        }
    }

    /// Snapshot of the audited fields, used to diff a mutation.
    pub fn tracked(&self) -> TrackedFields {
        TrackedFields {
            sector_id: self.sector_id,
            user_id: self.user_id,
            situation: self.situation.clone(),
            status: self.status.clone(),
        }
    }
}

/// Setor/usuário responsáveis por uma pendência.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_id: Option<SectorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFields {
    pub sector_id: Option<SectorId>,
    pub user_id: Option<UserId>,
    pub situation: Option<String>,
    pub status: Option<String>,
}

impl TrackedFields {
    pub fn changes_to(self, after: TrackedFields) -> FieldChanges {
        FieldChanges {
            sector: (self.sector_id, after.sector_id),
            user: (self.user_id, after.user_id),
            situation: (self.situation, after.situation),
            status: (self.status, after.status),
        }
    }
}

/// Edição tri-estado para atualizações parciais.
///
/// No JSON: campo ausente → `Keep`, `null` → `Clear`, valor → `Set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEdit<T> {
    Keep,
    Set(T),
    Clear,
}

impl<T> Default for FieldEdit<T> {
    fn default() -> Self {
        FieldEdit::Keep
    }
}

impl<T: PartialEq + Copy> FieldEdit<T> {
    /// The value this edit produces when applied over `current`.
    pub fn apply_to(&self, current: Option<T>) -> Option<T> {
        match self {
            FieldEdit::Keep => current,
            FieldEdit::Set(v) => Some(*v),
            FieldEdit::Clear => None,
        }
    }

    pub fn changes(&self, current: Option<T>) -> bool {
        self.apply_to(current) != current
    }
}

impl<T> From<Option<T>> for FieldEdit<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => FieldEdit::Set(v),
            None => FieldEdit::Clear,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldEdit<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Only reached when the field is present; absence falls back to `Default`.
        Option::<T>::deserialize(deserializer).map(FieldEdit::from)
    }
}

/// Dados de criação de pendência.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTicket {
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub equipment: Option<String>,
    #[serde(default)]
    pub situation: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub response_deadline_days: Option<u32>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub sector_id: Option<SectorId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub route_id: Option<RouteId>,
    #[serde(default)]
    pub client: Option<serde_json::Value>,
    #[serde(default)]
    pub linked_proposals: Option<serde_json::Value>,
}

/// Atualização parcial: somente os campos informados são aplicados.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TicketPatch {
    #[serde(default)]
    pub equipment: Option<String>,
    #[serde(default)]
    pub situation: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub response_deadline_days: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub sector_id: Option<SectorId>,
    #[serde(default)]
    pub user_id: FieldEdit<UserId>,
    #[serde(default)]
    pub route_id: Option<RouteId>,
    #[serde(default)]
    pub client: Option<serde_json::Value>,
    #[serde(default)]
    pub linked_proposals: Option<serde_json::Value>,
}

impl TicketPatch {
    /// Applies the plain (non-assignment) fields in place.
    pub fn apply_fields(&self, ticket: &mut Ticket) {
        fn set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }
        set(&mut ticket.equipment, &self.equipment);
        set(&mut ticket.situation, &self.situation);
        set(&mut ticket.status, &self.status);
        set(&mut ticket.priority, &self.priority);
        set(&mut ticket.response_deadline_days, &self.response_deadline_days);
        set(&mut ticket.notes, &self.notes);
        set(&mut ticket.version, &self.version);
        set(&mut ticket.client, &self.client);
        set(&mut ticket.linked_proposals, &self.linked_proposals);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_user_field_is_tri_state() {
        let keep: TicketPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(keep.user_id, FieldEdit::Keep);

        let clear: TicketPatch = serde_json::from_str(r#"{"user_id": null}"#).unwrap();
        assert_eq!(clear.user_id, FieldEdit::Clear);

        let set: TicketPatch = serde_json::from_str(r#"{"user_id": 12}"#).unwrap();
        assert_eq!(set.user_id, FieldEdit::Set(UserId(12)));
    }

    #[test]
    fn field_edit_application() {
        let current = Some(UserId(1));
        assert_eq!(FieldEdit::Keep.apply_to(current), current);
        assert_eq!(FieldEdit::Clear.apply_to(current), None);
        assert_eq!(FieldEdit::Set(UserId(2)).apply_to(current), Some(UserId(2)));
        assert!(!FieldEdit::Set(UserId(1)).changes(current));
        assert!(!FieldEdit::<UserId>::Clear.changes(None));
    }

    #[test]
    fn apply_fields_only_touches_supplied_values() {
        let mut ticket = Ticket::new(TicketId(1), "123456".into(), Utc::now());
        ticket.equipment = Some("Pump".into());
        ticket.status = Some("New".into());

        let patch = TicketPatch {
            status: Some("Quoted".into()),
            response_deadline_days: Some(4),
            ..Default::default()
        };
        patch.apply_fields(&mut ticket);

        assert_eq!(ticket.equipment.as_deref(), Some("Pump"));
        assert_eq!(ticket.status.as_deref(), Some("Quoted"));
        assert_eq!(ticket.response_deadline_days, Some(4));
    }

    #[test]
    fn ticket_without_history_or_transfer_deserializes() {
        let json = r#"{
            "id": 3,
            "number": "100200",
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z",
            "sector_id": 4
        }"#;
        let ticket: Ticket = serde_json::from_str(json).unwrap();
        assert!(ticket.history.is_empty());
        assert_eq!(ticket.transfer, TransferState::None);
        assert_eq!(ticket.assignment().sector_id, Some(SectorId(4)));
    }

    #[test]
    fn tracked_fields_diff() {
        let before = TrackedFields {
            sector_id: Some(SectorId(1)),
            user_id: None,
            situation: Some("Open".into()),
            status: None,
        };
        let after = TrackedFields {
            sector_id: Some(SectorId(2)),
            ..before.clone()
        };
        let changes = before.changes_to(after);
        assert!(changes.sector_changed());
        assert!(!changes.user_changed());
        assert!(!changes.situation_changed());
    }
}
