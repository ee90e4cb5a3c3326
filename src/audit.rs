//! Histórico de alterações de uma pendência (somente acréscimo).
//!
//! [`AuditLog::append`] normaliza o histórico existente e acrescenta uma
//! nova [`HistoryEntry`]. Entradas anteriores nunca são reescritas.
//! Campos ausentes são omitidos na serialização para manter as entradas
//! compactas.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SectorId, UserId};

/// Rótulo da ação registrada numa entrada de histórico.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryAction {
    Creation,
    Transfer,
    #[serde(rename = "Transfer of sector")]
    SectorTransfer,
    Assignment,
    Unassignment,
    Reassignment,
    #[serde(rename = "Situation change")]
    SituationChange,
    #[serde(rename = "Status change")]
    StatusChange,
    Edit,
    Acceptance,
    Return,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HistoryAction::Creation => "Creation",
            HistoryAction::Transfer => "Transfer",
            HistoryAction::SectorTransfer => "Transfer of sector",
            HistoryAction::Assignment => "Assignment",
            HistoryAction::Unassignment => "Unassignment",
            HistoryAction::Reassignment => "Reassignment",
            HistoryAction::SituationChange => "Situation change",
            HistoryAction::StatusChange => "Status change",
            HistoryAction::Edit => "Edit",
            HistoryAction::Acceptance => "Acceptance",
            HistoryAction::Return => "Return",
        };
        f.write_str(label)
    }
}

/// Uma entrada imutável do histórico.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub changed_at: DateTime<Utc>,
    pub action: HistoryAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_situation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub situation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_sector_id: Option<SectorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_id: Option<SectorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<UserId>,
}

/// Formatos aceitos na leitura: ausente/nulo, objeto único legado ou sequência.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredHistory {
    Sequence(Vec<HistoryEntry>),
    Single(Box<HistoryEntry>),
    Absent,
}

impl From<StoredHistory> for History {
    fn from(stored: StoredHistory) -> Self {
        match stored {
            StoredHistory::Sequence(entries) => History(entries),
            StoredHistory::Single(entry) => History(vec![*entry]),
            StoredHistory::Absent => History::default(),
        }
    }
}

/// Sequência ordenada de entradas; sempre serializada como array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredHistory")]
pub struct History(Vec<HistoryEntry>);

impl History {
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.0.last()
    }
}

/// Valores antes/depois dos quatro campos rastreados.
///
/// Um par com os dois lados nulos simplesmente não aparece na entrada.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldChanges {
    pub sector: (Option<SectorId>, Option<SectorId>),
    pub user: (Option<UserId>, Option<UserId>),
    pub situation: (Option<String>, Option<String>),
    pub status: (Option<String>, Option<String>),
}

impl FieldChanges {
    pub fn sector_changed(&self) -> bool {
        self.sector.0 != self.sector.1
    }

    pub fn user_changed(&self) -> bool {
        self.user.0 != self.user.1
    }

    pub fn situation_changed(&self) -> bool {
        self.situation.0 != self.situation.1
    }

    pub fn status_changed(&self) -> bool {
        self.status.0 != self.status.1
    }

    /// Rótulo da ação; a primeira regra que casar vence.
    pub fn determine_action(&self) -> HistoryAction {
        if self.sector_changed() && self.user_changed() {
            return HistoryAction::Transfer;
        }
        if self.sector_changed() {
            return HistoryAction::SectorTransfer;
        }
        if self.user_changed() {
            return match self.user {
                (_, None) => HistoryAction::Unassignment,
                (None, Some(_)) => HistoryAction::Assignment,
                _ => HistoryAction::Reassignment,
            };
        }
        if self.situation_changed() {
            return HistoryAction::SituationChange;
        }
        if self.status_changed() {
            return HistoryAction::StatusChange;
        }
        HistoryAction::Edit
    }

    /// `"Sector: 1 → 2. User: — → 5"`: only changed fields, fixed order, no trailing period.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        if self.sector_changed() {
            push_change(&mut out, "Sector", &self.sector.0, &self.sector.1);
        }
        if self.user_changed() {
            push_change(&mut out, "User", &self.user.0, &self.user.1);
        }
        if self.situation_changed() {
            push_change(&mut out, "Situation", &self.situation.0, &self.situation.1);
        }
        if self.status_changed() {
            push_change(&mut out, "Status", &self.status.0, &self.status.1);
        }
        let trimmed = out.trim();
        trimmed.strip_suffix('.').unwrap_or(trimmed).to_string()
    }
}

fn push_change<T: fmt::Display>(out: &mut String, field: &str, before: &Option<T>, after: &Option<T>) {
    out.push_str(&format!("{field}: {} → {}. ", or_dash(before), or_dash(after)));
}

fn or_dash<T: fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(|| "—".to_string(), |v| v.to_string())
}

/// Dados de uma entrada a acrescentar.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub action: HistoryAction,
    pub changes: FieldChanges,
    pub notes: Option<String>,
    pub description: Option<String>,
    pub actor_id: Option<UserId>,
}

impl EntryDraft {
    /// Entry labelled and described from its own changes.
    pub fn from_changes(changes: FieldChanges) -> Self {
        let description = Some(changes.describe());
        Self {
            action: changes.determine_action(),
            changes,
            notes: None,
            description,
            actor_id: None,
        }
    }

    pub fn new(action: HistoryAction, changes: FieldChanges) -> Self {
        Self {
            action,
            changes,
            notes: None,
            description: None,
            actor_id: None,
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn by(mut self, actor_id: Option<UserId>) -> Self {
        self.actor_id = actor_id;
        self
    }
}

/// Appends entries to a ticket history.
pub struct AuditLog;

impl AuditLog {
    /// Acrescenta uma entrada construída a partir de `draft` e devolve o histórico.
    pub fn append(history: History, draft: EntryDraft, at: DateTime<Utc>) -> History {
        let History(mut entries) = history;
        entries.push(Self::build_entry(draft, at));
        History(entries)
    }

    fn build_entry(draft: EntryDraft, at: DateTime<Utc>) -> HistoryEntry {
        let EntryDraft {
            action,
            changes,
            notes,
            description,
            actor_id,
        } = draft;
        let (previous_situation, situation) = changes.situation;
        let (previous_status, status) = changes.status;
        let (previous_user_id, user_id) = changes.user;
        let (previous_sector_id, sector_id) = changes.sector;
        HistoryEntry {
            changed_at: at,
            action,
            previous_situation,
            situation,
            previous_status,
            status,
            previous_user_id,
            user_id,
            previous_sector_id,
            sector_id,
            notes: notes.filter(|n| !n.trim().is_empty()),
            description: description.filter(|d| !d.trim().is_empty()),
            actor_id,
        }
    }
}
