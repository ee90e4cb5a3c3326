use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit::{AuditLog, EntryDraft, FieldChanges, HistoryAction};
use crate::error::NexusError;
use crate::ids::{SectorId, UserId};
use crate::route::Route;
use crate::router::RouteResolver;
use crate::visibility::Actor;

use super::ticket::{Assignment, FieldEdit, Ticket};

/// Estado do handshake de transferência de uma pendência.
///
/// NONE → PENDING → NONE (aceite) ou RETURNED (devolução). RETURNED aceita
/// uma nova proposta. A atribuição anterior só existe enquanto PENDING.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    #[default]
    None,
    Pending {
        previous: Assignment,
    },
    Returned,
}

impl TransferState {
    pub fn is_pending(&self) -> bool {
        matches!(self, TransferState::Pending { .. })
    }

    /// Assignment held before the pending proposal.
    pub fn previous(&self) -> Option<Assignment> {
        match self {
            TransferState::Pending { previous } => Some(*previous),
            _ => None,
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferState::None => write!(f, "NONE"),
            TransferState::Pending { .. } => write!(f, "PENDING"),
            TransferState::Returned => write!(f, "RETURNED"),
        }
    }
}

/// Destino proposto para uma transferência.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferRequest {
    pub sector_id: Option<SectorId>,
    pub user_id: FieldEdit<UserId>,
}

impl TransferRequest {
    pub fn to_sector(sector_id: SectorId) -> Self {
        Self {
            sector_id: Some(sector_id),
            user_id: FieldEdit::Keep,
        }
    }

    pub fn to_user(user_id: UserId) -> Self {
        Self {
            sector_id: None,
            user_id: FieldEdit::Set(user_id),
        }
    }

    /// Whether applying this request would change the ticket's assignment.
    pub fn changes(&self, current: Assignment) -> bool {
        self.sector_changes(current).is_some() || self.user_id.changes(current.user_id)
    }

    fn sector_changes(&self, current: Assignment) -> Option<SectorId> {
        self.sector_id.filter(|s| Some(*s) != current.sector_id)
    }
}

/// The result of a committed handshake step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Proposed { from: Assignment, to: Assignment },
    Accepted { holder: Assignment },
    Returned { from: Assignment, restored: Assignment },
}

/// Drives the transfer handshake of a `Ticket`.
///
/// Every method validates before touching the ticket, so an `Err` leaves
/// the ticket (and its history) exactly as it was.
pub struct TransferStateMachine;

impl TransferStateMachine {
    /// Propõe uma transferência e registra a entrada de histórico correspondente.
    pub fn propose(
        ticket: &mut Ticket,
        route: Option<&Route>,
        request: &TransferRequest,
        actor_id: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Transition, NexusError> {
        let before = ticket.tracked();
        let transition = Self::apply_proposal(ticket, route, request)?;
        let changes = before.changes_to(ticket.tracked());
        Self::record(ticket, EntryDraft::from_changes(changes).by(actor_id), actor_id, now);
        Ok(transition)
    }

    /// Valida e aplica a proposta sem registrar histórico.
    ///
    /// Used when the proposal is part of a larger edit that records a
    /// single combined entry.
    pub fn apply_proposal(
        ticket: &mut Ticket,
        route: Option<&Route>,
        request: &TransferRequest,
    ) -> Result<Transition, NexusError> {
        if ticket.transfer.is_pending() {
            return Err(NexusError::Validation(format!(
                "ticket {} already has a pending transfer",
                ticket.id
            )));
        }

        let from = ticket.assignment();
        let new_sector = request.sector_changes(from);
        let user_changed = request.user_id.changes(from.user_id);
        if new_sector.is_none() && !user_changed {
            return Err(NexusError::Validation(
                "transfer must change the sector or the user".into(),
            ));
        }

        if let Some(destination) = new_sector
            && !RouteResolver::is_valid_sector_target(route, from.sector_id, from.user_id, destination)
        {
            return Err(NexusError::InvalidTransferTarget(format!(
                "sector {destination} is not the next sector on the ticket's route"
            )));
        }
        if let FieldEdit::Set(destination) = request.user_id
            && user_changed
            && !RouteResolver::is_valid_user_target(route, from.sector_id, from.user_id, destination)
        {
            return Err(NexusError::InvalidTransferTarget(format!(
                "user {destination} is not the next step on the ticket's route"
            )));
        }

        if let Some(sector) = new_sector {
            ticket.sector_id = Some(sector);
        }
        ticket.user_id = request.user_id.apply_to(from.user_id);
        ticket.transfer = TransferState::Pending { previous: from };

        let to = ticket.assignment();
        info!(ticket = %ticket.id, ?from, ?to, "transfer proposed");
        Ok(Transition::Proposed { from, to })
    }

    /// Aceita a transferência pendente; apenas o destinatário pode aceitar.
    pub fn accept(
        ticket: &mut Ticket,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Transition, NexusError> {
        Self::pending_previous(ticket)?;
        Self::authorize_recipient(ticket, actor)?;

        ticket.transfer = TransferState::None;
        let holder = ticket.assignment();
        let changes = FieldChanges {
            sector: (None, holder.sector_id),
            user: (None, holder.user_id),
            ..Default::default()
        };
        let draft = EntryDraft::new(HistoryAction::Acceptance, changes)
            .with_description("Transfer accepted by recipient")
            .by(Some(actor.id));
        Self::record(ticket, draft, Some(actor.id), now);

        info!(ticket = %ticket.id, actor = %actor.id, "transfer accepted");
        Ok(Transition::Accepted { holder })
    }

    /// Devolve a transferência: restaura setor/usuário anteriores.
    pub fn return_transfer(
        ticket: &mut Ticket,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Transition, NexusError> {
        let restored = Self::pending_previous(ticket)?;
        Self::authorize_recipient(ticket, actor)?;

        let from = ticket.assignment();
        ticket.sector_id = restored.sector_id;
        ticket.user_id = restored.user_id;
        ticket.transfer = TransferState::Returned;

        let changes = FieldChanges {
            sector: (from.sector_id, restored.sector_id),
            user: (from.user_id, restored.user_id),
            ..Default::default()
        };
        let summary = changes.describe();
        let description = if summary.is_empty() {
            "Transfer returned".to_string()
        } else {
            format!("Transfer returned. {summary}")
        };
        let draft = EntryDraft::new(HistoryAction::Return, changes)
            .with_description(description)
            .by(Some(actor.id));
        Self::record(ticket, draft, Some(actor.id), now);

        info!(ticket = %ticket.id, actor = %actor.id, ?from, ?restored, "transfer returned");
        Ok(Transition::Returned { from, restored })
    }

    fn pending_previous(ticket: &Ticket) -> Result<Assignment, NexusError> {
        ticket
            .transfer
            .previous()
            .ok_or(NexusError::TransferNotPending(ticket.id))
    }

    /// Only the receiving user (or, without one, the receiving sector) may act.
    fn authorize_recipient(ticket: &Ticket, actor: &Actor) -> Result<(), NexusError> {
        let allowed = match (ticket.user_id, ticket.sector_id) {
            (Some(user), _) => actor.id == user,
            (None, Some(sector)) => actor.sector_id == Some(sector),
            (None, None) => {
                return Err(NexusError::InvalidTransferTarget(format!(
                    "ticket {} was not transferred to any user or sector",
                    ticket.id
                )));
            }
        };
        if !allowed {
            warn!(ticket = %ticket.id, actor = %actor.id, "actor is not the transfer recipient");
            return Err(NexusError::Unauthorized(format!(
                "user {} is not the recipient of ticket {}",
                actor.id, ticket.id
            )));
        }
        Ok(())
    }

    fn record(ticket: &mut Ticket, draft: EntryDraft, actor_id: Option<UserId>, now: DateTime<Utc>) {
        let history = std::mem::take(&mut ticket.history);
        ticket.history = AuditLog::append(history, draft, now);
        ticket.updated_at = now;
        if actor_id.is_some() {
            ticket.modified_by = actor_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{RouteId, TicketId};
    use crate::route::Step;

    const A: SectorId = SectorId(1);
    const B: SectorId = SectorId(2);
    const C: SectorId = SectorId(3);
    const U1: UserId = UserId(10);
    const U2: UserId = UserId(20);

    fn ticket_at(sector: Option<SectorId>, user: Option<UserId>) -> Ticket {
        let mut t = Ticket::new(TicketId(1), "100001".into(), Utc::now());
        t.sector_id = sector;
        t.user_id = user;
        t
    }

    fn actor(id: UserId, sector: Option<SectorId>) -> Actor {
        Actor {
            id,
            sector_id: sector,
            privilege_level: 1,
        }
    }

    /// A → U1 → B
    fn route() -> Route {
        Route {
            id: RouteId(1),
            name: "R".into(),
            description: None,
            active: true,
            created_at: Utc::now(),
            steps: vec![Step::sector(1, A), Step::user(2, U1), Step::sector(3, B)],
        }
    }

    #[test]
    fn propose_sets_pending_and_snapshot() {
        let mut t = ticket_at(Some(A), None);
        let tr = TransferStateMachine::propose(&mut t, None, &TransferRequest::to_sector(C), None, Utc::now())
            .unwrap();

        assert_eq!(
            tr,
            Transition::Proposed {
                from: Assignment { sector_id: Some(A), user_id: None },
                to: Assignment { sector_id: Some(C), user_id: None },
            }
        );
        assert_eq!(t.sector_id, Some(C));
        assert_eq!(
            t.transfer.previous(),
            Some(Assignment { sector_id: Some(A), user_id: None })
        );
        assert_eq!(t.history.len(), 1);
        assert_eq!(t.history.entries()[0].action, HistoryAction::SectorTransfer);
        assert_eq!(t.history.entries()[0].description.as_deref(), Some("Sector: 1 → 3"));
    }

    #[test]
    fn propose_without_change_is_rejected() {
        let mut t = ticket_at(Some(A), Some(U1));
        let request = TransferRequest {
            sector_id: Some(A),
            user_id: FieldEdit::Set(U1),
        };
        let err = TransferStateMachine::propose(&mut t, None, &request, None, Utc::now()).unwrap_err();
        assert!(matches!(err, NexusError::Validation(_)));
        assert!(t.history.is_empty());
    }

    #[test]
    fn invalid_route_target_leaves_ticket_untouched() {
        let mut t = ticket_at(Some(A), None);
        let snapshot = t.clone();
        let r = route();

        let err = TransferStateMachine::propose(&mut t, Some(&r), &TransferRequest::to_sector(C), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, NexusError::InvalidTransferTarget(_)));

        let err = TransferStateMachine::propose(&mut t, Some(&r), &TransferRequest::to_user(U2), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, NexusError::InvalidTransferTarget(_)));

        assert_eq!(t, snapshot);
    }

    #[test]
    fn sector_proposal_may_skip_user_step() {
        let mut t = ticket_at(Some(A), None);
        let r = route();
        TransferStateMachine::propose(&mut t, Some(&r), &TransferRequest::to_sector(B), None, Utc::now()).unwrap();
        assert_eq!(t.sector_id, Some(B));
        assert!(t.transfer.is_pending());
    }

    #[test]
    fn combined_proposal_validates_both_targets_from_origin() {
        let r = route();
        let mut t = ticket_at(Some(A), None);
        // B is the next sector but U2 is not the next user step.
        let request = TransferRequest {
            sector_id: Some(B),
            user_id: FieldEdit::Set(U2),
        };
        let err = TransferStateMachine::propose(&mut t, Some(&r), &request, None, Utc::now()).unwrap_err();
        assert!(matches!(err, NexusError::InvalidTransferTarget(_)));
        assert_eq!(t.sector_id, Some(A));
    }

    #[test]
    fn second_proposal_while_pending_is_rejected() {
        let mut t = ticket_at(Some(A), None);
        TransferStateMachine::propose(&mut t, None, &TransferRequest::to_sector(B), None, Utc::now()).unwrap();
        let err = TransferStateMachine::propose(&mut t, None, &TransferRequest::to_sector(C), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, NexusError::Validation(_)));
        assert_eq!(t.transfer.previous().unwrap().sector_id, Some(A));
    }

    #[test]
    fn accept_by_assigned_user_clears_snapshot() {
        let mut t = ticket_at(Some(A), None);
        TransferStateMachine::propose(&mut t, None, &TransferRequest::to_user(U1), None, Utc::now()).unwrap();

        let tr = TransferStateMachine::accept(&mut t, &actor(U1, Some(A)), Utc::now()).unwrap();
        assert_eq!(
            tr,
            Transition::Accepted {
                holder: Assignment { sector_id: Some(A), user_id: Some(U1) }
            }
        );
        assert_eq!(t.transfer, TransferState::None);
        assert_eq!(t.user_id, Some(U1));
        assert_eq!(t.history.last().unwrap().action, HistoryAction::Acceptance);
        assert_eq!(t.modified_by, Some(U1));
    }

    #[test]
    fn accept_twice_fails_with_not_pending() {
        let mut t = ticket_at(Some(A), None);
        TransferStateMachine::propose(&mut t, None, &TransferRequest::to_sector(B), None, Utc::now()).unwrap();
        TransferStateMachine::accept(&mut t, &actor(U2, Some(B)), Utc::now()).unwrap();

        let err = TransferStateMachine::accept(&mut t, &actor(U2, Some(B)), Utc::now()).unwrap_err();
        assert!(matches!(err, NexusError::TransferNotPending(_)));
        assert_eq!(t.history.len(), 2);
    }

    #[test]
    fn accept_requires_recipient() {
        let mut t = ticket_at(Some(A), None);
        TransferStateMachine::propose(&mut t, None, &TransferRequest::to_user(U1), None, Utc::now()).unwrap();

        // Same sector, but the ticket is assigned to U1 specifically.
        let err = TransferStateMachine::accept(&mut t, &actor(U2, Some(A)), Utc::now()).unwrap_err();
        assert!(matches!(err, NexusError::Unauthorized(_)));
        assert!(t.transfer.is_pending());

        let mut s = ticket_at(Some(A), None);
        TransferStateMachine::propose(&mut s, None, &TransferRequest::to_sector(B), None, Utc::now()).unwrap();
        let err = TransferStateMachine::return_transfer(&mut s, &actor(U2, Some(A)), Utc::now()).unwrap_err();
        assert!(matches!(err, NexusError::Unauthorized(_)));
    }

    #[test]
    fn pending_without_any_recipient_is_unreachable() {
        let mut t = ticket_at(None, Some(U1));
        let request = TransferRequest {
            sector_id: None,
            user_id: FieldEdit::Clear,
        };
        TransferStateMachine::propose(&mut t, None, &request, None, Utc::now()).unwrap();
        let err = TransferStateMachine::accept(&mut t, &actor(U1, None), Utc::now()).unwrap_err();
        assert!(matches!(err, NexusError::InvalidTransferTarget(_)));
    }

    #[test]
    fn return_restores_previous_assignment() {
        let mut t = ticket_at(Some(A), Some(U2));
        let request = TransferRequest {
            sector_id: Some(B),
            user_id: FieldEdit::Set(U1),
        };
        TransferStateMachine::propose(&mut t, None, &request, None, Utc::now()).unwrap();

        let tr = TransferStateMachine::return_transfer(&mut t, &actor(U1, Some(B)), Utc::now()).unwrap();
        assert!(matches!(tr, Transition::Returned { .. }));
        assert_eq!(t.sector_id, Some(A));
        assert_eq!(t.user_id, Some(U2));
        assert_eq!(t.transfer, TransferState::Returned);
        assert_eq!(t.transfer.previous(), None);

        let entry = t.history.last().unwrap();
        assert_eq!(entry.action, HistoryAction::Return);
        assert_eq!(
            entry.description.as_deref(),
            Some("Transfer returned. Sector: 2 → 1. User: 10 → 20")
        );
        assert_eq!(entry.previous_sector_id, Some(B));
        assert_eq!(entry.sector_id, Some(A));
    }

    #[test]
    fn return_entry_keeps_unchanged_sector_pair() {
        let mut t = ticket_at(Some(A), Some(U2));
        TransferStateMachine::propose(&mut t, None, &TransferRequest::to_user(U1), None, Utc::now()).unwrap();
        TransferStateMachine::return_transfer(&mut t, &actor(U1, Some(A)), Utc::now()).unwrap();

        let entry = t.history.last().unwrap();
        assert_eq!(entry.action, HistoryAction::Return);
        assert_eq!(entry.previous_sector_id, Some(A));
        assert_eq!(entry.sector_id, Some(A));
        assert_eq!(entry.previous_user_id, Some(U1));
        assert_eq!(entry.user_id, Some(U2));
        assert_eq!(entry.description.as_deref(), Some("Transfer returned. User: 10 → 20"));
    }

    #[test]
    fn returned_ticket_accepts_a_new_proposal() {
        let mut t = ticket_at(Some(A), None);
        TransferStateMachine::propose(&mut t, None, &TransferRequest::to_sector(B), None, Utc::now()).unwrap();
        TransferStateMachine::return_transfer(&mut t, &actor(U2, Some(B)), Utc::now()).unwrap();

        let err = TransferStateMachine::accept(&mut t, &actor(U2, Some(A)), Utc::now()).unwrap_err();
        assert!(matches!(err, NexusError::TransferNotPending(_)));

        TransferStateMachine::propose(&mut t, None, &TransferRequest::to_sector(C), None, Utc::now()).unwrap();
        assert!(t.transfer.is_pending());
    }

    #[test]
    fn transfer_state_display_and_serde() {
        assert_eq!(TransferState::None.to_string(), "NONE");
        assert_eq!(TransferState::Returned.to_string(), "RETURNED");
        let pending = TransferState::Pending {
            previous: Assignment { sector_id: Some(A), user_id: None },
        };
        assert_eq!(pending.to_string(), "PENDING");
        let json = serde_json::to_value(pending).unwrap();
        assert_eq!(json["state"], "PENDING");
        assert_eq!(json["previous"]["sector_id"], 1);
    }
}
