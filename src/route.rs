//! Roteiros: sequências ordenadas de passos que uma pendência deve seguir.
//!
//! Um [`Route`] é uma lista de [`Step`]s ordenada por `ordinal` (único e
//! estritamente crescente). Cada passo aponta para um setor ou para um
//! usuário específico, em qualquer ordem.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::NexusError;
use crate::ids::{RouteId, SectorId, UserId};

/// Tipo de um passo do roteiro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    Sector,
    User,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Sector => write!(f, "SECTOR"),
            StepKind::User => write!(f, "USER"),
        }
    }
}

/// Destino de um passo; o tipo e a referência nunca divergem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepTarget {
    Sector { sector_id: SectorId },
    User { user_id: UserId },
}

/// Uma posição dentro de um roteiro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub ordinal: u32,
    #[serde(flatten)]
    pub target: StepTarget,
}

impl Step {
    pub fn sector(ordinal: u32, sector_id: SectorId) -> Self {
        Self {
            ordinal,
            target: StepTarget::Sector { sector_id },
        }
    }

    pub fn user(ordinal: u32, user_id: UserId) -> Self {
        Self {
            ordinal,
            target: StepTarget::User { user_id },
        }
    }

    pub fn kind(&self) -> StepKind {
        match self.target {
            StepTarget::Sector { .. } => StepKind::Sector,
            StepTarget::User { .. } => StepKind::User,
        }
    }

    pub fn sector_id(&self) -> Option<SectorId> {
        match self.target {
            StepTarget::Sector { sector_id } => Some(sector_id),
            StepTarget::User { .. } => None,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self.target {
            StepTarget::User { user_id } => Some(user_id),
            StepTarget::Sector { .. } => None,
        }
    }
}

/// Definição de roteiro com seus passos já ordenados.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Route {
    /// Builds a route from an already-validated definition.
    pub fn from_definition(id: RouteId, definition: RouteDefinition, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: definition.name,
            description: definition.description,
            active: definition.active.unwrap_or(true),
            created_at,
            steps: definition.steps,
        }
    }
}

/// Passo como chega da camada externa: o tipo pode não ter a referência correspondente.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDraft {
    #[serde(default)]
    pub ordinal: Option<u32>,
    pub kind: StepKind,
    #[serde(default)]
    pub sector_id: Option<SectorId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

impl StepDraft {
    pub fn sector(sector_id: SectorId) -> Self {
        Self {
            ordinal: None,
            kind: StepKind::Sector,
            sector_id: Some(sector_id),
            user_id: None,
        }
    }

    pub fn user(user_id: UserId) -> Self {
        Self {
            ordinal: None,
            kind: StepKind::User,
            sector_id: None,
            user_id: Some(user_id),
        }
    }

    pub fn at(mut self, ordinal: u32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    fn target(&self) -> Option<StepTarget> {
        match self.kind {
            StepKind::Sector => self.sector_id.map(|sector_id| StepTarget::Sector { sector_id }),
            StepKind::User => self.user_id.map(|user_id| StepTarget::User { user_id }),
        }
    }
}

/// Payload de criação/atualização de roteiro.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRoute {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `None` mantém o valor atual numa atualização (e vale `true` na criação).
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub steps: Vec<StepDraft>,
}

/// A [`NewRoute`] whose steps passed normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDefinition {
    pub name: String,
    pub description: Option<String>,
    pub active: Option<bool>,
    pub steps: Vec<Step>,
}

impl NewRoute {
    /// Valida o payload e produz passos ordenados por `ordinal`.
    ///
    /// Rascunhos sem a referência que o tipo exige são descartados. A
    /// ordem ausente vale a posição (1-based) do rascunho na lista.
    pub fn into_definition(self) -> Result<RouteDefinition, NexusError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(NexusError::Validation("route name must not be empty".into()));
        }

        let mut steps = Vec::with_capacity(self.steps.len());
        for (position, draft) in self.steps.iter().enumerate() {
            let Some(target) = draft.target() else {
                warn!(kind = %draft.kind, position, "discarding route step without a matching target");
                continue;
            };
            let ordinal = draft.ordinal.unwrap_or(position as u32 + 1);
            steps.push(Step { ordinal, target });
        }

        steps.sort_by_key(|s| s.ordinal);
        if let Some(pair) = steps.windows(2).find(|w| w[0].ordinal == w[1].ordinal) {
            return Err(NexusError::Validation(format!(
                "duplicate step ordinal {} in route '{name}'",
                pair[0].ordinal
            )));
        }

        Ok(RouteDefinition {
            name,
            description: self.description.filter(|d| !d.trim().is_empty()),
            active: self.active,
            steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drafts_are_sorted_by_ordinal() {
        let def = NewRoute {
            name: "Assistência".into(),
            steps: vec![
                StepDraft::sector(SectorId(2)).at(3),
                StepDraft::user(UserId(9)).at(2),
                StepDraft::sector(SectorId(1)).at(1),
            ],
            ..Default::default()
        }
        .into_definition()
        .unwrap();

        assert_eq!(
            def.steps,
            vec![
                Step::sector(1, SectorId(1)),
                Step::user(2, UserId(9)),
                Step::sector(3, SectorId(2)),
            ]
        );
    }

    #[test]
    fn missing_ordinal_defaults_to_position() {
        let def = NewRoute {
            name: "R".into(),
            steps: vec![StepDraft::sector(SectorId(4)), StepDraft::user(UserId(5))],
            ..Default::default()
        }
        .into_definition()
        .unwrap();
        assert_eq!(def.steps[0].ordinal, 1);
        assert_eq!(def.steps[1].ordinal, 2);
    }

    #[test]
    fn draft_without_matching_target_is_discarded() {
        let broken = StepDraft {
            ordinal: Some(1),
            kind: StepKind::User,
            sector_id: Some(SectorId(3)),
            user_id: None,
        };
        let def = NewRoute {
            name: "R".into(),
            steps: vec![broken, StepDraft::sector(SectorId(8)).at(2)],
            ..Default::default()
        }
        .into_definition()
        .unwrap();
        assert_eq!(def.steps, vec![Step::sector(2, SectorId(8))]);
    }

    #[test]
    fn duplicate_ordinals_are_rejected() {
        let result = NewRoute {
            name: "R".into(),
            steps: vec![
                StepDraft::sector(SectorId(1)).at(1),
                StepDraft::sector(SectorId(2)).at(1),
            ],
            ..Default::default()
        }
        .into_definition();
        assert!(matches!(result, Err(NexusError::Validation(_))));
    }

    #[test]
    fn blank_name_is_rejected() {
        let result = NewRoute {
            name: "   ".into(),
            ..Default::default()
        }
        .into_definition();
        assert!(matches!(result, Err(NexusError::Validation(_))));
    }

    #[test]
    fn step_serializes_with_kind_tag() {
        let json = serde_json::to_value(Step::user(2, UserId(11))).unwrap();
        assert_eq!(json["kind"], "USER");
        assert_eq!(json["user_id"], 11);
        assert_eq!(json["ordinal"], 2);

        let back: Step = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), StepKind::User);
        assert_eq!(back.user_id(), Some(UserId(11)));
        assert_eq!(back.sector_id(), None);
    }
}
