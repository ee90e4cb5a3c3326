//! Identificadores fortemente tipados.
//!
//! Setores, usuários, pendências e roteiros usam inteiros no armazenamento,
//! mas nunca devem ser trocados entre si: cada um ganha seu próprio newtype.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Identidade de uma pendência.
    TicketId
);
id_type!(
    /// Identidade de um roteiro.
    RouteId
);
id_type!(
    /// Setor organizacional.
    SectorId
);
id_type!(
    /// Usuário individual.
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&SectorId(7)).unwrap();
        assert_eq!(json, "7");
        let back: UserId = serde_json::from_str("42").unwrap();
        assert_eq!(back, UserId(42));
    }

    #[test]
    fn ids_display_their_number() {
        assert_eq!(TicketId(15).to_string(), "15");
        assert_eq!(RouteId::from(3).to_string(), "3");
    }
}
