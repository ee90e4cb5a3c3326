//! Saída de terminal do NEXUS.
//!
//! Usa a crate `console` para estilização com cores. Pendências, roteiros
//! e estatísticas são impressos como JSON formatado; listagens ganham um
//! resumo de uma linha por pendência.

use console::Style;
use serde::Serialize;

use nexus::NexusError;
use nexus::transfer::{Ticket, TransferState};

pub struct Printer {
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl Printer {
    pub fn new() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    pub fn success(&self, message: &str) {
        println!("  {} {message}", self.green.apply_to("✓"));
    }

    /// Falha com a categoria do erro, na saída de erro.
    pub fn failure(&self, error: &anyhow::Error) {
        match error.downcast_ref::<NexusError>() {
            Some(e) => eprintln!("  {} [{}] {e}", self.red.apply_to("✗"), e.kind()),
            None => eprintln!("  {} {error:#}", self.red.apply_to("✗")),
        }
    }

    /// Imprime um valor serializável em JSON formatado sob um título.
    pub fn json<T: Serialize>(&self, title: &str, value: &T) {
        println!("{}", self.dim.apply_to(format!("─── {title} ───")));
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }

    pub fn ticket_list(&self, tickets: &[Ticket]) {
        if tickets.is_empty() {
            println!("  {}", self.dim.apply_to("no tickets"));
            return;
        }
        for t in tickets {
            let transfer = match t.transfer {
                TransferState::Pending { .. } => self.yellow.apply_to(t.transfer.to_string()),
                _ => self.dim.apply_to(t.transfer.to_string()),
            };
            println!(
                "  #{:<5} {:<8} sector={:<6} user={:<6} {:<10} {}",
                t.id,
                t.number,
                display_or_dash(t.sector_id),
                display_or_dash(t.user_id),
                t.situation.as_deref().unwrap_or("—"),
                transfer,
            );
        }
    }
}

fn display_or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "—".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus::ids::SectorId;

    #[test]
    fn missing_values_render_as_dash() {
        assert_eq!(display_or_dash::<SectorId>(None), "—");
        assert_eq!(display_or_dash(Some(SectorId(4))), "4");
    }
}
