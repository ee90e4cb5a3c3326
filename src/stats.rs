//! Estatísticas das pendências visíveis para um ator.
//!
//! Mesmo critério de visibilidade da listagem, opcionalmente restrito por
//! um intervalo de datas de criação (inclusivo nas duas pontas).

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::transfer::Ticket;
use crate::visibility::{Actor, VisibilityPolicy};

/// Intervalo de datas de criação; pontas ausentes ficam em aberto.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    /// Whether `at` falls within the range, counting the whole of the `to` day.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let after_start = self
            .from
            .is_none_or(|from| at >= from.and_time(NaiveTime::MIN).and_utc());
        let before_end = self.to.is_none_or(|to| match to.checked_add_days(Days::new(1)) {
            Some(next) => at < next.and_time(NaiveTime::MIN).and_utc(),
            None => true,
        });
        after_start && before_end
    }
}

/// Contagem de um valor agrupado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketStatistics {
    pub total: u64,
    pub overdue: u64,
    pub by_status: Vec<ValueCount>,
    pub by_situation: Vec<ValueCount>,
    pub by_priority: Vec<ValueCount>,
}

pub struct StatisticsAggregator;

impl StatisticsAggregator {
    pub fn aggregate<'a>(
        tickets: impl IntoIterator<Item = &'a Ticket>,
        actor: &Actor,
        range: Option<DateRange>,
        now: DateTime<Utc>,
    ) -> TicketStatistics {
        let range = range.unwrap_or_default();
        let selected: Vec<&Ticket> = tickets
            .into_iter()
            .filter(|t| VisibilityPolicy::visible(t, actor))
            .filter(|t| range.contains(t.created_at))
            .collect();

        TicketStatistics {
            total: selected.len() as u64,
            overdue: selected.iter().filter(|t| is_overdue(t, now)).count() as u64,
            by_status: count_by(selected.iter().map(|t| t.status.as_deref())),
            by_situation: count_by(selected.iter().map(|t| t.situation.as_deref())),
            by_priority: count_by(selected.iter().map(|t| t.priority.as_deref())),
        }
    }
}

/// Prazo vencido: criação + prazo em dias já passou.
pub fn is_overdue(ticket: &Ticket, now: DateTime<Utc>) -> bool {
    let Some(days) = ticket.response_deadline_days else {
        return false;
    };
    match ticket.created_at.checked_add_signed(TimeDelta::days(i64::from(days))) {
        Some(deadline) => deadline < now,
        None => false,
    }
}

/// Counts trimmed, non-blank values; highest count first, ties in first-seen order.
fn count_by<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<ValueCount> {
    let mut counts: Vec<ValueCount> = Vec::new();
    for value in values.flatten().map(str::trim).filter(|v| !v.is_empty()) {
        match counts.iter_mut().find(|c| c.value == value) {
            Some(c) => c.count += 1,
            None => counts.push(ValueCount {
                value: value.to_string(),
                count: 1,
            }),
        }
    }
    // sort_by is stable, so ties keep their first-seen order.
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{SectorId, TicketId, UserId};

    fn viewer() -> Actor {
        Actor {
            id: UserId(1),
            sector_id: Some(SectorId(1)),
            privilege_level: 0,
        }
    }

    fn ticket(id: i64, created_at: DateTime<Utc>) -> Ticket {
        let mut t = Ticket::new(TicketId(id), id.to_string(), created_at);
        t.sector_id = Some(SectorId(1));
        t
    }

    fn at(date: &str) -> DateTime<Utc> {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn overdue_when_deadline_passed() {
        let now = Utc::now();
        let mut t = ticket(1, now - TimeDelta::days(5));
        t.response_deadline_days = Some(2);

        let stats = StatisticsAggregator::aggregate([&t], &viewer(), None, now);
        assert_eq!(stats.total, 1);
        assert_eq!(stats.overdue, 1);
    }

    #[test]
    fn not_overdue_without_deadline_or_within_it() {
        let now = Utc::now();
        let no_deadline = ticket(1, now - TimeDelta::days(30));
        let mut within = ticket(2, now - TimeDelta::days(1));
        within.response_deadline_days = Some(3);

        let stats = StatisticsAggregator::aggregate([&no_deadline, &within], &viewer(), None, now);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.overdue, 0);
    }

    #[test]
    fn invisible_tickets_are_ignored() {
        let now = Utc::now();
        let mine = ticket(1, now);
        let mut other_user = ticket(2, now);
        other_user.user_id = Some(UserId(99));
        let mut other_sector = ticket(3, now);
        other_sector.sector_id = Some(SectorId(2));

        let stats = StatisticsAggregator::aggregate([&mine, &other_user, &other_sector], &viewer(), None, now);
        assert_eq!(stats.total, 1);
    }

    #[test]
    fn date_range_is_inclusive_on_both_ends() {
        let tickets = [
            ticket(1, at("2024-03-01")),
            ticket(2, at("2024-03-10")),
            ticket(3, at("2024-03-11")),
            ticket(4, at("2024-02-29")),
        ];
        let range = DateRange::new(Some(date("2024-03-01")), Some(date("2024-03-10")));
        let stats = StatisticsAggregator::aggregate(tickets.iter(), &viewer(), Some(range), Utc::now());
        assert_eq!(stats.total, 2);
    }

    #[test]
    fn open_ended_ranges() {
        let tickets = [ticket(1, at("2020-01-01")), ticket(2, at("2024-06-01"))];
        let since = DateRange::new(Some(date("2024-01-01")), None);
        let until = DateRange::new(None, Some(date("2021-01-01")));

        let stats = StatisticsAggregator::aggregate(tickets.iter(), &viewer(), Some(since), Utc::now());
        assert_eq!(stats.total, 1);
        let stats = StatisticsAggregator::aggregate(tickets.iter(), &viewer(), Some(until), Utc::now());
        assert_eq!(stats.total, 1);
    }

    #[test]
    fn group_counts_sorted_descending_with_stable_ties() {
        let now = Utc::now();
        let statuses = [Some("Quoted"), Some("New"), Some(" New "), None, Some("  "), Some("Closed"), Some("Quoted")];
        let tickets: Vec<Ticket> = statuses
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let mut t = ticket(i as i64, now);
                t.status = s.map(str::to_string);
                t
            })
            .collect();

        let stats = StatisticsAggregator::aggregate(tickets.iter(), &viewer(), None, now);
        assert_eq!(
            stats.by_status,
            vec![
                ValueCount { value: "Quoted".into(), count: 2 },
                ValueCount { value: "New".into(), count: 2 },
                ValueCount { value: "Closed".into(), count: 1 },
            ]
        );
        assert!(stats.by_priority.is_empty());
    }
}
