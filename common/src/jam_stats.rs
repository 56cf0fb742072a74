//! Turn a game's jam ledger into per-jammer and per-line summaries and a running score.
//!
//! Everything here is a pure function of its inputs: the jam list is never
//! mutated and nothing is cached between calls. Anomalies in the ledger
//! (missing jammer, missing line, missing points, stale registry references)
//! only ever lead to fewer rows or zero contributions, never to an error.
//!
//! Jammer rows are ordered by the skater's display number compared as a
//! string, so "10" sorts before "2".

use crate::{
    GameStatsReport, JamRecord, JammerSummary, LineRegistry, LineSummary, PeriodFilter,
    Selection, SkaterRegistry, TeamSide, TimelinePoint,
};
use itertools::Itertools;
use log::{debug, trace};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Counters accumulated over the jams of one jammer or one line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    jam_count: u32,
    lead_count: u32,
    points_for: u32,
    points_against: u32,
}

impl Tally {
    fn add(&mut self, jam: &JamRecord, side: TeamSide) {
        self.jam_count += 1;
        if jam.had_lead(side) {
            self.lead_count += 1;
        }
        self.points_for = self.points_for.saturating_add(jam.points(side));
        self.points_against = self
            .points_against
            .saturating_add(jam.points(side.opposite()));
    }

    fn lead_percentage(&self) -> f64 {
        if self.jam_count == 0 {
            0.0
        } else {
            f64::from(self.lead_count) / f64::from(self.jam_count) * 100.0
        }
    }
}

/// Group the jams passing `period` by `key`, skipping jams where the key is absent.
fn tally_by<'a, F>(jams: &'a [JamRecord], side: TeamSide, period: PeriodFilter, key: F) -> HashMap<&'a str, Tally>
where
    F: Fn(&'a JamRecord) -> Option<&'a str>,
{
    let mut tallies: HashMap<&str, Tally> = HashMap::new();
    for jam in jams.iter().filter(|jam| period.matches(jam.period)) {
        if let Some(id) = key(jam) {
            tallies.entry(id).or_default().add(jam, side);
        }
    }
    tallies
}

/// Summarize every skater who jammed for `side` in the selected period.
///
/// Ids that are not in `skaters` are dropped. Rows are sorted by display
/// number as a string, then by name and id.
#[must_use]
pub fn summarize_by_jammer(
    jams: &[JamRecord],
    side: TeamSide,
    period: PeriodFilter,
    skaters: &SkaterRegistry,
) -> Vec<JammerSummary> {
    tally_by(jams, side, period, |jam| jam.jammer_id(side))
        .into_iter()
        .filter_map(|(skater_id, tally)| {
            let Some(skater) = skaters.get(skater_id) else {
                debug!("Dropping jammer stats for unknown skater {skater_id}");
                return None;
            };
            Some(JammerSummary {
                skater_id: skater.id.clone(),
                skater_number: skater.number.clone(),
                skater_name: skater.name.clone(),
                jam_count: tally.jam_count,
                lead_count: tally.lead_count,
                lead_percentage: tally.lead_percentage(),
                points_for: tally.points_for,
                points_against: tally.points_against,
            })
        })
        .sorted_by(|a, b| {
            a.skater_number
                .cmp(&b.skater_number)
                .then_with(|| a.skater_name.cmp(&b.skater_name))
                .then_with(|| a.skater_id.cmp(&b.skater_id))
        })
        .collect()
}

/// Summarize every line that skated for `side` in the selected period.
/// Rows are sorted by line name ignoring case, then by exact name and id.
#[must_use]
pub fn summarize_by_line(
    jams: &[JamRecord],
    side: TeamSide,
    period: PeriodFilter,
    lines: &LineRegistry,
) -> Vec<LineSummary> {
    tally_by(jams, side, period, |jam| jam.line_id(side))
        .into_iter()
        .filter_map(|(line_id, tally)| {
            let Some(line) = lines.get(line_id) else {
                debug!("Dropping line stats for unknown line {line_id}");
                return None;
            };
            Some(LineSummary {
                line_id: line.id.clone(),
                line_name: line.name.clone(),
                jam_count: tally.jam_count,
                lead_count: tally.lead_count,
                lead_percentage: tally.lead_percentage(),
                points_for: tally.points_for,
                points_against: tally.points_against,
            })
        })
        .sorted_by_cached_key(|row| {
            (
                row.line_name.to_lowercase(),
                row.line_name.clone(),
                row.line_id.clone(),
            )
        })
        .collect()
}

/// Cumulative score after each jam, in (period, jam number) order.
#[must_use]
pub fn compute_score_timeline(jams: &[JamRecord], period: PeriodFilter) -> Vec<TimelinePoint> {
    let mut home_score: u32 = 0;
    let mut visiting_score: u32 = 0;

    jams.iter()
        .filter(|jam| period.matches(jam.period))
        .sorted_by_key(|jam| (jam.period, jam.jam_number))
        .map(|jam| {
            home_score = home_score.saturating_add(jam.points(TeamSide::Home));
            visiting_score = visiting_score.saturating_add(jam.points(TeamSide::Visiting));
            let label = match period {
                PeriodFilter::All => format!("P{} J{}", jam.period, jam.jam_number),
                _ => format!("J{}", jam.jam_number),
            };
            trace!("{label}: {home_score}-{visiting_score}");
            TimelinePoint {
                label,
                home_score,
                visiting_score,
            }
        })
        .collect()
}

/// Number of jams in the selected period with a jammer recorded for `side`.
#[must_use]
pub fn count_side_jams(jams: &[JamRecord], side: TeamSide, period: PeriodFilter) -> usize {
    jams.iter()
        .filter(|jam| period.matches(jam.period) && jam.jammer_id(side).is_some())
        .count()
}

/// The (home, visiting) score at the end of the timeline.
#[must_use]
pub fn final_score(timeline: &[TimelinePoint]) -> (u32, u32) {
    timeline
        .last()
        .map_or((0, 0), |p| (p.home_score, p.visiting_score))
}

/// Compute everything the stats page shows for one selection.
#[must_use]
pub fn build_report(
    selection: &Selection,
    jams: &[JamRecord],
    skaters: &SkaterRegistry,
    lines: &LineRegistry,
) -> GameStatsReport {
    let timeline = compute_score_timeline(jams, selection.period);
    GameStatsReport {
        selection: selection.clone(),
        total_jams: count_side_jams(jams, selection.side, selection.period),
        jammers: summarize_by_jammer(jams, selection.side, selection.period, skaters),
        lines: summarize_by_line(jams, selection.side, selection.period, lines),
        final_score: final_score(&timeline),
        timeline,
    }
}

/// Something odd about a jam ledger. The aggregation still accepts the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerIssue {
    DuplicateJam { period: u8, jam_number: u32 },
    InvalidPeriod { period: u8, jam_number: u32 },
    ZeroJamNumber { period: u8 },
    MissingJams { period: u8, first: u32, last: u32 },
}

impl fmt::Display for LedgerIssue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LedgerIssue::DuplicateJam { period, jam_number } => {
                write!(f, "jam P{period} J{jam_number} is recorded more than once")
            }
            LedgerIssue::InvalidPeriod { period, jam_number } => {
                write!(f, "jam J{jam_number} has invalid period {period}")
            }
            LedgerIssue::ZeroJamNumber { period } => {
                write!(f, "period {period} has a jam numbered 0")
            }
            LedgerIssue::MissingJams {
                period,
                first,
                last,
            } if first == last => write!(f, "jam P{period} J{first} is missing"),
            LedgerIssue::MissingJams {
                period,
                first,
                last,
            } => write!(f, "jams P{period} J{first}-J{last} are missing"),
        }
    }
}

/// Look for duplicate slots, bad periods and gaps in jam numbering.
#[must_use]
pub fn check_ledger(jams: &[JamRecord]) -> Vec<LedgerIssue> {
    let mut issues = Vec::new();
    let mut by_period: BTreeMap<u8, Vec<u32>> = BTreeMap::new();

    for jam in jams {
        if !(1..=2).contains(&jam.period) {
            issues.push(LedgerIssue::InvalidPeriod {
                period: jam.period,
                jam_number: jam.jam_number,
            });
            continue;
        }
        by_period.entry(jam.period).or_default().push(jam.jam_number);
    }

    for (period, mut numbers) in by_period {
        numbers.sort_unstable();
        for (number, count) in numbers.iter().dedup_with_count().map(|(c, n)| (*n, c)) {
            if number == 0 {
                issues.push(LedgerIssue::ZeroJamNumber { period });
            } else if count > 1 {
                issues.push(LedgerIssue::DuplicateJam {
                    period,
                    jam_number: number,
                });
            }
        }

        let mut expected = 1;
        for number in numbers.into_iter().dedup().filter(|n| *n > 0) {
            if number > expected {
                issues.push(LedgerIssue::MissingJams {
                    period,
                    first: expected,
                    last: number - 1,
                });
            }
            expected = number + 1;
        }
    }

    issues
}
