//! Shape aggregated stats into the series a chart renderer consumes.
//! Colors, axes and the rest of the chart configuration belong to the renderer.

use crate::{GameStatsReport, JammerSummary, LineSummary, TeamSide, TimelinePoint};
use serde::{Deserialize, Serialize};

pub const NO_SCORE_DATA: &str = "No score data available for this period.";
pub const NO_JAMMER_DATA: &str = "No jammer data available for this team.";
pub const NO_BLOCKER_DATA: &str = "No blocker data available for this team.";

/// Common view over jammer and line rows.
pub trait SummaryRow {
    fn label(&self) -> String;
    fn jam_count(&self) -> u32;
    fn lead_count(&self) -> u32;
    fn lead_percentage(&self) -> f64;
    fn points_for(&self) -> u32;
    fn points_against(&self) -> u32;

    /// Points for minus points against. Negative when outscored.
    fn point_differential(&self) -> i64 {
        i64::from(self.points_for()) - i64::from(self.points_against())
    }
}

impl SummaryRow for JammerSummary {
    fn label(&self) -> String {
        format!("#{} {}", self.skater_number, self.skater_name)
    }
    fn jam_count(&self) -> u32 {
        self.jam_count
    }
    fn lead_count(&self) -> u32 {
        self.lead_count
    }
    fn lead_percentage(&self) -> f64 {
        self.lead_percentage
    }
    fn points_for(&self) -> u32 {
        self.points_for
    }
    fn points_against(&self) -> u32 {
        self.points_against
    }
}

impl SummaryRow for LineSummary {
    fn label(&self) -> String {
        self.line_name.clone()
    }
    fn jam_count(&self) -> u32 {
        self.jam_count
    }
    fn lead_count(&self) -> u32 {
        self.lead_count
    }
    fn lead_percentage(&self) -> f64 {
        self.lead_percentage
    }
    fn points_for(&self) -> u32 {
        self.points_for
    }
    fn points_against(&self) -> u32 {
        self.points_against
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    pub label: String,
    pub values: Vec<f64>,
}

/// One bar chart: a label per bar, one or more series, a tooltip per bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarChart {
    pub title: String,
    pub labels: Vec<String>,
    pub series: Vec<BarSeries>,
    pub tooltips: Vec<String>,
}

/// The three charts shown for jammers or for lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionCharts {
    pub jams_played: BarChart,
    pub lead_percentage: BarChart,
    pub points: BarChart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSeries {
    pub labels: Vec<String>,
    pub home_label: String,
    pub home_scores: Vec<u32>,
    pub visiting_label: String,
    pub visiting_scores: Vec<u32>,
}

/// A chart section, or the message to show instead when there is nothing to plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Data { charts: T },
    Empty { message: String },
}

impl<T> Section<T> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Section::Empty { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsCharts {
    pub selected_side: TeamSide,
    pub score: Section<ScoreSeries>,
    pub jammers: Section<SectionCharts>,
    pub blockers: Section<SectionCharts>,
}

fn percent_of(value: u32, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(value) / total as f64 * 100.0
    }
}

/// Tooltip for the jams played chart, e.g. "Jams played: 3/12 (25%)".
#[must_use]
pub fn jam_share_tooltip(jam_count: u32, total_jams: usize) -> String {
    format!(
        "Jams played: {jam_count}/{total_jams} ({:.0}%)",
        percent_of(jam_count, total_jams).round()
    )
}

/// Tooltip for the lead percentage chart, e.g. "Lead Percentage: 67% (2/3)".
#[must_use]
pub fn lead_tooltip(lead_percentage: f64, lead_count: u32, jam_count: u32) -> String {
    format!(
        "Lead Percentage: {:.0}% ({lead_count}/{jam_count})",
        lead_percentage.round()
    )
}

/// Build the jams played, lead percentage and points charts for a set of rows.
#[must_use]
pub fn section_charts<R: SummaryRow>(rows: &[R], total_jams: usize) -> SectionCharts {
    let labels: Vec<String> = rows.iter().map(SummaryRow::label).collect();

    let jams_played = BarChart {
        title: "Jams Played".to_string(),
        labels: labels.clone(),
        series: vec![BarSeries {
            label: "Jams Played".to_string(),
            values: rows.iter().map(|r| f64::from(r.jam_count())).collect(),
        }],
        tooltips: rows
            .iter()
            .map(|r| jam_share_tooltip(r.jam_count(), total_jams))
            .collect(),
    };

    let lead_percentage = BarChart {
        title: "Lead Percentage".to_string(),
        labels: labels.clone(),
        series: vec![BarSeries {
            label: "Lead Percentage".to_string(),
            values: rows.iter().map(SummaryRow::lead_percentage).collect(),
        }],
        tooltips: rows
            .iter()
            .map(|r| lead_tooltip(r.lead_percentage(), r.lead_count(), r.jam_count()))
            .collect(),
    };

    #[allow(clippy::cast_precision_loss)]
    let points = BarChart {
        title: "Points For and Against".to_string(),
        labels,
        series: vec![
            BarSeries {
                label: "Points For".to_string(),
                values: rows.iter().map(|r| f64::from(r.points_for())).collect(),
            },
            BarSeries {
                label: "Points Against".to_string(),
                values: rows.iter().map(|r| f64::from(r.points_against())).collect(),
            },
            BarSeries {
                label: "Total Score".to_string(),
                values: rows.iter().map(|r| r.point_differential() as f64).collect(),
            },
        ],
        tooltips: rows
            .iter()
            .map(|r| {
                format!(
                    "For: {}, Against: {}, Total: {}",
                    r.points_for(),
                    r.points_against(),
                    r.point_differential()
                )
            })
            .collect(),
    };

    SectionCharts {
        jams_played,
        lead_percentage,
        points,
    }
}

/// Split a timeline into parallel series for a line chart.
#[must_use]
pub fn score_series(timeline: &[TimelinePoint], home_label: &str, visiting_label: &str) -> ScoreSeries {
    ScoreSeries {
        labels: timeline.iter().map(|p| p.label.clone()).collect(),
        home_label: home_label.to_string(),
        home_scores: timeline.iter().map(|p| p.home_score).collect(),
        visiting_label: visiting_label.to_string(),
        visiting_scores: timeline.iter().map(|p| p.visiting_score).collect(),
    }
}

/// Everything the stats page plots for a report. Team names default to
/// "Home Team" and "Visiting Team".
#[must_use]
pub fn stats_charts(
    report: &GameStatsReport,
    home_name: Option<&str>,
    visiting_name: Option<&str>,
) -> StatsCharts {
    let score = if report.timeline.is_empty() {
        Section::Empty {
            message: NO_SCORE_DATA.to_string(),
        }
    } else {
        Section::Data {
            charts: score_series(
                &report.timeline,
                home_name.unwrap_or("Home Team"),
                visiting_name.unwrap_or("Visiting Team"),
            ),
        }
    };

    let jammers = if report.jammers.is_empty() {
        Section::Empty {
            message: NO_JAMMER_DATA.to_string(),
        }
    } else {
        Section::Data {
            charts: section_charts(&report.jammers, report.total_jams),
        }
    };

    let blockers = if report.lines.is_empty() {
        Section::Empty {
            message: NO_BLOCKER_DATA.to_string(),
        }
    } else {
        Section::Data {
            charts: section_charts(&report.lines, report.total_jams),
        }
    };

    StatsCharts {
        selected_side: report.selection.side,
        score,
        jammers,
        blockers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PeriodFilter, Selection};

    fn jammer(number: &str, name: &str, jams: u32, leads: u32, pf: u32, pa: u32) -> JammerSummary {
        JammerSummary {
            skater_id: format!("id-{number}"),
            skater_number: number.to_string(),
            skater_name: name.to_string(),
            jam_count: jams,
            lead_count: leads,
            lead_percentage: f64::from(leads) / f64::from(jams) * 100.0,
            points_for: pf,
            points_against: pa,
        }
    }

    fn empty_report() -> GameStatsReport {
        GameStatsReport {
            selection: Selection::new("g1", TeamSide::Visiting, PeriodFilter::First),
            total_jams: 0,
            jammers: vec![],
            lines: vec![],
            timeline: vec![],
            final_score: (0, 0),
        }
    }

    #[test]
    fn test_tooltips() {
        assert_eq!(jam_share_tooltip(3, 12), "Jams played: 3/12 (25%)");
        assert_eq!(jam_share_tooltip(2, 3), "Jams played: 2/3 (67%)");
        assert_eq!(jam_share_tooltip(0, 0), "Jams played: 0/0 (0%)");
        assert_eq!(
            lead_tooltip(66.666_666, 2, 3),
            "Lead Percentage: 67% (2/3)"
        );
        assert_eq!(lead_tooltip(50.0, 1, 2), "Lead Percentage: 50% (1/2)");
    }

    #[test]
    fn test_section_charts_for_jammers() {
        let rows = vec![
            jammer("10", "Tenacious", 3, 2, 12, 15),
            jammer("2", "Deuce", 1, 1, 4, 0),
        ];
        let charts = section_charts(&rows, 4);

        assert_eq!(charts.jams_played.labels, vec!["#10 Tenacious", "#2 Deuce"]);
        assert_eq!(charts.jams_played.series[0].values, vec![3.0, 1.0]);
        assert_eq!(charts.jams_played.tooltips[0], "Jams played: 3/4 (75%)");
        assert_eq!(charts.lead_percentage.tooltips[1], "Lead Percentage: 100% (1/1)");

        let totals = &charts.points.series[2];
        assert_eq!(totals.label, "Total Score");
        assert_eq!(totals.values, vec![-3.0, 4.0]);
    }

    #[test]
    fn test_line_label_is_name() {
        let row = LineSummary {
            line_id: "l1".to_string(),
            line_name: "Wall".to_string(),
            jam_count: 1,
            lead_count: 0,
            lead_percentage: 0.0,
            points_for: 0,
            points_against: 4,
        };
        assert_eq!(row.label(), "Wall");
        assert_eq!(row.point_differential(), -4);
    }

    #[test]
    fn test_empty_report_placeholders() {
        let charts = stats_charts(&empty_report(), None, None);

        assert_eq!(charts.selected_side, TeamSide::Visiting);
        assert_eq!(
            charts.score,
            Section::Empty {
                message: NO_SCORE_DATA.to_string()
            }
        );
        assert!(charts.jammers.is_empty());
        assert!(charts.blockers.is_empty());

        let json = serde_json::to_value(&charts).unwrap();
        assert_eq!(json["score"]["status"], "empty");
        assert_eq!(json["blockers"]["message"], NO_BLOCKER_DATA);
    }

    #[test]
    fn test_score_series_default_names() {
        let mut report = empty_report();
        report.timeline = vec![
            TimelinePoint {
                label: "J1".to_string(),
                home_score: 0,
                visiting_score: 4,
            },
            TimelinePoint {
                label: "J2".to_string(),
                home_score: 3,
                visiting_score: 4,
            },
        ];
        let charts = stats_charts(&report, Some("Rollergirls"), None);

        let Section::Data { charts: series } = charts.score else {
            panic!("expected score data");
        };
        assert_eq!(series.labels, vec!["J1", "J2"]);
        assert_eq!(series.home_label, "Rollergirls");
        assert_eq!(series.visiting_label, "Visiting Team");
        assert_eq!(series.home_scores, vec![0, 3]);
        assert_eq!(series.visiting_scores, vec![4, 4]);
    }
}
