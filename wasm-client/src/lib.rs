//! WebAssembly interface for the game stats page.
//!
//! The browser app fetches rows from the hosted database itself and hands them
//! over as JSON strings. Every function here returns JSON as well, ready for
//! the chart components.

use derby_common::chart_series::stats_charts;
use derby_common::jam_stats::{
    build_report, compute_score_timeline, summarize_by_jammer, summarize_by_line,
};
use derby_common::{
    JamRecord, PeriodFilter, RosterLine, Selection, Skater, TeamSide, line_registry,
    skater_registry,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;

// Define the panic hook for better error messages in the browser
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
}

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);
}

fn parse_json<T: DeserializeOwned>(what: &str, json: &str) -> Result<T, String> {
    serde_json::from_str(json).map_err(|e| format!("Invalid {what}: {e}"))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("Failed to serialize result: {e}"))
}

fn parse_side(side: &str) -> Result<TeamSide, String> {
    side.parse()
}

fn parse_period(period: &str) -> Result<PeriodFilter, String> {
    period.parse()
}

pub fn jammer_stats(jams_json: &str, skaters_json: &str, side: &str, period: &str) -> Result<String, String> {
    let jams: Vec<JamRecord> = parse_json("jams", jams_json)?;
    let skaters: Vec<Skater> = parse_json("skaters", skaters_json)?;
    let rows = summarize_by_jammer(
        &jams,
        parse_side(side)?,
        parse_period(period)?,
        &skater_registry(skaters),
    );
    to_json(&rows)
}

pub fn line_stats(jams_json: &str, lines_json: &str, side: &str, period: &str) -> Result<String, String> {
    let jams: Vec<JamRecord> = parse_json("jams", jams_json)?;
    let lines: Vec<RosterLine> = parse_json("lines", lines_json)?;
    let rows = summarize_by_line(
        &jams,
        parse_side(side)?,
        parse_period(period)?,
        &line_registry(lines),
    );
    to_json(&rows)
}

pub fn score_timeline(jams_json: &str, period: &str) -> Result<String, String> {
    let jams: Vec<JamRecord> = parse_json("jams", jams_json)?;
    to_json(&compute_score_timeline(&jams, parse_period(period)?))
}

/// The full report plus chart series for one selection.
#[allow(clippy::too_many_arguments)]
pub fn game_stats(
    game_id: &str,
    jams_json: &str,
    skaters_json: &str,
    lines_json: &str,
    side: &str,
    period: &str,
    home_name: Option<String>,
    visiting_name: Option<String>,
) -> Result<String, String> {
    let jams: Vec<JamRecord> = parse_json("jams", jams_json)?;
    let skaters: Vec<Skater> = parse_json("skaters", skaters_json)?;
    let lines: Vec<RosterLine> = parse_json("lines", lines_json)?;
    let selection = Selection::new(game_id, parse_side(side)?, parse_period(period)?);

    let report = build_report(
        &selection,
        &jams,
        &skater_registry(skaters),
        &line_registry(lines),
    );
    let charts = stats_charts(&report, home_name.as_deref(), visiting_name.as_deref());
    to_json(&serde_json::json!({ "report": report, "charts": charts }))
}

/// Per-jammer rows as JSON.
#[wasm_bindgen]
pub fn summarize_by_jammer_json(
    jams_json: &str,
    skaters_json: &str,
    side: &str,
    period: &str,
) -> Result<String, JsValue> {
    jammer_stats(jams_json, skaters_json, side, period).map_err(|e| JsValue::from_str(&e))
}

/// Per-line rows as JSON.
#[wasm_bindgen]
pub fn summarize_by_line_json(
    jams_json: &str,
    lines_json: &str,
    side: &str,
    period: &str,
) -> Result<String, JsValue> {
    line_stats(jams_json, lines_json, side, period).map_err(|e| JsValue::from_str(&e))
}

/// Cumulative score points as JSON.
#[wasm_bindgen]
pub fn compute_score_timeline_json(jams_json: &str, period: &str) -> Result<String, JsValue> {
    score_timeline(jams_json, period).map_err(|e| {
        log(&e);
        JsValue::from_str(&e)
    })
}

/// Report and chart series as JSON.
#[wasm_bindgen]
#[allow(clippy::too_many_arguments)]
pub fn build_report_json(
    game_id: &str,
    jams_json: &str,
    skaters_json: &str,
    lines_json: &str,
    side: &str,
    period: &str,
    home_name: Option<String>,
    visiting_name: Option<String>,
) -> Result<String, JsValue> {
    game_stats(
        game_id,
        jams_json,
        skaters_json,
        lines_json,
        side,
        period,
        home_name,
        visiting_name,
    )
    .map_err(|e| {
        log(&e);
        JsValue::from_str(&e)
    })
}
