//! Read-only access to the hosted query API (PostgREST over HTTP).
//! Requests are retried with exponential backoff on 5xx errors and network failures.

use crate::conversions::{eq_filter, in_filter, normalize_base_url};
use crate::jam_stats::{build_report, check_ledger};
use crate::{
    CLIENT_REQUEST_TIMEOUT_SECS, DEFAULT_MAX_RETRIES, Game, GameStatsReport, JamRecord,
    LineRegistry, RequestToken, RosterLine, Selection, SelectionTracker, Skater, SkaterRegistry,
    line_registry, skater_registry,
};
use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::time::Duration;

const GAME_COLUMNS: &str = "id,home_team_id,home_team_color,visiting_team_id,visiting_team_color,\
start_date,location,\
home_team:teams!games_home_team_id_fkey(id,name,city,country),\
visiting_team:teams!games_visiting_team_id_fkey(id,name,city,country)";
const JAM_COLUMNS: &str = "game_id,period,jam_number,home_jammer_id,home_line_id,home_points,\
visiting_jammer_id,visiting_line_id,visiting_points,lead_team";

/// Where the store lives and how hard to try reaching it.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub api_base: String,
    pub api_key: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl StoreConfig {
    pub fn new(api_base: &str, api_key: impl Into<String>) -> Self {
        StoreConfig {
            api_base: normalize_base_url(api_base),
            api_key: api_key.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_secs: CLIENT_REQUEST_TIMEOUT_SECS,
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    #[must_use]
    pub fn table_url(&self, table: &str) -> String {
        format!("{}rest/v1/{table}", self.api_base)
    }
}

/// Failures worth another attempt against the store: the request timed out,
/// the connection was refused or dropped, or the host did not resolve.
/// Body and decode errors mean the store answered, so retrying will not help.
fn is_retryable_error(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request()
}

/// Short name of the failure class for retry warnings.
fn error_kind(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_request() {
        "request"
    } else if e.is_decode() {
        "malformed rows"
    } else if e.is_body() {
        "truncated body"
    } else {
        "other"
    }
}

/// Seconds to wait before the next attempt: 1, 2, 4, ...
fn backoff_secs(attempts: u32) -> u64 {
    2_u64.saturating_pow(attempts.saturating_sub(1))
}

/// Send a request, retrying 5xx responses and retry-able network errors.
/// Any other non-success status fails immediately with the response body.
async fn send_with_retry<F>(build_request: F, max_retries: u32) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        match build_request().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_server_error() {
                    let error_msg = response.text().await.unwrap_or_default();
                    if attempts < max_retries {
                        let sleep_secs = backoff_secs(attempts);
                        warn!(
                            "Server error ({status} {error_msg}), retrying in {sleep_secs} seconds... (attempt {attempts}/{max_retries})"
                        );
                        tokio::time::sleep(Duration::from_secs(sleep_secs)).await;
                        continue;
                    }
                    return Err(anyhow!(
                        "Server error after {attempts} attempts: {status} {error_msg}"
                    ));
                }
                if !status.is_success() {
                    let msg = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(anyhow!("Store returned an error ({status}): {msg}"));
                }
                return Ok(response);
            }
            Err(e) => {
                if is_retryable_error(&e) && attempts < max_retries {
                    let sleep_secs = backoff_secs(attempts);
                    warn!(
                        "Store unreachable ({}), retrying in {sleep_secs} seconds... (attempt {attempts}/{max_retries}): {e}",
                        error_kind(&e)
                    );
                    tokio::time::sleep(Duration::from_secs(sleep_secs)).await;
                    continue;
                }
                return Err(anyhow!(
                    "Store unreachable ({}) after {attempts} attempts: {e}",
                    error_kind(&e)
                ));
            }
        }
    }
}

/// Async, read-only client for the tables the stats page needs.
#[derive(Debug, Clone)]
pub struct StoreClient {
    http: Client,
    config: StoreConfig,
}

impl StoreClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(StoreClient { http, config })
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// GET `table` with PostgREST query parameters and decode the JSON rows.
    async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let url = self.config.table_url(table);
        debug!("GET {url} {query:?}");
        let response = send_with_retry(
            || {
                self.http
                    .get(&url)
                    .header("apikey", &self.config.api_key)
                    .bearer_auth(&self.config.api_key)
                    .query(query)
            },
            self.config.max_retries,
        )
        .await?;

        response
            .json::<Vec<T>>()
            .await
            .with_context(|| format!("Failed to deserialize rows from {table}"))
    }

    /// Fetch the game header with both teams embedded.
    ///
    /// # Errors
    /// Returns an error if the request fails or no game has this id.
    pub async fn fetch_game(&self, game_id: &str) -> Result<Game> {
        let games: Vec<Game> = self
            .select(
                "games",
                &[
                    ("select", GAME_COLUMNS.to_string()),
                    ("id", eq_filter(game_id)),
                ],
            )
            .await?;
        games
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Game not found: {game_id}"))
    }

    /// Fetch every jam of a game, ordered by period then jam number.
    ///
    /// # Errors
    /// Returns an error if the request fails or a row is malformed.
    pub async fn fetch_jams(&self, game_id: &str) -> Result<Vec<JamRecord>> {
        self.select(
            "jams",
            &[
                ("select", JAM_COLUMNS.to_string()),
                ("game_id", eq_filter(game_id)),
                ("order", "period.asc,jam_number.asc".to_string()),
            ],
        )
        .await
    }

    /// Look up skaters by id. An empty id set makes no request.
    ///
    /// # Errors
    /// Returns an error if the request fails or a row is malformed.
    pub async fn fetch_skaters(&self, ids: &BTreeSet<String>) -> Result<SkaterRegistry> {
        if ids.is_empty() {
            return Ok(SkaterRegistry::new());
        }
        let ids: Vec<&String> = ids.iter().collect();
        let skaters: Vec<Skater> = self
            .select(
                "skaters",
                &[
                    ("select", "id,number,name".to_string()),
                    ("id", in_filter(&ids)),
                ],
            )
            .await?;
        Ok(skater_registry(skaters))
    }

    /// Look up roster lines by id. An empty id set makes no request.
    ///
    /// # Errors
    /// Returns an error if the request fails or a row is malformed.
    pub async fn fetch_lines(&self, ids: &BTreeSet<String>) -> Result<LineRegistry> {
        if ids.is_empty() {
            return Ok(LineRegistry::new());
        }
        let ids: Vec<&String> = ids.iter().collect();
        let lines: Vec<RosterLine> = self
            .select(
                "roster_lines",
                &[("select", "id,name".to_string()), ("id", in_filter(&ids))],
            )
            .await?;
        Ok(line_registry(lines))
    }
}

/// Every jammer id recorded for either side.
#[must_use]
pub fn referenced_skaters(jams: &[JamRecord]) -> BTreeSet<String> {
    jams.iter()
        .flat_map(|jam| [jam.home_jammer_id.as_ref(), jam.visiting_jammer_id.as_ref()])
        .flatten()
        .cloned()
        .collect()
}

/// Every line id recorded for either side.
#[must_use]
pub fn referenced_lines(jams: &[JamRecord]) -> BTreeSet<String> {
    jams.iter()
        .flat_map(|jam| [jam.home_line_id.as_ref(), jam.visiting_line_id.as_ref()])
        .flatten()
        .cloned()
        .collect()
}

/// Load jams and both registries for `selection` and aggregate them.
///
/// `token` must come from `tracker.begin(selection)` at the moment the
/// selection was made, so the order of selections decides which load wins
/// and not the order in which the loads get polled. Returns `Ok(None)` when a
/// newer selection was made while the load was in flight, whether the load
/// succeeded or not.
///
/// # Errors
/// Returns an error if any retrieval of the current load fails. Nothing is
/// aggregated in that case.
pub async fn load_game_stats(
    client: &StoreClient,
    tracker: &SelectionTracker,
    token: RequestToken,
    selection: &Selection,
) -> Result<Option<GameStatsReport>> {
    let outcome = fetch_and_build(client, tracker, token, selection).await;
    match outcome {
        Ok(Some(report)) => Ok(tracker.accept(token, report)),
        Ok(None) => Ok(None),
        Err(_) if !tracker.is_current(token) => {
            debug!("Ignoring failure of superseded load #{}", token.generation());
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn fetch_and_build(
    client: &StoreClient,
    tracker: &SelectionTracker,
    token: RequestToken,
    selection: &Selection,
) -> Result<Option<GameStatsReport>> {
    let jams = client
        .fetch_jams(&selection.game_id)
        .await
        .context("Failed to load jams")?;
    if !tracker.is_current(token) {
        debug!("Selection changed while loading jams, skipping registries");
        return Ok(None);
    }

    let skater_ids = referenced_skaters(&jams);
    let line_ids = referenced_lines(&jams);
    let (skaters, lines) = tokio::try_join!(
        async {
            client
                .fetch_skaters(&skater_ids)
                .await
                .context("Failed to load skaters")
        },
        async {
            client
                .fetch_lines(&line_ids)
                .await
                .context("Failed to load roster lines")
        }
    )?;

    info!(
        "Loaded {} jams, {} skaters, {} lines for game {}",
        jams.len(),
        skaters.len(),
        lines.len(),
        selection.game_id
    );
    for issue in check_ledger(&jams) {
        warn!("Game {}: {issue}", selection.game_id);
    }
    Ok(Some(build_report(selection, &jams, &skaters, &lines)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PeriodFilter, TeamSide};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn jam(home_jammer: Option<&str>, visiting_line: Option<&str>) -> JamRecord {
        JamRecord {
            game_id: "g1".to_string(),
            period: 1,
            jam_number: 1,
            home_jammer_id: home_jammer.map(str::to_string),
            home_line_id: None,
            home_points: None,
            visiting_jammer_id: Some("v1".to_string()),
            visiting_line_id: visiting_line.map(str::to_string),
            visiting_points: None,
            lead_team: None,
        }
    }

    #[test]
    fn test_store_config() {
        let config = StoreConfig::new("abc.supabase.co", "key").with_max_retries(0);
        assert_eq!(config.api_base, "https://abc.supabase.co/");
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.table_url("jams"), "https://abc.supabase.co/rest/v1/jams");
    }

    #[test]
    fn test_backoff() {
        assert_eq!(backoff_secs(1), 1);
        assert_eq!(backoff_secs(2), 2);
        assert_eq!(backoff_secs(4), 8);
    }

    #[test]
    fn test_referenced_ids() {
        let jams = vec![jam(Some("h1"), None), jam(Some("h1"), Some("l9")), jam(None, None)];

        let skaters: Vec<String> = referenced_skaters(&jams).into_iter().collect();
        assert_eq!(skaters, vec!["h1", "v1"]);
        let lines: Vec<String> = referenced_lines(&jams).into_iter().collect();
        assert_eq!(lines, vec!["l9"]);
    }

    #[tokio::test]
    async fn test_empty_registries_skip_requests() {
        // Nothing listens here; an actual request would fail.
        let config = StoreConfig::new("http://127.0.0.1:9", "key").with_max_retries(1);
        let client = StoreClient::new(config).unwrap();

        assert!(client.fetch_skaters(&BTreeSet::new()).await.unwrap().is_empty());
        assert!(client.fetch_lines(&BTreeSet::new()).await.unwrap().is_empty());
    }

    fn refused_client() -> StoreClient {
        // Nothing listens here; every request fails to connect.
        let config = StoreConfig::new("http://127.0.0.1:9", "key").with_max_retries(1);
        StoreClient::new(config).unwrap()
    }

    /// Answer every request with an empty JSON array, calling `on_request`
    /// before each response is written.
    async fn empty_store<F>(on_request: F) -> StoreClient
    where
        F: Fn() + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let on_request = Arc::new(on_request);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let on_request = Arc::clone(&on_request);
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    on_request();
                    let response = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                                    content-length: 2\r\nconnection: close\r\n\r\n[]";
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        let config = StoreConfig::new(&format!("http://{addr}"), "key").with_max_retries(1);
        StoreClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_load_fails_without_store() {
        let client = refused_client();
        let tracker = SelectionTracker::new();
        let selection = Selection::new("g1", TeamSide::Home, PeriodFilter::All);

        let token = tracker.begin(selection.clone());
        let result = load_game_stats(&client, &tracker, token, &selection).await;
        assert!(result.is_err());
        assert_eq!(tracker.current_selection(), Some(selection));
    }

    #[tokio::test]
    async fn test_superseded_failure_is_silent() {
        let client = refused_client();
        let tracker = SelectionTracker::new();
        let older = Selection::new("g1", TeamSide::Home, PeriodFilter::All);
        let newer = older.with_period(PeriodFilter::First);

        let old_token = tracker.begin(older.clone());
        tracker.begin(newer.clone());
        let result = load_game_stats(&client, &tracker, old_token, &older).await;
        assert!(result.unwrap().is_none());
        assert_eq!(tracker.current_selection(), Some(newer));
    }

    #[tokio::test]
    async fn test_load_returns_report() {
        let client = empty_store(|| {}).await;
        let tracker = SelectionTracker::new();
        let selection = Selection::new("g1", TeamSide::Visiting, PeriodFilter::Second);

        let token = tracker.begin(selection.clone());
        let report = load_game_stats(&client, &tracker, token, &selection)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.selection, selection);
        assert_eq!(report.total_jams, 0);
        assert!(report.timeline.is_empty());
        assert_eq!(report.final_score, (0, 0));
    }

    #[tokio::test]
    async fn test_selection_changed_mid_flight() {
        let tracker = Arc::new(SelectionTracker::new());
        let older = Selection::new("g1", TeamSide::Home, PeriodFilter::All);
        let newer = older.with_side(TeamSide::Visiting);

        // The user switches side while the jams request is being answered
        let client = {
            let tracker = Arc::clone(&tracker);
            let newer = newer.clone();
            empty_store(move || {
                tracker.begin(newer.clone());
            })
            .await
        };

        let token = tracker.begin(older.clone());
        let result = load_game_stats(&client, &tracker, token, &older).await;
        assert!(result.unwrap().is_none());
        assert_eq!(tracker.current_selection(), Some(newer));
    }

    #[tokio::test]
    async fn test_latest_selection_wins_regardless_of_polling_order() {
        let client = empty_store(|| {}).await;
        let tracker = SelectionTracker::new();
        let older = Selection::new("g1", TeamSide::Visiting, PeriodFilter::All);
        let newer = older.with_period(PeriodFilter::First);

        let old_token = tracker.begin(older.clone());
        let new_token = tracker.begin(newer.clone());
        let (new_result, old_result) = tokio::join!(
            load_game_stats(&client, &tracker, new_token, &newer),
            load_game_stats(&client, &tracker, old_token, &older)
        );

        assert_eq!(new_result.unwrap().unwrap().selection, newer);
        assert!(old_result.unwrap().is_none());
        assert_eq!(tracker.current_selection(), Some(newer));
    }
}
