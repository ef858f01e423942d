// Module for getting game logs into memory: the per-team HTTP fetcher and a CSV
// cache of the combined table.
use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::teams::{Team, TeamId, TeamRegistry};

mod date_format {
    use chrono::NaiveDate;
    use serde::{self, Deserialize, Deserializer, Serializer};
    pub const FMT: &str = "%Y-%m-%d";

    pub fn serialize<S>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&date.format(FMT).to_string())
    }

    pub fn deserialize<'de, D>(d: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        NaiveDate::parse_from_str(s.trim(), FMT).map_err(serde::de::Error::custom)
    }
}

// `WL` column in the provider's own encoding.
mod wl_format {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(win: &bool, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(if *win { "W" } else { "L" })
    }

    pub fn deserialize<'de, D>(d: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        match s.trim() {
            "W" => Ok(true),
            "L" => Ok(false),
            other => Err(serde::de::Error::custom(format!("expected W or L, got '{}'", other))),
        }
    }
}

/// One team's participation in one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRow {
    #[serde(rename = "TEAM_ID")]   pub team_id: TeamId,
    #[serde(rename = "GAME_ID")]   pub game_id: String,
    #[serde(rename = "GAME_DATE", with = "date_format")]
                                   pub game_date: NaiveDate,
    #[serde(rename = "MATCHUP")]   pub matchup: String,
    #[serde(rename = "WL", with = "wl_format")]
                                   pub win: bool,
    #[serde(rename = "PTS")]       pub points: u32,
}

/// Anything that can produce the full game history of one team.
pub trait GameSource {
    fn team_games(&self, team: &Team) -> Result<Vec<GameRow>>;
}

/// Client for the stats provider's `leaguegamefinder` endpoint.
pub struct StatsClient {
    http: Client,
    base_url: String,
}

impl StatsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // The provider rejects requests that don't look like they come from its own site.
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
            ),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(REFERER, HeaderValue::from_static("https://www.nba.com/"));
        headers.insert("Origin", HeaderValue::from_static("https://www.nba.com"));
        headers.insert("x-nba-stats-origin", HeaderValue::from_static("stats"));
        headers.insert("x-nba-stats-token", HeaderValue::from_static("true"));

        let http = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(StatsClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl GameSource for StatsClient {
    fn team_games(&self, team: &Team) -> Result<Vec<GameRow>> {
        let url = format!("{}/leaguegamefinder", self.base_url);
        let team_id = team.id.to_string();
        debug!("Fetching game log for {} from {}", team.abbreviation, url);

        let body: Value = self
            .http
            .get(&url)
            .query(&[
                ("PlayerOrTeam", "T"),
                ("TeamID", team_id.as_str()),
                ("LeagueID", "00"),
            ])
            .send()?
            .error_for_status()?
            .json()?;

        parse_game_finder(&body)
    }
}

/// Decode a `leaguegamefinder` payload: the first result set, rows addressed by header name.
/// Unfinished games (null `WL`) are dropped.
pub fn parse_game_finder(body: &Value) -> Result<Vec<GameRow>> {
    let set = body["resultSets"]
        .get(0)
        .ok_or_else(|| Error::MalformedResponse("missing resultSets[0]".into()))?;
    let headers: Vec<&str> = set["headers"]
        .as_array()
        .ok_or_else(|| Error::MalformedResponse("missing headers".into()))?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    let rows = set["rowSet"]
        .as_array()
        .ok_or_else(|| Error::MalformedResponse("missing rowSet".into()))?;

    let col = |name: &str| {
        headers
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| Error::MalformedResponse(format!("missing column {}", name)))
    };
    let (team_c, game_c, date_c) = (col("TEAM_ID")?, col("GAME_ID")?, col("GAME_DATE")?);
    let (matchup_c, wl_c, pts_c) = (col("MATCHUP")?, col("WL")?, col("PTS")?);

    let mut out = Vec::with_capacity(rows.len());
    let mut unfinished = 0usize;
    for row in rows {
        let win = match row[wl_c].as_str() {
            Some("W") => true,
            Some("L") => false,
            _ => {
                unfinished += 1;
                continue;
            }
        };
        let team_id = row[team_c]
            .as_i64()
            .ok_or_else(|| Error::MalformedResponse(format!("bad TEAM_ID: {}", row[team_c])))?;
        let date_str = row[date_c]
            .as_str()
            .ok_or_else(|| Error::MalformedResponse(format!("bad GAME_DATE: {}", row[date_c])))?;
        let game_date = NaiveDate::parse_from_str(date_str, date_format::FMT)
            .map_err(|e| Error::MalformedResponse(format!("bad GAME_DATE {}: {}", date_str, e)))?;

        out.push(GameRow {
            team_id: TeamId(team_id),
            game_id: row[game_c].as_str().unwrap_or_default().to_string(),
            game_date,
            matchup: row[matchup_c].as_str().unwrap_or_default().to_string(),
            win,
            points: row[pts_c].as_u64().unwrap_or(0) as u32,
        });
    }

    if unfinished > 0 {
        warn!("Dropped {} rows without a result", unfinished);
    }
    Ok(out)
}

const MAX_BACKOFF_DOUBLINGS: u32 = 6;

/// Delay before retry number `attempt + 1`: 250ms doubling, capped at 16s.
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(250 * 2u64.pow(attempt.min(MAX_BACKOFF_DOUBLINGS)))
}

/// Retry an operation with exponential backoff.
pub fn with_retry<T, F>(mut operation: F, max_attempts: u32) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if attempt + 1 < attempts => {
                warn!("Attempt {} failed: {}", attempt + 1, e);
                thread::sleep(backoff(attempt));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Fetch every team's history in registry order. The first team that still fails
/// after retries aborts the whole fetch.
pub fn fetch_all_games(
    source: &dyn GameSource,
    teams: &[Team],
    max_attempts: u32,
) -> Result<Vec<GameRow>> {
    let mut all = Vec::new();
    for team in teams {
        let rows = with_retry(|| source.team_games(team), max_attempts).map_err(|e| Error::Fetch {
            team: team.abbreviation.to_string(),
            source: Box::new(e),
        })?;
        info!("{}: {} games", team.abbreviation, rows.len());
        all.extend(rows);
    }
    Ok(all)
}

/// Every row must belong to a team in the registry.
pub fn validate_closed_world(rows: &[GameRow], registry: &TeamRegistry) -> Result<()> {
    match rows.iter().find(|r| !registry.contains_id(r.team_id)) {
        Some(r) => Err(Error::UnknownTeamId(r.team_id.0)),
        None => Ok(()),
    }
}

pub fn load_games_csv<P: AsRef<Path>>(path: P) -> Result<Vec<GameRow>> {
    let file = File::open(path)?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(true)
        .from_reader(file);

    let headers = rdr.headers()?.clone();
    let mut out = Vec::new();
    for result in rdr.records() {
        let raw: StringRecord = result?;
        // Skip completely empty lines
        if raw.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        out.push(raw.deserialize::<GameRow>(Some(&headers))?);
    }
    Ok(out)
}

pub fn save_games_csv<P: AsRef<Path>>(path: P, rows: &[GameRow]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}
