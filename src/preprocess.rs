// Feature engineering: opponent, venue, scoring average and previous result per game row.
use std::collections::HashMap;

use clap::ValueEnum;
use tracing::debug;

use crate::io::GameRow;
use crate::teams::{TeamId, TeamRegistry};

/// How the per-row scoring average is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AverageMode {
    /// Mean over all of a team's rows, later games included.
    #[default]
    Season,
    /// Mean over the team's strictly earlier rows; 0 for its first game.
    PointInTime,
}

/// A game row with its derived features.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredRow {
    pub game: GameRow,
    pub opponent_id: TeamId,
    pub is_home: bool,
    pub avg_points: f64,
    pub prev_outcome: bool,
}

impl EngineeredRow {
    pub fn team_id(&self) -> TeamId {
        self.game.team_id
    }
}

/// Resolve the opponent from "ABC vs. XYZ" (home) or "ABC @ XYZ" (away).
/// Anything that doesn't resolve through the registry maps back to `own_id`.
pub fn get_opponent_id(matchup: &str, own_id: TeamId, registry: &TeamRegistry) -> TeamId {
    let tail = if let Some(i) = matchup.rfind("vs.") {
        &matchup[i + "vs.".len()..]
    } else if let Some(i) = matchup.rfind('@') {
        &matchup[i + 1..]
    } else {
        return own_id;
    };
    registry.lookup_abbreviation(tail.trim()).unwrap_or(own_id)
}

pub fn is_home_game(matchup: &str) -> bool {
    matchup.contains("vs.")
}

/// Mean points per team over every row in `games`.
pub fn season_averages(games: &[GameRow]) -> HashMap<TeamId, f64> {
    let mut totals: HashMap<TeamId, (u64, u64)> = HashMap::new();
    for g in games {
        let e = totals.entry(g.team_id).or_default();
        e.0 += g.points as u64;
        e.1 += 1;
    }
    totals
        .into_iter()
        .map(|(id, (sum, n))| (id, sum as f64 / n as f64))
        .collect()
}

/// Row indices per team, sorted by game date. Same-day rows keep their input order.
fn chronological_indices(games: &[GameRow]) -> HashMap<TeamId, Vec<usize>> {
    let mut by_team: HashMap<TeamId, Vec<usize>> = HashMap::new();
    for (i, g) in games.iter().enumerate() {
        by_team.entry(g.team_id).or_default().push(i);
    }
    for idx in by_team.values_mut() {
        idx.sort_by_key(|&i| games[i].game_date);
    }
    by_team
}

/// Derive the engineered table. Output rows line up one-to-one with `games`.
pub fn build_features(games: &[GameRow], registry: &TeamRegistry, mode: AverageMode) -> Vec<EngineeredRow> {
    let mut prev_outcome = vec![false; games.len()];
    let mut avg_points = vec![0.0; games.len()];

    let season = season_averages(games);
    for (team, idx) in chronological_indices(games) {
        let mut running = 0u64;
        for (pos, &i) in idx.iter().enumerate() {
            if pos > 0 {
                prev_outcome[i] = games[idx[pos - 1]].win;
            }
            avg_points[i] = match mode {
                AverageMode::Season => season[&team],
                AverageMode::PointInTime if pos == 0 => 0.0,
                AverageMode::PointInTime => running as f64 / pos as f64,
            };
            running += games[i].points as u64;
        }
    }

    let rows: Vec<EngineeredRow> = games
        .iter()
        .enumerate()
        .map(|(i, g)| EngineeredRow {
            game: g.clone(),
            opponent_id: get_opponent_id(&g.matchup, g.team_id, registry),
            is_home: is_home_game(&g.matchup),
            avg_points: avg_points[i],
            prev_outcome: prev_outcome[i],
        })
        .collect();

    let fallbacks = rows.iter().filter(|r| r.opponent_id == r.team_id()).count();
    debug!(
        "Engineered {} rows ({:?} averages, {} unresolved opponents)",
        rows.len(),
        mode,
        fallbacks
    );
    rows
}

/// The team's chronologically last engineered row.
pub fn latest_row(rows: &[EngineeredRow], team: TeamId) -> Option<&EngineeredRow> {
    rows.iter()
        .filter(|r| r.team_id() == team)
        .fold(None, |best: Option<&EngineeredRow>, r| match best {
            Some(b) if b.game.game_date > r.game.game_date => Some(b),
            _ => Some(r),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    const BOS: TeamId = TeamId(1610612738);
    const LAL: TeamId = TeamId(1610612747);

    fn game(team: TeamId, day: u32, matchup: &str, win: bool, points: u32) -> GameRow {
        GameRow {
            team_id: team,
            game_id: format!("{}-{}", team, day),
            game_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            matchup: matchup.to_string(),
            win,
            points,
        }
    }

    #[test]
    fn opponent_from_both_matchup_shapes() {
        let reg = TeamRegistry::nba();
        assert_eq!(get_opponent_id("BOS vs. LAL", BOS, &reg), LAL);
        assert_eq!(get_opponent_id("BOS @ LAL", BOS, &reg), LAL);
        assert_eq!(get_opponent_id("LAL @ BOS", LAL, &reg), BOS);
        // repeated calls are stable
        assert_eq!(get_opponent_id("BOS @ LAL", BOS, &reg), get_opponent_id("BOS @ LAL", BOS, &reg));
    }

    #[test]
    fn unresolved_opponent_falls_back_to_own_id() {
        let reg = TeamRegistry::nba();
        // preseason game against a non-NBA club
        assert_eq!(get_opponent_id("BOS vs. MAC", BOS, &reg), BOS);
        assert_eq!(get_opponent_id("garbage", BOS, &reg), BOS);
    }

    #[test]
    fn home_flag_follows_separator() {
        assert!(is_home_game("BOS vs. LAL"));
        assert!(!is_home_game("BOS @ LAL"));
    }

    #[test]
    fn prev_outcome_uses_date_order_not_input_order() {
        let reg = TeamRegistry::nba();
        // input deliberately out of date order
        let games = vec![
            game(BOS, 3, "BOS vs. LAL", false, 90),
            game(BOS, 1, "BOS @ LAL", true, 110),
            game(LAL, 1, "LAL vs. BOS", false, 100),
            game(BOS, 2, "BOS vs. LAL", true, 100),
        ];
        let rows = build_features(&games, &reg, AverageMode::Season);
        // BOS day 1 is its first game
        assert!(!rows[1].prev_outcome);
        // day 2 follows the day-1 win
        assert!(rows[3].prev_outcome);
        // day 3 follows the day-2 win
        assert!(rows[0].prev_outcome);
        // LAL's only game
        assert!(!rows[2].prev_outcome);
    }

    #[test]
    fn season_average_is_whole_table_mean() {
        let reg = TeamRegistry::nba();
        let games = vec![
            game(BOS, 1, "BOS @ LAL", true, 110),
            game(BOS, 2, "BOS vs. LAL", true, 100),
            game(BOS, 3, "BOS vs. LAL", false, 91),
            game(LAL, 1, "LAL vs. BOS", false, 100),
        ];
        let rows = build_features(&games, &reg, AverageMode::Season);
        for r in rows.iter().filter(|r| r.team_id() == BOS) {
            assert_relative_eq!(r.avg_points, 301.0 / 3.0);
        }
        assert_relative_eq!(rows[3].avg_points, 100.0);

        let mut reversed = games.clone();
        reversed.reverse();
        let avgs = season_averages(&reversed);
        assert_relative_eq!(avgs[&BOS], 301.0 / 3.0);
    }

    #[test]
    fn point_in_time_average_only_sees_earlier_games() {
        let reg = TeamRegistry::nba();
        let games = vec![
            game(BOS, 1, "BOS @ LAL", true, 110),
            game(BOS, 2, "BOS vs. LAL", true, 100),
            game(BOS, 3, "BOS vs. LAL", false, 90),
        ];
        let rows = build_features(&games, &reg, AverageMode::PointInTime);
        assert_relative_eq!(rows[0].avg_points, 0.0);
        assert_relative_eq!(rows[1].avg_points, 110.0);
        assert_relative_eq!(rows[2].avg_points, 105.0);
    }

    #[test]
    fn latest_row_picks_most_recent_date() {
        let reg = TeamRegistry::nba();
        let games = vec![
            game(BOS, 2, "BOS vs. LAL", true, 100),
            game(BOS, 5, "BOS @ LAL", false, 95),
            game(BOS, 3, "BOS vs. LAL", true, 120),
        ];
        let rows = build_features(&games, &reg, AverageMode::Season);
        let last = latest_row(&rows, BOS).unwrap();
        assert_eq!(last.game.game_date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert!(last.prev_outcome);
        assert!(latest_row(&rows, LAL).is_none());
    }
}
