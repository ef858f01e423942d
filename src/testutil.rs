// Synthetic seasons shared by the pipeline tests.
use chrono::{Duration, NaiveDate};

use crate::io::GameRow;
use crate::teams::TeamRegistry;

const TEAMS: [&str; 4] = ["ATL", "BOS", "CHI", "LAL"];
const BASE_POINTS: [u32; 4] = [100, 105, 95, 110];

/// Four teams, ten games each, where the home side always wins. Every pairing
/// meets both home and away.
pub fn synthetic_season(registry: &TeamRegistry) -> Vec<GameRow> {
    season(registry, |_, _| false)
}

/// Same schedule, but BOS also wins both of its trips to ATL, so the result is
/// no longer a function of the home flag alone.
pub fn mixed_season(registry: &TeamRegistry) -> Vec<GameRow> {
    season(registry, |home, away| TEAMS[home] == "ATL" && TEAMS[away] == "BOS")
}

/// `away_wins(home, away)` marks the games the visitors take. The winner scores
/// ten over its base.
fn season(registry: &TeamRegistry, away_wins: impl Fn(usize, usize) -> bool) -> Vec<GameRow> {
    let pairings = [[(0, 1), (2, 3)], [(0, 2), (1, 3)], [(0, 3), (1, 2)]];
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

    let mut rows = Vec::new();
    for round in 0..10 {
        let date = start + Duration::days(round as i64 * 2);
        let flip = (round / 3) % 2 == 1;
        for (g, &(a, b)) in pairings[round % 3].iter().enumerate() {
            let (home, away) = if flip { (b, a) } else { (a, b) };
            let home_win = !away_wins(home, away);
            let bonus = |won: bool| if won { 10 } else { 0 };
            let game_id = format!("00223{:02}{}", round, g);
            let (h, v) = (TEAMS[home], TEAMS[away]);
            rows.push(GameRow {
                team_id: registry.lookup_abbreviation(h).unwrap(),
                game_id: game_id.clone(),
                game_date: date,
                matchup: format!("{} vs. {}", h, v),
                win: home_win,
                points: BASE_POINTS[home] + bonus(home_win),
            });
            rows.push(GameRow {
                team_id: registry.lookup_abbreviation(v).unwrap(),
                game_id,
                game_date: date,
                matchup: format!("{} @ {}", v, h),
                win: !home_win,
                points: BASE_POINTS[away] + bonus(!home_win),
            });
        }
    }
    rows
}
