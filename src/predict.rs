// Single-matchup prediction from already fitted state.
use ndarray::Array2;
use tracing::debug;

use crate::encoder::LabelEncoder;
use crate::error::{Error, Result};
use crate::model::{win_label, Classifier, EncodedRow, FEATURE_NAMES};
use crate::preprocess::{latest_row, EngineeredRow};
use crate::teams::TeamRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionRequest {
    pub team: String,
    pub opponent: String,
    pub is_home: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub model: String,
    /// 1 when `team` is predicted to win
    pub label: usize,
    pub team_win_probability: f64,
    pub opponent_win_probability: f64,
}

/// Build the one-row feature matrix for `request`, in training column order.
/// The team's average and previous result come from its latest engineered row.
pub fn feature_row(
    request: &PredictionRequest,
    registry: &TeamRegistry,
    table: &[EngineeredRow],
    encoder: &LabelEncoder,
) -> Result<Array2<f64>> {
    let team_id = registry
        .lookup_abbreviation(&request.team)
        .ok_or_else(|| Error::UnknownTeam(request.team.clone()))?;
    let opponent_id = registry
        .lookup_abbreviation(&request.opponent)
        .ok_or_else(|| Error::UnknownTeam(request.opponent.clone()))?;

    let latest = latest_row(table, team_id).ok_or_else(|| Error::EmptyHistory(request.team.clone()))?;
    let row = EncodedRow {
        team: encoder.transform(team_id)?,
        opponent: encoder.transform(opponent_id)?,
        avg_points: latest.avg_points,
        is_home: request.is_home,
        prev_outcome: latest.prev_outcome,
        win: false,
    };

    let features = row.features();
    debug!(
        "Feature row for {} v {}: {:?}",
        request.team,
        request.opponent,
        FEATURE_NAMES.iter().zip(features.iter()).collect::<Vec<_>>()
    );
    Array2::from_shape_vec((1, FEATURE_NAMES.len()), features.to_vec())
        .map_err(|e| Error::Fit(e.to_string()))
}

pub fn predict(
    model: &dyn Classifier,
    request: &PredictionRequest,
    registry: &TeamRegistry,
    table: &[EngineeredRow],
    encoder: &LabelEncoder,
) -> Result<PredictionResult> {
    let x = feature_row(request, registry, table, encoder)?;
    let p_win = model.predict_proba(&x)?[0];
    Ok(PredictionResult {
        model: model.name().to_string(),
        label: win_label(p_win),
        team_win_probability: p_win,
        opponent_win_probability: 1.0 - p_win,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{encode_rows, fit_encoder, to_matrix, ForestClassifier, ForestParams, KnnClassifier};
    use crate::preprocess::{build_features, AverageMode};
    use crate::testutil::synthetic_season;
    use crate::teams::TeamId;
    use approx::assert_relative_eq;
    use ndarray::Array1;
    use std::cell::Cell;

    fn fitted() -> (TeamRegistry, Vec<EngineeredRow>, LabelEncoder, ForestClassifier, KnnClassifier) {
        let reg = TeamRegistry::nba();
        let table = build_features(&synthetic_season(&reg), &reg, AverageMode::Season);
        let enc = fit_encoder(&table);
        let (x, y) = to_matrix(&encode_rows(&table, &enc).unwrap());
        let forest = ForestClassifier::fit(&x, &y, &ForestParams { n_trees: 31, max_depth: None, seed: 42 }).unwrap();
        let knn = KnnClassifier::fit(&x, &y, 5).unwrap();
        (reg, table, enc, forest, knn)
    }

    fn request(team: &str, opponent: &str, is_home: bool) -> PredictionRequest {
        PredictionRequest { team: team.into(), opponent: opponent.into(), is_home }
    }

    #[test]
    fn probabilities_sum_to_one_and_match_label() {
        let (reg, table, enc, forest, knn) = fitted();
        for model in [&forest as &dyn Classifier, &knn] {
            for home in [true, false] {
                let r = predict(model, &request("BOS", "LAL", home), &reg, &table, &enc).unwrap();
                assert_relative_eq!(r.team_win_probability + r.opponent_win_probability, 1.0, epsilon = 1e-12);
                assert_eq!(r.team_win_probability > 0.5, r.label == 1);
            }
        }
    }

    #[test]
    fn forest_favours_the_home_side() {
        let (reg, table, enc, forest, _) = fitted();
        let home = predict(&forest, &request("BOS", "LAL", true), &reg, &table, &enc).unwrap();
        let away = predict(&forest, &request("BOS", "LAL", false), &reg, &table, &enc).unwrap();
        assert_eq!(home.label, 1);
        assert_eq!(away.label, 0);
    }

    #[test]
    fn feature_row_uses_latest_history() {
        let (reg, table, enc, _, _) = fitted();
        let x = feature_row(&request("BOS", "LAL", true), &reg, &table, &enc).unwrap();
        let bos = reg.lookup_abbreviation("BOS").unwrap();
        let latest = latest_row(&table, bos).unwrap();
        assert_eq!(x.shape(), &[1, 5]);
        assert_eq!(x[(0, 0)], enc.transform(bos).unwrap() as f64);
        assert_relative_eq!(x[(0, 2)], latest.avg_points);
        assert_eq!(x[(0, 3)], 1.0);
        assert_eq!(x[(0, 4)], if latest.prev_outcome { 1.0 } else { 0.0 });
    }

    #[test]
    fn unknown_and_unseen_teams_fail() {
        let (reg, table, enc, forest, _) = fitted();
        assert!(matches!(
            predict(&forest, &request("XYZ", "LAL", true), &reg, &table, &enc),
            Err(Error::UnknownTeam(_))
        ));
        // MIA is registered but absent from the synthetic season
        assert!(matches!(
            predict(&forest, &request("MIA", "LAL", true), &reg, &table, &enc),
            Err(Error::EmptyHistory(_))
        ));
        assert!(matches!(
            predict(&forest, &request("BOS", "MIA", true), &reg, &table, &enc),
            Err(Error::UnseenCategory(id)) if TeamId(id) == reg.lookup_abbreviation("MIA").unwrap()
        ));
    }

    /// Fixed-probability model that counts how often it is scored.
    struct CountingModel {
        p_win: f64,
        calls: Cell<usize>,
    }

    impl Classifier for CountingModel {
        fn name(&self) -> &str {
            "counting"
        }

        fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
            self.calls.set(self.calls.get() + 1);
            Ok(Array1::from_elem(x.nrows(), self.p_win))
        }
    }

    #[test]
    fn model_is_scored_once_per_prediction() {
        let (reg, table, enc, _, _) = fitted();
        for (p_win, label) in [(0.7, 1), (0.5, 0), (0.2, 0)] {
            let model = CountingModel { p_win, calls: Cell::new(0) };
            let r = predict(&model, &request("BOS", "LAL", true), &reg, &table, &enc).unwrap();
            assert_eq!(model.calls.get(), 1);
            assert_eq!(r.label, label);
            assert_eq!(r.model, "counting");
            assert_relative_eq!(r.opponent_win_probability, 1.0 - p_win);
        }
    }
}
