// PNG charts for the evaluation and prediction results.
use std::fmt::Display;
use std::path::Path;

use plotters::prelude::*;

use crate::error::{Error, Result};
use crate::metrics::{Evaluation, CLASS_NAMES};
use crate::predict::PredictionResult;

const SIZE: (u32, u32) = (1000, 600);

fn plot_err<E: Display>(e: E) -> Error {
    Error::Plot(e.to_string())
}

/// Horizontal bar chart of feature importances, largest on top.
pub fn plot_feature_importance(path: &Path, ranked: &[(String, f64)]) -> Result<()> {
    let names: Vec<&str> = ranked.iter().map(|(n, _)| n.as_str()).collect();
    let count = ranked.len();
    let max_x = ranked.iter().map(|(_, c)| *c).fold(0.0_f64, f64::max).max(1e-6);

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Feature Importance", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(140)
        .build_cartesian_2d(0.0..max_x * 1.1, 0..count)
        .map_err(plot_err)?;

    // Row 0 is drawn at the bottom, so the ranking is flipped onto the axis.
    chart
        .configure_mesh()
        .disable_mesh()
        .y_labels(count)
        .y_label_formatter(&|idx| {
            let i = *idx;
            if i < count {
                names[count - 1 - i].to_string()
            } else {
                String::new()
            }
        })
        .x_desc("Importance")
        .y_desc("Feature")
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(ranked.iter().enumerate().map(|(i, (_, imp))| {
            let row = count - 1 - i;
            Rectangle::new([(0.0, row), (*imp, row + 1)], BLUE.mix(0.5).filled())
        }))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

/// 2x2 heatmap, actual class on rows (loss on top) and predicted class on columns.
pub fn plot_confusion_matrix(path: &Path, eval: &Evaluation) -> Result<()> {
    let max = eval.confusion.iter().flatten().copied().max().unwrap_or(0).max(1) as f64;

    let root = BitMapBackend::new(path, (600, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Confusion Matrix ({})", eval.model), ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(0.0..2.0, 0.0..2.0)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(0)
        .y_labels(0)
        .x_desc(format!("Predicted ({} | {})", CLASS_NAMES[0], CLASS_NAMES[1]))
        .y_desc(format!("Actual ({} | {})", CLASS_NAMES[1], CLASS_NAMES[0]))
        .draw()
        .map_err(plot_err)?;

    for (actual, row) in eval.confusion.iter().enumerate() {
        for (predicted, &n) in row.iter().enumerate() {
            let x = predicted as f64;
            let y = 1.0 - actual as f64;
            let shade = 255 - (n as f64 / max * 200.0) as u8;
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [(x, y), (x + 1.0, y + 1.0)],
                    RGBColor(shade, shade, 255).filled(),
                )))
                .map_err(plot_err)?;
            chart
                .draw_series(std::iter::once(Text::new(
                    n.to_string(),
                    (x + 0.45, y + 0.55),
                    ("sans-serif", 32).into_font(),
                )))
                .map_err(plot_err)?;
        }
    }

    root.present().map_err(plot_err)?;
    Ok(())
}

/// One ROC curve per model against the chance diagonal.
pub fn plot_roc(path: &Path, evals: &[Evaluation]) -> Result<()> {
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("ROC Curve", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..1.0, 0.0..1.0)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("False positive rate")
        .y_desc("True positive rate")
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(vec![(0.0, 0.0), (1.0, 1.0)], &BLACK.mix(0.4)))
        .map_err(plot_err)?;

    for (i, eval) in evals.iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(LineSeries::new(eval.roc.iter().copied(), color.stroke_width(2)))
            .map_err(plot_err)?
            .label(format!("{} (AUC = {:.3})", eval.model, eval.auc))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Histogram of test-set win probabilities, ten bins, one bar group per model.
pub fn plot_probability_distribution(path: &Path, evals: &[Evaluation]) -> Result<()> {
    const BINS: usize = 10;
    let counts: Vec<[usize; BINS]> = evals
        .iter()
        .map(|e| {
            let mut c = [0usize; BINS];
            for &p in &e.probabilities {
                c[((p * BINS as f64) as usize).min(BINS - 1)] += 1;
            }
            c
        })
        .collect();
    let max_count = counts.iter().flatten().copied().max().unwrap_or(0).max(1);

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Predicted Win Probability", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..1.0, 0.0..max_count as f64 * 1.1)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("P(win)")
        .y_desc("Games")
        .draw()
        .map_err(plot_err)?;

    let bin_width = 1.0 / BINS as f64;
    let bar_width = bin_width / evals.len().max(1) as f64;
    for (m, (eval, c)) in evals.iter().zip(&counts).enumerate() {
        let color = Palette99::pick(m).to_rgba();
        chart
            .draw_series(c.iter().enumerate().map(|(b, &n)| {
                let x0 = b as f64 * bin_width + m as f64 * bar_width;
                Rectangle::new([(x0, 0.0), (x0 + bar_width * 0.9, n as f64)], color.mix(0.7).filled())
            }))
            .map_err(plot_err)?
            .label(eval.model.clone())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Side-by-side win probabilities of both teams, one group per model.
pub fn plot_head_to_head(path: &Path, team: &str, opponent: &str, results: &[PredictionResult]) -> Result<()> {
    let groups = results.len().max(1) as f64;

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{} vs {}", team, opponent), ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(20)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..groups, 0.0..1.15)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(0)
        .y_desc("Win probability")
        .draw()
        .map_err(plot_err)?;

    let sides = [(team, BLUE), (opponent, RED)];
    for (s, (name, color)) in sides.iter().enumerate() {
        let color = *color;
        chart
            .draw_series(results.iter().enumerate().map(|(i, r)| {
                let p = if s == 0 { r.team_win_probability } else { r.opponent_win_probability };
                let x0 = i as f64 + 0.1 + s as f64 * 0.42;
                Rectangle::new([(x0, 0.0), (x0 + 0.38, p)], color.mix(0.6).filled())
            }))
            .map_err(plot_err)?
            .label(name.to_string())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], color.filled()));
    }

    chart
        .draw_series(results.iter().enumerate().map(|(i, r)| {
            Text::new(
                format!("{}: {:.1}% / {:.1}%", r.model, r.team_win_probability * 100.0, r.opponent_win_probability * 100.0),
                (i as f64 + 0.1, 1.08),
                ("sans-serif", 18).into_font(),
            )
        }))
        .map_err(plot_err)?;

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}
