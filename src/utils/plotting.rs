use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Result};
use log::{info, warn};
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::config::defs::{PLOT_ROW_HEIGHT, PLOT_WIDTH, PLOT_X_MIN};
use crate::utils::stats::FqStats;


/// Points outlining the area under a histogram.
/// A lone bin `x` becomes the segment `[x-1, x]` so it still has width.
pub fn area_points(bins: &BTreeMap<u32, u64>) -> Vec<(f64, f64)> {
    let mut points: Vec<(f64, f64)> = bins.iter().map(|(&x, &c)| (x as f64, c as f64)).collect();
    if points.len() == 1 {
        let (x, c) = points[0];
        points = vec![(x - 1.0, c), (x, c)];
    }
    points
}

/// Axis maxima shared by every row: (max length, max length count, max avg qual, max qual count).
pub fn global_maxima<'a, I>(stats: I) -> (u32, u64, u32, u64)
where
    I: IntoIterator<Item = &'a FqStats>,
{
    stats.into_iter().fold((0, 0, 0, 0), |acc, s| {
        (
            acc.0.max(s.max_length),
            acc.1.max(s.max_length_count),
            acc.2.max(s.max_avg_qual),
            acc.3.max(s.max_qual_count),
        )
    })
}

fn draw_panel(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    caption: &str,
    bins: &BTreeMap<u32, u64>,
    x_max: u32,
    y_max: u64,
    color: &RGBColor,
) -> Result<()> {
    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 16))
        .margin(5)
        .x_label_area_size(25)
        .y_label_area_size(45)
        .build_cartesian_2d(PLOT_X_MIN..x_max as f64, 0f64..y_max as f64)?;

    chart.configure_mesh()
        .disable_mesh()
        .draw()?;

    chart.draw_series(
        AreaSeries::new(area_points(bins), 0.0, color.mix(0.4)).border_style(color),
    )?;
    Ok(())
}


/// Draws read length and average quality distributions, one row per file.
///
/// # Arguments
///
/// * `named_stats` - (display name, statistics) in row order.
/// * `output_path` - PNG to write.
///
/// # Returns
/// Number of rows drawn. Files without sequences are skipped; an error is
/// returned when nothing is left to draw.
pub fn plot_fqs(named_stats: &[(String, FqStats)], output_path: &Path) -> Result<usize> {
    let kept: Vec<&(String, FqStats)> = named_stats
        .iter()
        .filter(|(name, stats)| {
            if !stats.is_plottable() {
                warn!("Skipping {} because it has no sequences", name);
            }
            stats.is_plottable()
        })
        .collect();

    if kept.is_empty() {
        return Err(anyhow!("None of the given files contain sequences to plot"));
    }

    let (max_length, max_length_count, max_qual, max_qual_count) =
        global_maxima(kept.iter().map(|(_, s)| s));

    let rows = kept.len();
    let root = BitMapBackend::new(output_path, (PLOT_WIDTH, PLOT_ROW_HEIGHT * rows as u32))
        .into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((rows, 2));

    for (i, (name, stats)) in kept.iter().enumerate() {
        draw_panel(
            &panels[2 * i],
            &format!("{} Read Length", name),
            &stats.length_bins,
            max_length,
            max_length_count,
            &BLUE,
        )?;
        draw_panel(
            &panels[2 * i + 1],
            &format!("{} Avg Qual", name),
            &stats.qual_bins,
            max_qual,
            max_qual_count,
            &GREEN,
        )?;
    }

    root.present()?;
    info!("Wrote {} row(s) to {}", rows, output_path.display());
    Ok(rows)
}
