//! SVG learning-curve charts
//!
//! Renders the validation-error curves of one sweep campaign into a single
//! SVG so the runs can be compared side by side.

use std::fs;
use std::path::Path;

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 500.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 160.0;
const MARGIN_BOTTOM: f64 = 80.0;
const MARGIN_LEFT: f64 = 80.0;

const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

/// Series colors, cycled when a campaign has more runs than entries
pub const PALETTE: [&str; 6] = [
    "#3498db", "#2ecc71", "#e74c3c", "#9b59b6", "#f39c12", "#1abc9c",
];

/// One learning curve to draw
#[derive(Debug, Clone)]
pub struct CurveSeries {
    pub name: String,
    /// Validation error per epoch, in [0, 1]
    pub errors: Vec<f64>,
    pub color: String,
}

impl CurveSeries {
    pub fn new(name: impl Into<String>, errors: Vec<f64>, index: usize) -> Self {
        Self {
            name: name.into(),
            errors,
            color: PALETTE[index % PALETTE.len()].to_string(),
        }
    }
}

/// Render curves as an SVG string. Epochs go on x, error (as %) on y.
pub fn render_learning_curves(title: &str, series: &[CurveSeries]) -> String {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let epochs = series.iter().map(|s| s.errors.len()).max().unwrap_or(0);
    // a single epoch still needs a non-zero x span
    let x_span = (epochs.saturating_sub(1)).max(1) as f64;
    let y_max = 100.0;

    let x_of = |epoch: usize| MARGIN_LEFT + (epoch as f64 / x_span) * plot_width;
    let y_of = |err: f64| MARGIN_TOP + plot_height - (err * 100.0 / y_max) * plot_height;

    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        CHART_WIDTH, CHART_HEIGHT, CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        (MARGIN_LEFT + plot_width / 2.0), COLOR_TEXT, escape_xml(title)
    ));

    for i in 0..=5 {
        let y = MARGIN_TOP + plot_height - (i as f64 / 5.0) * plot_height;
        let value = (i as f64 / 5.0) * y_max;
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT, y, MARGIN_LEFT + plot_width, y, COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.0}%</text>"#,
            MARGIN_LEFT - 10.0, y + 4.0, COLOR_TEXT, value
        ));
    }

    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP + plot_height, MARGIN_LEFT + plot_width, MARGIN_TOP + plot_height, COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, MARGIN_TOP + plot_height, COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">Epoch</text>"#,
        MARGIN_LEFT + plot_width / 2.0, CHART_HEIGHT - 20.0, COLOR_TEXT
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {})">Validation error</text>"#,
        CHART_HEIGHT / 2.0, COLOR_TEXT, CHART_HEIGHT / 2.0
    ));

    for epoch in 0..epochs {
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{}">{}</text>"#,
            x_of(epoch), MARGIN_TOP + plot_height + 20.0, COLOR_TEXT, epoch
        ));
    }

    for s in series.iter().filter(|s| !s.errors.is_empty()) {
        let path = s
            .errors
            .iter()
            .enumerate()
            .map(|(i, &err)| {
                let cmd = if i == 0 { "M" } else { "L" };
                format!("{} {:.2} {:.2}", cmd, x_of(i), y_of(err))
            })
            .collect::<Vec<_>>()
            .join(" ");

        svg.push_str(&format!(
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="3"/>"#,
            path, s.color
        ));
        for (i, &err) in s.errors.iter().enumerate() {
            svg.push_str(&format!(
                r#"<circle cx="{:.2}" cy="{:.2}" r="4" fill="{}" stroke="white" stroke-width="2"/>"#,
                x_of(i),
                y_of(err),
                s.color
            ));
        }
    }

    let mut legend_y = MARGIN_TOP + 10.0;
    for s in series {
        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="15" height="15" fill="{}"/>"#,
            CHART_WIDTH - MARGIN_RIGHT + 20.0, legend_y, s.color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            CHART_WIDTH - MARGIN_RIGHT + 40.0, legend_y + 12.0, COLOR_TEXT, escape_xml(&s.name)
        ));
        legend_y += 25.0;
    }

    svg.push_str("</svg>");
    svg
}

/// Render and write the chart
pub fn generate_learning_curve_chart(
    title: &str,
    series: &[CurveSeries],
    output_path: &Path,
) -> std::io::Result<()> {
    fs::write(output_path, render_learning_curves(title, series))
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_one_path_per_series() {
        let series = vec![
            CurveSeries::new("lr=0.1", vec![0.5, 0.3, 0.2], 0),
            CurveSeries::new("lr=0.01", vec![0.6, 0.4, 0.25], 1),
        ];
        let svg = render_learning_curves("Learning rates", &series);

        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<path").count(), 2);
        assert!(svg.contains("lr=0.01"));
    }

    #[test]
    fn test_single_epoch_curve_is_finite() {
        let series = vec![CurveSeries::new("only", vec![0.4], 0)];
        let svg = render_learning_curves("One epoch", &series);
        assert!(!svg.contains("NaN"));
        assert!(!svg.contains("inf"));
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b & c>"), "a&lt;b &amp; c&gt;");
    }

    #[test]
    fn test_chart_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curves.svg");
        let series = vec![CurveSeries::new("k=3", vec![0.9, 0.1], 0)];
        generate_learning_curve_chart("Filters", &series, &path).unwrap();
        assert!(path.exists());
    }
}
