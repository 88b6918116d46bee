use std::io::Cursor;
use std::path::PathBuf;
use image::{ImageFormat, RgbImage};
use plotters::prelude::LineSeries;
use plotters::prelude::*;
use crate::drivers::error::PotentiostatError;
/// One named line of (x, y) points.
#[derive(Clone, Debug, PartialEq)]
pub struct PlotSeries {
    pub name: Option<String>,
    pub points: Vec<(f64, f64)>,
}
impl PlotSeries {
    pub fn new(name: Option<&str>, points: Vec<(f64, f64)>) -> Self {
        Self {
            name: name.map(str::to_owned),
            points,
        }
    }
}
/// A chart handed to a [`Plotter`]; `name` doubles as the output file stem.
#[derive(Clone, Debug, PartialEq)]
pub struct Figure {
    pub name: String,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<PlotSeries>,
}
/// Sink for finished figures.
pub trait Plotter {
    fn render(&mut self, figure: &Figure) -> Result<(), PotentiostatError>;
}
/// Canvas size and colours. Series take palette colours in order.
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub foreground: RGBColor,
    pub palette: Vec<RGBColor>,
}
impl Default for PlotStyle {
    // 白底黑字，和实验报告里的图一致
    fn default() -> Self {
        Self {
            width: 1000,
            height: 800,
            background: WHITE,
            foreground: BLACK,
            palette: vec![RGBColor(31, 119, 180), RGBColor(255, 127, 14), RGBColor(44, 160, 44)],
        }
    }
}
impl PlotStyle {
    fn series_color(&self, idx: usize) -> RGBColor {
        if self.palette.is_empty() {
            return self.foreground;
        }
        self.palette[idx % self.palette.len()]
    }
}
/// Writes every figure to `<out_dir>/<figure name>.png`.
pub struct PngPlotter {
    out_dir: PathBuf,
    style: PlotStyle,
}
impl PngPlotter {
    pub fn new(out_dir: impl Into<PathBuf>, style: PlotStyle) -> Self {
        Self {
            out_dir: out_dir.into(),
            style,
        }
    }
}
impl Plotter for PngPlotter {
    fn render(&mut self, figure: &Figure) -> Result<(), PotentiostatError> {
        let png = render_figure_png(figure, &self.style)?;
        std::fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(format!("{}.png", figure.name));
        std::fs::write(&path, png)?;
        log::info!("plot written to {}", path.display());
        Ok(())
    }
}
/// Axis ranges covering every point, padded when a range collapses.
pub fn figure_bounds(figure: &Figure) -> Option<((f64, f64), (f64, f64))> {
    let mut points = figure.series.iter().flat_map(|s| s.points.iter().copied());
    let (x0, y0) = points.next()?;
    let (mut x_min, mut x_max, mut y_min, mut y_max) = (x0, x0, y0, y0);
    for (x, y) in points {
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }
    let widen = |lo: f64, hi: f64| {
        if (hi - lo).abs() < f64::EPSILON {
            (lo - 1.0, hi + 1.0)
        } else {
            (lo, hi)
        }
    };
    Some((widen(x_min, x_max), widen(y_min, y_max)))
}
/// Draws `figure` and returns it PNG-encoded.
pub fn render_figure_png(figure: &Figure, style: &PlotStyle) -> Result<Vec<u8>, PotentiostatError> {
    let ((x_min, x_max), (y_min, y_max)) = figure_bounds(figure).ok_or_else(|| {
        PotentiostatError::Plot(format!("figure '{}' has no points", figure.name))
    })?;
    let text = style.foreground;
    let mut rgb = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut rgb, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(&figure.title, ("sans-serif", 20).into_font().color(&text))
            .set_label_area_size(LabelAreaPosition::Left, 55)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
        chart
            .configure_mesh()
            .light_line_style(&text.mix(0.1))
            .x_desc(figure.x_label.as_str())
            .y_desc(figure.y_label.as_str())
            .label_style(("sans-serif", 12).into_font().color(&text))
            .draw()?;
        for (idx, series) in figure.series.iter().enumerate() {
            let color = style.series_color(idx);
            let drawn = chart.draw_series(LineSeries::new(series.points.iter().copied(), &color))?;
            if let Some(name) = &series.name {
                drawn
                    .label(name.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }
        }
        if figure.series.iter().any(|s| s.name.is_some()) {
            chart
                .configure_series_labels()
                .label_font(("sans-serif", 12).into_font().color(&text))
                .border_style(&text.mix(0.3))
                .background_style(&style.background)
                .draw()?;
        }
        root.present()?;
    }
    let image = RgbImage::from_raw(style.width, style.height, rgb)
        .ok_or_else(|| PotentiostatError::Plot(format!("canvas for '{}' has the wrong size", figure.name)))?;
    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png)?;
    Ok(png.into_inner())
}
