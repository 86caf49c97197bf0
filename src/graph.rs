#![cfg(feature = "web")]
use crate::filter::FilteredView;
use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use plotters::prelude::*;
use std::ops::Range;
use thiserror::Error;

/// Why a chart could not be produced.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The view has no columns or no rows; the page shows no chart.
    #[error("nothing to render")]
    NothingToRender,

    #[error("failed to draw chart: {0}")]
    Drawing(String),

    #[error("failed to encode chart as PNG: {0}")]
    Encode(#[from] image::ImageError),
}

/// Configuration options for chart generation
///
/// Labels and dimensions of the PNG produced by [`create_line_graph`].
#[derive(Clone, Debug)]
pub struct GraphOptions {
    /// Title displayed at the top of the graph
    pub title: String,

    /// Label for the X-axis
    pub x_label: String,

    /// Label for the Y-axis
    pub y_label: String,

    /// Width of the graph in pixels
    pub width: u32,

    /// Height of the graph in pixels
    pub height: u32,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            title: "Graph".to_string(),
            x_label: "Year".to_string(),
            y_label: "Value".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Options for the chart of the single selected occupation.
pub fn single_options(view: &FilteredView, occupation: &str, width: u32, height: u32) -> GraphOptions {
    GraphOptions {
        title: format!(
            "{}: change from {} to {}",
            occupation, view.range.start, view.range.end
        ),
        x_label: "Year".to_string(),
        y_label: occupation.to_string(),
        width,
        height,
    }
}

/// Options for the chart comparing several occupations.
pub fn compare_options(view: &FilteredView, width: u32, height: u32) -> GraphOptions {
    GraphOptions {
        title: format!(
            "Selected occupations, {} to {}",
            view.range.start, view.range.end
        ),
        x_label: "Year".to_string(),
        y_label: "Value".to_string(),
        width,
        height,
    }
}

/// Axis extents for a view: `(x_range, y_range)`, both padded so that a
/// single point or a flat series still gets a drawable, non-empty axis.
///
/// Extents are widened to `i128` so that padding any pair of `i64` counts
/// cannot overflow.
pub fn axis_ranges(view: &FilteredView) -> Option<(Range<i128>, Range<i128>)> {
    if view.is_empty() {
        return None;
    }

    let years = view.years();
    let min_x = i128::from(*years.iter().min()?);
    let max_x = i128::from(*years.iter().max()?);

    let values = view
        .rows
        .iter()
        .flat_map(|r| r.values.iter().map(|&v| i128::from(v)));
    let (min_y, max_y) = values.fold((i128::MAX, i128::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));

    let x_pad = if min_x == max_x { 1 } else { 0 };
    let y_pad = ((max_y - min_y) / 10).max(1);

    Some((
        (min_x - x_pad)..(max_x + x_pad),
        (min_y - y_pad)..(max_y + y_pad),
    ))
}

/// Creates a line graph from a filtered view
///
/// One line per view column, a circle on every data point, one x tick per
/// year and integer y ticks. A legend is drawn when there is more than one line.
///
/// # Arguments
/// * `view` - Rows and columns to plot
/// * `options` - Graph labels and size
///
/// # Returns
/// * A Result containing the PNG image data as bytes or an error
pub fn create_line_graph(view: &FilteredView, options: &GraphOptions) -> Result<Vec<u8>, RenderError> {
    let (x_range, y_range) = axis_ranges(view).ok_or(RenderError::NothingToRender)?;
    let (width, height) = (options.width, options.height);
    let mut pixels = vec![0u8; (width * height * 3) as usize];

    {
        let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(drawing)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&options.title, ("sans-serif", 24).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range, y_range)
            .map_err(drawing)?;

        let years = view.years();
        chart
            .configure_mesh()
            .x_desc(&options.x_label)
            .y_desc(&options.y_label)
            .x_labels(years.len() + 2)
            .x_label_formatter(&|x| x.to_string())
            .y_label_formatter(&|y| y.to_string())
            .x_label_style(("sans-serif", 11).into_font())
            .draw()
            .map_err(drawing)?;

        for (idx, name) in view.columns.iter().enumerate() {
            let color = Palette99::pick(idx).to_rgba();
            let points: Vec<(i128, i128)> = view
                .series(idx)
                .into_iter()
                .map(|(year, value)| (i128::from(year), i128::from(value)))
                .collect();

            chart
                .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))
                .map_err(drawing)?
                .label(name.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));

            chart
                .draw_series(points.iter().map(|&p| Circle::new(p, 4, color.filled())))
                .map_err(drawing)?;
        }

        if view.columns.len() > 1 {
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(&BLACK)
                .draw()
                .map_err(drawing)?;
        }

        root.present().map_err(drawing)?;
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(&pixels, width, height, image::ColorType::Rgb8)?;
    Ok(png)
}

fn drawing(e: impl std::fmt::Display) -> RenderError {
    RenderError::Drawing(e.to_string())
}
