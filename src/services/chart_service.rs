use std::error::Error;
use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{register_font, FontStyle, FontTransform};
use tracing::debug;

use crate::errors::AppError;
use crate::models::{
    AggregationResult, AuthorSentimentMatrix, CategoryCount, ChartSet, Granularity, PeriodCount,
    SentimentBucket, SentimentCategory,
};

/// Fixed colour per sentiment category, in display order
pub const SENTIMENT_PALETTE: [(SentimentCategory, RGBColor); 5] = [
    (SentimentCategory::StronglyPositive, RGBColor(0x81, 0xC3, 0xD7)),
    (SentimentCategory::Positive, RGBColor(0x21, 0x9E, 0xBC)),
    (SentimentCategory::Neutral, RGBColor(0xD9, 0xDC, 0xD6)),
    (SentimentCategory::Negative, RGBColor(0x2F, 0x66, 0x90)),
    (SentimentCategory::StronglyNegative, RGBColor(0x16, 0x42, 0x5B)),
];

/// Segment colour for labels outside the five categories
pub const OTHER_COLOR: RGBColor = RGBColor(0x9E, 0x9E, 0x9E);
pub const TIMELINE_COLOR: RGBColor = RGBColor(0x2F, 0x66, 0x90);

const FONT_FAMILY: &str = "sans-serif";
const NO_DATA: &str = "Aucune donnée disponible";

pub fn category_color(category: SentimentCategory) -> Result<RGBColor, AppError> {
    SENTIMENT_PALETTE
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, color)| *color)
        .ok_or_else(|| AppError::Render(format!("No colour for sentiment '{}'", category)))
}

pub fn bucket_color(bucket: SentimentBucket) -> Result<RGBColor, AppError> {
    match bucket {
        SentimentBucket::Category(category) => category_color(category),
        SentimentBucket::Other => Ok(OTHER_COLOR),
    }
}

/// Register the embedded TrueType face once per process
fn ensure_fonts() -> Result<(), AppError> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let registered = *REGISTERED.get_or_init(|| {
        register_font(
            FONT_FAMILY,
            FontStyle::Normal,
            epaint_default_fonts::UBUNTU_LIGHT,
        )
        .is_ok()
    });
    if registered {
        Ok(())
    } else {
        Err(AppError::Render("Failed to load the embedded chart font".to_string()))
    }
}

fn render_error<E: std::fmt::Display>(e: E) -> AppError {
    AppError::Render(e.to_string())
}

/// Draw onto a white RGB canvas of `size` and return it as PNG bytes
pub(crate) fn render_png<F>(size: (u32, u32), draw: F) -> Result<Vec<u8>, AppError>
where
    F: FnOnce(&DrawingArea<BitMapBackend<'_>, Shift>) -> Result<(), Box<dyn Error>>,
{
    ensure_fonts()?;

    let (width, height) = size;
    let mut pixels = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, size).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;
        draw(&root).map_err(render_error)?;
        root.present().map_err(render_error)?;
    }
    encode_png(width, height, &pixels)
}

fn encode_png(width: u32, height: u32, pixels: &[u8]) -> Result<Vec<u8>, AppError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().map_err(render_error)?;
        writer.write_image_data(pixels).map_err(render_error)?;
        writer.finish().map_err(render_error)?;
    }
    Ok(out)
}

/// Titled blank canvas with a centred notice
fn draw_empty(root: &DrawingArea<BitMapBackend<'_>, Shift>, title: &str) -> Result<(), Box<dyn Error>> {
    let area = root.titled(title, (FONT_FAMILY, 22))?;
    let (width, height) = area.dim_in_pixel();
    let style = (FONT_FAMILY, 16)
        .into_font()
        .color(&BLACK.mix(0.6))
        .pos(Pos::new(HPos::Center, VPos::Center));
    area.draw(&Text::new(
        NO_DATA.to_string(),
        ((width / 2) as i32, (height / 2) as i32),
        style,
    ))?;
    Ok(())
}

/// Upper bound of a count axis with some headroom
fn axis_ceiling(max: usize) -> u32 {
    let max = max as u32;
    max + (max / 10).max(1)
}

/// Count axis for the author chart. The longest bar stops at 70% of the
/// width so the legend in the upper right never covers a bar.
fn legend_ceiling(max: usize) -> u32 {
    let max = max as u32;
    (max * 10).div_ceil(7).max(max + 1)
}

/// Inclusive discrete range covering `n` slots. Always at least two values
/// wide so a single bar still maps onto the plotting area.
fn slot_range(n: usize) -> std::ops::Range<u32> {
    0..(n.max(2) - 1) as u32
}

fn slot_index(value: &SegmentValue<u32>) -> Option<usize> {
    match value {
        SegmentValue::Exact(i) | SegmentValue::CenterOf(i) => Some(*i as usize),
        SegmentValue::Last => None,
    }
}

/// Most period labels drawn under the timeline
const MAX_TIME_LABELS: usize = 40;
const TIME_LABEL_SIZE: u32 = 12;
/// Gap between the x axis and the start of a rotated label
const TIME_LABEL_GAP: i32 = 8;

/// Indices of the periods that get a label, evenly spaced
fn time_label_slots(n: usize) -> Vec<usize> {
    let step = n.div_ceil(MAX_TIME_LABELS).max(1);
    (0..n).step_by(step).collect()
}

/// Height of the label area under the timeline: room for the longest rotated
/// label plus the axis title
fn time_label_area(longest_label: u32) -> u32 {
    (longest_label + TIME_LABEL_GAP as u32 + 36).max(60)
}

/// Line chart of mentions per period, one marker per period
pub fn render_mentions_over_time(
    series: &[PeriodCount],
    granularity: Granularity,
) -> Result<Vec<u8>, AppError> {
    let title = format!("Évolution des mentions ({})", granularity.title_suffix());
    let labels: Vec<String> = series.iter().map(|p| p.period.to_string()).collect();

    render_png((1000, 480), |root| {
        if series.is_empty() {
            return draw_empty(root, &title);
        }

        // Plotters re-anchors mesh labels at their centre, which puts rotated
        // text across the axis. These are drawn by hand, hanging from the axis.
        let label_style = TextStyle::from(
            (FONT_FAMILY, TIME_LABEL_SIZE)
                .into_font()
                .transform(FontTransform::Rotate90),
        )
        .pos(Pos::new(HPos::Left, VPos::Center));
        let mut longest = 0;
        for label in &labels {
            longest = longest.max(root.estimate_text_size(label, &label_style)?.0);
        }

        let y_max = axis_ceiling(series.iter().map(|p| p.count).max().unwrap_or(0));
        let mut chart = ChartBuilder::on(root)
            .caption(&title, (FONT_FAMILY, 22))
            .margin(15)
            .x_label_area_size(time_label_area(longest))
            .y_label_area_size(50)
            .build_cartesian_2d(slot_range(series.len()).into_segmented(), 0u32..y_max)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(series.len().min(MAX_TIME_LABELS))
            .x_label_formatter(&|_| String::new())
            .x_desc("Période")
            .y_desc("Nombre d'articles")
            .draw()?;

        for i in time_label_slots(series.len()) {
            let (x, y) = chart.backend_coord(&(SegmentValue::CenterOf(i as u32), 0));
            root.draw(&Text::new(
                labels[i].clone(),
                (x, y + TIME_LABEL_GAP),
                label_style.clone(),
            ))?;
        }

        let points: Vec<(SegmentValue<u32>, u32)> = series
            .iter()
            .enumerate()
            .map(|(i, p)| (SegmentValue::CenterOf(i as u32), p.count as u32))
            .collect();

        chart.draw_series(LineSeries::new(
            points.clone(),
            TIMELINE_COLOR.stroke_width(2),
        ))?;
        chart.draw_series(
            points
                .into_iter()
                .map(|point| Circle::new(point, 4, TIMELINE_COLOR.filled())),
        )?;
        Ok(())
    })
}

/// One bar per sentiment category, coloured by category
pub fn render_sentiment_histogram(histogram: &[CategoryCount]) -> Result<Vec<u8>, AppError> {
    let title = "Répartition des sentiments";
    let colors = histogram
        .iter()
        .map(|c| category_color(c.category))
        .collect::<Result<Vec<_>, _>>()?;
    let labels: Vec<&str> = histogram.iter().map(|c| c.category.label()).collect();
    let total: usize = histogram.iter().map(|c| c.count).sum();

    render_png((640, 480), |root| {
        if total == 0 {
            return draw_empty(root, title);
        }

        let y_max = axis_ceiling(histogram.iter().map(|c| c.count).max().unwrap_or(0));
        let mut chart = ChartBuilder::on(root)
            .caption(title, (FONT_FAMILY, 22))
            .margin(15)
            .x_label_area_size(50)
            .y_label_area_size(50)
            .build_cartesian_2d(slot_range(histogram.len()).into_segmented(), 0u32..y_max)?;

        let label_of = |v: &SegmentValue<u32>| {
            slot_index(v)
                .and_then(|i| labels.get(i).map(|l| l.to_string()))
                .unwrap_or_default()
        };
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(histogram.len())
            .x_label_formatter(&label_of)
            .x_desc("Sentiment")
            .y_desc("Nombre d'articles")
            .draw()?;

        chart.draw_series(
            Histogram::vertical(&chart)
                .margin(12)
                .style_func(|x, _| {
                    slot_index(x)
                        .and_then(|i| colors.get(i))
                        .copied()
                        .unwrap_or(OTHER_COLOR)
                        .filled()
                })
                .data(
                    histogram
                        .iter()
                        .enumerate()
                        .map(|(i, c)| (i as u32, c.count as u32)),
                ),
        )?;
        Ok(())
    })
}

/// Horizontal stacked bars: one row per author, one segment per bucket
pub fn render_author_sentiment(matrix: &AuthorSentimentMatrix) -> Result<Vec<u8>, AppError> {
    let title = "Sentiment par auteur (top 10)";
    let colors = matrix
        .columns
        .iter()
        .map(|&bucket| bucket_color(bucket))
        .collect::<Result<Vec<_>, _>>()?;
    let authors: Vec<&str> = matrix.rows.iter().map(|r| r.author.as_str()).collect();

    // starts[j][i]: where bucket j begins on row i
    let mut starts = vec![vec![0u32; matrix.rows.len()]; matrix.columns.len()];
    for (i, row) in matrix.rows.iter().enumerate() {
        let mut offset = 0u32;
        for (j, &count) in row.counts.iter().enumerate() {
            if let Some(column) = starts.get_mut(j) {
                column[i] = offset;
            }
            offset += count as u32;
        }
    }

    render_png((1000, 600), |root| {
        if matrix.rows.is_empty() {
            return draw_empty(root, title);
        }

        let x_max = legend_ceiling(matrix.rows.iter().map(|r| r.total()).max().unwrap_or(0));
        let mut chart = ChartBuilder::on(root)
            .caption(title, (FONT_FAMILY, 22))
            .margin(15)
            .x_label_area_size(50)
            .y_label_area_size(180)
            .build_cartesian_2d(0u32..x_max, slot_range(matrix.rows.len()).into_segmented())?;

        let author_of = |v: &SegmentValue<u32>| {
            slot_index(v)
                .and_then(|i| authors.get(i).map(|a| a.to_string()))
                .unwrap_or_default()
        };
        chart
            .configure_mesh()
            .disable_y_mesh()
            .y_labels(matrix.rows.len())
            .y_label_formatter(&author_of)
            .x_desc("Nombre d'articles")
            .draw()?;

        for (j, bucket) in matrix.columns.iter().enumerate() {
            let color = colors[j];
            let column_starts = &starts[j];
            let segments = matrix.rows.iter().enumerate().filter_map(|(i, row)| {
                let count = row.counts.get(j).copied().unwrap_or(0) as u32;
                (count > 0).then(|| (i as u32, column_starts[i] + count))
            });

            chart
                .draw_series(
                    Histogram::horizontal(&chart)
                        .margin(6)
                        .style(color.filled())
                        .baseline_func(|y| {
                            slot_index(y)
                                .and_then(|i| column_starts.get(i))
                                .copied()
                                .unwrap_or(0)
                        })
                        .data(segments),
                )?
                .label(bucket.label())
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .label_font((FONT_FAMILY, 14))
            .draw()?;
        Ok(())
    })
}

/// Render all three report charts as base64 PNGs
pub fn render_charts(
    aggregation: &AggregationResult,
    granularity: Granularity,
) -> Result<ChartSet, AppError> {
    let charts = ChartSet {
        mentions_over_time: STANDARD.encode(render_mentions_over_time(
            &aggregation.mentions_over_time,
            granularity,
        )?),
        sentiment_distribution: STANDARD
            .encode(render_sentiment_histogram(&aggregation.sentiment_histogram)?),
        author_sentiment: STANDARD.encode(render_author_sentiment(&aggregation.author_sentiment)?),
    };
    debug!("Rendered report charts");
    Ok(charts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthorSentimentRow, Period};

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn histogram(counts: [usize; 5]) -> Vec<CategoryCount> {
        SentimentCategory::ORDERED
            .iter()
            .zip(counts)
            .map(|(&category, count)| CategoryCount { category, count })
            .collect()
    }

    #[test]
    fn test_palette_covers_every_category() {
        for category in SentimentCategory::ORDERED {
            assert!(category_color(category).is_ok());
        }
        assert_eq!(bucket_color(SentimentBucket::Other).unwrap(), OTHER_COLOR);
        assert_eq!(
            category_color(SentimentCategory::Positive).unwrap(),
            RGBColor(0x21, 0x9E, 0xBC)
        );
    }

    #[test]
    fn test_time_labels_are_thinned_evenly() {
        assert_eq!(time_label_slots(3), vec![0, 1, 2]);
        assert_eq!(time_label_slots(40).len(), 40);
        let slots = time_label_slots(200);
        assert_eq!(slots.len(), 40);
        assert_eq!(slots[1], 5);
        assert!(time_label_slots(0).is_empty());
    }

    #[test]
    fn test_time_label_area_fits_longest_label() {
        assert!(time_label_area(130) > 130 + TIME_LABEL_GAP as u32);
        assert_eq!(time_label_area(0), 60);
    }

    #[test]
    fn test_legend_ceiling_leaves_room_right_of_bars() {
        assert_eq!(legend_ceiling(0), 1);
        assert_eq!(legend_ceiling(1), 2);
        assert_eq!(legend_ceiling(7), 10);
        assert!(legend_ceiling(14) * 7 >= 14 * 10);
    }

    #[test]
    fn test_long_weekly_series_renders() {
        let monday = chrono::NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let series: Vec<PeriodCount> = (0..200)
            .map(|i| PeriodCount {
                period: Period::Week(monday + chrono::Duration::weeks(i)),
                count: (i % 7) as usize + 1,
            })
            .collect();
        let png = render_mentions_over_time(&series, Granularity::Week).unwrap();
        assert!(png.starts_with(&PNG_SIGNATURE));
    }

    #[test]
    fn test_slot_range_is_never_degenerate() {
        assert_eq!(slot_range(0), 0..1);
        assert_eq!(slot_range(1), 0..1);
        assert_eq!(slot_range(5), 0..4);
    }

    #[test]
    fn test_histogram_renders_png() {
        let png = render_sentiment_histogram(&histogram([1, 4, 2, 0, 3])).unwrap();
        assert!(png.starts_with(&PNG_SIGNATURE));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let series = vec![
            PeriodCount {
                period: Period::Month { year: 2023, month: 10 },
                count: 1,
            },
            PeriodCount {
                period: Period::Month { year: 2023, month: 11 },
                count: 2,
            },
        ];
        let first = render_mentions_over_time(&series, Granularity::Month).unwrap();
        let second = render_mentions_over_time(&series, Granularity::Month).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_inputs_render_placeholders() {
        assert!(render_mentions_over_time(&[], Granularity::Day)
            .unwrap()
            .starts_with(&PNG_SIGNATURE));
        assert!(render_sentiment_histogram(&histogram([0; 5]))
            .unwrap()
            .starts_with(&PNG_SIGNATURE));
        assert!(render_author_sentiment(&AuthorSentimentMatrix::default())
            .unwrap()
            .starts_with(&PNG_SIGNATURE));
    }

    #[test]
    fn test_author_chart_with_single_author() {
        let matrix = AuthorSentimentMatrix {
            columns: vec![
                SentimentBucket::Category(SentimentCategory::Positive),
                SentimentBucket::Other,
            ],
            rows: vec![AuthorSentimentRow {
                author: "A".to_string(),
                counts: vec![2, 1],
            }],
        };
        let png = render_author_sentiment(&matrix).unwrap();
        assert!(png.starts_with(&PNG_SIGNATURE));
    }
}
