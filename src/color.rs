use std::fmt;

use palette::{Hsl, IntoColor, Srgb};

use crate::data::summary::ProportionSummary;

/// An 8-bit sRGB colour, displayed as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChartColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ChartColor {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        ChartColor { r, g, b }
    }

    pub const GRAY: ChartColor = ChartColor::rgb(0x80, 0x80, 0x80);
}

impl fmt::Display for ChartColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Fixed colours for the campaign outcome labels.
const OUTCOME_COLORS: [(&str, ChartColor); 2] = [
    ("yes", ChartColor::rgb(0x39, 0xC8, 0x41)),
    ("no", ChartColor::rgb(0xDB, 0x13, 0x2B)),
];

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<ChartColor> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            ChartColor::rgb(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Color mapping: category label → ChartColor
// ---------------------------------------------------------------------------

/// One bar or slice of a proportion chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub label: String,
    pub percentage: f64,
    /// Rounded text shown on the bar, e.g. `60.0%`.
    pub text: String,
    pub color: ChartColor,
}

/// Maps the categories of a summary to colours, in summary order.
#[derive(Debug, Clone)]
pub struct ColorMap {
    mapping: Vec<(String, ChartColor)>,
    default_color: ChartColor,
}

impl ColorMap {
    /// Outcome labels get their fixed colours, any other label a palette
    /// colour.
    pub fn for_summary(summary: &ProportionSummary) -> Self {
        let others: Vec<&str> = summary
            .entries()
            .iter()
            .map(|p| p.category.as_str())
            .filter(|c| fixed_color(c).is_none())
            .collect();
        let mut palette = generate_palette(others.len()).into_iter();

        let mapping = summary
            .entries()
            .iter()
            .map(|p| {
                let color = fixed_color(&p.category)
                    .or_else(|| palette.next())
                    .unwrap_or(ChartColor::GRAY);
                (p.category.clone(), color)
            })
            .collect();

        ColorMap {
            mapping,
            default_color: ChartColor::GRAY,
        }
    }

    /// Look up the colour for a given label.
    pub fn color_for(&self, label: &str) -> ChartColor {
        self.mapping
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, c)| *c)
            .unwrap_or(self.default_color)
    }

    /// Return the legend entries (label → colour).
    pub fn legend_entries(&self) -> &[(String, ChartColor)] {
        &self.mapping
    }

    /// Chart-ready rows for `summary`, coloured by this map.
    pub fn series(&self, summary: &ProportionSummary) -> Vec<ChartPoint> {
        summary
            .entries()
            .iter()
            .map(|p| ChartPoint {
                label: p.category.clone(),
                percentage: p.percentage,
                text: ProportionSummary::display_label(p.percentage),
                color: self.color_for(&p.category),
            })
            .collect()
    }
}

fn fixed_color(label: &str) -> Option<ChartColor> {
    OUTCOME_COLORS
        .iter()
        .find(|(l, _)| *l == label)
        .map(|(_, c)| *c)
}
