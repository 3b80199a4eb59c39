//! Effect configuration and per-line style resolution
//!
//! Every parameter is either a single global value or an array of per-line
//! overrides keyed by line index. Anything malformed falls back to the
//! default silently (with a warning in the log): this is a visual effect,
//! bad input should dim it, not break the host.
//!
//! Fallback is as narrow as possible: a mistyped field only drops that
//! field, a mistyped array entry only drops that line's override.

use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Default highlight color `#00ffff`
pub const DEFAULT_COLOR: [u8; 3] = [0, 255, 255];
/// Fraction of the dense line lit at any time
pub const DEFAULT_FLOW_RATIO: f64 = 0.05;
/// Cursor advance in dense points per second
pub const DEFAULT_SPEED: f64 = 500.0;
/// Interpolated points per render-space unit
pub const DEFAULT_DENSITY: f64 = 3.0;
/// Point sprite size in pixels
pub const DEFAULT_WIDTH: f32 = 3.0;

/// A single value or an array of per-line values (`null` entries allowed).
///
/// A value that parses as `T` is `One`, so `[r, g, b]` stays a single color.
/// Otherwise an array is read entry by entry; entries that are not a `T`
/// become `None` and that line keeps the default.
#[derive(Clone, Debug, PartialEq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<Option<T>>),
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for OneOrMany<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if let Ok(one) = T::deserialize(&value) {
            return Ok(OneOrMany::One(one));
        }
        match value {
            Value::Array(items) => Ok(OneOrMany::Many(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(line, item)| {
                        if item.is_null() {
                            return None;
                        }
                        T::deserialize(item)
                            .map_err(|e| {
                                warn!(line, error = %e, "Malformed per-line value, line uses the default")
                            })
                            .ok()
                    })
                    .collect(),
            )),
            other => Err(D::Error::custom(format!(
                "expected a value or an array of values, got {other}"
            ))),
        }
    }
}

/// Field deserializer that turns a wrongly typed value into `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match T::deserialize(&value) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            warn!(%value, error = %e, "Malformed config field, using default");
            Ok(None)
        }
    }
}

/// Color as `"#rrggbb"`, `"#rgb"` or `[r, g, b]` with 0-255 components.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ColorValue {
    Hex(String),
    Rgb(Vec<f64>),
}

impl ColorValue {
    pub fn to_rgb(&self) -> Option<[u8; 3]> {
        match self {
            ColorValue::Hex(s) => parse_hex_color(s),
            ColorValue::Rgb(c) => {
                if c.len() < 3 || c[..3].iter().any(|v| !v.is_finite()) {
                    return None;
                }
                Some([0, 1, 2].map(|i| c[i].round().clamp(0.0, 255.0) as u8))
            }
        }
    }
}

/// Parse `#rrggbb` / `#rgb` (leading `#` optional).
pub fn parse_hex_color(s: &str) -> Option<[u8; 3]> {
    let hex = s.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        6 => {
            let v = u32::from_str_radix(hex, 16).ok()?;
            Some([(v >> 16) as u8, (v >> 8) as u8, v as u8])
        }
        3 => {
            let v = u16::from_str_radix(hex, 16).ok()?;
            // #abc -> #aabbcc
            Some([(v >> 8) & 0xf, (v >> 4) & 0xf, v & 0xf].map(|n| (n as u8) * 0x11))
        }
        _ => None,
    }
}

/// Raw configuration as accepted from the host (JSON or a JS object).
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowConfig {
    #[serde(deserialize_with = "lenient")]
    pub color: Option<OneOrMany<ColorValue>>,
    #[serde(deserialize_with = "lenient")]
    pub flow_ratio: Option<OneOrMany<f64>>,
    #[serde(deserialize_with = "lenient")]
    pub speed: Option<OneOrMany<f64>>,
    #[serde(deserialize_with = "lenient")]
    pub density: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub width: Option<OneOrMany<f64>>,
}

impl FlowConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parse, falling back to the default configuration when `json` is not
    /// an object at all. Malformed fields inside an object fall back one by one.
    pub fn from_json_lenient(json: &str) -> Self {
        Self::from_json(json).unwrap_or_else(|e| {
            warn!(error = %e, "Invalid flow config, using defaults");
            Self::default()
        })
    }
}

/// Fully resolved style of a single line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineStyle {
    pub color: [u8; 3],
    pub flow_ratio: f64,
    pub speed: f64,
    pub width: f32,
}

impl Default for LineStyle {
    fn default() -> Self {
        Self {
            color: DEFAULT_COLOR,
            flow_ratio: DEFAULT_FLOW_RATIO,
            speed: DEFAULT_SPEED,
            width: DEFAULT_WIDTH,
        }
    }
}

impl LineStyle {
    /// Color normalized to 0..1 for the GPU
    pub fn rgb_normalized(&self) -> [f32; 3] {
        self.color.map(|c| c as f32 / 255.0)
    }
}

/// Validated global defaults plus per-line overrides.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowStyle {
    defaults: LineStyle,
    density: Option<f64>,
    colors: Vec<Option<[u8; 3]>>,
    flow_ratios: Vec<Option<f64>>,
    speeds: Vec<Option<f64>>,
    widths: Vec<Option<f32>>,
}

fn valid_ratio(v: f64) -> Option<f64> {
    (v > 0.0 && v < 1.0).then_some(v)
}

fn valid_positive(v: f64) -> Option<f64> {
    (v.is_finite() && v > 0.0).then_some(v)
}

/// Split a one-or-many value into (global default, per-line overrides).
/// A single value that fails validation leaves the default untouched.
fn split<T, U>(
    field: &'static str,
    value: Option<&OneOrMany<T>>,
    validate: impl Fn(&T) -> Option<U>,
) -> (Option<U>, Vec<Option<U>>) {
    match value {
        None => (None, Vec::new()),
        Some(OneOrMany::One(v)) => {
            let resolved = validate(v);
            if resolved.is_none() {
                warn!(field, "Invalid value, using default");
            }
            (resolved, Vec::new())
        }
        Some(OneOrMany::Many(items)) => {
            let overrides: Vec<Option<U>> = items
                .iter()
                .map(|item| item.as_ref().and_then(&validate))
                .collect();
            let rejected = items
                .iter()
                .zip(&overrides)
                .filter(|(item, resolved)| item.is_some() && resolved.is_none())
                .count();
            if rejected > 0 {
                warn!(field, rejected, "Invalid per-line values, those lines use the default");
            }
            (None, overrides)
        }
    }
}

impl FlowStyle {
    pub fn from_config(config: &FlowConfig) -> Self {
        let (color, colors) = split("color", config.color.as_ref(), ColorValue::to_rgb);
        let (flow_ratio, flow_ratios) =
            split("flowRatio", config.flow_ratio.as_ref(), |v| valid_ratio(*v));
        let (speed, speeds) = split("speed", config.speed.as_ref(), |v| valid_positive(*v));
        let (width, widths) = split("width", config.width.as_ref(), |v| {
            valid_positive(*v).map(|w| w as f32)
        });

        let density = config.density.and_then(|d| {
            let valid = valid_positive(d);
            if valid.is_none() {
                warn!(density = d, "Invalid density, using default");
            }
            valid
        });

        let base = LineStyle::default();
        Self {
            defaults: LineStyle {
                color: color.unwrap_or(base.color),
                flow_ratio: flow_ratio.unwrap_or(base.flow_ratio),
                speed: speed.unwrap_or(base.speed),
                width: width.unwrap_or(base.width),
            },
            density,
            colors,
            flow_ratios,
            speeds,
            widths,
        }
    }

    pub fn defaults(&self) -> &LineStyle {
        &self.defaults
    }

    pub fn density(&self) -> f64 {
        self.density.unwrap_or(DEFAULT_DENSITY)
    }

    /// Style of line `index`; lines without an override get the defaults.
    pub fn line(&self, index: usize) -> LineStyle {
        fn pick<T: Copy>(overrides: &[Option<T>], index: usize, default: T) -> T {
            overrides.get(index).copied().flatten().unwrap_or(default)
        }

        LineStyle {
            color: pick(&self.colors, index, self.defaults.color),
            flow_ratio: pick(&self.flow_ratios, index, self.defaults.flow_ratio),
            speed: pick(&self.speeds, index, self.defaults.speed),
            width: pick(&self.widths, index, self.defaults.width),
        }
    }
}

impl From<&FlowConfig> for FlowStyle {
    fn from(config: &FlowConfig) -> Self {
        Self::from_config(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#00ffff"), Some([0, 255, 255]));
        assert_eq!(parse_hex_color("FF8000"), Some([255, 128, 0]));
        assert_eq!(parse_hex_color("#f0a"), Some([255, 0, 170]));
        assert_eq!(parse_hex_color(" #123456 "), Some([0x12, 0x34, 0x56]));
        assert_eq!(parse_hex_color("#12345"), None);
        assert_eq!(parse_hex_color("#gg0000"), None);
        assert_eq!(parse_hex_color("red"), None);
        assert_eq!(parse_hex_color(""), None);
    }

    #[test]
    fn test_defaults_when_config_empty() {
        let style = FlowStyle::from_config(&FlowConfig::default());
        assert_eq!(style.line(0), LineStyle::default());
        assert_eq!(style.line(42), LineStyle::default());
        assert_eq!(style.density(), 3.0);
        assert_eq!(style.line(0).color, [0, 255, 255]);
        assert_eq!(style.line(0).flow_ratio, 0.05);
        assert_eq!(style.line(0).speed, 500.0);
    }

    #[test]
    fn test_single_values_become_defaults() {
        let config = FlowConfig::from_json(
            r##"{"color": "#ff0000", "flowRatio": 0.2, "speed": 120, "density": 5, "width": 6}"##,
        )
        .unwrap();
        let style = FlowStyle::from_config(&config);
        for i in [0, 3] {
            let line = style.line(i);
            assert_eq!(line.color, [255, 0, 0]);
            assert_eq!(line.flow_ratio, 0.2);
            assert_eq!(line.speed, 120.0);
            assert_eq!(line.width, 6.0);
        }
        assert_eq!(style.density(), 5.0);
    }

    #[test]
    fn test_rgb_triplet_is_single_color() {
        let config = FlowConfig::from_json(r#"{"color": [255, 128, 0]}"#).unwrap();
        let style = FlowStyle::from_config(&config);
        assert_eq!(style.line(0).color, [255, 128, 0]);
        assert_eq!(style.line(7).color, [255, 128, 0]);
    }

    #[test]
    fn test_per_line_override_falls_back_past_end() {
        let config = FlowConfig::from_json(r#"{"color": [[255, 0, 0]]}"#).unwrap();
        let style = FlowStyle::from_config(&config);
        assert_eq!(style.line(0).color, [255, 0, 0]);
        // Second line has no override: default color, not an out-of-bounds read
        assert_eq!(style.line(1).color, DEFAULT_COLOR);
    }

    #[test]
    fn test_per_line_arrays() {
        let config = FlowConfig::from_json(
            r##"{
                "color": ["#ff0000", null, "#00f"],
                "flowRatio": [0.1, 0.3],
                "speed": [100, null, 300],
                "width": [1, 2]
            }"##,
        )
        .unwrap();
        let style = FlowStyle::from_config(&config);

        assert_eq!(style.line(0).color, [255, 0, 0]);
        assert_eq!(style.line(1).color, DEFAULT_COLOR);
        assert_eq!(style.line(2).color, [0, 0, 255]);

        assert_eq!(style.line(1).flow_ratio, 0.3);
        assert_eq!(style.line(2).flow_ratio, DEFAULT_FLOW_RATIO);

        assert_eq!(style.line(1).speed, DEFAULT_SPEED);
        assert_eq!(style.line(2).speed, 300.0);

        assert_eq!(style.line(1).width, 2.0);
        assert_eq!(style.line(2).width, DEFAULT_WIDTH);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = FlowConfig::from_json(
            r##"{
                "color": "not-a-color",
                "flowRatio": 1.5,
                "speed": -10,
                "density": 0,
                "width": [0, -1, 4]
            }"##,
        )
        .unwrap();
        let style = FlowStyle::from_config(&config);
        let line = style.line(0);
        assert_eq!(line.color, DEFAULT_COLOR);
        assert_eq!(line.flow_ratio, DEFAULT_FLOW_RATIO);
        assert_eq!(line.speed, DEFAULT_SPEED);
        assert_eq!(line.width, DEFAULT_WIDTH);
        assert_eq!(style.line(1).width, DEFAULT_WIDTH);
        assert_eq!(style.line(2).width, 4.0);
        assert_eq!(style.density(), DEFAULT_DENSITY);
    }

    #[test]
    fn test_lenient_parse_of_garbage() {
        let config = FlowConfig::from_json_lenient(r#"{"speed": "fast"}"#);
        assert_eq!(config, FlowConfig::default());
        let config = FlowConfig::from_json_lenient("not json");
        assert_eq!(config, FlowConfig::default());
    }

    #[test]
    fn test_mistyped_entry_only_drops_that_line() {
        let config = FlowConfig::from_json_lenient(r##"{"color": "#ff0000", "speed": [100, "fast", 300]}"##);
        let style = FlowStyle::from_config(&config);

        assert_eq!(style.line(0).color, [255, 0, 0]);
        assert_eq!(style.line(0).speed, 100.0);
        assert_eq!(style.line(1).speed, DEFAULT_SPEED);
        assert_eq!(style.line(2).speed, 300.0);
        assert_eq!(style.line(2).color, [255, 0, 0]);
    }

    #[test]
    fn test_mistyped_field_only_drops_that_field() {
        let config = FlowConfig::from_json_lenient(
            r#"{"color": 16711680, "speed": 120, "flowRatio": 0.2, "density": "high"}"#,
        );
        assert!(config.color.is_none());
        assert!(config.density.is_none());

        let style = FlowStyle::from_config(&config);
        let line = style.line(0);
        assert_eq!(line.color, DEFAULT_COLOR);
        assert_eq!(line.speed, 120.0);
        assert_eq!(line.flow_ratio, 0.2);
        assert_eq!(style.density(), DEFAULT_DENSITY);
    }

    #[test]
    fn test_mixed_color_array_entries() {
        let config = FlowConfig::from_json(r##"{"color": ["#00ff00", 42, [0, 0, 255], {"r": 1}]}"##).unwrap();
        let style = FlowStyle::from_config(&config);
        assert_eq!(style.line(0).color, [0, 255, 0]);
        assert_eq!(style.line(1).color, DEFAULT_COLOR);
        assert_eq!(style.line(2).color, [0, 0, 255]);
        assert_eq!(style.line(3).color, DEFAULT_COLOR);
    }

    #[test]
    fn test_rgb_normalized() {
        let style = LineStyle {
            color: [255, 0, 51],
            ..LineStyle::default()
        };
        assert_eq!(style.rgb_normalized(), [1.0, 0.0, 0.2]);
    }
}
