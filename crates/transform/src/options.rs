//! Transform option parsing and canonical form
//!
//! Each parameter is validated on its own. Anything unparseable, out of
//! range or disallowed is dropped, and the remaining fields still apply.

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Raw query-style options as handed over by the routing layer
pub type RawOptions = BTreeMap<String, String>;

const WIDTH_NAMES: &[&str] = &["w", "width"];
const HEIGHT_NAMES: &[&str] = &["h", "height"];
const QUALITY_NAMES: &[&str] = &["q", "quality"];
const FORMAT_NAMES: &[&str] = &["f", "fm", "format"];
const FIT_NAMES: &[&str] = &["fit"];
const POSITION_NAMES: &[&str] = &["pos", "position", "crop"];

/// Encodable output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JPEG, lossy with a quality setting
    #[serde(alias = "jpg")]
    Jpeg,
    /// PNG
    Png,
    /// WebP (lossless)
    Webp,
    /// GIF
    Gif,
}

impl OutputFormat {
    /// Parse a format name, accepting the legacy `jpg` alias
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Map a MIME type (parameters ignored) to a format
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next().unwrap_or_default().trim();
        let subtype = mime.to_ascii_lowercase();
        subtype.strip_prefix("image/").and_then(Self::from_name)
    }

    /// Canonical lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }

    /// MIME type of encoded output
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    /// Whether the format can carry an alpha channel
    #[must_use]
    pub fn supports_alpha(self) -> bool {
        !matches!(self, Self::Jpeg)
    }

    pub(crate) fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::Webp => ImageFormat::WebP,
            Self::Gif => ImageFormat::Gif,
        }
    }

    pub(crate) fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::WebP => Some(Self::Webp),
            ImageFormat::Gif => Some(Self::Gif),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a resized image relates to the requested box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Fill the box and crop the overflow at the crop position
    Cover,
    /// Fit within the box, then pad to the box size
    Contain,
    /// Stretch to exactly the box size
    Fill,
    /// Fit within the box, preserving aspect ratio
    #[default]
    Inside,
    /// Cover the box without cropping
    Outside,
}

impl FitMode {
    /// Parse a fit mode name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cover" => Some(Self::Cover),
            "contain" => Some(Self::Contain),
            "fill" => Some(Self::Fill),
            "inside" => Some(Self::Inside),
            "outside" => Some(Self::Outside),
            _ => None,
        }
    }

    /// Canonical lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cover => "cover",
            Self::Contain => "contain",
            Self::Fill => "fill",
            Self::Inside => "inside",
            Self::Outside => "outside",
        }
    }
}

/// Anchor for cropping (`cover`) and padding (`contain`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CropPosition {
    /// Centered on both axes
    #[default]
    Center,
    /// Top edge, centered horizontally
    Top,
    /// Bottom edge, centered horizontally
    Bottom,
    /// Left edge, centered vertically
    Left,
    /// Right edge, centered vertically
    Right,
    /// Top-left corner
    TopLeft,
    /// Top-right corner
    TopRight,
    /// Bottom-left corner
    BottomLeft,
    /// Bottom-right corner
    BottomRight,
}

impl CropPosition {
    /// Parse a position, accepting compass aliases
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase().replace('_', "-");
        match name.as_str() {
            "center" | "centre" | "middle" => Some(Self::Center),
            "top" | "north" => Some(Self::Top),
            "bottom" | "south" => Some(Self::Bottom),
            "left" | "west" => Some(Self::Left),
            "right" | "east" => Some(Self::Right),
            "top-left" | "left-top" | "northwest" => Some(Self::TopLeft),
            "top-right" | "right-top" | "northeast" => Some(Self::TopRight),
            "bottom-left" | "left-bottom" | "southwest" => Some(Self::BottomLeft),
            "bottom-right" | "right-bottom" | "southeast" => Some(Self::BottomRight),
            _ => None,
        }
    }

    /// Canonical kebab-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Center => "center",
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Left => "left",
            Self::Right => "right",
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
        }
    }

    /// Offset of a `inner` span inside `outer` along the horizontal axis
    pub(crate) fn x_offset(self, outer: u32, inner: u32) -> u32 {
        let slack = outer.saturating_sub(inner);
        match self {
            Self::Left | Self::TopLeft | Self::BottomLeft => 0,
            Self::Right | Self::TopRight | Self::BottomRight => slack,
            Self::Center | Self::Top | Self::Bottom => slack / 2,
        }
    }

    /// Offset of a `inner` span inside `outer` along the vertical axis
    pub(crate) fn y_offset(self, outer: u32, inner: u32) -> u32 {
        let slack = outer.saturating_sub(inner);
        match self {
            Self::Top | Self::TopLeft | Self::TopRight => 0,
            Self::Bottom | Self::BottomLeft | Self::BottomRight => slack,
            Self::Center | Self::Left | Self::Right => slack / 2,
        }
    }
}

/// A validated set of transform options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Target width in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Target height in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// JPEG quality, 1 to 100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    /// Output format; defaults to the source format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    /// Fit mode; defaults to `inside`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<FitMode>,
    /// Crop/pad anchor; defaults to `center`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<CropPosition>,
}

impl TransformOptions {
    /// Whether no field is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether a resize was requested
    #[must_use]
    pub fn resizes(&self) -> bool {
        self.width.is_some() || self.height.is_some()
    }

    /// Canonical token string: present fields only, fixed order
    #[must_use]
    pub fn canonical(&self) -> String {
        let mut parts = Vec::with_capacity(6);
        if let Some(w) = self.width {
            parts.push(format!("w={w}"));
        }
        if let Some(h) = self.height {
            parts.push(format!("h={h}"));
        }
        if let Some(q) = self.quality {
            parts.push(format!("q={q}"));
        }
        if let Some(f) = self.format {
            parts.push(format!("f={f}"));
        }
        if let Some(fit) = self.fit {
            parts.push(format!("fit={}", fit.as_str()));
        }
        if let Some(pos) = self.position {
            parts.push(format!("pos={}", pos.as_str()));
        }
        parts.join(";")
    }
}

/// Limits and defaults for transforms (`[transform]` config section)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransformConfig {
    /// Widest accepted output
    #[serde(default = "default_max_dimension")]
    pub max_width: u32,

    /// Tallest accepted output
    #[serde(default = "default_max_dimension")]
    pub max_height: u32,

    /// JPEG quality when none is requested
    #[serde(default = "default_quality")]
    pub default_quality: u8,

    /// Formats a request may ask for
    #[serde(default = "default_allowed_formats")]
    pub allowed_formats: Vec<OutputFormat>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_dimension(),
            max_height: default_max_dimension(),
            default_quality: default_quality(),
            allowed_formats: default_allowed_formats(),
        }
    }
}

// Default value functions
fn default_max_dimension() -> u32 {
    4096
}

fn default_quality() -> u8 {
    80
}

fn default_allowed_formats() -> Vec<OutputFormat> {
    vec![
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::Webp,
        OutputFormat::Gif,
    ]
}

/// Validate raw options; `None` when no field survives.
///
/// Parameter names are case-insensitive. When several spellings of one
/// field are present, the first valid one in alias order wins.
#[must_use]
pub fn parse_options(raw: &RawOptions, config: &TransformConfig) -> Option<TransformOptions> {
    let mut lowered: HashMap<String, &str> = HashMap::with_capacity(raw.len());
    for (name, value) in raw {
        lowered
            .entry(name.trim().to_ascii_lowercase())
            .or_insert(value.as_str());
    }
    let field = |names: &[&str]| -> Vec<&str> {
        names
            .iter()
            .filter_map(|name| lowered.get(*name).copied())
            .collect()
    };

    let options = TransformOptions {
        width: field(WIDTH_NAMES)
            .into_iter()
            .find_map(|v| dimension(v, config.max_width)),
        height: field(HEIGHT_NAMES)
            .into_iter()
            .find_map(|v| dimension(v, config.max_height)),
        quality: field(QUALITY_NAMES).into_iter().find_map(quality),
        format: field(FORMAT_NAMES)
            .into_iter()
            .filter_map(OutputFormat::from_name)
            .find(|f| config.allowed_formats.contains(f)),
        fit: field(FIT_NAMES).into_iter().find_map(FitMode::from_name),
        position: field(POSITION_NAMES)
            .into_iter()
            .find_map(CropPosition::from_name),
    };

    (!options.is_empty()).then_some(options)
}

fn dimension(value: &str, max: u32) -> Option<u32> {
    let parsed: u64 = value.trim().parse().ok()?;
    if parsed == 0 {
        return None;
    }
    Some(u32::try_from(parsed).unwrap_or(u32::MAX).min(max.max(1)))
}

fn quality(value: &str) -> Option<u8> {
    let parsed: u8 = value.trim().parse().ok()?;
    (1..=100).contains(&parsed).then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawOptions {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn empty_input_yields_none() {
        assert_eq!(parse_options(&RawOptions::new(), &TransformConfig::default()), None);
    }

    #[test]
    fn aliases_are_accepted() {
        let config = TransformConfig::default();
        let opts = parse_options(
            &raw(&[("width", "200"), ("H", "100"), ("fm", "JPG"), ("crop", "northeast")]),
            &config,
        )
        .unwrap();
        assert_eq!(opts.width, Some(200));
        assert_eq!(opts.height, Some(100));
        assert_eq!(opts.format, Some(OutputFormat::Jpeg));
        assert_eq!(opts.position, Some(CropPosition::TopRight));
    }

    #[test]
    fn invalid_fields_are_dropped_independently() {
        let config = TransformConfig::default();
        let opts = parse_options(
            &raw(&[("w", "-5"), ("h", "abc"), ("q", "101"), ("fit", "cover")]),
            &config,
        )
        .unwrap();
        assert_eq!(
            opts,
            TransformOptions {
                fit: Some(FitMode::Cover),
                ..TransformOptions::default()
            }
        );
    }

    #[test]
    fn all_invalid_yields_none() {
        let config = TransformConfig::default();
        assert!(parse_options(&raw(&[("w", "0"), ("q", "0"), ("f", "tiff")]), &config).is_none());
        assert!(parse_options(&raw(&[("unrelated", "1")]), &config).is_none());
    }

    #[test]
    fn dimensions_are_clamped_to_limits() {
        let config = TransformConfig {
            max_width: 800,
            max_height: 600,
            ..TransformConfig::default()
        };
        let opts = parse_options(&raw(&[("w", "5000"), ("h", "99999999999")]), &config).unwrap();
        assert_eq!(opts.width, Some(800));
        assert_eq!(opts.height, Some(600));
    }

    #[test]
    fn format_must_be_allowed() {
        let config = TransformConfig {
            allowed_formats: vec![OutputFormat::Webp],
            ..TransformConfig::default()
        };
        assert!(parse_options(&raw(&[("f", "png")]), &config).is_none());
        assert_eq!(
            parse_options(&raw(&[("f", "webp")]), &config).unwrap().format,
            Some(OutputFormat::Webp)
        );
    }

    #[test]
    fn short_alias_wins_over_long() {
        let config = TransformConfig::default();
        let opts = parse_options(&raw(&[("w", "10"), ("width", "20")]), &config).unwrap();
        assert_eq!(opts.width, Some(10));
        // An invalid short form falls through to the long one
        let opts = parse_options(&raw(&[("w", "x"), ("width", "20")]), &config).unwrap();
        assert_eq!(opts.width, Some(20));
    }

    #[test]
    fn canonical_orders_fields() {
        let opts = TransformOptions {
            position: Some(CropPosition::BottomLeft),
            format: Some(OutputFormat::Webp),
            width: Some(300),
            ..TransformOptions::default()
        };
        assert_eq!(opts.canonical(), "w=300;f=webp;pos=bottom-left");
    }

    #[test]
    fn content_type_mapping() {
        assert_eq!(OutputFormat::from_content_type("image/jpg"), Some(OutputFormat::Jpeg));
        assert_eq!(
            OutputFormat::from_content_type("image/PNG; charset=binary"),
            Some(OutputFormat::Png)
        );
        assert_eq!(OutputFormat::from_content_type("image/svg+xml"), None);
        assert_eq!(OutputFormat::from_content_type("text/html"), None);
    }

    #[test]
    fn config_defaults_apply_to_partial_toml() {
        let config: TransformConfig = toml::from_str("max_width = 1024\nallowed_formats = [\"jpg\", \"png\"]").unwrap();
        assert_eq!(config.max_width, 1024);
        assert_eq!(config.max_height, 4096);
        assert_eq!(config.default_quality, 80);
        assert_eq!(config.allowed_formats, vec![OutputFormat::Jpeg, OutputFormat::Png]);
    }

    #[test]
    fn offsets_follow_position() {
        assert_eq!(CropPosition::Center.x_offset(100, 40), 30);
        assert_eq!(CropPosition::Right.x_offset(100, 40), 60);
        assert_eq!(CropPosition::TopLeft.y_offset(100, 40), 0);
        assert_eq!(CropPosition::BottomRight.y_offset(100, 40), 60);
    }
}
