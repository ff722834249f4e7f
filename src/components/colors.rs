use bytemuck::{Pod, Zeroable};

use crate::settings::ValidationError;

// ============================================================================
// PACKED COLOR
// ============================================================================

/// One RGBA pixel packed into a 32-bit word.
///
/// Byte order in memory (little-endian) is R, G, B, A, so the word value is
/// `r | g << 8 | b << 16 | a << 24`.  This is also the on-disk word layout
/// of sprite pixels in project files.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct Color(pub u32);

impl Color {
    pub const TRANSPARENT: Color = Color(0);
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color((r as u32) | ((g as u32) << 8) | ((b as u32) << 16) | ((a as u32) << 24))
    }

    pub const fn from_u32(word: u32) -> Self {
        Color(word)
    }

    pub const fn to_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn r(self) -> u8 {
        self.0 as u8
    }

    #[inline]
    pub const fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[inline]
    pub const fn b(self) -> u8 {
        (self.0 >> 16) as u8
    }

    #[inline]
    pub const fn a(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub const fn to_array(self) -> [u8; 4] {
        [self.r(), self.g(), self.b(), self.a()]
    }

    pub const fn from_array(c: [u8; 4]) -> Self {
        Color::rgba(c[0], c[1], c[2], c[3])
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Color::rgba(self.r(), self.g(), self.b(), a)
    }

    /// Alpha quantized to hundredths: `round(a / 255 * 100) / 100`.
    ///
    /// The blend formula depends on this quantization (254 and 255 both
    /// normalize to exactly 1.0), so do not replace it with `a / 255`.
    #[inline]
    pub fn alpha_normal(self) -> f64 {
        (self.a() as f64 / 255.0 * 100.0).round() / 100.0
    }

    /// `#RRGGBBAA`, the inverse of the hex form accepted by [`parse`].
    pub fn to_hex(self) -> String {
        format!(
            "#{:02X}{:02X}{:02X}{:02X}",
            self.r(),
            self.g(),
            self.b(),
            self.a()
        )
    }
}

impl std::fmt::Debug for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Color({})", self.to_hex())
    }
}

impl From<[u8; 4]> for Color {
    fn from(c: [u8; 4]) -> Self {
        Color::from_array(c)
    }
}

impl From<Color> for image::Rgba<u8> {
    fn from(c: Color) -> Self {
        image::Rgba(c.to_array())
    }
}

// ============================================================================
// COMPOSITING
// ============================================================================

/// Porter-Duff "over": composite `src` on top of `dst`, writing into `dst`.
///
/// Both alphas go through [`Color::alpha_normal`].  A fully opaque result
/// always stores alpha 255.
pub fn blend_over(dst: &mut Color, src: Color) {
    let sa = src.alpha_normal();
    if sa <= 0.0 {
        return;
    }
    let da = dst.alpha_normal();
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        *dst = Color::TRANSPARENT;
        return;
    }

    let mix = |s: u8, d: u8| -> u8 {
        let v = (s as f64 * sa + d as f64 * da * (1.0 - sa)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };
    let alpha = if out_a >= 1.0 {
        255
    } else {
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8
    };

    *dst = Color::rgba(
        mix(src.r(), dst.r()),
        mix(src.g(), dst.g()),
        mix(src.b(), dst.b()),
        alpha,
    );
}

/// `src` composited over `dst` with an extra opacity multiplier (layer opacity).
pub fn blend_with_opacity(dst: &mut Color, src: Color, opacity: f32) {
    if opacity >= 1.0 {
        blend_over(dst, src);
        return;
    }
    let a = (src.a() as f32 * opacity.clamp(0.0, 1.0)).round() as u8;
    blend_over(dst, src.with_alpha(a));
}

// ============================================================================
// TEXT PARSING
// ============================================================================

/// Outcome of parsing user-entered color text.
///
/// The three-way split is what the color text field validates against:
/// `Ok` is accepted as typed, `ClampedOverflow` is accepted but the field is
/// rewritten with the clamped value, `Malformed` is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorParse {
    Ok(Color),
    ClampedOverflow(Color),
    Malformed,
}

impl ColorParse {
    pub fn color(self) -> Option<Color> {
        match self {
            ColorParse::Ok(c) | ColorParse::ClampedOverflow(c) => Some(c),
            ColorParse::Malformed => None,
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, ColorParse::Ok(_))
    }
}

/// Parse `#RRGGBBAA` or `rgba(r, g, b, a)`.
///
/// * Hex needs the two-digit alpha suffix; `#RRGGBB` alone is malformed.
/// * In the `rgba()` form r/g/b are integers, anything above 255 clamps and
///   reports [`ColorParse::ClampedOverflow`].  `a` is a 0..1 fraction and is
///   clamped silently.
pub fn parse(text: &str) -> ColorParse {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix('#') {
        return parse_hex(hex);
    }
    let lower = text.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix("rgba") {
        return parse_rgba_fn(rest.trim_start());
    }
    ColorParse::Malformed
}

fn parse_hex(hex: &str) -> ColorParse {
    if hex.len() != 8 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return ColorParse::Malformed;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
    match (byte(0), byte(2), byte(4), byte(6)) {
        (Ok(r), Ok(g), Ok(b), Ok(a)) => ColorParse::Ok(Color::rgba(r, g, b, a)),
        _ => ColorParse::Malformed,
    }
}

fn parse_rgba_fn(rest: &str) -> ColorParse {
    let Some(inner) = rest.strip_prefix('(').and_then(|s| s.strip_suffix(')')) else {
        return ColorParse::Malformed;
    };
    let fields: Vec<&str> = inner.split(',').map(str::trim).collect();
    if fields.len() != 4 || fields.iter().any(|f| f.is_empty()) {
        return ColorParse::Malformed;
    }

    let mut clamped = false;
    let mut channels = [0u8; 3];
    for (slot, field) in channels.iter_mut().zip(&fields[..3]) {
        let Ok(v) = field.parse::<u32>() else {
            return ColorParse::Malformed;
        };
        if v > 255 {
            clamped = true;
        }
        *slot = v.min(255) as u8;
    }

    let alpha = match fields[3].parse::<f64>() {
        Ok(a) if a.is_finite() => (a.clamp(0.0, 1.0) * 255.0).round() as u8,
        _ => return ColorParse::Malformed,
    };

    let color = Color::rgba(channels[0], channels[1], channels[2], alpha);
    if clamped {
        ColorParse::ClampedOverflow(color)
    } else {
        ColorParse::Ok(color)
    }
}

/// Result-returning form of [`parse`] for callers that only need accept/reject.
pub fn parse_color_field(text: &str) -> Result<Color, ValidationError> {
    parse(text)
        .color()
        .ok_or_else(|| ValidationError::MalformedColor(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_little_endian_rgba() {
        let c = Color::rgba(0x11, 0x22, 0x33, 0x44);
        assert_eq!(c.to_u32(), 0x4433_2211);
        assert_eq!(c.to_array(), [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(Color::from_u32(0x4433_2211), c);
    }

    #[test]
    fn alpha_normal_is_quantized_to_hundredths() {
        assert_eq!(Color::rgba(0, 0, 0, 255).alpha_normal(), 1.0);
        assert_eq!(Color::rgba(0, 0, 0, 254).alpha_normal(), 1.0);
        assert_eq!(Color::rgba(0, 0, 0, 128).alpha_normal(), 0.5);
        assert_eq!(Color::rgba(0, 0, 0, 0).alpha_normal(), 0.0);
        // 3/255 = 1.18% -> 0.01
        assert_eq!(Color::rgba(0, 0, 0, 3).alpha_normal(), 0.01);
    }

    #[test]
    fn opaque_over_anything_replaces() {
        let mut dst = Color::rgba(10, 20, 30, 90);
        blend_over(&mut dst, Color::rgba(200, 100, 50, 255));
        assert_eq!(dst, Color::rgba(200, 100, 50, 255));
    }

    #[test]
    fn near_opaque_source_saturates_alpha() {
        let mut dst = Color::rgba(0, 0, 0, 0);
        blend_over(&mut dst, Color::rgba(1, 2, 3, 254));
        assert_eq!(dst.a(), 255);
    }

    #[test]
    fn half_over_opaque_mixes() {
        let mut dst = Color::rgba(0, 0, 0, 255);
        blend_over(&mut dst, Color::rgba(200, 200, 200, 128));
        assert_eq!(dst, Color::rgba(100, 100, 100, 255));
    }

    #[test]
    fn transparent_source_is_noop() {
        let mut dst = Color::rgba(9, 8, 7, 6);
        blend_over(&mut dst, Color::rgba(255, 255, 255, 0));
        assert_eq!(dst, Color::rgba(9, 8, 7, 6));
    }

    #[test]
    fn parses_hex_with_alpha_suffix() {
        assert_eq!(parse("#FF0000FF"), ColorParse::Ok(Color::rgba(255, 0, 0, 255)));
        assert_eq!(parse("  #0a0B0c80 "), ColorParse::Ok(Color::rgba(10, 11, 12, 128)));
    }

    #[test]
    fn hex_alpha_is_a_byte_not_a_percentage() {
        // Read as a percentage, 64 would be alpha 163.
        assert_eq!(
            parse("#11223364"),
            ColorParse::Ok(Color::rgba(0x11, 0x22, 0x33, 0x64))
        );
        assert_eq!(parse("#11223300"), ColorParse::Ok(Color::rgba(0x11, 0x22, 0x33, 0)));
    }

    #[test]
    fn hex_without_alpha_is_malformed() {
        assert_eq!(parse("#112233"), ColorParse::Malformed);
        assert_eq!(parse("#11223G44"), ColorParse::Malformed);
        assert_eq!(parse("112233FF"), ColorParse::Malformed);
    }

    #[test]
    fn rgba_fractional_alpha_never_reports_clamp() {
        assert_eq!(
            parse("rgba(10,20,30,2.5)"),
            ColorParse::Ok(Color::rgba(10, 20, 30, 255))
        );
        assert_eq!(
            parse("rgba(10, 20, 30, 0.5)"),
            ColorParse::Ok(Color::rgba(10, 20, 30, 128))
        );
    }

    #[test]
    fn rgba_channel_overflow_clamps() {
        assert_eq!(
            parse("rgba(300,20,30,1)"),
            ColorParse::ClampedOverflow(Color::rgba(255, 20, 30, 255))
        );
    }

    #[test]
    fn rgba_missing_pieces_are_malformed() {
        assert_eq!(parse("rgba(10,20,30)"), ColorParse::Malformed);
        assert_eq!(parse("rgba 10,20,30,1"), ColorParse::Malformed);
        assert_eq!(parse("rgba(10,20,30,1"), ColorParse::Malformed);
        assert_eq!(parse("rgba(10,,30,1)"), ColorParse::Malformed);
        assert_eq!(parse("rgba(a,20,30,1)"), ColorParse::Malformed);
        assert_eq!(parse("rgba(-1,20,30,1)"), ColorParse::Malformed);
    }

    #[test]
    fn hex_round_trips_through_to_hex() {
        let c = Color::rgba(1, 2, 254, 77);
        assert_eq!(parse(&c.to_hex()), ColorParse::Ok(c));
    }

    #[test]
    fn field_parser_rejects_malformed() {
        assert!(parse_color_field("#12").is_err());
        assert_eq!(
            parse_color_field("rgba(999,0,0,1)").ok(),
            Some(Color::rgba(255, 0, 0, 255))
        );
    }
}
