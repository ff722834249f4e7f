use std::path::{Path, PathBuf};

use crate::components::colors::Color;

// ============================================================================
// VALIDATION ERRORS
// ============================================================================

/// Rejected text-field input.  The owning field restores its previous text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MalformedColor(String),
    MalformedNumber(String),
    OutOfRange { value: i64, min: i64, max: i64 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MalformedColor(t) => write!(f, "Malformed color '{}'", t),
            ValidationError::MalformedNumber(t) => write!(f, "Malformed number '{}'", t),
            ValidationError::OutOfRange { value, min, max } => {
                write!(f, "{} is outside {}..={}", value, min, max)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Parse a numeric text field (line width, canvas size...) and range-check it.
pub fn parse_numeric_field(text: &str, min: u32, max: u32) -> Result<u32, ValidationError> {
    let trimmed = text.trim();
    let value: i64 = trimmed
        .parse()
        .map_err(|_| ValidationError::MalformedNumber(text.to_string()))?;
    if value < min as i64 || value > max as i64 {
        return Err(ValidationError::OutOfRange {
            value,
            min: min as i64,
            max: max as i64,
        });
    }
    Ok(value as u32)
}

// ============================================================================
// EDITOR SETTINGS — document-wide tool state
// ============================================================================

pub const MAX_LINE_WIDTH: u32 = 64;

/// Tool state shared by every layer of a document.
///
/// Owned by the `Document` and passed by reference into every layer
/// operation, so changing the brush color or a flag affects whichever layer
/// is active next.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub color: Color,
    /// Brush edge length in cells.
    pub line_width: u32,
    /// Probability (0..=1) that a brush cell is written. 1.0 = solid brush.
    pub spray_probability: f32,
    /// Flood fill also spreads into fully transparent cells of another color.
    pub ignore_alpha_zero: bool,
    /// Breadth-first flood fill instead of depth-first.
    pub slow_fill: bool,
    /// Extraction only takes cells equal to the seed color.
    pub same_color_only: bool,
    /// Rotation keeps sub-cell coordinates and commits with supersampling.
    pub anti_aliased: bool,
    /// Paint and drop with "over" compositing instead of plain copy.
    pub preserve_transparency: bool,
    /// Floating selections may be dropped onto cells outside the mask.
    pub drop_outside_selection: bool,
    /// Undo/redo replays large frames over several ticks.
    pub slow_history: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            line_width: 1,
            spray_probability: 1.0,
            ignore_alpha_zero: false,
            slow_fill: false,
            same_color_only: false,
            anti_aliased: false,
            preserve_transparency: false,
            drop_outside_selection: false,
            slow_history: false,
        }
    }
}

impl EditorSettings {
    pub fn set_line_width(&mut self, width: u32) {
        self.line_width = width.clamp(1, MAX_LINE_WIDTH);
    }

    pub fn set_spray_probability(&mut self, p: f32) {
        self.spray_probability = if p.is_finite() { p.clamp(0.0, 1.0) } else { 1.0 };
    }
}

// ============================================================================
// ENGINE CONFIG — persisted across sessions
// ============================================================================

pub const DEFAULT_HISTORY_CAPACITY: usize = 75;
pub const DEFAULT_FRAME_RATE: u32 = 35;

/// Engine configuration that persists across sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Undo frames kept per layer.
    pub history_capacity: usize,
    /// Target ticks per second of the editor loop.
    pub frame_rate: u32,
    pub default_width: u32,
    pub default_height: u32,
    /// Polygon mask workers. 0 = derive from available parallelism.
    pub mask_workers: usize,
    pub anti_aliased: bool,
    pub slow_fill: bool,
    pub slow_history: bool,
    pub preserve_transparency: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            frame_rate: DEFAULT_FRAME_RATE,
            default_width: 32,
            default_height: 32,
            mask_workers: 0,
            anti_aliased: false,
            slow_fill: false,
            slow_history: false,
            preserve_transparency: false,
        }
    }
}

impl EngineConfig {
    /// Path to the settings file.
    /// On Linux:   ~/.config/spritefe/spritefe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\SpriteFE\spritefe_settings.cfg
    /// On macOS:   ~/Library/Application Support/SpriteFE/spritefe_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").ok()?;
            return Some(PathBuf::from(appdata).join("SpriteFE").join("spritefe_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("SpriteFE")
                    .join("spritefe_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?;
            Some(config_dir.join("spritefe").join("spritefe_settings.cfg"))
        }
    }

    /// Load from the platform settings path (defaults if missing or corrupt).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_config_str(&content),
            Err(_) => Self::default(),
        }
    }

    /// Parse `key=value` lines.  Unknown keys are ignored and unparsable
    /// values keep their default.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "history_capacity" => {
                    s.history_capacity = val
                        .parse()
                        .ok()
                        .filter(|&n: &usize| n > 0)
                        .unwrap_or(DEFAULT_HISTORY_CAPACITY);
                }
                "frame_rate" => {
                    s.frame_rate = val
                        .parse()
                        .ok()
                        .filter(|&n: &u32| n > 0)
                        .unwrap_or(DEFAULT_FRAME_RATE);
                }
                "default_width" => {
                    s.default_width = parse_numeric_field(val, 1, 4096).unwrap_or(32);
                }
                "default_height" => {
                    s.default_height = parse_numeric_field(val, 1, 4096).unwrap_or(32);
                }
                "mask_workers" => {
                    s.mask_workers = val.parse().unwrap_or(0);
                }
                "anti_aliased" => s.anti_aliased = val == "true",
                "slow_fill" => s.slow_fill = val == "true",
                "slow_history" => s.slow_history = val == "true",
                "preserve_transparency" => s.preserve_transparency = val == "true",
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "history_capacity={}\n\
             frame_rate={}\n\
             default_width={}\n\
             default_height={}\n\
             mask_workers={}\n\
             anti_aliased={}\n\
             slow_fill={}\n\
             slow_history={}\n\
             preserve_transparency={}\n",
            self.history_capacity,
            self.frame_rate,
            self.default_width,
            self.default_height,
            self.mask_workers,
            self.anti_aliased,
            self.slow_fill,
            self.slow_history,
            self.preserve_transparency,
        )
    }

    /// Save to the platform settings path.  Failures are logged, not fatal.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            crate::log_warn!("Failed to save settings to {}: {}", path.display(), e);
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    /// Initial tool state for a new document.
    pub fn editor_settings(&self) -> EditorSettings {
        EditorSettings {
            anti_aliased: self.anti_aliased,
            slow_fill: self.slow_fill,
            slow_history: self.slow_history,
            preserve_transparency: self.preserve_transparency,
            ..EditorSettings::default()
        }
    }
}
