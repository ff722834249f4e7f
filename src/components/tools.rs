use crate::canvas::{Document, EditResult, note_skipped};
use crate::components::colors::{self, Color, ColorParse};
use crate::ops::{canvas_ops, fill, paint, selection, transform};
use crate::settings::{MAX_LINE_WIDTH, ValidationError, parse_numeric_field};

// ============================================================================
// EDITOR COMMANDS
// ============================================================================

/// Boolean tool options of [`crate::settings::EditorSettings`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolFlag {
    IgnoreAlphaZero,
    SlowFill,
    SameColorOnly,
    AntiAliased,
    PreserveTransparency,
    DropOutsideSelection,
    SlowHistory,
}

impl ToolFlag {
    pub fn name(&self) -> &'static str {
        match self {
            ToolFlag::IgnoreAlphaZero => "ignore-alpha-zero",
            ToolFlag::SlowFill => "slow-fill",
            ToolFlag::SameColorOnly => "same-color-only",
            ToolFlag::AntiAliased => "anti-aliased",
            ToolFlag::PreserveTransparency => "preserve-transparency",
            ToolFlag::DropOutsideSelection => "drop-outside-selection",
            ToolFlag::SlowHistory => "slow-history",
        }
    }

    pub fn all() -> &'static [ToolFlag] {
        &[
            ToolFlag::IgnoreAlphaZero,
            ToolFlag::SlowFill,
            ToolFlag::SameColorOnly,
            ToolFlag::AntiAliased,
            ToolFlag::PreserveTransparency,
            ToolFlag::DropOutsideSelection,
            ToolFlag::SlowHistory,
        ]
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|f| f.name() == name)
    }
}

/// One user action.  Positions are in document space (fractional cells);
/// drag deltas are in view space and go through the zoom.
#[derive(Clone, Debug, PartialEq)]
pub enum EditorCommand {
    Paint { x: f64, y: f64 },
    EndStroke,
    Fill { x: f64, y: f64 },
    Extract { x: f64, y: f64 },
    ExtractSelection,
    Drag { dx: f64, dy: f64 },
    /// `theta` in radians.
    Rotate { theta: f64, center: Option<(f64, f64)> },
    Commit,
    Copy,
    Paste,
    SelectRect { a: (f64, f64), b: (f64, f64) },
    SelectPolygon(Vec<(f64, f64)>),
    ClearSelection,
    Undo,
    Redo,
    Resize { cols: u32, rows: u32 },
    SetColor(Color),
    SetLineWidth(u32),
    SetSprayProbability(f32),
    SetFlag(ToolFlag, bool),
    AddLayer,
    DeleteLayer,
    DuplicateLayer,
    SelectLayer(usize),
    MoveLayer { from: usize, to: usize },
    SetLayerVisible { index: usize, visible: bool },
    SetLayerOpacity { index: usize, opacity: f32 },
    Zoom { factor: f64, anchor: (f64, f64) },
    Pan { dx: f64, dy: f64 },
}

impl EditorCommand {
    pub fn label(&self) -> &'static str {
        match self {
            EditorCommand::Paint { .. } => "paint",
            EditorCommand::EndStroke => "end-stroke",
            EditorCommand::Fill { .. } => "fill",
            EditorCommand::Extract { .. } => "extract",
            EditorCommand::ExtractSelection => "extract-selection",
            EditorCommand::Drag { .. } => "drag",
            EditorCommand::Rotate { .. } => "rotate",
            EditorCommand::Commit => "commit",
            EditorCommand::Copy => "copy",
            EditorCommand::Paste => "paste",
            EditorCommand::SelectRect { .. } => "select-rect",
            EditorCommand::SelectPolygon(_) => "select-polygon",
            EditorCommand::ClearSelection => "clear-selection",
            EditorCommand::Undo => "undo",
            EditorCommand::Redo => "redo",
            EditorCommand::Resize { .. } => "resize",
            EditorCommand::SetColor(_) => "color",
            EditorCommand::SetLineWidth(_) => "line-width",
            EditorCommand::SetSprayProbability(_) => "spray",
            EditorCommand::SetFlag(..) => "set",
            EditorCommand::AddLayer
            | EditorCommand::DeleteLayer
            | EditorCommand::DuplicateLayer
            | EditorCommand::SelectLayer(_)
            | EditorCommand::MoveLayer { .. }
            | EditorCommand::SetLayerVisible { .. }
            | EditorCommand::SetLayerOpacity { .. } => "layer",
            EditorCommand::Zoom { .. } => "zoom",
            EditorCommand::Pan { .. } => "pan",
        }
    }

    /// Commands that may change pixels or the layer stack.
    pub fn modifies_document(&self) -> bool {
        !matches!(
            self,
            EditorCommand::SetColor(_)
                | EditorCommand::SetLineWidth(_)
                | EditorCommand::SetSprayProbability(_)
                | EditorCommand::SetFlag(..)
                | EditorCommand::SelectLayer(_)
                | EditorCommand::Zoom { .. }
                | EditorCommand::Pan { .. }
                | EditorCommand::Copy
                | EditorCommand::SelectRect { .. }
                | EditorCommand::SelectPolygon(_)
                | EditorCommand::ClearSelection
        )
    }
}

#[inline]
fn cell(v: f64) -> i64 {
    v.floor() as i64
}

/// Run one command against the document.  Undo and redo are synchronous
/// here; the app loop handles the paced variants itself.
pub fn execute(doc: &mut Document, cmd: &EditorCommand) -> EditResult {
    // Any command other than painting closes the open stroke.
    if !matches!(cmd, EditorCommand::Paint { .. }) {
        paint::end_stroke(doc.active_layer_mut());
    }

    let result = match cmd {
        EditorCommand::Paint { x, y } => {
            let (layer, ctx) = doc.active_mut();
            paint::paint(layer, &ctx, cell(*x), cell(*y))
        }
        EditorCommand::EndStroke => Ok(0),
        EditorCommand::Fill { x, y } => {
            let (layer, ctx) = doc.active_mut();
            fill::flood_fill(layer, &ctx, cell(*x), cell(*y))
        }
        EditorCommand::Extract { x, y } => {
            let (layer, ctx) = doc.active_mut();
            transform::extract_auto(layer, &ctx, cell(*x), cell(*y))
        }
        EditorCommand::ExtractSelection => {
            let (layer, ctx) = doc.active_mut();
            transform::extract_masked(layer, &ctx)
        }
        EditorCommand::Drag { dx, dy } => {
            let (layer, ctx) = doc.active_mut();
            transform::drag(layer, ctx.view, *dx, *dy)
        }
        EditorCommand::Rotate { theta, center } => {
            let (layer, ctx) = doc.active_mut();
            transform::rotate(layer, &ctx, *theta, *center)
        }
        EditorCommand::Commit => {
            let (layer, ctx) = doc.active_mut();
            transform::commit(layer, &ctx)
        }
        EditorCommand::Copy => canvas_ops::copy(doc),
        EditorCommand::Paste => canvas_ops::paste(doc),
        EditorCommand::SelectRect { a, b } => {
            selection::select_rect(doc, *a, *b);
            Ok(doc.mask.selected_count())
        }
        EditorCommand::SelectPolygon(points) => {
            selection::select_polygon(doc, points);
            Ok(0)
        }
        EditorCommand::ClearSelection => {
            selection::clear_selection(doc);
            Ok(0)
        }
        EditorCommand::Undo => doc.active_layer_mut().undo(),
        EditorCommand::Redo => doc.active_layer_mut().redo(),
        EditorCommand::Resize { cols, rows } => canvas_ops::resize(doc, *cols, *rows),
        EditorCommand::SetColor(c) => {
            doc.settings.color = *c;
            Ok(0)
        }
        EditorCommand::SetLineWidth(w) => {
            doc.settings.set_line_width(*w);
            Ok(0)
        }
        EditorCommand::SetSprayProbability(p) => {
            doc.settings.set_spray_probability(*p);
            Ok(0)
        }
        EditorCommand::SetFlag(flag, on) => {
            let s = &mut doc.settings;
            let slot = match flag {
                ToolFlag::IgnoreAlphaZero => &mut s.ignore_alpha_zero,
                ToolFlag::SlowFill => &mut s.slow_fill,
                ToolFlag::SameColorOnly => &mut s.same_color_only,
                ToolFlag::AntiAliased => &mut s.anti_aliased,
                ToolFlag::PreserveTransparency => &mut s.preserve_transparency,
                ToolFlag::DropOutsideSelection => &mut s.drop_outside_selection,
                ToolFlag::SlowHistory => &mut s.slow_history,
            };
            *slot = *on;
            Ok(0)
        }
        EditorCommand::AddLayer => Ok(canvas_ops::add_layer(doc)),
        EditorCommand::DeleteLayer => canvas_ops::delete_layer(doc),
        EditorCommand::DuplicateLayer => Ok(canvas_ops::duplicate_layer(doc)),
        EditorCommand::SelectLayer(i) => canvas_ops::select_layer(doc, *i),
        EditorCommand::MoveLayer { from, to } => canvas_ops::move_layer(doc, *from, *to),
        EditorCommand::SetLayerVisible { index, visible } => {
            canvas_ops::set_layer_visibility(doc, *index, *visible)
        }
        EditorCommand::SetLayerOpacity { index, opacity } => {
            canvas_ops::set_layer_opacity(doc, *index, *opacity)
        }
        EditorCommand::Zoom { factor, anchor } => {
            doc.view.zoom_around(*factor, anchor.0, anchor.1);
            let (vw, vh) = doc.view.view_size();
            doc.sync_view(vw, vh);
            Ok(0)
        }
        EditorCommand::Pan { dx, dy } => {
            doc.view.pan_by(*dx, *dy);
            let (vw, vh) = doc.view.view_size();
            doc.sync_view(vw, vh);
            Ok(0)
        }
    };
    note_skipped(cmd.label(), &result);
    result
}

// ============================================================================
// TEXT FORM — one command per line, for scripts and the CLI
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CommandParseError {
    UnknownCommand(String),
    MissingArgument(&'static str),
    InvalidArgument(String),
    Validation(ValidationError),
}

impl std::fmt::Display for CommandParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandParseError::UnknownCommand(c) => write!(f, "Unknown command '{}'", c),
            CommandParseError::MissingArgument(c) => write!(f, "Missing argument for '{}'", c),
            CommandParseError::InvalidArgument(a) => write!(f, "Invalid argument '{}'", a),
            CommandParseError::Validation(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CommandParseError {}

impl From<ValidationError> for CommandParseError {
    fn from(e: ValidationError) -> Self {
        CommandParseError::Validation(e)
    }
}

struct Args<'a> {
    name: &'static str,
    iter: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn word(&mut self) -> Result<&'a str, CommandParseError> {
        self.iter.next().ok_or(CommandParseError::MissingArgument(self.name))
    }

    fn num<T: std::str::FromStr>(&mut self) -> Result<T, CommandParseError> {
        let w = self.word()?;
        w.parse()
            .map_err(|_| CommandParseError::InvalidArgument(w.to_string()))
    }

    fn point(&mut self) -> Result<(f64, f64), CommandParseError> {
        Ok((self.num()?, self.num()?))
    }

    fn on_off(&mut self) -> Result<bool, CommandParseError> {
        match self.word()? {
            "on" | "true" | "1" => Ok(true),
            "off" | "false" | "0" => Ok(false),
            other => Err(CommandParseError::InvalidArgument(other.to_string())),
        }
    }

    fn rest(self) -> Vec<&'a str> {
        self.iter.collect()
    }
}

fn command_name(word: &str) -> Option<&'static str> {
    const NAMES: &[&str] = &[
        "paint",
        "end-stroke",
        "fill",
        "extract",
        "extract-selection",
        "drag",
        "rotate",
        "commit",
        "copy",
        "paste",
        "select-rect",
        "select-polygon",
        "clear-selection",
        "undo",
        "redo",
        "resize",
        "color",
        "line-width",
        "spray",
        "set",
        "layer",
        "zoom",
        "pan",
    ];
    NAMES.iter().copied().find(|n| *n == word)
}

/// Parse one script line.  Blank lines and `#` comments yield `None`.
///
/// ```text
/// color #FF0000FF
/// paint 3 4
/// rotate 90 2.5 2.5
/// select-polygon 0,0 8,0 4,6
/// layer opacity 1 0.5
/// set anti-aliased on
/// ```
pub fn parse_command(line: &str) -> Result<Option<EditorCommand>, CommandParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (head, tail) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let name = command_name(head)
        .ok_or_else(|| CommandParseError::UnknownCommand(head.to_string()))?;
    let mut args = Args {
        name,
        iter: tail.split_whitespace(),
    };

    let cmd = match name {
        "paint" => {
            let (x, y) = args.point()?;
            EditorCommand::Paint { x, y }
        }
        "end-stroke" => EditorCommand::EndStroke,
        "fill" => {
            let (x, y) = args.point()?;
            EditorCommand::Fill { x, y }
        }
        "extract" => {
            let (x, y) = args.point()?;
            EditorCommand::Extract { x, y }
        }
        "extract-selection" => EditorCommand::ExtractSelection,
        "drag" => {
            let (dx, dy) = args.point()?;
            EditorCommand::Drag { dx, dy }
        }
        "rotate" => {
            let degrees: f64 = args.num()?;
            let rest = args.rest();
            let center = match rest.as_slice() {
                [] => None,
                [x, y] => Some((parse_f64(x)?, parse_f64(y)?)),
                _ => return Err(CommandParseError::InvalidArgument(rest.join(" "))),
            };
            EditorCommand::Rotate {
                theta: degrees.to_radians(),
                center,
            }
        }
        "commit" => EditorCommand::Commit,
        "copy" => EditorCommand::Copy,
        "paste" => EditorCommand::Paste,
        "select-rect" => EditorCommand::SelectRect {
            a: args.point()?,
            b: args.point()?,
        },
        "select-polygon" => {
            let points = args
                .rest()
                .into_iter()
                .map(|p| {
                    let (x, y) = p
                        .split_once(',')
                        .ok_or_else(|| CommandParseError::InvalidArgument(p.to_string()))?;
                    Ok((parse_f64(x)?, parse_f64(y)?))
                })
                .collect::<Result<Vec<_>, CommandParseError>>()?;
            EditorCommand::SelectPolygon(points)
        }
        "clear-selection" => EditorCommand::ClearSelection,
        "undo" => EditorCommand::Undo,
        "redo" => EditorCommand::Redo,
        "resize" => {
            let cols = parse_numeric_field(args.word()?, 1, crate::canvas::MAX_CANVAS_DIM)?;
            let rows = parse_numeric_field(args.word()?, 1, crate::canvas::MAX_CANVAS_DIM)?;
            EditorCommand::Resize { cols, rows }
        }
        "color" => {
            let text = tail.trim();
            match colors::parse(text) {
                ColorParse::Ok(c) => EditorCommand::SetColor(c),
                ColorParse::ClampedOverflow(c) => {
                    crate::log_warn!("Color '{}' clamped to {}", text, c.to_hex());
                    EditorCommand::SetColor(c)
                }
                ColorParse::Malformed => {
                    return Err(ValidationError::MalformedColor(text.to_string()).into());
                }
            }
        }
        "line-width" => EditorCommand::SetLineWidth(parse_numeric_field(
            args.word()?,
            1,
            MAX_LINE_WIDTH,
        )?),
        "spray" => EditorCommand::SetSprayProbability(args.num()?),
        "set" => {
            let w = args.word()?;
            let flag = ToolFlag::from_name(w)
                .ok_or_else(|| CommandParseError::InvalidArgument(w.to_string()))?;
            EditorCommand::SetFlag(flag, args.on_off()?)
        }
        "layer" => match args.word()? {
            "add" => EditorCommand::AddLayer,
            "delete" => EditorCommand::DeleteLayer,
            "duplicate" => EditorCommand::DuplicateLayer,
            "select" => EditorCommand::SelectLayer(args.num()?),
            "move" => EditorCommand::MoveLayer {
                from: args.num()?,
                to: args.num()?,
            },
            "visible" => EditorCommand::SetLayerVisible {
                index: args.num()?,
                visible: args.on_off()?,
            },
            "opacity" => EditorCommand::SetLayerOpacity {
                index: args.num()?,
                opacity: args.num()?,
            },
            other => return Err(CommandParseError::InvalidArgument(other.to_string())),
        },
        "zoom" => EditorCommand::Zoom {
            factor: args.num()?,
            anchor: args.point()?,
        },
        "pan" => {
            let (dx, dy) = args.point()?;
            EditorCommand::Pan { dx, dy }
        }
        _ => return Err(CommandParseError::UnknownCommand(head.to_string())),
    };
    Ok(Some(cmd))
}

fn parse_f64(s: &str) -> Result<f64, CommandParseError> {
    s.trim()
        .parse()
        .map_err(|_| CommandParseError::InvalidArgument(s.to_string()))
}

/// Parse a whole script.  Errors carry the 1-based line number.
pub fn parse_script(text: &str) -> Result<Vec<EditorCommand>, (usize, CommandParseError)> {
    let mut out = Vec::new();
    for (n, line) in text.lines().enumerate() {
        if let Some(cmd) = parse_command(line).map_err(|e| (n + 1, e))? {
            out.push(cmd);
        }
    }
    Ok(out)
}
