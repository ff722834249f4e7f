use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::{ImageFormat, RgbaImage};

use crate::components::colors::Color;

// ============================================================================
// PROJECT FILE FORMAT
// ============================================================================
//
// A project file is a flat sequence of little-endian u32 words holding nested
// records `[size, type, payload...]`, where `size` counts every word of the
// record including its two header words.
//
//   type 0  project    type-1 records
//   type 1  group      type-2 records
//   type 2  animation  [width << 16 | height], then type-3 records
//   type 3  sprite     [height << 16 | width], then width*height pixel words
//
// Animation and sprite headers pack their dimensions in opposite order.
// There is no magic number or version field.

const HEADER_WORDS: usize = 2;

/// Record tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum RecordType {
    Project = 0,
    Group = 1,
    Animation = 2,
    Sprite = 3,
}

impl RecordType {
    fn child(self) -> Option<RecordType> {
        match self {
            RecordType::Project => Some(RecordType::Group),
            RecordType::Group => Some(RecordType::Animation),
            RecordType::Animation => Some(RecordType::Sprite),
            RecordType::Sprite => None,
        }
    }
}

/// One image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sprite {
    pub width: u16,
    pub height: u16,
    pub pixels: Vec<Color>,
}

impl Sprite {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pixels: vec![Color::TRANSPARENT; width as usize * height as usize],
        }
    }
}

/// Frames of one animation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpriteAnimation {
    pub width: u16,
    pub height: u16,
    pub frames: Vec<Sprite>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnimationGroup {
    pub animations: Vec<SpriteAnimation>,
}

/// Root of a project file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpriteProject {
    pub groups: Vec<AnimationGroup>,
}

impl SpriteProject {
    /// Project with one group holding one single-frame animation.
    pub fn single(sprite: Sprite) -> Self {
        SpriteProject {
            groups: vec![AnimationGroup {
                animations: vec![SpriteAnimation {
                    width: sprite.width,
                    height: sprite.height,
                    frames: vec![sprite],
                }],
            }],
        }
    }

    pub fn sprite(&self, group: usize, animation: usize, frame: usize) -> Option<&Sprite> {
        self.groups
            .get(group)?
            .animations
            .get(animation)?
            .frames
            .get(frame)
    }

    pub fn sprite_mut(&mut self, group: usize, animation: usize, frame: usize) -> Option<&mut Sprite> {
        self.groups
            .get_mut(group)?
            .animations
            .get_mut(animation)?
            .frames
            .get_mut(frame)
    }

    /// First sprite in file order.
    pub fn first_sprite(&self) -> Option<&Sprite> {
        self.groups
            .iter()
            .flat_map(|g| g.animations.iter())
            .flat_map(|a| a.frames.iter())
            .next()
    }

    pub fn sprite_count(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| g.animations.iter())
            .map(|a| a.frames.len())
            .sum()
    }
}

/// Error type for project file operations.
#[derive(Debug)]
pub enum FormatError {
    Io(std::io::Error),
    /// The file does not follow the record layout.
    Corrupted(String),
    /// The in-memory project cannot be represented in the format.
    Unencodable(String),
    /// Valid file content the editor cannot open.
    Unsupported(String),
    Image(String),
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatError::Io(e) => write!(f, "I/O error: {}", e),
            FormatError::Corrupted(e) => write!(f, "Corrupted project file: {}", e),
            FormatError::Unencodable(e) => write!(f, "Cannot encode project: {}", e),
            FormatError::Unsupported(e) => write!(f, "Unsupported project: {}", e),
            FormatError::Image(e) => write!(f, "Image export error: {}", e),
        }
    }
}

impl std::error::Error for FormatError {}

impl From<std::io::Error> for FormatError {
    fn from(e: std::io::Error) -> Self {
        FormatError::Io(e)
    }
}

impl From<image::ImageError> for FormatError {
    fn from(e: image::ImageError) -> Self {
        FormatError::Image(e.to_string())
    }
}

fn corrupted(msg: impl Into<String>) -> FormatError {
    FormatError::Corrupted(msg.into())
}

// ---------------------------------------------------------------------------
//  Reader
// ---------------------------------------------------------------------------

/// A decoded record of any type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Project(SpriteProject),
    Group(AnimationGroup),
    Animation(SpriteAnimation),
    Sprite(Sprite),
}

struct Reader<'a> {
    words: &'a [u32],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.words.len() - self.pos
    }

    /// Read one record of type `expected`, checking the tag before touching
    /// the payload.
    fn node(&mut self, expected: RecordType) -> Result<Node, FormatError> {
        let at = self.pos;
        if self.remaining() < HEADER_WORDS {
            return Err(corrupted(format!("truncated record header at word {}", at)));
        }
        let size = self.words[at] as usize;
        let tag = self.words[at + 1];
        if tag != expected as u32 {
            return Err(corrupted(format!(
                "expected record type {} at word {}, found {}",
                expected as u32, at, tag
            )));
        }
        if size < HEADER_WORDS {
            return Err(corrupted(format!("record at word {} declares size {}", at, size)));
        }
        if size > self.remaining() {
            return Err(corrupted(format!(
                "record at word {} declares {} words, only {} remain",
                at,
                size,
                self.remaining()
            )));
        }

        let mut body = Reader {
            words: &self.words[at + HEADER_WORDS..at + size],
            pos: 0,
        };
        let node = body.payload(expected)?;
        if body.remaining() != 0 {
            return Err(corrupted(format!(
                "record at word {} has {} unread words",
                at,
                body.remaining()
            )));
        }
        self.pos = at + size;
        Ok(node)
    }

    fn children(&mut self, parent: RecordType) -> Result<Vec<Node>, FormatError> {
        let Some(kind) = parent.child() else { return Ok(Vec::new()) };
        let mut out = Vec::new();
        while self.remaining() > 0 {
            out.push(self.node(kind)?);
        }
        Ok(out)
    }

    fn header(&mut self) -> Result<u32, FormatError> {
        let w = *self
            .words
            .get(self.pos)
            .ok_or_else(|| corrupted("missing dimension word"))?;
        self.pos += 1;
        Ok(w)
    }

    fn payload(&mut self, kind: RecordType) -> Result<Node, FormatError> {
        match kind {
            RecordType::Project => {
                let groups = self
                    .children(kind)?
                    .into_iter()
                    .filter_map(|n| match n {
                        Node::Group(g) => Some(g),
                        _ => None,
                    })
                    .collect();
                Ok(Node::Project(SpriteProject { groups }))
            }
            RecordType::Group => {
                let animations = self
                    .children(kind)?
                    .into_iter()
                    .filter_map(|n| match n {
                        Node::Animation(a) => Some(a),
                        _ => None,
                    })
                    .collect();
                Ok(Node::Group(AnimationGroup { animations }))
            }
            RecordType::Animation => {
                let dims = self.header()?;
                let width = (dims >> 16) as u16;
                let height = (dims & 0xFFFF) as u16;
                let frames = self
                    .children(kind)?
                    .into_iter()
                    .filter_map(|n| match n {
                        Node::Sprite(s) => Some(s),
                        _ => None,
                    })
                    .collect();
                Ok(Node::Animation(SpriteAnimation {
                    width,
                    height,
                    frames,
                }))
            }
            RecordType::Sprite => {
                let dims = self.header()?;
                let height = (dims >> 16) as u16;
                let width = (dims & 0xFFFF) as u16;
                let count = width as usize * height as usize;
                if self.remaining() != count {
                    return Err(corrupted(format!(
                        "{}x{} sprite holds {} pixel words",
                        width,
                        height,
                        self.remaining()
                    )));
                }
                let pixels = self.words[self.pos..]
                    .iter()
                    .map(|&w| Color::from_u32(w))
                    .collect();
                self.pos = self.words.len();
                Ok(Node::Sprite(Sprite {
                    width,
                    height,
                    pixels,
                }))
            }
        }
    }
}

/// Decode a whole project file.  Any structural problem fails the whole
/// decode.
pub fn decode_project(bytes: &[u8]) -> Result<SpriteProject, FormatError> {
    if bytes.len() % 4 != 0 {
        return Err(corrupted(format!(
            "length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let mut reader = Reader {
        words: &words,
        pos: 0,
    };
    let Node::Project(project) = reader.node(RecordType::Project)? else {
        return Err(corrupted("root is not a project record"));
    };
    if reader.remaining() != 0 {
        return Err(corrupted(format!(
            "{} trailing words after project record",
            reader.remaining()
        )));
    }
    Ok(project)
}

// ---------------------------------------------------------------------------
//  Writer
// ---------------------------------------------------------------------------

struct Writer {
    words: Vec<u32>,
}

impl Writer {
    fn begin(&mut self, kind: RecordType) -> usize {
        let start = self.words.len();
        self.words.push(0);
        self.words.push(kind as u32);
        start
    }

    fn end(&mut self, start: usize) -> Result<(), FormatError> {
        let size = u32::try_from(self.words.len() - start)
            .map_err(|_| FormatError::Unencodable("record exceeds u32 words".into()))?;
        self.words[start] = size;
        Ok(())
    }

    fn sprite(&mut self, s: &Sprite) -> Result<(), FormatError> {
        if s.pixels.len() != s.width as usize * s.height as usize {
            return Err(FormatError::Unencodable(format!(
                "{}x{} sprite has {} pixels",
                s.width,
                s.height,
                s.pixels.len()
            )));
        }
        let start = self.begin(RecordType::Sprite);
        self.words.push(((s.height as u32) << 16) | s.width as u32);
        self.words.extend_from_slice(bytemuck::cast_slice::<Color, u32>(&s.pixels));
        self.end(start)
    }

    fn animation(&mut self, a: &SpriteAnimation) -> Result<(), FormatError> {
        let start = self.begin(RecordType::Animation);
        self.words.push(((a.width as u32) << 16) | a.height as u32);
        for s in &a.frames {
            self.sprite(s)?;
        }
        self.end(start)
    }

    fn group(&mut self, g: &AnimationGroup) -> Result<(), FormatError> {
        let start = self.begin(RecordType::Group);
        for a in &g.animations {
            self.animation(a)?;
        }
        self.end(start)
    }

    fn project(&mut self, p: &SpriteProject) -> Result<(), FormatError> {
        let start = self.begin(RecordType::Project);
        for g in &p.groups {
            self.group(g)?;
        }
        self.end(start)
    }
}

pub fn encode_project(project: &SpriteProject) -> Result<Vec<u8>, FormatError> {
    let mut w = Writer { words: Vec::new() };
    w.project(project)?;
    Ok(w.words.iter().flat_map(|word| word.to_le_bytes()).collect())
}

/// Save a project file.  The file is written only once encoding succeeded.
pub fn save_project(project: &SpriteProject, path: &Path) -> Result<(), FormatError> {
    let bytes = encode_project(project)?;
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&bytes)?;
    writer.flush()?;
    crate::log_info!(
        "Saved project {} ({} sprites, {} bytes)",
        path.display(),
        project.sprite_count(),
        bytes.len()
    );
    Ok(())
}

pub fn load_project(path: &Path) -> Result<SpriteProject, FormatError> {
    let bytes = std::fs::read(path)?;
    match decode_project(&bytes) {
        Ok(project) => {
            crate::log_info!(
                "Loaded project {} ({} sprites)",
                path.display(),
                project.sprite_count()
            );
            Ok(project)
        }
        Err(e) => {
            crate::log_err!("Failed to load {}: {}", path.display(), e);
            Err(e)
        }
    }
}

// ============================================================================
// PNG EXPORT
// ============================================================================

/// Write a flattened RGBA buffer as PNG.
pub fn export_png(pixels: &[Color], width: u32, height: u32, path: &Path) -> Result<(), FormatError> {
    let raw: Vec<u8> = pixels.iter().flat_map(|c| c.to_array()).collect();
    let image = RgbaImage::from_raw(width, height, raw).ok_or_else(|| {
        FormatError::Image(format!(
            "{} pixels do not fill {}x{}",
            pixels.len(),
            width,
            height
        ))
    })?;
    image.save_with_format(path, ImageFormat::Png)?;
    crate::log_info!("Exported {}x{} PNG to {}", width, height, path.display());
    Ok(())
}
