use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::canvas::{Document, MAX_CANVAS_DIM};
use crate::io::{self, FormatError, Sprite, SpriteProject};
use crate::settings::EngineConfig;

/// Position of a sprite inside a project's library.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpriteRef {
    pub group: usize,
    pub animation: usize,
    pub frame: usize,
}

/// Single open document.
pub struct Project {
    pub id: Uuid,
    /// The sprite being edited, as a layered document.
    pub document: Document,
    /// Every sprite of the project file.  The edited sprite is written back
    /// as the flattened document on save.
    pub library: SpriteProject,
    pub editing: SpriteRef,
    /// `None` for unsaved/untitled files.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,

    /// Display name (derived from path or "Untitled-X")
    pub name: String,

    config: EngineConfig,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, width: u32, height: u32, config: &EngineConfig) -> Self {
        let document = Document::with_config(width, height, config);
        let library = SpriteProject::single(Sprite::new(document.cols as u16, document.rows as u16));
        Self {
            id: Uuid::new_v4(),
            document,
            library,
            editing: SpriteRef::default(),
            path: None,
            is_dirty: false,
            name: format!("Untitled-{}", untitled_counter),
            config: config.clone(),
        }
    }

    /// Open a project file and start editing its first sprite.  A project
    /// without sprites gets a blank one of the configured default size.
    pub fn open(path: &Path, config: &EngineConfig) -> Result<Self, FormatError> {
        let mut library = io::load_project(path)?;
        if library.first_sprite().is_none() {
            crate::log_warn!("{} holds no sprites, adding a blank one", path.display());
            library = SpriteProject::single(Sprite::new(
                config.default_width as u16,
                config.default_height as u16,
            ));
        }
        let editing = first_ref(&library);
        if let Some(sprite) = library.sprite(editing.group, editing.animation, editing.frame) {
            check_editable(sprite)?;
        }
        let document = document_for(&library, editing, config);
        let mut project = Self {
            id: Uuid::new_v4(),
            document,
            library,
            editing,
            path: Some(path.to_path_buf()),
            is_dirty: false,
            name: String::new(),
            config: config.clone(),
        };
        project.update_name_from_path();
        Ok(project)
    }

    /// Switch editing to another sprite of the library.  Edits to the current
    /// sprite are written back first; the new document starts with a fresh
    /// history.
    pub fn edit_sprite(&mut self, target: SpriteRef) -> bool {
        match self.library.sprite(target.group, target.animation, target.frame) {
            None => return false,
            Some(sprite) => {
                if let Err(e) = check_editable(sprite) {
                    crate::log_warn!("Cannot edit sprite: {}", e);
                    return false;
                }
            }
        }
        self.store_document();
        self.editing = target;
        self.document = document_for(&self.library, target, &self.config);
        true
    }

    /// Write the flattened document into the edited sprite of the library.
    pub fn store_document(&mut self) {
        let (cols, rows) = (self.document.cols, self.document.rows);
        let pixels = self.document.render();
        let SpriteRef {
            group,
            animation,
            frame,
        } = self.editing;
        if let Some(sprite) = self.library.sprite_mut(group, animation, frame) {
            sprite.width = cols as u16;
            sprite.height = rows as u16;
            sprite.pixels = pixels;
        }
    }

    pub fn save(&mut self) -> Result<(), FormatError> {
        let Some(path) = self.path.clone() else {
            return Err(FormatError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "project has no file path",
            )));
        };
        self.save_as(&path)
    }

    pub fn save_as(&mut self, path: &Path) -> Result<(), FormatError> {
        self.store_document();
        io::save_project(&self.library, path)?;
        self.path = Some(path.to_path_buf());
        self.update_name_from_path();
        self.mark_clean();
        Ok(())
    }

    /// Flatten the document and write it as PNG.
    pub fn export_png(&self, path: &Path) -> Result<(), FormatError> {
        let pixels = self.document.render();
        io::export_png(&pixels, self.document.cols, self.document.rows, path)
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string());
        }
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }
}

fn first_ref(library: &SpriteProject) -> SpriteRef {
    for (g, group) in library.groups.iter().enumerate() {
        for (a, anim) in group.animations.iter().enumerate() {
            if !anim.frames.is_empty() {
                return SpriteRef {
                    group: g,
                    animation: a,
                    frame: 0,
                };
            }
        }
    }
    SpriteRef::default()
}

/// Documents can't represent empty or oversized sprites, and saving one
/// back would lose its pixels.
fn check_editable(sprite: &Sprite) -> Result<(), FormatError> {
    let (w, h) = (sprite.width as u32, sprite.height as u32);
    if w == 0 || h == 0 || w > MAX_CANVAS_DIM || h > MAX_CANVAS_DIM {
        return Err(FormatError::Unsupported(format!(
            "sprite is {}x{}, editable sizes are 1..={} per side",
            w, h, MAX_CANVAS_DIM
        )));
    }
    Ok(())
}

fn document_for(library: &SpriteProject, target: SpriteRef, config: &EngineConfig) -> Document {
    match library.sprite(target.group, target.animation, target.frame) {
        Some(s) => Document::from_pixels(s.width as u32, s.height as u32, s.pixels.clone(), config),
        None => Document::with_config(config.default_width, config.default_height, config),
    }
}
