//! Companion definitions and the read-only catalog joins are checked against.
//!
//! The catalog only records where a companion's mesh and texture live; loading
//! and uploading those assets belongs to the renderer.

use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use shared::NAME_LEN;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    #[default]
    Obj,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TextureSource {
    #[default]
    None,
    Png {
        file: PathBuf,
    },
    Color {
        r: f32,
        g: f32,
        b: f32,
        a: f32,
    },
}

/// One selectable avatar definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionDef {
    pub id: String,
    #[serde(default)]
    pub model_type: ModelType,
    pub model_file: PathBuf,
    #[serde(default)]
    pub texture: TextureSource,
}

impl CompanionDef {
    /// Makes relative asset paths relative to `base` instead of the working directory.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        if self.model_file.is_relative() {
            self.model_file = base.join(&self.model_file);
        }
        if let TextureSource::Png { file } = &mut self.texture {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
        self
    }
}

/// Companion id → definition. Built once at startup and never mutated.
#[derive(Debug, Clone, Default)]
pub struct CompanionCatalog {
    companions: HashMap<String, CompanionDef>,
}

impl CompanionCatalog {
    /// Builds the catalog, rejecting ids a client could never send in a
    /// `Join` and duplicate ids.
    pub fn new(defs: impl IntoIterator<Item = CompanionDef>) -> Result<Self, ServerError> {
        let mut companions = HashMap::new();
        for def in defs {
            if def.id.is_empty() {
                return Err(ServerError::InvalidConfig(
                    "companion id must not be empty".to_string(),
                ));
            }
            if def.id.len() >= NAME_LEN || def.id.contains('\0') {
                return Err(ServerError::InvalidConfig(format!(
                    "companion id `{}` does not fit the {} byte wire field",
                    def.id, NAME_LEN
                )));
            }
            if companions.contains_key(&def.id) {
                return Err(ServerError::InvalidConfig(format!(
                    "duplicate companion id `{}`",
                    def.id
                )));
            }
            companions.insert(def.id.clone(), def);
        }
        Ok(Self { companions })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.companions.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&CompanionDef> {
        self.companions.get(id)
    }

    /// Sorted ids, for startup logging.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.companions.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.companions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companions.is_empty()
    }
}
