//! Character catalog loading.
//!
//! The catalog is a JSON file listing characters and, per animation, the
//! frame strip geometry plus raw 8-bit alpha planes for the character sheet
//! and, for attacks, the weapon sheet. Paths are relative to the catalog.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use super::character::{Animation, CharacterDefinition, CharacterRegistry};
use super::mask::{build_mask, AlphaSheet, SilhouetteBox};
use crate::ws::protocol::AttackKind;

/// Catalog loading errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Sheet {} is {actual} bytes, expected {expected}", path.display())]
    SheetSize {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("Character {character}: {reason}")]
    Invalid { character: u32, reason: String },
}

#[derive(Debug, Deserialize)]
pub struct Catalog {
    pub characters: Vec<CharacterEntry>,
}

#[derive(Debug, Deserialize)]
pub struct CharacterEntry {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub health: i32,
    pub damage: i32,
    #[serde(default)]
    pub cost: i32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub animations: Vec<AnimationEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AnimationEntry {
    pub animation: Animation,
    pub frame_count: u32,
    /// Frames per second
    pub frame_rate: f32,
    pub sheet: SheetEntry,
    #[serde(default)]
    pub weapon_sheet: Option<SheetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetEntry {
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
}

impl Catalog {
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

/// Read a raw alpha plane
fn read_sheet(base: &Path, entry: &SheetEntry) -> Result<AlphaSheet, CatalogError> {
    let path = base.join(&entry.path);
    let alpha = std::fs::read(&path).map_err(|source| CatalogError::Io {
        path: path.clone(),
        source,
    })?;
    let expected = entry.width * entry.height;
    let actual = alpha.len();
    AlphaSheet::new(entry.width, entry.height, alpha).ok_or(CatalogError::SheetSize {
        path,
        expected,
        actual,
    })
}

/// Total animation time. Frame time is whole nanoseconds of an integer rate.
fn animation_millis(frame_count: u32, frame_rate: f32) -> u64 {
    let frame_nanos = 1_000_000_000 / (frame_rate as u64).max(1);
    frame_nanos * u64::from(frame_count) / 1_000_000
}

/// Build a definition, reading sheets relative to `base`
pub fn build_definition(
    entry: &CharacterEntry,
    base: &Path,
) -> Result<CharacterDefinition, CatalogError> {
    let invalid = |reason: &str| CatalogError::Invalid {
        character: entry.id,
        reason: reason.to_string(),
    };
    if entry.frame_width == 0 || entry.frame_height == 0 {
        return Err(invalid("frame size must be positive"));
    }
    if entry.health <= 0 {
        return Err(invalid("health must be positive"));
    }

    let (fw, fh) = (entry.frame_width as usize, entry.frame_height as usize);
    let mut silhouette = SilhouetteBox::default();
    let mut masks = HashMap::new();
    let mut weapon_masks = HashMap::new();
    let mut durations_ms = HashMap::new();

    for anim in &entry.animations {
        if anim.frame_count == 0 || anim.frame_rate < 1.0 {
            return Err(invalid("animations need frames and a frame rate of at least 1"));
        }
        let count = anim.frame_count as usize;

        let sheet = read_sheet(base, &anim.sheet)?;
        masks.insert(
            anim.animation,
            build_mask(&sheet, count, fw, fh, Some(&mut silhouette)),
        );

        let attack = match anim.animation {
            Animation::Attack => Some(AttackKind::Light),
            Animation::HeavyAttack => Some(AttackKind::Heavy),
            _ => None,
        };
        if let (Some(kind), Some(weapon)) = (attack, &anim.weapon_sheet) {
            let sheet = read_sheet(base, weapon)?;
            weapon_masks.insert(kind, build_mask(&sheet, count, fw, fh, None));
        }

        durations_ms.insert(
            anim.animation,
            animation_millis(anim.frame_count, anim.frame_rate),
        );
    }

    if silhouette.is_empty() {
        return Err(invalid("character sheets are fully transparent"));
    }
    let (_, _, _, silhouette_height) = silhouette.rect();

    Ok(CharacterDefinition {
        id: entry.id,
        name: entry.name.clone(),
        description: entry.description.clone(),
        health: entry.health,
        damage: entry.damage,
        cost: entry.cost,
        frame_width: entry.frame_width,
        frame_height: entry.frame_height,
        silhouette_height,
        x_boundary: silhouette.x_boundary(entry.frame_width),
        masks,
        weapon_masks,
        durations_ms,
    })
}

/// Load every character of the catalog at `path` into a registry
pub fn load_registry(path: &Path) -> Result<CharacterRegistry, CatalogError> {
    let catalog = Catalog::from_file(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let registry = CharacterRegistry::new();

    for entry in &catalog.characters {
        let definition = build_definition(entry, base)?;
        debug!(
            character_id = definition.id,
            x_boundary = definition.x_boundary,
            silhouette_height = definition.silhouette_height,
            attack_ms = definition.duration_ms(Animation::Attack),
            "Built character masks"
        );
        registry.insert(definition);
    }

    info!(path = %path.display(), characters = registry.len(), "Character catalog loaded");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Scratch directory with a one-character catalog
    fn scratch_catalog() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("duel_catalog_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        // 2 frames of 4x2: body in columns 1..=2 of each frame
        let body: Vec<u8> = [0, 255, 255, 0, 0, 255, 255, 0].repeat(2);
        // Weapon reaches the right edge of the frame
        let weapon: Vec<u8> = [0, 255, 255, 255, 0, 255, 255, 255].repeat(2);
        std::fs::write(dir.join("body.alpha"), &body).unwrap();
        std::fs::write(dir.join("weapon.alpha"), &weapon).unwrap();
        std::fs::write(dir.join("short.alpha"), [255u8; 3]).unwrap();

        let json = r#"{
            "characters": [{
                "id": 7,
                "name": "Tester",
                "health": 90,
                "damage": 12,
                "frame_width": 8,
                "frame_height": 4,
                "animations": [
                    {"animation": "idle", "frame_count": 2, "frame_rate": 8,
                     "sheet": {"path": "body.alpha", "width": 8, "height": 2}},
                    {"animation": "attack", "frame_count": 2, "frame_rate": 10,
                     "sheet": {"path": "body.alpha", "width": 8, "height": 2},
                     "weapon_sheet": {"path": "weapon.alpha", "width": 8, "height": 2}}
                ]
            }]
        }"#;
        let path = dir.join("characters.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn animation_time_follows_frame_rate() {
        assert_eq!(animation_millis(6, 12.0), 499);
        assert_eq!(animation_millis(4, 10.0), 400);
        assert_eq!(animation_millis(8, 0.0), 8000);
    }

    #[test]
    fn loads_masks_silhouette_and_timings() {
        let path = scratch_catalog();
        let registry = load_registry(&path).unwrap();
        let def = registry.get(7).unwrap();

        assert_eq!(def.duration_ms(Animation::Attack), 200);
        assert_eq!(def.duration_ms(Animation::Idle), 250);
        // Sheets are upscaled 2x: body spans columns 2..=5, all rows
        let idle = def.mask(Animation::Idle).unwrap();
        assert!(idle.get(2, 0) && idle.get(5, 3));
        assert!(!idle.get(1, 0) && !idle.get(6, 0));
        assert_eq!(def.silhouette_height, 4);
        assert_eq!(def.x_boundary, 2);

        let weapon = def.weapon_mask(AttackKind::Light).unwrap();
        assert!(weapon.get(7, 2));
        assert!(def.weapon_mask(AttackKind::Heavy).is_none());

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn wrong_sheet_size_is_reported() {
        let path = scratch_catalog();
        let base = path.parent().unwrap();
        let entry = CharacterEntry {
            id: 1,
            name: "Broken".into(),
            description: String::new(),
            health: 10,
            damage: 1,
            cost: 0,
            frame_width: 4,
            frame_height: 4,
            animations: vec![AnimationEntry {
                animation: Animation::Idle,
                frame_count: 1,
                frame_rate: 8.0,
                sheet: SheetEntry {
                    path: "short.alpha".into(),
                    width: 2,
                    height: 2,
                },
                weapon_sheet: None,
            }],
        };

        match build_definition(&entry, base) {
            Err(CatalogError::SheetSize {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        std::fs::remove_dir_all(base).ok();
    }

    #[test]
    fn missing_catalog_is_an_io_error() {
        let loaded = load_registry(Path::new("/nonexistent/characters.json"));
        assert!(matches!(loaded, Err(CatalogError::Io { .. })));
    }

    #[test]
    fn bundled_catalog_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/characters.json");
        let registry = load_registry(&path).unwrap();
        assert!(registry.len() >= 2);
        for id in [1, 2] {
            let def = registry.get(id).unwrap();
            assert!(def.mask(Animation::Idle).is_some());
            assert!(def.weapon_mask(AttackKind::Light).is_some());
            assert!(def.duration_ms(Animation::Attack) > 0);
        }
    }
}
