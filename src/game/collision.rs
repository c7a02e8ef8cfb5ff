//! Pixel-accurate hit detection between two characters

use super::character::{CharacterDefinition, CharacterState};
use crate::ws::protocol::AttackKind;

/// Axis-aligned rectangle in screen space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn frame_of(definition: &CharacterDefinition, state: &CharacterState) -> Self {
        Self {
            x: state.motion.x,
            y: state.motion.y,
            width: definition.frame_width as f32,
            height: definition.frame_height as f32,
        }
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }

    /// Overlap rectangle, if any
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.overlaps(other) {
            return None;
        }
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);
        Some(Rect {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        })
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Result of a hit test with the number of pixels examined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitProbe {
    pub hit: bool,
    pub pixels_tested: u64,
}

/// Sprite-space column of screen column `x` for a character drawn at `origin_x`
#[inline]
fn local_x(x: i32, origin_x: f32, frame_width: u32, direction: f32) -> i32 {
    let local = x - origin_x as i32;
    if direction < 0.0 {
        frame_width as i32 - 1 - local
    } else {
        local
    }
}

/// Collision oracle over precomputed masks
pub struct CollisionOracle;

impl CollisionOracle {
    /// Does `attacker`'s `kind` attack connect with `defender`?
    ///
    /// Both states must be expressed in the same screen frame.
    pub fn hits(
        attacker_def: &CharacterDefinition,
        attacker: &CharacterState,
        defender_def: &CharacterDefinition,
        defender: &CharacterState,
        kind: AttackKind,
    ) -> bool {
        Self::probe(attacker_def, attacker, defender_def, defender, kind).hit
    }

    pub fn probe(
        attacker_def: &CharacterDefinition,
        attacker: &CharacterState,
        defender_def: &CharacterDefinition,
        defender: &CharacterState,
        kind: AttackKind,
    ) -> HitProbe {
        let miss = HitProbe {
            hit: false,
            pixels_tested: 0,
        };

        let overlap = match Rect::frame_of(attacker_def, attacker)
            .intersection(&Rect::frame_of(defender_def, defender))
        {
            Some(overlap) => overlap,
            None => return miss,
        };

        let (weapon, body) = match (
            attacker_def.weapon_mask(kind),
            defender_def.mask(defender.hit_pose()),
        ) {
            (Some(weapon), Some(body)) => (weapon, body),
            _ => return miss,
        };

        let mut pixels_tested = 0;
        let (a, d) = (&attacker.motion, &defender.motion);

        for y in overlap.y as i32..(overlap.y + overlap.height) as i32 {
            let attacker_y = y - a.y as i32;
            let defender_y = y - d.y as i32;

            for x in overlap.x as i32..(overlap.x + overlap.width) as i32 {
                pixels_tested += 1;
                let attacker_x = local_x(x, a.x, attacker_def.frame_width, a.direction);
                let defender_x = local_x(x, d.x, defender_def.frame_width, d.direction);

                if weapon.get(attacker_x, attacker_y) && body.get(defender_x, defender_y) {
                    return HitProbe {
                        hit: true,
                        pixels_tested,
                    };
                }
            }
        }

        HitProbe {
            hit: false,
            pixels_tested,
        }
    }
}
