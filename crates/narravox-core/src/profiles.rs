//! Character profiles, genre defaults, and the per-run story context.
//!
//! Genre defaults are an immutable static table loaded once; profiles are
//! supplied by the caller per run. Voice catalogs and archetype lookup live
//! upstream and are out of scope here.

use crate::canonical::{DirectionContext, EmotionTag};
use crate::segment::Segment;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Speech pattern marker: the character leans on key words.
pub const PATTERN_EMPHASIS: &str = "emphasizes key words";
/// Speech pattern marker: the character uses dramatic pauses.
pub const PATTERN_DRAMATIC_PAUSES: &str = "uses dramatic pauses";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    Child,
    Teen,
    #[default]
    Adult,
    Elderly,
}

/// Caller-supplied per-character voice settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterProfile {
    pub name: String,
    #[serde(default)]
    pub age_group: AgeGroup,
    /// Default emotion when a line carries no usable direction.
    #[serde(default)]
    pub default_emotion: Option<String>,
    #[serde(default)]
    pub base_stability: Option<f32>,
    #[serde(default)]
    pub base_style: Option<f32>,
    /// Freeform speech pattern markers, matched case-insensitively.
    #[serde(default)]
    pub speech_patterns: Vec<String>,
}

impl CharacterProfile {
    pub fn has_pattern(&self, pattern: &str) -> bool {
        self.speech_patterns
            .iter()
            .any(|p| p.eq_ignore_ascii_case(pattern))
    }
}

/// Per-genre synthesis defaults.
#[derive(Debug, Clone, Copy)]
pub struct GenreDefaults {
    pub stability: f32,
    pub style: f32,
    pub emotion: EmotionTag,
}

static GENRE_TABLE: Lazy<Vec<(&'static str, GenreDefaults)>> = Lazy::new(|| {
    use EmotionTag::*;
    let d = |stability, style, emotion| GenreDefaults {
        stability,
        style,
        emotion,
    };
    vec![
        ("action", d(0.35, 0.70, Excited)),
        ("adventure", d(0.40, 0.65, Excited)),
        ("thriller", d(0.30, 0.75, Excited)),
        ("horror", d(0.30, 0.80, Fearful)),
        ("mystery", d(0.45, 0.60, Whisper)),
        ("fantasy", d(0.45, 0.60, Excited)),
        ("comedy", d(0.40, 0.65, Excited)),
        ("romance", d(0.60, 0.50, Calm)),
        ("drama", d(0.55, 0.50, Calm)),
        ("slice of life", d(0.65, 0.40, Calm)),
    ]
});

/// Look up genre defaults by substring, case-insensitive ("dark fantasy"
/// hits "fantasy").
pub fn genre_defaults(genre: &str) -> Option<GenreDefaults> {
    let lowered = genre.to_lowercase();
    GENRE_TABLE
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|&(_, defaults)| defaults)
}

/// Everything the pipeline knows about the story being annotated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryContext {
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub scene_mood: Option<String>,
    /// Scene-level baseline tags, the last resort of the narrator
    /// refinement heuristic.
    #[serde(default)]
    pub scene_baseline: Vec<String>,
    #[serde(default)]
    pub characters: HashMap<String, CharacterProfile>,
}

impl StoryContext {
    pub fn profile_for(&self, speaker: &str) -> Option<&CharacterProfile> {
        self.characters
            .get(speaker)
            .or_else(|| {
                self.characters
                    .values()
                    .find(|p| p.name.eq_ignore_ascii_case(speaker))
            })
    }

    /// Resolve the canonicalization context for one segment.
    pub fn direction_context(&self, segment: &Segment) -> DirectionContext {
        let profile = self.profile_for(&segment.speaker);
        DirectionContext {
            age_group: profile.map(|p| p.age_group).unwrap_or_default(),
            scene_mood: self.scene_mood.clone(),
            genre: self.genre.clone(),
            profile_default: profile.and_then(|p| p.default_emotion.clone()),
            speaker_is_narrator: !segment.is_dialogue(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genre_lookup_is_substring_and_case_insensitive() {
        assert_eq!(
            genre_defaults("Dark Fantasy").map(|d| d.emotion),
            Some(EmotionTag::Excited)
        );
        assert_eq!(
            genre_defaults("romance novel").map(|d| d.emotion),
            Some(EmotionTag::Calm)
        );
        assert!(genre_defaults("cookbook").is_none());
    }

    #[test]
    fn profile_lookup_falls_back_to_name_field() {
        let mut ctx = StoryContext::default();
        ctx.characters.insert(
            "roland".into(),
            CharacterProfile {
                name: "Roland".into(),
                ..Default::default()
            },
        );
        assert!(ctx.profile_for("Roland").is_some());
    }

    #[test]
    fn narrator_segments_resolve_as_narrator_context() {
        let ctx = StoryContext::default();
        let seg = Segment::narrator(0, "The wind howled.");
        assert!(ctx.direction_context(&seg).speaker_is_narrator);
    }
}
