//! Delivery-direction canonicalization.
//!
//! Maps freeform natural-language directions ("ominously, with dread",
//! "[furious]", "she whispered") to the fixed vocabulary the synthesizer
//! understands: eight emotion tags plus `pause:<n>s` markers. Total by
//! construction; when nothing matches, a context-aware default fills in.
//! All lookup tables are immutable statics loaded once.

use crate::profiles::{genre_defaults, AgeGroup};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The eight canonical emotion tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionTag {
    Excited,
    Sad,
    Angry,
    Calm,
    Fearful,
    Surprised,
    Whisper,
    Shouting,
}

impl EmotionTag {
    pub fn as_str(self) -> &'static str {
        match self {
            EmotionTag::Excited => "excited",
            EmotionTag::Sad => "sad",
            EmotionTag::Angry => "angry",
            EmotionTag::Calm => "calm",
            EmotionTag::Fearful => "fearful",
            EmotionTag::Surprised => "surprised",
            EmotionTag::Whisper => "whisper",
            EmotionTag::Shouting => "shouting",
        }
    }

    /// Exact canonical token, case-insensitive.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "excited" => Some(EmotionTag::Excited),
            "sad" => Some(EmotionTag::Sad),
            "angry" => Some(EmotionTag::Angry),
            "calm" => Some(EmotionTag::Calm),
            "fearful" => Some(EmotionTag::Fearful),
            "surprised" => Some(EmotionTag::Surprised),
            "whisper" => Some(EmotionTag::Whisper),
            "shouting" => Some(EmotionTag::Shouting),
            _ => None,
        }
    }
}

/// True for a bare canonical emotion token.
pub fn is_emotion_tag(token: &str) -> bool {
    EmotionTag::parse(token).is_some()
}

/// True for a `pause:<n>s` marker.
pub fn is_pause_tag(token: &str) -> bool {
    token.starts_with("pause:")
}

/// Combination mappings: one descriptive keyword to an ordered pair of
/// tags capturing a nuance no single tag expresses. Matched by substring
/// so adverb forms ("ominously") hit their root keyword. Checked before
/// single-tag mappings and short-circuiting them.
static COMBINATION_TABLE: Lazy<Vec<(&'static str, &'static [EmotionTag])>> = Lazy::new(|| {
    use EmotionTag::*;
    vec![
        ("ominous", &[Whisper, Angry][..]),
        ("mysterious", &[Whisper, Fearful][..]),
        ("menacing", &[Angry, Whisper][..]),
        ("heartbroken", &[Sad, Whisper][..]),
        ("ecstatic", &[Excited, Surprised][..]),
        ("panicked", &[Fearful, Shouting][..]),
        ("panicking", &[Fearful, Shouting][..]),
        ("awestruck", &[Surprised, Whisper][..]),
        ("triumphant", &[Excited, Shouting][..]),
        ("desperate", &[Fearful, Sad][..]),
        ("wistful", &[Sad, Calm][..]),
        ("conspiratorial", &[Whisper, Excited][..]),
        ("thunderstruck", &[Surprised, Fearful][..]),
    ]
});

/// Many-to-one mapping from descriptive adjectives and delivery verbs to a
/// single canonical emotion.
static SINGLE_TAG_TABLE: Lazy<Vec<(&'static str, EmotionTag)>> = Lazy::new(|| {
    use EmotionTag::*;
    vec![
        // excited
        ("thrilled", Excited),
        ("energetic", Excited),
        ("enthusiastic", Excited),
        ("eager", Excited),
        ("cheerful", Excited),
        ("joyful", Excited),
        ("exuberant", Excited),
        ("lively", Excited),
        ("giddy", Excited),
        ("animated", Excited),
        // sad
        ("mournful", Sad),
        ("somber", Sad),
        ("sorrowful", Sad),
        ("tearful", Sad),
        ("gloomy", Sad),
        ("melancholy", Sad),
        ("dejected", Sad),
        ("grieving", Sad),
        ("crestfallen", Sad),
        // angry
        ("furious", Angry),
        ("irate", Angry),
        ("enraged", Angry),
        ("seething", Angry),
        ("irritated", Angry),
        ("annoyed", Angry),
        ("hostile", Angry),
        ("bitter", Angry),
        ("indignant", Angry),
        // calm
        ("gentle", Calm),
        ("soothing", Calm),
        ("relaxed", Calm),
        ("serene", Calm),
        ("tender", Calm),
        ("steady", Calm),
        ("measured", Calm),
        ("tranquil", Calm),
        ("warm", Calm),
        // fearful
        ("terrified", Fearful),
        ("scared", Fearful),
        ("afraid", Fearful),
        ("anxious", Fearful),
        ("nervous", Fearful),
        ("dread", Fearful),
        ("uneasy", Fearful),
        ("trembling", Fearful),
        ("timid", Fearful),
        ("horrified", Fearful),
        // surprised
        ("astonished", Surprised),
        ("amazed", Surprised),
        ("shocked", Surprised),
        ("startled", Surprised),
        ("stunned", Surprised),
        ("incredulous", Surprised),
        ("bewildered", Surprised),
        // whisper
        ("whispered", Whisper),
        ("whispering", Whisper),
        ("hushed", Whisper),
        ("quiet", Whisper),
        ("quietly", Whisper),
        ("murmured", Whisper),
        ("muttered", Whisper),
        ("undertone", Whisper),
        // shouting
        ("shouted", Shouting),
        ("yelled", Shouting),
        ("yelling", Shouting),
        ("screamed", Shouting),
        ("screaming", Shouting),
        ("bellowed", Shouting),
        ("roared", Shouting),
        ("booming", Shouting),
        ("thunderous", Shouting),
    ]
});

/// Scene mood to default emotion. Shared by the canonicalizer context
/// default and the narrator refinement heuristic.
static MOOD_DEFAULTS: Lazy<Vec<(&'static str, EmotionTag)>> = Lazy::new(|| {
    use EmotionTag::*;
    vec![
        ("tense", Fearful),
        ("suspense", Fearful),
        ("eerie", Fearful),
        ("joy", Excited),
        ("celebrat", Excited),
        ("battle", Excited),
        ("somber", Sad),
        ("mourn", Sad),
        ("tragic", Sad),
        ("romantic", Calm),
        ("peaceful", Calm),
        ("mysterious", Whisper),
    ]
});

/// Explicit delivery verbs whose signal must survive the whole pipeline.
static PROTECTED_DELIVERY: Lazy<Vec<(&'static str, EmotionTag)>> = Lazy::new(|| {
    use EmotionTag::*;
    vec![
        ("whisper", Whisper),
        ("hiss", Whisper),
        ("murmur", Whisper),
        ("shout", Shouting),
        ("yell", Shouting),
        ("scream", Shouting),
        ("bellow", Shouting),
    ]
});

static BRACKET_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\[\]]+)\]").expect("bracket token regex"));
static PAUSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pause:(\d+(?:\.\d+)?)s").expect("pause token regex"));

/// Context used to synthesize a default when a direction carries no usable
/// emotion signal.
#[derive(Debug, Clone, Default)]
pub struct DirectionContext {
    pub age_group: AgeGroup,
    pub scene_mood: Option<String>,
    pub genre: Option<String>,
    /// Character-profile default emotion, if the speaker has a profile.
    pub profile_default: Option<String>,
    pub speaker_is_narrator: bool,
}

/// Canonicalization result: ordered tags plus synthesis adjustments.
#[derive(Debug, Clone)]
pub struct CanonicalDirection {
    /// Emotion tags first (at most 3), then any pause markers.
    pub tags: Vec<String>,
    /// Clamped to [0.8, 1.2].
    pub speed_modifier: f32,
    /// Small delta applied on top of the merged stability.
    pub stability_adjust: f32,
}

/// Map a freeform direction (or absence thereof) to canonical tags plus
/// speed and stability adjustments. Pure and total: always yields at least
/// one emotion tag.
pub fn canonicalize_direction(
    direction: Option<&str>,
    ctx: &DirectionContext,
) -> CanonicalDirection {
    let raw = direction.unwrap_or("");
    let lowered = raw.to_lowercase();
    let mut emotions: Vec<EmotionTag> = Vec::new();

    // 1. Combination mappings short-circuit single-tag matches: they encode
    //    compound nuance a single tag cannot.
    if !lowered.is_empty() {
        for (keyword, tags) in COMBINATION_TABLE.iter() {
            if lowered.contains(keyword) {
                for tag in *tags {
                    push_unique(&mut emotions, *tag);
                }
                break;
            }
        }
    }

    // 2. Already-bracketed tokens: canonical directly, else mapped, else
    //    ignored.
    if emotions.is_empty() {
        for cap in BRACKET_TOKEN_RE.captures_iter(&lowered) {
            let token = cap[1].trim();
            if is_pause_tag(token) {
                continue;
            }
            if let Some(tag) = EmotionTag::parse(token) {
                push_unique(&mut emotions, tag);
            } else if let Some(tag) = lookup_single(token) {
                push_unique(&mut emotions, tag);
            }
        }
    }

    // 3. Raw-text scan: canonical keywords first, then mapping keywords.
    if emotions.is_empty() {
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        for word in &words {
            if let Some(tag) = EmotionTag::parse(word) {
                push_unique(&mut emotions, tag);
            }
        }
        if emotions.is_empty() {
            for word in &words {
                if let Some(tag) = lookup_single(word) {
                    push_unique(&mut emotions, tag);
                }
            }
        }
    }

    // 4. Pause markers are additive and never substitute for an emotion.
    let pauses = extract_pause_tags(&lowered);

    // 5. Context-aware default when no emotion was found.
    if emotions.is_empty() {
        emotions.push(context_default_emotion(ctx));
    }

    // 6. Vocabulary economy.
    emotions.truncate(3);

    let (speed_modifier, stability_adjust) = delivery_adjustments(emotions[0]);
    let tags = emotions
        .iter()
        .map(|t| t.as_str().to_string())
        .chain(pauses)
        .collect();

    CanonicalDirection {
        tags,
        speed_modifier,
        stability_adjust,
    }
}

/// Default emotion for a segment with no usable direction, in priority:
/// profile default, narrator baseline, age-appropriate default, scene
/// mood, genre, `calm`.
pub fn context_default_emotion(ctx: &DirectionContext) -> EmotionTag {
    if let Some(profile_default) = ctx.profile_default.as_deref() {
        if let Some(tag) = EmotionTag::parse(profile_default) {
            return tag;
        }
    }
    if ctx.speaker_is_narrator {
        return EmotionTag::Calm;
    }
    // Young character defaults must carry more expressive energy than calm.
    match ctx.age_group {
        AgeGroup::Child => return EmotionTag::Excited,
        AgeGroup::Teen => return EmotionTag::Surprised,
        AgeGroup::Adult | AgeGroup::Elderly => {}
    }
    if let Some(mood) = ctx.scene_mood.as_deref() {
        if let Some(tag) = mood_default_emotion(mood) {
            return tag;
        }
    }
    if let Some(genre) = ctx.genre.as_deref() {
        if let Some(defaults) = genre_defaults(genre) {
            return defaults.emotion;
        }
    }
    EmotionTag::Calm
}

/// Scene-mood table lookup, shared with the narrator refinement heuristic.
pub fn mood_default_emotion(mood: &str) -> Option<EmotionTag> {
    let lowered = mood.to_lowercase();
    MOOD_DEFAULTS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|&(_, tag)| tag)
}

/// Delivery emotions the speaker tag arrived with that later passes must
/// preserve (explicit whispered/shouted markers in the attribution).
pub fn protected_delivery_tags(attribution: Option<&str>) -> Vec<EmotionTag> {
    let Some(attribution) = attribution else {
        return Vec::new();
    };
    let lowered = attribution.to_lowercase();
    let mut tags = Vec::new();
    for (keyword, tag) in PROTECTED_DELIVERY.iter() {
        if lowered.contains(keyword) {
            push_unique(&mut tags, *tag);
        }
    }
    tags
}

/// Extract well-formed `pause:<n>s` markers, snapped to the wire steps
/// 0.5 / 1 / 1.5 / 2 seconds.
pub fn extract_pause_tags(input: &str) -> Vec<String> {
    PAUSE_RE
        .captures_iter(input)
        .filter_map(|cap| cap[1].parse::<f32>().ok())
        .map(snap_pause)
        .collect()
}

fn snap_pause(seconds: f32) -> String {
    let clamped = seconds.clamp(0.5, 2.0);
    let steps = [0.5_f32, 1.0, 1.5, 2.0];
    let nearest = steps
        .iter()
        .copied()
        .min_by(|a, b| {
            (a - clamped)
                .abs()
                .partial_cmp(&(b - clamped).abs())
                .expect("finite pause values")
        })
        .unwrap_or(1.0);
    if nearest.fract() == 0.0 {
        format!("pause:{}s", nearest as u32)
    } else {
        format!("pause:{nearest}s")
    }
}

fn lookup_single(word: &str) -> Option<EmotionTag> {
    SINGLE_TAG_TABLE
        .iter()
        .find(|(keyword, _)| *keyword == word)
        .map(|&(_, tag)| tag)
}

fn push_unique(tags: &mut Vec<EmotionTag>, tag: EmotionTag) {
    if !tags.contains(&tag) {
        tags.push(tag);
    }
}

/// Speed and stability deltas keyed off the primary tag.
fn delivery_adjustments(primary: EmotionTag) -> (f32, f32) {
    let (speed, stability_adjust) = match primary {
        EmotionTag::Whisper => (0.9, 0.1),
        EmotionTag::Shouting => (1.1, -0.1),
        EmotionTag::Excited => (1.05, -0.05),
        EmotionTag::Sad => (0.95, 0.05),
        EmotionTag::Fearful => (1.0, -0.05),
        EmotionTag::Angry => (1.05, -0.1),
        EmotionTag::Surprised => (1.05, -0.05),
        EmotionTag::Calm => (0.95, 0.1),
    };
    (f32::clamp(speed, 0.8, 1.2), stability_adjust)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adult_ctx() -> DirectionContext {
        DirectionContext::default()
    }

    #[test]
    fn total_even_on_empty_input() {
        for input in [None, Some(""), Some("   "), Some("???")] {
            let result = canonicalize_direction(input, &adult_ctx());
            assert!(
                result.tags.iter().any(|t| is_emotion_tag(t)),
                "no emotion tag for {input:?}"
            );
        }
    }

    #[test]
    fn combination_match_beats_single_tag_match() {
        // "dread" alone would map to fearful; the "ominous" combination
        // must win.
        let result = canonicalize_direction(Some("ominously, with dread"), &adult_ctx());
        assert_eq!(result.tags, vec!["whisper", "angry"]);
    }

    #[test]
    fn bracketed_canonical_token_is_accepted_directly() {
        let result = canonicalize_direction(Some("[excited] and a bit rushed"), &adult_ctx());
        assert_eq!(result.tags[0], "excited");
    }

    #[test]
    fn bracketed_descriptor_is_mapped() {
        let result = canonicalize_direction(Some("[furious]"), &adult_ctx());
        assert_eq!(result.tags, vec!["angry"]);
    }

    #[test]
    fn unknown_bracketed_token_is_ignored() {
        let result = canonicalize_direction(Some("[sotto-voce-ish]"), &adult_ctx());
        assert_eq!(result.tags, vec!["calm"]);
    }

    #[test]
    fn raw_text_keywords_are_scanned_when_no_brackets_match() {
        let result = canonicalize_direction(Some("she sounded terrified"), &adult_ctx());
        assert_eq!(result.tags, vec!["fearful"]);
    }

    #[test]
    fn pauses_never_substitute_for_an_emotion() {
        let result = canonicalize_direction(Some("pause:1s"), &adult_ctx());
        assert_eq!(result.tags, vec!["calm", "pause:1s"]);
    }

    #[test]
    fn pause_values_snap_to_wire_steps() {
        let result = canonicalize_direction(Some("[excited] pause:0.7s pause:9s"), &adult_ctx());
        assert_eq!(result.tags, vec!["excited", "pause:0.5s", "pause:2s"]);
    }

    #[test]
    fn at_most_three_emotion_tags() {
        let result = canonicalize_direction(
            Some("excited sad angry fearful surprised"),
            &adult_ctx(),
        );
        let emotions = result.tags.iter().filter(|t| is_emotion_tag(t)).count();
        assert_eq!(emotions, 3);
    }

    #[test]
    fn narrator_defaults_to_calm() {
        let ctx = DirectionContext {
            speaker_is_narrator: true,
            ..Default::default()
        };
        let result = canonicalize_direction(None, &ctx);
        assert_eq!(result.tags, vec!["calm"]);
    }

    #[test]
    fn young_characters_never_default_to_calm() {
        for age in [AgeGroup::Child, AgeGroup::Teen] {
            let ctx = DirectionContext {
                age_group: age,
                ..Default::default()
            };
            let result = canonicalize_direction(None, &ctx);
            assert_ne!(result.tags[0], "calm", "{age:?} defaulted to calm");
        }
    }

    #[test]
    fn profile_default_wins_over_everything_else() {
        let ctx = DirectionContext {
            profile_default: Some("whisper".into()),
            scene_mood: Some("joyful".into()),
            genre: Some("action".into()),
            ..Default::default()
        };
        let result = canonicalize_direction(None, &ctx);
        assert_eq!(result.tags, vec!["whisper"]);
    }

    #[test]
    fn scene_mood_then_genre_drive_the_default() {
        let moody = DirectionContext {
            scene_mood: Some("tense standoff".into()),
            ..Default::default()
        };
        assert_eq!(canonicalize_direction(None, &moody).tags, vec!["fearful"]);

        let genred = DirectionContext {
            genre: Some("action".into()),
            ..Default::default()
        };
        assert_eq!(canonicalize_direction(None, &genred).tags, vec!["excited"]);
    }

    #[test]
    fn protected_delivery_verbs_are_detected() {
        assert_eq!(
            protected_delivery_tags(Some("she whispered urgently")),
            vec![EmotionTag::Whisper]
        );
        assert_eq!(
            protected_delivery_tags(Some("he screamed back")),
            vec![EmotionTag::Shouting]
        );
        assert!(protected_delivery_tags(Some("she said")).is_empty());
        assert!(protected_delivery_tags(None).is_empty());
    }

    #[test]
    fn whisper_primary_slows_and_stabilizes() {
        let result = canonicalize_direction(Some("[whisper]"), &adult_ctx());
        assert!(result.speed_modifier >= 0.8 && result.speed_modifier <= 1.2);
        assert!(result.speed_modifier < 1.0);
        assert!(result.stability_adjust > 0.0);
    }
}
