//! Coarse emotion label extraction for downstream preset lookup.
//!
//! First-match-wins keyword scan over a vocabulary larger than the eight
//! canonical tags. Used only for preset lookup, never for synthesis, and
//! never fails. Protected delivery keywords (whisper/shout) sit near the
//! top of the rule order so their signal dominates the label.

use once_cell::sync::Lazy;

/// Label returned when nothing matches.
pub const NEUTRAL_LABEL: &str = "neutral";

static LABEL_RULES: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("ominous", "mysterious"),
        ("mysterious", "mysterious"),
        ("whisper", "hushed"),
        ("hushed", "hushed"),
        ("murmur", "hushed"),
        ("shouting", "intense"),
        ("shout", "intense"),
        ("scream", "intense"),
        ("yell", "intense"),
        ("furious", "angry"),
        ("rage", "angry"),
        ("angry", "angry"),
        ("irritat", "angry"),
        ("terrified", "fearful"),
        ("fearful", "fearful"),
        ("afraid", "fearful"),
        ("dread", "fearful"),
        ("nervous", "anxious"),
        ("anxious", "anxious"),
        ("ecstatic", "excited"),
        ("excited", "excited"),
        ("thrilled", "excited"),
        ("energetic", "excited"),
        ("joy", "happy"),
        ("cheerful", "happy"),
        ("happy", "happy"),
        ("playful", "playful"),
        ("heartbroken", "melancholy"),
        ("melancholy", "melancholy"),
        ("mournful", "melancholy"),
        ("grief", "sad"),
        ("tearful", "sad"),
        ("sad", "sad"),
        ("astonished", "surprised"),
        ("shocked", "surprised"),
        ("surprised", "surprised"),
        ("tender", "tender"),
        ("gentle", "tender"),
        ("romantic", "romantic"),
        ("soothing", "calm"),
        ("serene", "calm"),
        ("calm", "calm"),
    ]
});

/// Map a canonical-tag/raw-direction string to one coarse label.
pub fn extract_emotion(input: &str) -> &'static str {
    let lowered = input.to_lowercase();
    for (keyword, label) in LABEL_RULES.iter() {
        if lowered.contains(keyword) {
            return label;
        }
    }
    NEUTRAL_LABEL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_neutral() {
        assert_eq!(extract_emotion(""), NEUTRAL_LABEL);
        assert_eq!(extract_emotion("plainly spoken"), NEUTRAL_LABEL);
    }

    #[test]
    fn first_match_wins() {
        // whisper outranks the later excited rule
        assert_eq!(extract_emotion("[whisper][excited]"), "hushed");
        assert_eq!(extract_emotion("[excited][whisper]"), "hushed");
    }

    #[test]
    fn labels_beyond_the_canonical_eight() {
        assert_eq!(extract_emotion("an ominous turn"), "mysterious");
        assert_eq!(extract_emotion("heartbroken and alone"), "melancholy");
    }

    #[test]
    fn canonical_tag_strings_resolve() {
        assert_eq!(extract_emotion("[calm][pause:1s]"), "calm");
        assert_eq!(extract_emotion("[shouting]"), "intense");
    }
}
