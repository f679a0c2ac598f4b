//! Core segment types shared by every pipeline stage.
//!
//! A `Segment` is one contiguous span of narration or dialogue with a single
//! speaker. Segments are created once by the tag parser; `index`, `kind`,
//! `speaker` and `text` are immutable afterwards, everything else is filled
//! in progressively by the annotation stages.

use crate::canonical::is_emotion_tag;
use serde::{Deserialize, Serialize};

/// Sentinel speaker name for narration spans.
pub const NARRATOR_SPEAKER: &str = "narrator";

/// Whether a segment is narration or a character line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Narrator,
    Dialogue,
}

/// Which pipeline stage produced a segment's final annotation.
///
/// Exactly one source is recorded per segment; a later pass that rewrites
/// the tags must also rewrite the source. Used for refinement eligibility
/// and coverage auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationSource {
    Primary,
    DialogueRefined,
    NarratorRefined,
    Heuristic,
    Unannotated,
}

/// One span of narration or dialogue, with delivery metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Position in the source order. Assigned once at parse time, never
    /// reused; the only join key when merging parallel batch results.
    pub index: usize,
    pub kind: SegmentKind,
    /// `"narrator"` for narration; otherwise the tag-declared name, trimmed.
    pub speaker: String,
    pub text: String,
    /// Free text describing how the line was spoken, if an upstream step
    /// supplied one (e.g. `"whispered"`). Protected delivery signals are
    /// derived from this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    /// Ordered canonical tags: bare emotion tokens plus `pause:<n>s`
    /// markers. The first emotion tag is the primary delivery.
    #[serde(default)]
    pub canonical_tags: Vec<String>,
    /// Unconverted natural-language direction, kept for diagnostics only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_direction: Option<String>,
    /// Synthesis stability, in [0, 1].
    pub stability: f32,
    /// Synthesis style exaggeration, in [0, 1].
    pub style: f32,
    /// Playback speed multiplier. Clamped to [0.8, 1.2] at canonicalization.
    pub speed_modifier: f32,
    /// Coarse categorical label for downstream preset lookup. Distinct from
    /// `canonical_tags`.
    #[serde(default)]
    pub emotion_label: String,
    pub annotation_source: AnnotationSource,
}

impl Segment {
    /// A freshly parsed narration span.
    pub fn narrator(index: usize, text: impl Into<String>) -> Self {
        Self::new(index, SegmentKind::Narrator, NARRATOR_SPEAKER, text)
    }

    /// A freshly parsed character line.
    pub fn dialogue(index: usize, speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(index, SegmentKind::Dialogue, speaker, text)
    }

    fn new(
        index: usize,
        kind: SegmentKind,
        speaker: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            index,
            kind,
            speaker: speaker.into(),
            text: text.into(),
            attribution: None,
            canonical_tags: Vec::new(),
            raw_direction: None,
            stability: 0.5,
            style: 0.5,
            speed_modifier: 1.0,
            emotion_label: String::new(),
            annotation_source: AnnotationSource::Unannotated,
        }
    }

    pub fn is_dialogue(&self) -> bool {
        self.kind == SegmentKind::Dialogue
    }

    /// True when at least one canonical *emotion* tag is present (pause
    /// markers do not count as delivery information).
    pub fn has_emotion_tag(&self) -> bool {
        self.canonical_tags.iter().any(|t| is_emotion_tag(t))
    }

    /// Wire form consumed by the synthesizer: bracketed tokens concatenated
    /// with no separator, e.g. `[whisper][fearful][pause:0.5s]`.
    pub fn tag_string(&self) -> String {
        self.canonical_tags
            .iter()
            .map(|t| format!("[{t}]"))
            .collect()
    }

    /// Replace the delivery tags and record the stage that produced them.
    /// Keeping the two writes together upholds the one-source-per-segment
    /// invariant.
    pub fn set_annotation(&mut self, tags: Vec<String>, source: AnnotationSource) {
        self.canonical_tags = tags;
        self.annotation_source = source;
    }
}
