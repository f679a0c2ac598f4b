//! Secondary refinement passes.
//!
//! Both passes target only segments the primary pass left without usable
//! (content-derived) delivery tags. Dialogue refinement is the one point of
//! required hard failure: dialogue must never ship on a blanket default.
//! Narrator refinement is an enhancement and always recovers through a
//! deterministic heuristic.

use crate::annotate::apply_fix;
use crate::bridge::{parse_direction_payload, CompletionBridge, CompletionRequest, DirectionFix};
use crate::canonical::{is_emotion_tag, mood_default_emotion, protected_delivery_tags};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::profiles::{genre_defaults, StoryContext};
use crate::prompts;
use crate::segment::{AnnotationSource, Segment};
use once_cell::sync::Lazy;
use tokio::time::timeout;

/// Flagged narrator sets up to this size skip the remote call entirely.
const NARRATOR_HEURISTIC_CUTOFF: usize = 5;

/// High-emotion lexical cues, checked before the medium set.
static HIGH_INTENSITY_CUES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "scream", "shriek", "explod", "crash", "shatter", "slam", "thunder", "roar", "burst",
    ]
});

/// Medium-emotion lexical cues.
static MEDIUM_INTENSITY_CUES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "whisper", "crept", "trembl", "shiver", "shadow", "silence", "darkness", "flicker",
    ]
});

/// Ordered pattern-to-tags rules for the narrator heuristic.
static NARRATOR_RULES: Lazy<Vec<(&'static [&'static str], &'static [&'static str])>> =
    Lazy::new(|| {
        vec![
            (
                &["scream", "shriek", "terror", "horror"][..],
                &["fearful", "surprised"][..],
            ),
            (
                &["explod", "crash", "shatter", "slam", "burst", "thunder", "roar"][..],
                &["excited", "surprised"][..],
            ),
            (
                &["whisper", "hush", "silen"][..],
                &["whisper", "calm"][..],
            ),
            (
                &["crept", "shadow", "darkness", "flicker"][..],
                &["whisper", "fearful"][..],
            ),
            (
                &["wept", "tears", "grief", "mourn", "sob"][..],
                &["sad"][..],
            ),
            (
                &["battle", "charge", "race", "sprint", "chase"][..],
                &["excited"][..],
            ),
        ]
    });

/// Dialogue needing refinement: no emotion tag at all, or tags that came
/// from a blanket default rather than observed content. A protected
/// delivery verb in the attribution counts as observed content, so a
/// segment carrying its protected tag is never flagged.
pub fn dialogue_needs_refinement(seg: &Segment) -> bool {
    if !seg.is_dialogue() {
        return false;
    }
    if !seg.has_emotion_tag() {
        return true;
    }
    let protected = protected_delivery_tags(seg.attribution.as_deref());
    if protected
        .iter()
        .any(|tag| seg.canonical_tags.iter().any(|t| t == tag.as_str()))
    {
        return false;
    }
    matches!(
        seg.annotation_source,
        AnnotationSource::Heuristic | AnnotationSource::Unannotated
    )
}

/// Narration needing refinement: empty tags, generically flat delivery, or
/// text whose intensity cues suggest richer delivery is warranted.
pub fn narrator_needs_refinement(seg: &Segment) -> bool {
    if seg.is_dialogue() {
        return false;
    }
    if !seg.has_emotion_tag() {
        return true;
    }
    if is_flat(seg) {
        return true;
    }
    intensity_cue(&seg.text).is_some()
}

/// The "boring" delivery: calm alone (pause markers aside).
fn is_flat(seg: &Segment) -> bool {
    let emotions: Vec<&str> = seg
        .canonical_tags
        .iter()
        .filter(|t| is_emotion_tag(t))
        .map(|t| t.as_str())
        .collect();
    emotions == ["calm"]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intensity {
    High,
    Medium,
}

fn intensity_cue(text: &str) -> Option<Intensity> {
    let lowered = text.to_lowercase();
    if HIGH_INTENSITY_CUES.iter().any(|cue| lowered.contains(cue)) {
        return Some(Intensity::High);
    }
    if MEDIUM_INTENSITY_CUES.iter().any(|cue| lowered.contains(cue)) {
        return Some(Intensity::Medium);
    }
    None
}

/// Deterministic tag choice for one narration span: ordered lexical rules,
/// then scene mood, then genre default, then the scene baseline, then calm.
fn narrator_heuristic_tags(seg: &Segment, story: &StoryContext) -> Vec<String> {
    let lowered = seg.text.to_lowercase();
    for (patterns, tags) in NARRATOR_RULES.iter() {
        if patterns.iter().any(|p| lowered.contains(p)) {
            return tags.iter().map(|t| t.to_string()).collect();
        }
    }
    if let Some(tag) = story.scene_mood.as_deref().and_then(mood_default_emotion) {
        return vec![tag.as_str().to_string()];
    }
    if let Some(defaults) = story.genre.as_deref().and_then(genre_defaults) {
        return vec![defaults.emotion.as_str().to_string()];
    }
    let baseline: Vec<String> = story
        .scene_baseline
        .iter()
        .filter(|t| is_emotion_tag(t))
        .cloned()
        .collect();
    if !baseline.is_empty() {
        return baseline;
    }
    vec!["calm".to_string()]
}

pub struct RefinementPass<'a> {
    bridge: &'a dyn CompletionBridge,
    config: &'a PipelineConfig,
}

impl<'a> RefinementPass<'a> {
    pub fn new(bridge: &'a dyn CompletionBridge, config: &'a PipelineConfig) -> Self {
        Self { bridge, config }
    }

    /// One remote call over all flagged dialogue segments, fixes applied by
    /// global index. Any failure, and any flagged segment still unresolved
    /// afterwards, is fatal.
    pub async fn refine_dialogue(
        &self,
        segments: &mut [Segment],
        story: &StoryContext,
    ) -> PipelineResult<()> {
        let flagged: Vec<usize> = segments
            .iter()
            .filter(|s| dialogue_needs_refinement(s))
            .map(|s| s.index)
            .collect();
        if flagged.is_empty() {
            return Ok(());
        }
        tracing::info!(count = flagged.len(), "dialogue refinement pass");

        let flagged_refs: Vec<&Segment> = segments
            .iter()
            .filter(|s| flagged.contains(&s.index))
            .collect();
        let fixes = match self
            .refinement_call(
                prompts::DIALOGUE_REFINE_SYSTEM,
                prompts::dialogue_refine_user_prompt(&flagged_refs),
            )
            .await
        {
            Ok(fixes) => fixes,
            Err(error) => {
                tracing::error!(%error, indices = ?flagged, "dialogue refinement call failed");
                return Err(PipelineError::UnresolvedDialogue { indices: flagged });
            }
        };

        apply_fixes_by_index(
            segments,
            fixes,
            &flagged,
            story,
            AnnotationSource::DialogueRefined,
        );

        let unresolved: Vec<usize> = segments
            .iter()
            .filter(|s| {
                flagged.contains(&s.index)
                    && (s.annotation_source != AnnotationSource::DialogueRefined
                        || !s.has_emotion_tag())
            })
            .map(|s| s.index)
            .collect();
        if !unresolved.is_empty() {
            return Err(PipelineError::UnresolvedDialogue {
                indices: unresolved,
            });
        }
        Ok(())
    }

    /// Narrator refinement never hard-fails: small flagged sets go straight
    /// to the heuristic, larger ones try one remote call first and fall
    /// back to the heuristic for whatever it leaves uncovered.
    pub async fn refine_narrator(&self, segments: &mut [Segment], story: &StoryContext) {
        let flagged: Vec<usize> = segments
            .iter()
            .filter(|s| narrator_needs_refinement(s))
            .map(|s| s.index)
            .collect();
        if flagged.is_empty() {
            return;
        }
        tracing::info!(count = flagged.len(), "narrator refinement pass");

        if flagged.len() > NARRATOR_HEURISTIC_CUTOFF {
            let flagged_refs: Vec<&Segment> = segments
                .iter()
                .filter(|s| flagged.contains(&s.index))
                .collect();
            match self
                .refinement_call(
                    prompts::NARRATOR_REFINE_SYSTEM,
                    prompts::narrator_refine_user_prompt(&flagged_refs),
                )
                .await
            {
                Ok(fixes) => apply_fixes_by_index(
                    segments,
                    fixes,
                    &flagged,
                    story,
                    AnnotationSource::NarratorRefined,
                ),
                Err(error) => {
                    tracing::warn!(%error, "narrator refinement call failed; using heuristic");
                }
            }
        }

        for seg in segments.iter_mut() {
            if !flagged.contains(&seg.index)
                || seg.annotation_source == AnnotationSource::NarratorRefined
            {
                continue;
            }
            let tags = narrator_heuristic_tags(seg, story);
            let audio_tags: String = tags.iter().map(|t| format!("[{t}]")).collect();
            let fix = DirectionFix {
                index: seg.index,
                audio_tags,
                stability: None,
                style: None,
                reasoning: String::new(),
            };
            let ctx = story.direction_context(seg);
            apply_fix(seg, &fix, &ctx, story, AnnotationSource::NarratorRefined);
        }
    }

    async fn refinement_call(
        &self,
        system_prompt: &str,
        user_prompt: String,
    ) -> PipelineResult<Vec<DirectionFix>> {
        let request = CompletionRequest {
            system_prompt: system_prompt.to_string(),
            user_prompt,
            max_output_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
            expect_json: true,
        };
        let response = timeout(self.config.call_timeout(), self.bridge.complete(request))
            .await
            .map_err(|_| PipelineError::Deadline(self.config.call_timeout_secs))??;
        Ok(parse_direction_payload(&response.content)?.directions)
    }
}

/// Apply refinement fixes keyed by global index; fixes for unflagged or
/// unknown indices are dropped.
fn apply_fixes_by_index(
    segments: &mut [Segment],
    fixes: Vec<DirectionFix>,
    flagged: &[usize],
    story: &StoryContext,
    source: AnnotationSource,
) {
    for fix in fixes {
        if !flagged.contains(&fix.index) {
            continue;
        }
        let Some(seg) = segments.iter_mut().find(|s| s.index == fix.index) else {
            continue;
        };
        if fix.audio_tags.trim().is_empty() {
            continue;
        }
        let ctx = story.direction_context(seg);
        apply_fix(seg, &fix, &ctx, story, source);
    }
}
