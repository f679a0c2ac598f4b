//! Annotation applier: combine per-segment directions from the merged
//! batch results with character and genre defaults into final synthesis
//! parameters.
//!
//! Strategy order for a segment without a matching annotation: context
//! default first, then one opportunistic single-segment completion call as
//! best-effort enrichment (its failure is swallowed, never propagated).

use crate::bridge::{
    parse_direction_payload, CompletionBridge, CompletionRequest, DirectionFix,
};
use crate::cache::TtlCache;
use crate::canonical::{
    canonicalize_direction, protected_delivery_tags, DirectionContext, EmotionTag,
};
use crate::config::PipelineConfig;
use crate::dispatch::AnnotationMap;
use crate::profiles::{genre_defaults, StoryContext, PATTERN_DRAMATIC_PAUSES, PATTERN_EMPHASIS};
use crate::prompts;
use crate::segment::{AnnotationSource, Segment};
use tokio::time::timeout;

/// Stability never drops below this, even after speech-pattern modifiers.
const STABILITY_FLOOR: f32 = 0.15;

pub struct AnnotationApplier<'a> {
    bridge: &'a dyn CompletionBridge,
    config: &'a PipelineConfig,
    cache: &'a TtlCache<DirectionFix>,
}

impl<'a> AnnotationApplier<'a> {
    pub fn new(
        bridge: &'a dyn CompletionBridge,
        config: &'a PipelineConfig,
        cache: &'a TtlCache<DirectionFix>,
    ) -> Self {
        Self {
            bridge,
            config,
            cache,
        }
    }

    /// Produce the annotated list. Order and length are preserved; only
    /// annotation fields change.
    pub async fn apply(
        &self,
        segments: Vec<Segment>,
        annotations: &AnnotationMap,
        story: &StoryContext,
    ) -> Vec<Segment> {
        let mut out = Vec::with_capacity(segments.len());
        for mut seg in segments {
            let ctx = story.direction_context(&seg);
            match annotations.get(&seg.index) {
                Some(fix) => {
                    apply_fix(&mut seg, fix, &ctx, story, AnnotationSource::Primary);
                }
                None => self.apply_fallback(&mut seg, &ctx, story).await,
            }
            out.push(seg);
        }
        out
    }

    /// Context default plus one best-effort remote enrichment.
    async fn apply_fallback(&self, seg: &mut Segment, ctx: &DirectionContext, story: &StoryContext) {
        if let Some(fix) = self.opportunistic_annotation(seg, story).await {
            // Fallback-sourced primary annotation.
            tracing::debug!(index = seg.index, "single-segment fallback call succeeded");
            apply_fix(seg, &fix, ctx, story, AnnotationSource::Primary);
            return;
        }

        let canonical = canonicalize_direction(None, ctx);
        let profile = story.profile_for(&seg.speaker);
        let genre = story.genre.as_deref().and_then(genre_defaults);
        let stability = profile
            .and_then(|p| p.base_stability)
            .or(genre.map(|g| g.stability))
            .unwrap_or(0.5);
        let style = profile
            .and_then(|p| p.base_style)
            .or(genre.map(|g| g.style))
            .unwrap_or(0.5);

        seg.stability = (stability + canonical.stability_adjust).clamp(0.0, 1.0);
        seg.style = style.clamp(0.0, 1.0);
        seg.speed_modifier = canonical.speed_modifier;
        let tags = merge_protected(canonical.tags, &protected_delivery_tags(seg.attribution.as_deref()));
        seg.set_annotation(tags, AnnotationSource::Heuristic);
    }

    /// Cache-backed single-segment completion call. Every failure here is
    /// swallowed; the heuristic default already covers the segment.
    async fn opportunistic_annotation(
        &self,
        seg: &Segment,
        story: &StoryContext,
    ) -> Option<DirectionFix> {
        let key = format!("{}|{}", seg.speaker, seg.text);
        if let Some(fix) = self.cache.get(&key) {
            return Some(fix);
        }

        let request = CompletionRequest {
            system_prompt: prompts::ANNOTATE_SYSTEM.to_string(),
            user_prompt: prompts::single_segment_user_prompt(seg, story),
            max_output_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
            expect_json: true,
        };

        let response = match timeout(self.config.call_timeout(), self.bridge.complete(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                tracing::debug!(index = seg.index, %error, "fallback call failed; keeping heuristic default");
                return None;
            }
            Err(_) => {
                tracing::debug!(index = seg.index, "fallback call timed out; keeping heuristic default");
                return None;
            }
        };

        match parse_direction_payload(&response.content) {
            Ok(payload) => {
                let fix = payload.directions.into_iter().find(|d| d.index == 0)?;
                self.cache.insert(key, fix.clone());
                Some(fix)
            }
            Err(error) => {
                tracing::debug!(index = seg.index, %error, "fallback payload malformed; keeping heuristic default");
                None
            }
        }
    }
}

/// Apply one direction to one segment with the full merge chain.
pub(crate) fn apply_fix(
    seg: &mut Segment,
    fix: &DirectionFix,
    ctx: &DirectionContext,
    story: &StoryContext,
    source: AnnotationSource,
) {
    let canonical = canonicalize_direction(Some(&fix.audio_tags), ctx);
    let profile = story.profile_for(&seg.speaker);
    let genre = story.genre.as_deref().and_then(genre_defaults);

    // Priority: character-profile base, genre default, raw annotation value.
    let base_stability = profile
        .and_then(|p| p.base_stability)
        .or(genre.map(|g| g.stability))
        .or(fix.stability)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    let style = profile
        .and_then(|p| p.base_style)
        .or(genre.map(|g| g.style))
        .or(fix.style)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    let mut stability = (base_stability + canonical.stability_adjust).clamp(0.0, 1.0);
    if let Some(profile) = profile {
        for pattern in [PATTERN_EMPHASIS, PATTERN_DRAMATIC_PAUSES] {
            if profile.has_pattern(pattern) {
                stability = (stability - 0.05).max(STABILITY_FLOOR);
            }
        }
    }

    seg.stability = stability;
    seg.style = style;
    seg.speed_modifier = canonical.speed_modifier;
    if !fix.audio_tags.trim().is_empty() {
        seg.raw_direction = Some(fix.audio_tags.clone());
    }
    let tags = merge_protected(canonical.tags, &protected_delivery_tags(seg.attribution.as_deref()));
    seg.set_annotation(tags, source);
}

/// Union of the protected signal with newly derived tags, protected first
/// so it can never fall off the cap of 4.
pub(crate) fn merge_protected(derived: Vec<String>, protected: &[EmotionTag]) -> Vec<String> {
    if protected.is_empty() {
        return derived;
    }
    let mut merged: Vec<String> = protected.iter().map(|t| t.as_str().to_string()).collect();
    for tag in derived {
        if !merged.contains(&tag) {
            merged.push(tag);
        }
    }
    merged.truncate(4);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, PipelineResult};
    use crate::bridge::CompletionResponse;
    use async_trait::async_trait;

    struct FailingBridge;

    #[async_trait]
    impl CompletionBridge for FailingBridge {
        async fn complete(&self, _request: CompletionRequest) -> PipelineResult<CompletionResponse> {
            Err(PipelineError::Bridge("down".into()))
        }
    }

    struct CannedBridge(String);

    #[async_trait]
    impl CompletionBridge for CannedBridge {
        async fn complete(&self, _request: CompletionRequest) -> PipelineResult<CompletionResponse> {
            Ok(CompletionResponse {
                content: self.0.clone(),
            })
        }
    }

    fn cache(config: &PipelineConfig) -> TtlCache<DirectionFix> {
        TtlCache::new(config.cache_ttl(), config.cache_capacity)
    }

    #[tokio::test]
    async fn annotated_segment_becomes_primary() {
        let config = PipelineConfig::default();
        let cache = cache(&config);
        let bridge = FailingBridge;
        let applier = AnnotationApplier::new(&bridge, &config, &cache);

        let segs = vec![Segment::dialogue(0, "Mira", "Run!")];
        let mut annotations = AnnotationMap::new();
        annotations.insert(
            0,
            DirectionFix {
                index: 0,
                audio_tags: "[shouting]".into(),
                stability: Some(0.3),
                style: Some(0.8),
                reasoning: String::new(),
            },
        );

        let out = applier
            .apply(segs, &annotations, &StoryContext::default())
            .await;
        assert_eq!(out[0].annotation_source, AnnotationSource::Primary);
        assert_eq!(out[0].canonical_tags, vec!["shouting"]);
        assert_eq!(out[0].raw_direction.as_deref(), Some("[shouting]"));
    }

    #[tokio::test]
    async fn missing_annotation_degrades_to_heuristic_when_bridge_is_down() {
        let config = PipelineConfig::default();
        let cache = cache(&config);
        let bridge = FailingBridge;
        let applier = AnnotationApplier::new(&bridge, &config, &cache);

        let segs = vec![Segment::narrator(0, "The wind howled.")];
        let out = applier
            .apply(segs, &AnnotationMap::new(), &StoryContext::default())
            .await;
        assert_eq!(out[0].annotation_source, AnnotationSource::Heuristic);
        assert_eq!(out[0].canonical_tags, vec!["calm"]);
    }

    #[tokio::test]
    async fn opportunistic_call_upgrades_fallback_to_primary() {
        let config = PipelineConfig::default();
        let cache = cache(&config);
        let bridge = CannedBridge(
            r#"{"directions":[{"index":0,"audioTags":"[fearful]","stability":0.4,"style":0.6,"reasoning":""}]}"#
                .into(),
        );
        let applier = AnnotationApplier::new(&bridge, &config, &cache);

        let segs = vec![Segment::dialogue(3, "Mira", "Who's there?")];
        let out = applier
            .apply(segs, &AnnotationMap::new(), &StoryContext::default())
            .await;
        assert_eq!(out[0].annotation_source, AnnotationSource::Primary);
        assert_eq!(out[0].canonical_tags, vec!["fearful"]);
        // the successful lookup is cached for repeats
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn protected_delivery_survives_a_contradicting_annotation() {
        let config = PipelineConfig::default();
        let cache = cache(&config);
        let bridge = FailingBridge;
        let applier = AnnotationApplier::new(&bridge, &config, &cache);

        let mut seg = Segment::dialogue(0, "Mira", "Get down.");
        seg.attribution = Some("she whispered".into());
        let mut annotations = AnnotationMap::new();
        annotations.insert(
            0,
            DirectionFix {
                index: 0,
                audio_tags: "[excited]".into(),
                stability: None,
                style: None,
                reasoning: String::new(),
            },
        );

        let out = applier
            .apply(vec![seg], &annotations, &StoryContext::default())
            .await;
        assert!(out[0].canonical_tags.contains(&"whisper".to_string()));
        assert!(out[0].canonical_tags.contains(&"excited".to_string()));
    }

    #[test]
    fn merged_protected_tags_are_capped_at_four() {
        let merged = merge_protected(
            vec![
                "excited".into(),
                "sad".into(),
                "angry".into(),
                "pause:1s".into(),
            ],
            &[EmotionTag::Whisper],
        );
        assert_eq!(merged.len(), 4);
        assert_eq!(merged[0], "whisper");
    }

    #[tokio::test]
    async fn speech_patterns_lower_stability_with_a_floor() {
        let config = PipelineConfig::default();
        let cache = cache(&config);
        let bridge = FailingBridge;
        let applier = AnnotationApplier::new(&bridge, &config, &cache);

        let mut story = StoryContext::default();
        story.characters.insert(
            "Brick".into(),
            crate::profiles::CharacterProfile {
                name: "Brick".into(),
                base_stability: Some(0.2),
                speech_patterns: vec![PATTERN_EMPHASIS.into(), PATTERN_DRAMATIC_PAUSES.into()],
                ..Default::default()
            },
        );

        let mut annotations = AnnotationMap::new();
        annotations.insert(
            0,
            DirectionFix {
                index: 0,
                audio_tags: "[angry]".into(),
                stability: None,
                style: None,
                reasoning: String::new(),
            },
        );
        let segs = vec![Segment::dialogue(0, "Brick", "Enough!")];
        let out = applier.apply(segs, &annotations, &story).await;
        assert!(out[0].stability >= STABILITY_FLOOR);
        assert!(out[0].stability < 0.2);
    }
}
