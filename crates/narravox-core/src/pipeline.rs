//! End-to-end annotation pipeline.
//!
//! Wires the stages together: validate, parse, batch-dispatch the primary
//! annotation pass, apply annotations with fallbacks, run both refinement
//! passes, extract emotion labels, and report coverage. The caller gets
//! either a complete ordered annotated list or an explicit fatal error
//! naming the unresolved dialogue indices; never a silently incomplete
//! result.

use crate::annotate::AnnotationApplier;
use crate::bridge::{CompletionBridge, DirectionFix};
use crate::cache::TtlCache;
use crate::config::PipelineConfig;
use crate::dispatch::BatchDispatcher;
use crate::emotion::extract_emotion;
use crate::error::PipelineResult;
use crate::profiles::StoryContext;
use crate::refine::RefinementPass;
use crate::segment::{AnnotationSource, Segment};
use crate::tags::{parse_segments, validate_tags, TagValidation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-source segment counts, for coverage auditing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageStats {
    pub total: usize,
    pub primary: usize,
    pub dialogue_refined: usize,
    pub narrator_refined: usize,
    pub heuristic: usize,
    pub unannotated: usize,
}

impl CoverageStats {
    pub fn from_segments(segments: &[Segment]) -> Self {
        let mut stats = Self {
            total: segments.len(),
            ..Default::default()
        };
        for seg in segments {
            match seg.annotation_source {
                AnnotationSource::Primary => stats.primary += 1,
                AnnotationSource::DialogueRefined => stats.dialogue_refined += 1,
                AnnotationSource::NarratorRefined => stats.narrator_refined += 1,
                AnnotationSource::Heuristic => stats.heuristic += 1,
                AnnotationSource::Unannotated => stats.unannotated += 1,
            }
        }
        stats
    }
}

/// A fully annotated, ordered segment sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedScript {
    pub segments: Vec<Segment>,
    pub coverage: CoverageStats,
    /// Structural report from the tag validator; vacuously valid when the
    /// run started from pre-parsed segments.
    pub validation: TagValidation,
}

/// Owns the completion bridge, config, and annotation cache for runs.
pub struct AnnotationPipeline {
    bridge: Arc<dyn CompletionBridge>,
    config: PipelineConfig,
    cache: TtlCache<DirectionFix>,
}

impl AnnotationPipeline {
    pub fn new(bridge: Arc<dyn CompletionBridge>) -> Self {
        Self::with_config(bridge, PipelineConfig::default())
    }

    pub fn with_config(bridge: Arc<dyn CompletionBridge>, config: PipelineConfig) -> Self {
        let cache = TtlCache::new(config.cache_ttl(), config.cache_capacity);
        Self {
            bridge,
            config,
            cache,
        }
    }

    /// Validate, segment, and annotate raw tagged prose. Structural tag
    /// errors are reported in the result, never fatal.
    pub async fn annotate_prose(
        &self,
        prose: &str,
        story: &StoryContext,
    ) -> PipelineResult<AnnotatedScript> {
        let validation = validate_tags(prose);
        if !validation.valid {
            tracing::warn!(
                errors = ?validation.errors,
                "structural tag errors; parsing proceeds tolerantly"
            );
        }
        let segments = parse_segments(prose);
        let mut script = self.annotate_segments(segments, story).await?;
        script.validation = validation;
        Ok(script)
    }

    /// Annotate an already-parsed segment list.
    ///
    /// Segments must arrive in source order with `index` equal to position,
    /// as `parse_segments` produces them; the batch merge keys on that
    /// correspondence.
    pub async fn annotate_segments(
        &self,
        segments: Vec<Segment>,
        story: &StoryContext,
    ) -> PipelineResult<AnnotatedScript> {
        debug_assert!(
            segments.iter().enumerate().all(|(i, s)| s.index == i),
            "segment indices must match their positions"
        );
        let vacuous = TagValidation {
            valid: true,
            errors: Vec::new(),
        };
        if segments.is_empty() {
            return Ok(AnnotatedScript {
                segments,
                coverage: CoverageStats::default(),
                validation: vacuous,
            });
        }

        let dispatcher = BatchDispatcher::new(self.bridge.as_ref(), &self.config);
        let annotations = dispatcher.dispatch(&segments, story).await;
        tracing::info!(
            segments = segments.len(),
            annotated = annotations.len(),
            "primary annotation pass complete"
        );

        let applier = AnnotationApplier::new(self.bridge.as_ref(), &self.config, &self.cache);
        let mut segments = applier.apply(segments, &annotations, story).await;

        let refiner = RefinementPass::new(self.bridge.as_ref(), &self.config);
        refiner.refine_dialogue(&mut segments, story).await?;
        refiner.refine_narrator(&mut segments, story).await;

        for seg in &mut segments {
            let mut basis = seg.tag_string();
            if let Some(raw) = seg.raw_direction.as_deref() {
                basis.push(' ');
                basis.push_str(raw);
            }
            seg.emotion_label = extract_emotion(&basis).to_string();
        }

        let coverage = CoverageStats::from_segments(&segments);
        tracing::info!(
            total = coverage.total,
            primary = coverage.primary,
            dialogue_refined = coverage.dialogue_refined,
            narrator_refined = coverage.narrator_refined,
            heuristic = coverage.heuristic,
            "annotation pipeline complete"
        );

        Ok(AnnotatedScript {
            segments,
            coverage,
            validation: vacuous,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{CompletionRequest, CompletionResponse};
    use crate::error::PipelineError;
    use async_trait::async_trait;

    struct NoBridge;

    #[async_trait]
    impl CompletionBridge for NoBridge {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> PipelineResult<CompletionResponse> {
            Err(PipelineError::Bridge("unused".into()))
        }
    }

    #[tokio::test]
    #[should_panic(expected = "segment indices must match their positions")]
    async fn out_of_position_indices_panic_in_debug() {
        let pipeline = AnnotationPipeline::new(Arc::new(NoBridge));
        let _ = pipeline
            .annotate_segments(vec![Segment::narrator(5, "x")], &StoryContext::default())
            .await;
    }

    #[test]
    fn coverage_counts_every_source_once() {
        let mut a = Segment::narrator(0, "a");
        a.annotation_source = AnnotationSource::Primary;
        let mut b = Segment::dialogue(1, "X", "b");
        b.annotation_source = AnnotationSource::DialogueRefined;
        let mut c = Segment::narrator(2, "c");
        c.annotation_source = AnnotationSource::Heuristic;

        let stats = CoverageStats::from_segments(&[a, b, c]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.primary, 1);
        assert_eq!(stats.dialogue_refined, 1);
        assert_eq!(stats.heuristic, 1);
        assert_eq!(stats.unannotated, 0);
    }
}
