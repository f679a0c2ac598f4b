//! Bounded-parallel batch dispatch for the primary annotation pass.
//!
//! Large segment lists are split into fixed-size batches; batches run in
//! concurrency windows of `parallelism`, and every local segment index is
//! remapped to its global index before the single-threaded merge. A failed
//! or timed-out batch contributes nothing and is logged; later refinement
//! passes patch the gap. Batches are never retried here.

use crate::bridge::{parse_direction_payload, CompletionBridge, CompletionRequest, DirectionFix};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::profiles::StoryContext;
use crate::prompts;
use crate::segment::Segment;
use futures::future;
use std::collections::HashMap;
use tokio::time::timeout;

/// One slice of the segment list plus its global offset.
pub struct Batch<'a> {
    pub segments: &'a [Segment],
    pub start_index: usize,
}

/// Sequential batches preserving source order.
pub fn split_batches(segments: &[Segment], batch_size: usize) -> Vec<Batch<'_>> {
    let size = batch_size.max(1);
    segments
        .chunks(size)
        .enumerate()
        .map(|(i, chunk)| Batch {
            segments: chunk,
            start_index: i * size,
        })
        .collect()
}

/// Merged annotations keyed by global segment index.
pub type AnnotationMap = HashMap<usize, DirectionFix>;

pub struct BatchDispatcher<'a> {
    bridge: &'a dyn CompletionBridge,
    config: &'a PipelineConfig,
}

impl<'a> BatchDispatcher<'a> {
    pub fn new(bridge: &'a dyn CompletionBridge, config: &'a PipelineConfig) -> Self {
        Self { bridge, config }
    }

    /// Run all batches and merge their annotations by global index.
    pub async fn dispatch(&self, segments: &[Segment], story: &StoryContext) -> AnnotationMap {
        let batches = split_batches(segments, self.config.batch_size);
        let window_size = self.config.parallelism.max(1);
        let mut merged = AnnotationMap::new();

        for window in batches.chunks(window_size) {
            let results =
                future::join_all(window.iter().map(|b| self.annotate_batch(b, story))).await;

            // All batches in the window completed; merge is single-threaded.
            for (batch, result) in window.iter().zip(results) {
                match result {
                    Ok(local) => {
                        for (local_index, fix) in local {
                            merged.insert(batch.start_index + local_index, fix);
                        }
                    }
                    Err(error) => {
                        tracing::warn!(
                            start_index = batch.start_index,
                            batch_len = batch.segments.len(),
                            %error,
                            "annotation batch failed; leaving gap for refinement"
                        );
                    }
                }
            }
        }

        merged
    }

    async fn annotate_batch(
        &self,
        batch: &Batch<'_>,
        story: &StoryContext,
    ) -> PipelineResult<HashMap<usize, DirectionFix>> {
        let request = CompletionRequest {
            system_prompt: prompts::ANNOTATE_SYSTEM.to_string(),
            user_prompt: prompts::annotate_user_prompt(batch.segments, story),
            max_output_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
            expect_json: true,
        };

        let response = timeout(self.config.call_timeout(), self.bridge.complete(request))
            .await
            .map_err(|_| PipelineError::Deadline(self.config.call_timeout_secs))??;

        let payload = parse_direction_payload(&response.content)?;
        let len = batch.segments.len();
        Ok(payload
            .directions
            .into_iter()
            .filter(|d| d.index < len)
            .map(|d| (d.index, d))
            .collect())
    }
}
