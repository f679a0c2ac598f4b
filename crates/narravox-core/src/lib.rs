//! # narravox-core — narration annotation pipeline
//!
//! Turns machine-generated prose with inline `[CHAR:<name>]` speaker tags
//! into a fully-annotated sequence of speech segments, each carrying a
//! speaker, canonical delivery tags, and synthesis parameters, ready for
//! audio rendering.
//!
//! ## Data flow
//!
//! ```text
//! raw tagged prose
//!   │ validate_tags (reported, never fatal)
//!   ▼
//! parse_segments ──► Vec<Segment>
//!   │
//!   ▼
//! BatchDispatcher ──► bounded-parallel completion calls, merged by index
//!   │
//!   ▼
//! AnnotationApplier ──► canonical tags + stability/style/speed, fallbacks
//!   │
//!   ▼
//! RefinementPass ──► dialogue (hard-fail) then narrator (heuristic)
//!   │
//!   ▼
//! extract_emotion ──► coarse label per segment ──► AnnotatedScript
//! ```
//!
//! Audio synthesis, voice catalogs, and persistence live upstream and
//! downstream of this crate.

pub mod annotate;
pub mod bridge;
pub mod cache;
pub mod canonical;
pub mod config;
pub mod dispatch;
pub mod emotion;
pub mod error;
pub mod pipeline;
pub mod profiles;
pub mod prompts;
pub mod refine;
pub mod segment;
pub mod tags;

pub use bridge::{
    parse_direction_payload, CompletionBridge, CompletionRequest, CompletionResponse,
    DirectionFix, DirectionPayload, OpenRouterBridge,
};
pub use canonical::{
    canonicalize_direction, context_default_emotion, protected_delivery_tags, CanonicalDirection,
    DirectionContext, EmotionTag,
};
pub use config::PipelineConfig;
pub use emotion::{extract_emotion, NEUTRAL_LABEL};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{AnnotatedScript, AnnotationPipeline, CoverageStats};
pub use profiles::{AgeGroup, CharacterProfile, StoryContext};
pub use segment::{AnnotationSource, Segment, SegmentKind, NARRATOR_SPEAKER};
pub use tags::{parse_segments, strip_tags, unique_speakers, validate_tags, TagValidation};
