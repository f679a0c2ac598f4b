//! Primary annotation prompt: per-segment delivery directions as JSON.

use crate::profiles::StoryContext;
use crate::segment::Segment;
use std::fmt::Write;

/// System instruction for the batch annotation model.
pub const ANNOTATE_SYSTEM: &str = r#"You are a voice director preparing a narrated audiobook script.
For every numbered segment you receive, decide how the line should be delivered.

Rules:
- Respond with JSON only: {"directions":[{"index":<n>,"audioTags":"...","stability":<0..1>,"style":<0..1>,"reasoning":"..."}]}.
- "index" is the segment's number exactly as given in the list.
- "audioTags" is a concatenation of bracketed tokens drawn ONLY from:
  [excited] [sad] [angry] [calm] [fearful] [surprised] [whisper] [shouting]
  plus optional pauses [pause:0.5s] [pause:1s] [pause:1.5s] [pause:2s].
- At most 3 emotion tags per segment; the first tag is the primary delivery.
- Narration should stay understated unless the text clearly calls for more.
- Cover every segment in the list; do not invent indices."#;

/// Numbered segment list for one batch. Indices are batch-local; the
/// dispatcher remaps them to global positions.
pub fn annotate_user_prompt(segments: &[Segment], story: &StoryContext) -> String {
    let mut prompt = String::new();
    push_story_header(&mut prompt, story);
    prompt.push_str("Segments:\n");
    for (i, seg) in segments.iter().enumerate() {
        let _ = writeln!(prompt, "{i}. ({speaker}) {text}", speaker = seg.speaker, text = seg.text);
    }
    prompt.push_str("\nReturn a direction for every segment above.");
    prompt
}

/// Single-segment prompt for the opportunistic fallback call.
pub fn single_segment_user_prompt(segment: &Segment, story: &StoryContext) -> String {
    let mut prompt = String::new();
    push_story_header(&mut prompt, story);
    let _ = writeln!(
        prompt,
        "Segments:\n0. ({speaker}) {text}",
        speaker = segment.speaker,
        text = segment.text
    );
    prompt.push_str("\nReturn a direction for this one segment (index 0).");
    prompt
}

fn push_story_header(prompt: &mut String, story: &StoryContext) {
    if let Some(genre) = story.genre.as_deref() {
        let _ = writeln!(prompt, "Genre: {genre}");
    }
    if let Some(mood) = story.scene_mood.as_deref() {
        let _ = writeln!(prompt, "Scene mood: {mood}");
    }
    if !prompt.is_empty() {
        prompt.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_numbers_segments_locally_from_zero() {
        let segs = vec![
            Segment::narrator(40, "The wind howled."),
            Segment::dialogue(41, "Mira", "Who's there?"),
        ];
        let prompt = annotate_user_prompt(&segs, &StoryContext::default());
        assert!(prompt.contains("0. (narrator) The wind howled."));
        assert!(prompt.contains("1. (Mira) Who's there?"));
    }
}
