//! Refinement prompts: patch segments the primary pass left without usable
//! delivery tags. Unlike the batch prompt, these carry global indices and
//! the response must echo them back unchanged.

use crate::segment::Segment;
use std::fmt::Write;

/// System instruction for the dialogue refinement call.
pub const DIALOGUE_REFINE_SYSTEM: &str = r#"You are a voice director fixing dialogue lines that are still missing delivery tags.
Respond with JSON only: {"directions":[{"index":<n>,"audioTags":"...","stability":<0..1>,"style":<0..1>,"reasoning":"..."}]}.
"index" must be the exact number shown for the line. "audioTags" uses ONLY:
[excited] [sad] [angry] [calm] [fearful] [surprised] [whisper] [shouting]
plus optional [pause:0.5s] [pause:1s] [pause:1.5s] [pause:2s]. At most 3 emotion tags.
Every listed line MUST receive at least one emotion tag."#;

/// System instruction for the narrator refinement call.
pub const NARRATOR_REFINE_SYSTEM: &str = r#"You are a voice director enriching flat narration delivery.
Respond with JSON only: {"directions":[{"index":<n>,"audioTags":"...","stability":<0..1>,"style":<0..1>,"reasoning":"..."}]}.
"index" must be the exact number shown. "audioTags" uses ONLY:
[excited] [sad] [angry] [calm] [fearful] [surprised] [whisper] [shouting]
plus optional [pause:0.5s] [pause:1s] [pause:1.5s] [pause:2s]. At most 3 emotion tags.
Match the emotional intensity of the text; keep truly neutral narration calm."#;

/// Flagged dialogue lines, numbered by global index.
pub fn dialogue_refine_user_prompt(flagged: &[&Segment]) -> String {
    let mut prompt = String::from("Dialogue lines still missing delivery tags:\n");
    for seg in flagged {
        let _ = writeln!(
            prompt,
            "{index}. ({speaker}) {text}",
            index = seg.index,
            speaker = seg.speaker,
            text = seg.text
        );
    }
    prompt.push_str("\nReturn a direction for every line, keyed by the numbers above.");
    prompt
}

/// Flagged narration spans, numbered by global index.
pub fn narrator_refine_user_prompt(flagged: &[&Segment]) -> String {
    let mut prompt = String::from("Narration spans with flat or missing delivery:\n");
    for seg in flagged {
        let _ = writeln!(prompt, "{index}. {text}", index = seg.index, text = seg.text);
    }
    prompt.push_str("\nReturn a direction for every span, keyed by the numbers above.");
    prompt
}
