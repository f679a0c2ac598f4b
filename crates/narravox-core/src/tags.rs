//! Speaker-tag validation and segmentation.
//!
//! Wire format consumed from upstream text generation:
//! `[CHAR:<name>]...[/CHAR]`. The validator reports structural problems
//! without rejecting anything; the parser is tolerant by design and absorbs
//! malformed markup into the surrounding narration. Validation is a
//! separate, optional concern.

use crate::segment::Segment;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const OPEN_MARK: &str = "[CHAR:";
const CLOSE_MARK: &str = "[/CHAR]";

static OPEN_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[CHAR:[^\]]*\]").expect("open tag regex"));

/// Structural check result. `valid` is simply `errors.is_empty()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Structural checks over raw prose: tag balance, nesting depth, speaker
/// names. Never fails; empty input is vacuously valid.
pub fn validate_tags(prose: &str) -> TagValidation {
    let mut errors = Vec::new();
    if prose.trim().is_empty() {
        return TagValidation {
            valid: true,
            errors,
        };
    }

    let opens = find_all(prose, OPEN_MARK);
    let closes = find_all(prose, CLOSE_MARK);

    if opens.len() != closes.len() {
        errors.push(format!(
            "UNBALANCED_TAGS: {} open tag(s) vs {} close tag(s)",
            opens.len(),
            closes.len()
        ));
    }

    // Depth scan over both markers in positional order. Depth above 1 is
    // nesting; below 0 is an unmatched close, reported and reset so the
    // scan continues instead of aborting.
    let mut events: Vec<(usize, bool)> = opens
        .iter()
        .map(|&p| (p, true))
        .chain(closes.iter().map(|&p| (p, false)))
        .collect();
    events.sort_by_key(|&(p, _)| p);

    let mut depth = 0i32;
    for (pos, is_open) in events {
        if is_open {
            depth += 1;
            if depth > 1 {
                errors.push(format!(
                    "NESTED_TAG: open tag at byte {pos} inside another dialogue span"
                ));
            }
        } else {
            depth -= 1;
            if depth < 0 {
                errors.push(format!(
                    "UNMATCHED_CLOSE: close tag at byte {pos} has no matching open tag"
                ));
                depth = 0;
            }
        }
    }

    for &pos in &opens {
        let name_start = pos + OPEN_MARK.len();
        let name = prose[name_start..]
            .find(']')
            .map(|rel| prose[name_start..name_start + rel].trim())
            .unwrap_or("");
        if name.is_empty() {
            errors.push(format!(
                "EMPTY_SPEAKER: open tag at byte {pos} has no speaker name"
            ));
        }
    }

    TagValidation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Scanner states for the segmenting parser.
enum ScanState {
    /// Consuming narration, looking for the next open tag.
    OutsideTag,
    /// An open tag matched; looking for the closing marker.
    InDialogue { open_pos: usize, body_start: usize },
    /// A malformed open marker at this position is absorbed into the
    /// narration buffer and scanning resumes after it.
    ErrorRecovery { at: usize },
}

/// Segment raw prose into ordered narration and dialogue spans.
///
/// Indices are assigned sequentially from 0 over *emitted* segments only:
/// an empty dialogue body is skipped without consuming an index. Malformed
/// markup never raises; it is absorbed verbatim into the surrounding
/// narration.
pub fn parse_segments(prose: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut narrator_buf = String::new();
    let mut speaker = String::new();
    let mut pos = 0usize;
    let mut state = ScanState::OutsideTag;

    let flush_narrator = |buf: &mut String, segments: &mut Vec<Segment>| {
        let text = buf.trim();
        if !text.is_empty() {
            segments.push(Segment::narrator(segments.len(), text));
        }
        buf.clear();
    };

    loop {
        match state {
            ScanState::OutsideTag => {
                let Some(rel) = prose[pos..].find(OPEN_MARK) else {
                    narrator_buf.push_str(&prose[pos..]);
                    break;
                };
                let open_pos = pos + rel;
                narrator_buf.push_str(&prose[pos..open_pos]);
                let name_start = open_pos + OPEN_MARK.len();
                match prose[name_start..].find(']') {
                    Some(nrel) => {
                        let name = prose[name_start..name_start + nrel].trim();
                        // A '[' inside the name means this open marker never
                        // closed; treat it as malformed.
                        if name.is_empty() || name.contains('[') {
                            state = ScanState::ErrorRecovery { at: open_pos };
                        } else {
                            speaker = name.to_string();
                            state = ScanState::InDialogue {
                                open_pos,
                                body_start: name_start + nrel + 1,
                            };
                        }
                    }
                    None => state = ScanState::ErrorRecovery { at: open_pos },
                }
            }
            ScanState::InDialogue {
                open_pos,
                body_start,
            } => {
                match prose[body_start..].find(CLOSE_MARK) {
                    Some(rel) => {
                        let close = body_start + rel;
                        flush_narrator(&mut narrator_buf, &mut segments);
                        let body = prose[body_start..close].trim();
                        // Empty dialogue spans are dropped, no placeholder.
                        if !body.is_empty() {
                            segments.push(Segment::dialogue(segments.len(), speaker.clone(), body));
                        }
                        pos = close + CLOSE_MARK.len();
                        state = ScanState::OutsideTag;
                    }
                    // Open tag without a close: fall back to recovery at
                    // the open marker so the raw text is kept.
                    None => state = ScanState::ErrorRecovery { at: open_pos },
                }
            }
            ScanState::ErrorRecovery { at } => {
                narrator_buf.push_str(OPEN_MARK);
                pos = at + OPEN_MARK.len();
                state = ScanState::OutsideTag;
            }
        }
    }

    flush_narrator(&mut narrator_buf, &mut segments);
    segments
}

/// Ordered set of unique speaker names, first appearance wins.
pub fn unique_speakers(prose: &str) -> Vec<String> {
    let mut speakers: Vec<String> = Vec::new();
    for seg in parse_segments(prose) {
        if seg.is_dialogue() && !speakers.contains(&seg.speaker) {
            speakers.push(seg.speaker);
        }
    }
    speakers
}

/// Remove all speaker tags and collapse whitespace, for narrator-only
/// rendering.
pub fn strip_tags(prose: &str) -> String {
    let without_open = OPEN_TAG_RE.replace_all(prose, " ");
    let without_close = without_open.replace(CLOSE_MARK, " ");
    without_close.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn find_all(haystack: &str, needle: &str) -> Vec<usize> {
    haystack.match_indices(needle).map(|(p, _)| p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentKind;

    #[test]
    fn segments_knight_scene_in_source_order() {
        let prose = "The knight said, [CHAR:Roland]Hello there![/CHAR] and smiled.";
        let segs = parse_segments(prose);
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].kind, SegmentKind::Narrator);
        assert_eq!(segs[0].text, "The knight said,");
        assert_eq!(segs[1].kind, SegmentKind::Dialogue);
        assert_eq!(segs[1].speaker, "Roland");
        assert_eq!(segs[1].text, "Hello there!");
        assert_eq!(segs[2].text, "and smiled.");
        for (i, seg) in segs.iter().enumerate() {
            assert_eq!(seg.index, i);
        }
    }

    #[test]
    fn empty_dialogue_spans_do_not_consume_an_index() {
        let prose = "Before. [CHAR:Ann]   [/CHAR] After.";
        let segs = parse_segments(prose);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].text, "Before.");
        assert_eq!(segs[1].text, "After.");
        assert_eq!(segs[1].index, 1);
    }

    #[test]
    fn unterminated_open_tag_is_absorbed_into_narration() {
        let prose = "She paused. [CHAR:Bob]never closed";
        let segs = parse_segments(prose);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].kind, SegmentKind::Narrator);
        assert!(segs[0].text.contains("never closed"));
    }

    #[test]
    fn stray_close_tag_is_flagged_but_parsing_proceeds() {
        let prose = "Something odd [/CHAR] happened. [CHAR:Eve]Hi.[/CHAR]";
        let validation = validate_tags(prose);
        assert!(!validation.valid);
        assert!(validation.errors.iter().any(|e| e.contains("UNMATCHED_CLOSE")));
        assert!(validation.errors.iter().any(|e| e.contains("UNBALANCED_TAGS")));

        let segs = parse_segments(prose);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[1].speaker, "Eve");
    }

    #[test]
    fn nested_open_is_reported() {
        let prose = "[CHAR:A]outer [CHAR:B]inner[/CHAR] tail[/CHAR]";
        let validation = validate_tags(prose);
        assert!(validation.errors.iter().any(|e| e.contains("NESTED_TAG")));
    }

    #[test]
    fn empty_speaker_is_reported() {
        let prose = "[CHAR:  ]Hello[/CHAR]";
        let validation = validate_tags(prose);
        assert!(validation.errors.iter().any(|e| e.contains("EMPTY_SPEAKER")));
    }

    #[test]
    fn empty_input_is_vacuously_valid() {
        assert!(validate_tags("").valid);
        assert!(validate_tags("   \n ").valid);
        assert!(parse_segments("").is_empty());
    }

    #[test]
    fn strip_tags_collapses_whitespace() {
        let prose = "The knight said,  [CHAR:Roland]Hello there![/CHAR]\n and smiled.";
        assert_eq!(
            strip_tags(prose),
            "The knight said, Hello there! and smiled."
        );
    }

    #[test]
    fn unique_speakers_preserve_first_appearance() {
        let prose = "[CHAR:Roland]Hi.[/CHAR] [CHAR:Ann]Hey.[/CHAR] [CHAR:Roland]Again.[/CHAR]";
        assert_eq!(unique_speakers(prose), vec!["Roland", "Ann"]);
    }
}
