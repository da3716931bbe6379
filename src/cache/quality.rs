//! Response quality heuristic.
//!
//! The score only biases cache retention and TTLs; it never rejects output.

/// Markers suggesting the response has usable structure (sections, lists,
/// paragraph breaks). Presence extends the TTL.
const STRUCTURE_MARKERS: &[&str] = &["\n\n", "\n- ", "\n* ", "\n#", "\n1.", ":\n"];

/// Platform-flavored signal tokens (hashtags, mentions, links) that indicate
/// the response carries publishable content rather than filler.
const SIGNAL_TOKENS: &[&str] = &["#", "@", "http://", "https://"];

pub(crate) fn has_structure_markers(text: &str) -> bool {
    STRUCTURE_MARKERS.iter().any(|m| text.contains(m))
}

fn length_band(text: &str) -> f64 {
    match text.len() {
        0..=79 => 0.2,
        80..=299 => 0.6,
        300..=2499 => 1.0,
        _ => 0.7,
    }
}

fn sentence_band(text: &str) -> f64 {
    let sentences = text
        .split(['.', '!', '?'])
        .filter(|s| s.trim().len() > 2)
        .count();
    match sentences {
        0 => 0.0,
        1 | 2 => 0.5,
        _ => 1.0,
    }
}

fn signal_band(text: &str) -> f64 {
    let hits = SIGNAL_TOKENS.iter().filter(|t| text.contains(**t)).count();
    (hits as f64 / 2.0).min(1.0)
}

/// Score a response in `[0, 1]`.
///
/// Weighted combination of length bands, structural markers, platform signal
/// tokens, and sentence count.
pub fn score_quality(text: &str) -> f64 {
    let structure = if has_structure_markers(text) { 1.0 } else { 0.0 };
    let score = 0.35 * length_band(text)
        + 0.25 * structure
        + 0.2 * signal_band(text)
        + 0.2 * sentence_band(text);
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_stays_in_unit_interval() {
        for text in ["", "hi", "a ".repeat(5000).as_str()] {
            let q = score_quality(text);
            assert!((0.0..=1.0).contains(&q), "score {q} out of range");
        }
    }

    #[test]
    fn test_structured_response_outscores_fragment() {
        let structured = "Launch plan:\n\n- Ship the beta.\n- Gather feedback!\n- Iterate quickly.\n\nFollow #launch for updates.";
        let fragment = "ok";
        assert!(score_quality(structured) > score_quality(fragment));
    }

    #[test]
    fn test_marker_detection() {
        assert!(has_structure_markers("intro\n\nbody"));
        assert!(has_structure_markers("steps:\n- one"));
        assert!(!has_structure_markers("a single flat line"));
    }

    #[test]
    fn test_overlong_response_is_discounted() {
        let long = "word ".repeat(1200);
        let mid = "This is a reasonable answer. It has several sentences. It stays on topic.";
        assert!(length_band(&long) < length_band(mid));
    }
}
