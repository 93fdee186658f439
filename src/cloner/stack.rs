//! Stack trace normalization

use crate::constants::{MAX_STACK_FRAMES, STACK_KEEP_FRAMES};

/// Split a stack into frames and make paths portable.
///
/// The first line (the message line) is dropped; each frame is trimmed,
/// loses its leading `at ` and has `base_path` replaced by `.`. Stacks
/// over `MAX_STACK_FRAMES` frames keep both ends around a skip marker.
pub fn prepare_stack(stack: &str, base_path: Option<&str>) -> Vec<String> {
    let lines: Vec<&str> = stack.split('\n').skip(1).collect();

    let marker;
    let frames: Vec<&str> = if lines.len() > MAX_STACK_FRAMES {
        let skipped = lines.len() - MAX_STACK_FRAMES;
        marker = format!("--- skipped {} frames ---", skipped);
        let mut kept = Vec::with_capacity(MAX_STACK_FRAMES + 1);
        kept.extend_from_slice(&lines[..STACK_KEEP_FRAMES]);
        kept.push(marker.as_str());
        kept.extend_from_slice(&lines[lines.len() - STACK_KEEP_FRAMES..]);
        kept
    } else {
        lines
    };

    frames
        .into_iter()
        .map(|line| normalize_frame(line, base_path))
        .collect()
}

fn normalize_frame(line: &str, base_path: Option<&str>) -> String {
    let line = line.trim();
    let line = line.strip_prefix("at ").unwrap_or(line);
    match base_path {
        Some(base) if !base.is_empty() => line.replacen(base, ".", 1),
        _ => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_message_line_and_normalizes() {
        let stack = "Error: boom\n    at run (/home/app/src/main.js:10:5)\n    at /home/app/index.js:1:1";
        let frames = prepare_stack(stack, Some("/home/app"));
        assert_eq!(
            frames,
            vec!["run (./src/main.js:10:5)", "./index.js:1:1"]
        );
    }

    #[test]
    fn test_without_base_path() {
        let frames = prepare_stack("Error\n  at x (/a.js:1:1)", None);
        assert_eq!(frames, vec!["x (/a.js:1:1)"]);
    }

    #[test]
    fn test_single_line_stack_is_empty() {
        assert!(prepare_stack("Error: only message", None).is_empty());
    }

    #[test]
    fn test_oversized_stack_is_cut_in_the_middle() {
        let mut stack = String::from("RangeError: Maximum call stack size exceeded");
        for i in 0..600 {
            stack.push_str(&format!("\n    at frame{}", i));
        }

        let frames = prepare_stack(&stack, None);
        assert_eq!(frames.len(), 501);
        assert_eq!(frames[0], "frame0");
        assert_eq!(frames[249], "frame249");
        assert_eq!(frames[250], "--- skipped 100 frames ---");
        assert_eq!(frames[251], "frame350");
        assert_eq!(frames[500], "frame599");
    }

    #[test]
    fn test_exactly_max_frames_is_kept() {
        let mut stack = String::from("Error");
        for i in 0..500 {
            stack.push_str(&format!("\nat f{}", i));
        }
        assert_eq!(prepare_stack(&stack, None).len(), 500);
    }
}
