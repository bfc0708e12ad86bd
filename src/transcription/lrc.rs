//! LRC lyric files: `[mm:ss.xx]text` lines.

use super::Segment;
use regex::Regex;
use std::sync::OnceLock;

/// Seconds a parsed line lasts when no later line bounds it.
const LAST_LINE_SECS: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct LrcLine {
    /// The tag exactly as written, e.g. `[01:05.20]`.
    pub tag: String,
    pub seconds: f64,
    pub text: String,
}

fn line_regex() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| {
        Regex::new(r"^\s*(\[(\d+):(\d+(?:\.\d+)?)\])(.*)$").expect("valid regex")
    })
}

fn leading_tags() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"^\s*(\[\d+:\d+(?:\.\d+)?\]\s*)+").expect("valid regex"))
}

pub fn format_timestamp(seconds: f64) -> String {
    let minutes = (seconds / 60.0).floor() as u64;
    let rest = seconds % 60.0;
    format!("[{:02}:{:05.2}]", minutes, rest)
}

/// Builds an LRC document from `(start, text)` pairs. Entries without a
/// start are skipped; quotes are dropped and newlines flattened; lines are
/// sorted by their text form.
pub fn segments_to_lrc<'a>(segments: impl IntoIterator<Item = (Option<f64>, &'a str)>) -> String {
    let mut lines: Vec<String> = segments
        .into_iter()
        .filter_map(|(start, text)| {
            let start = start.filter(|s| s.is_finite())?;
            let text = text.trim().replace('"', "").replace('\n', " ");
            Some(format!("{}{}", format_timestamp(start), text))
        })
        .collect();
    lines.sort();
    lines.join("\n")
}

pub fn parse_lrc(lrc: &str) -> Vec<LrcLine> {
    lrc.lines()
        .filter_map(|line| {
            let captures = line_regex().captures(line)?;
            let minutes: f64 = captures[2].parse().ok()?;
            let seconds: f64 = captures[3].parse().ok()?;
            Some(LrcLine {
                tag: captures[1].to_string(),
                seconds: minutes * 60.0 + seconds,
                text: captures[4].trim().to_string(),
            })
        })
        .collect()
}

/// Segments from parsed lines; each ends where the next begins.
pub fn lrc_segments(lines: &[LrcLine]) -> Vec<Segment> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| Segment {
            start: line.seconds,
            end: lines
                .get(i + 1)
                .map(|next| next.seconds)
                .unwrap_or(line.seconds + LAST_LINE_SECS),
            text: line.text.clone(),
        })
        .collect()
}

/// Lays rewritten lyric text over the original timestamps.
///
/// The result has exactly the original tags in the original order. When the
/// rewrite carries tags of its own, each tagged line lands on the original
/// line with the nearest timestamp and untagged lines (preambles, notes) are
/// dropped. Otherwise the n-th non-empty rewritten line becomes the n-th
/// line's text and surplus lines are joined onto the last line. Original
/// lines that receive nothing keep their text.
pub fn align_rewritten(original: &str, rewritten: &str) -> String {
    let lines = parse_lrc(original);
    if lines.is_empty() {
        return rewritten.trim().to_string();
    }

    let tagged = parse_lrc(rewritten);
    let texts = if tagged.is_empty() {
        align_by_order(&lines, rewritten)
    } else {
        align_by_tag(&lines, &tagged)
    };

    lines
        .iter()
        .zip(texts)
        .map(|(line, text)| format!("{}{}", line.tag, text.unwrap_or_else(|| line.text.clone())))
        .collect::<Vec<_>>()
        .join("\n")
}

fn align_by_tag(lines: &[LrcLine], tagged: &[LrcLine]) -> Vec<Option<String>> {
    let mut texts: Vec<Option<String>> = vec![None; lines.len()];
    for line in tagged {
        let text = leading_tags().replace(&line.text, "").trim().to_string();
        let nearest = lines
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (a.seconds - line.seconds)
                    .abs()
                    .total_cmp(&(b.seconds - line.seconds).abs())
            })
            .map(|(i, _)| i);
        if let Some(i) = nearest {
            append_text(&mut texts[i], &text);
        }
    }
    texts
}

fn align_by_order(lines: &[LrcLine], rewritten: &str) -> Vec<Option<String>> {
    let mut texts: Vec<Option<String>> = vec![None; lines.len()];
    let candidates = rewritten
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("```"));
    for (i, text) in candidates.enumerate() {
        let slot = i.min(lines.len() - 1);
        append_text(&mut texts[slot], text);
    }
    texts
}

fn append_text(slot: &mut Option<String>, text: &str) {
    match slot {
        Some(existing) if !text.is_empty() => {
            if !existing.is_empty() {
                existing.push(' ');
            }
            existing.push_str(text);
        }
        Some(_) => {}
        None => *slot = Some(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_timestamps() {
        assert_eq!(format_timestamp(0.0), "[00:00.00]");
        assert_eq!(format_timestamp(5.5), "[00:05.50]");
        assert_eq!(format_timestamp(65.2), "[01:05.20]");
        assert_eq!(format_timestamp(600.0), "[10:00.00]");
    }

    #[test]
    fn builds_sorted_lrc() {
        let lrc = segments_to_lrc(vec![
            (Some(12.0), " second \"line\" "),
            (None, "no start"),
            (Some(1.5), "first\nline"),
            (Some(20.0), ""),
        ]);
        assert_eq!(lrc, "[00:01.50]first line\n[00:12.00]second line\n[00:20.00]");
    }

    #[test]
    fn parses_lines_and_ignores_noise() {
        let lines = parse_lrc("[00:01.50]hello\nnot a line\n[01:02.00] world ");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].tag, "[00:01.50]");
        assert_eq!(lines[1].seconds, 62.0);
        assert_eq!(lines[1].text, "world");

        let segments = lrc_segments(&lines);
        assert_eq!(segments[0].end, 62.0);
        assert_eq!(segments[1].end, 64.0);
    }

    #[test]
    fn rewrite_keeps_every_timestamp() {
        let original = "[00:01.00]one\n[00:05.00]two\n[00:09.00]three";
        let rewritten = "uno\n\ndos\ntres\ncuatro\n";
        let aligned = align_rewritten(original, rewritten);
        assert_eq!(aligned, "[00:01.00]uno\n[00:05.00]dos\n[00:09.00]tres cuatro");

        let tags: Vec<String> = parse_lrc(&aligned).into_iter().map(|l| l.tag).collect();
        assert_eq!(tags, vec!["[00:01.00]", "[00:05.00]", "[00:09.00]"]);
    }

    #[test]
    fn tagged_rewrite_ignores_preamble() {
        let original = "[00:01.00]one\n[00:05.00]two\n[00:09.00]three";
        let rewritten = "Sure! Here are the rewritten lyrics:\n[00:01.00]uno\n[00:05.00]dos\n[00:09.00]tres";
        assert_eq!(
            align_rewritten(original, rewritten),
            "[00:01.00]uno\n[00:05.00]dos\n[00:09.00]tres"
        );
    }

    #[test]
    fn tagged_rewrite_snaps_to_nearest_timestamp() {
        let original = "[00:01.00]one\n[00:05.00]two\n[00:09.00]three";
        let rewritten = "[00:01.20] uno\n[00:08.00]dos\n[00:08.90]tres\nHope you like it";
        assert_eq!(
            align_rewritten(original, rewritten),
            "[00:01.00]uno\n[00:05.00]two\n[00:09.00]dos tres"
        );
    }

    #[test]
    fn short_rewrite_keeps_original_text() {
        let original = "[00:01.00]one\n[00:05.00]two";
        let aligned = align_rewritten(original, "```\n[00:01.00]uno\n```");
        assert_eq!(aligned, "[00:01.00]uno\n[00:05.00]two");
    }

    #[test]
    fn untimed_original_returns_rewrite() {
        assert_eq!(align_rewritten("", "  new words \n"), "new words");
    }
}
