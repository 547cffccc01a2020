//! Splits a raw completion into reasoning and answer using the inline
//! `<think>` / `<answer>` tag convention of the upstream model.

use regex::Regex;
use std::sync::LazyLock;

static THINK_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<think>(.*?)</think>").expect("think block pattern compiles")
});
static ANSWER_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<answer>(.*?)</answer>").expect("answer block pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitContent {
    pub reasoning: String,
    pub answer: String,
    pub had_tags: bool,
}

/// Only the first block of each kind counts.
///
/// Without an `<answer>` block, text around the `<think>` block becomes the
/// answer. With an `<answer>` block, text outside it is dropped.
pub fn split_think_answer(src: &str) -> SplitContent {
    let think = THINK_BLOCK.captures(src);
    let answer = ANSWER_BLOCK.captures(src);
    let had_tags = think.is_some() || answer.is_some();

    let reasoning = think
        .as_ref()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let answer = match (&answer, &think) {
        (Some(ans), _) => ans
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
        (None, Some(th)) => {
            // group 0 always exists for a successful match
            let whole = th.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
            let before = src[..whole.0].trim();
            let after = src[whole.1..].trim();
            [before, after]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        }
        (None, None) => src.trim().to_string(),
    };

    SplitContent {
        reasoning,
        answer,
        had_tags,
    }
}

#[cfg(test)]
mod tests {
    use super::split_think_answer;

    #[test]
    fn both_tags_in_order() {
        let out = split_think_answer("<think> because X </think>\n<answer>\n Y \n</answer>");
        assert_eq!(out.reasoning, "because X");
        assert_eq!(out.answer, "Y");
        assert!(out.had_tags);
    }

    #[test]
    fn both_tags_reversed_and_surrounded() {
        let out = split_think_answer("lead <answer>A</answer> mid <think>R</think> tail");
        assert_eq!(out.reasoning, "R");
        assert_eq!(out.answer, "A");
        assert!(out.had_tags);
    }

    #[test]
    fn tags_are_case_insensitive_and_span_lines() {
        let out = split_think_answer("<THINK>line one\nline two</Think><Answer>ok</ANSWER>");
        assert_eq!(out.reasoning, "line one\nline two");
        assert_eq!(out.answer, "ok");
    }

    #[test]
    fn think_only_salvages_surrounding_text() {
        let out = split_think_answer("  before  <think> R </think>  after ");
        assert_eq!(out.reasoning, "R");
        assert_eq!(out.answer, "before\nafter");
        assert!(out.had_tags);
    }

    #[test]
    fn think_only_omits_empty_sides() {
        let out = split_think_answer("<think>R</think>\n\n  the answer");
        assert_eq!(out.answer, "the answer");
        let out = split_think_answer("prefix <think>R</think>   ");
        assert_eq!(out.answer, "prefix");
        let out = split_think_answer("<think>R</think>");
        assert_eq!(out.answer, "");
        assert_eq!(out.reasoning, "R");
    }

    #[test]
    fn answer_only_discards_outside_text() {
        let out = split_think_answer("noise <answer> A </answer> more noise");
        assert_eq!(out.reasoning, "");
        assert_eq!(out.answer, "A");
        assert!(out.had_tags);
    }

    #[test]
    fn no_tags_returns_trimmed_input() {
        let out = split_think_answer("  plain text\n");
        assert_eq!(out.reasoning, "");
        assert_eq!(out.answer, "plain text");
        assert!(!out.had_tags);
    }

    #[test]
    fn only_first_think_block_is_used() {
        let out = split_think_answer("<think>first</think> middle <think>second</think>");
        assert_eq!(out.reasoning, "first");
        assert_eq!(out.answer, "middle <think>second</think>");
    }

    #[test]
    fn unclosed_tag_is_plain_text() {
        let out = split_think_answer("<think>never closed");
        assert!(!out.had_tags);
        assert_eq!(out.answer, "<think>never closed");
    }

    #[test]
    fn match_is_non_greedy() {
        let out = split_think_answer("<answer>a</answer><answer>b</answer>");
        assert_eq!(out.answer, "a");
    }
}
