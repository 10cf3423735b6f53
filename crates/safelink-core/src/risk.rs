//! Heuristic chat-message risk scorer.
//!
//! A fixed, ordered set of rule groups (threats, money demands, explicit
//! requests, urgency, off-platform moves, impersonation, underage references)
//! is matched case-insensitively against the message. Each group contributes
//! its weight at most once no matter how many of its patterns hit; the total
//! is clamped to 0..=100. Pure and deterministic — no I/O, no state.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Input is capped before any pattern runs, so pathological messages cannot
/// stall the matcher.
pub const MAX_SCAN_CHARS: usize = 10_000;

/// Half-width of the context snippet recorded for a match (~80 chars total).
const SNIPPET_SPAN: usize = 40;

pub const RED_THRESHOLD: u32 = 60;
pub const YELLOW_THRESHOLD: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Green,
    Yellow,
    Red,
}

impl RiskLevel {
    pub fn from_score(score: u32) -> Self {
        if score >= RED_THRESHOLD {
            RiskLevel::Red
        } else if score >= YELLOW_THRESHOLD {
            RiskLevel::Yellow
        } else {
            RiskLevel::Green
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSignal {
    pub label: String,
    pub weight: u32,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskReport {
    pub score: u32,
    pub level: RiskLevel,
    pub signals: Vec<RiskSignal>,
}

struct RuleGroup {
    label: &'static str,
    weight: u32,
    patterns: Vec<Regex>,
}

pub struct RiskScorer {
    groups: Vec<RuleGroup>,
}

fn group(label: &'static str, weight: u32, patterns: &[&str]) -> RuleGroup {
    RuleGroup {
        label,
        weight,
        patterns: patterns
            .iter()
            .map(|p| Regex::new(p).expect("static risk pattern is valid"))
            .collect(),
    }
}

impl RiskScorer {
    pub fn new() -> Self {
        let groups = vec![
            group(
                "Threat / exposure",
                35,
                &[
                    r"(?i)i'?ll (?:post|share|expose)",
                    r"(?i)i will (?:post|share|expose)",
                    r"(?i)(?:expose|leak).*(?:you|pics|photos|videos)",
                    r"(?i)(?:send|pay).*(?:or|else)",
                    r"(?i)if you don'?t (?:pay|send)",
                    r"(?i)ruin your (?:life|reputation)",
                ],
            ),
            group(
                "Demands for money",
                30,
                &[
                    r"(?i)\bpay\b",
                    r"(?i)\bmoney\b",
                    r"(?i)\bransom\b",
                    r"(?i)gift ?card",
                    r"(?i)prepaid",
                    r"(?i)steam card",
                    r"(?i)apple ?card",
                    r"(?i)google ?play",
                    r"(?i)bitcoin|btc|crypto|usdt|binance|wallet|cashapp|venmo|western union",
                ],
            ),
            group(
                "Requests for explicit images",
                25,
                &[
                    r"(?i)\bsend (?:me )?(?:nudes?|explicit|naked|nsfw)\b",
                    r"(?i)send (?:pics?|photos?).*(?:now|proof)",
                    r"(?i)\bvideo call\b.*\bclothes off\b",
                ],
            ),
            group(
                "Urgency / countdown",
                10,
                &[
                    r"(?i)\b(?:24|12|48)\s?hours?\b",
                    r"(?i)\bdeadline\b",
                    r"(?i)\bnow\b",
                    r"(?i)\bimmediately\b",
                    r"(?i)\bright now\b",
                ],
            ),
            group(
                "Move off-platform",
                10,
                &[
                    r"(?i)snap(?:chat)?[: ]",
                    r"(?i)\bwhats?app\b",
                    r"(?i)\btelegram\b",
                    r"(?i)\bt\.me/\w+",
                ],
            ),
            group(
                "Impersonation (authority/platform)",
                15,
                &[
                    r"(?i)\b(?:fbi|police|interpol|sheriff|cia)\b",
                    r"(?i)(?:meta|instagram|facebook|trust & safety|support) (?:team|security|agent)",
                ],
            ),
            group(
                "Underage / legal risk",
                20,
                &[
                    r"(?i)\bunder\s?age\b",
                    r"(?i)\bminor\b",
                    r"(?i)\b17\b|\b16\b|\b15\b|\b14\b|\b13\b",
                    r"(?i)child (?:porn|abuse|exploitation)",
                ],
            ),
        ];
        Self { groups }
    }

    pub fn score(&self, message: &str) -> RiskReport {
        let text = truncate_chars(message, MAX_SCAN_CHARS);
        let mut signals = Vec::new();
        let mut total: u32 = 0;

        for rule in &self.groups {
            for re in &rule.patterns {
                if let Some(m) = re.find(text) {
                    total += rule.weight;
                    signals.push(RiskSignal {
                        label: rule.label.to_string(),
                        weight: rule.weight,
                        snippet: snippet_around(text, m.start(), SNIPPET_SPAN),
                    });
                    break; // a group counts at most once
                }
            }
        }

        let score = total.min(100);
        RiskReport {
            score,
            level: RiskLevel::from_score(score),
            signals,
        }
    }
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Score with a process-wide scorer instance (the ruleset is fixed, so
/// compiling it once is enough).
pub fn score(message: &str) -> RiskReport {
    static SCORER: OnceLock<RiskScorer> = OnceLock::new();
    SCORER.get_or_init(RiskScorer::new).score(message)
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn snippet_around(text: &str, idx: usize, span: usize) -> String {
    let mut start = idx.saturating_sub(span);
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (idx + span).min(text.len());
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    text[start..end].split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_message_is_green() {
        let report = score("");
        assert_eq!(report.score, 0);
        assert_eq!(report.level, RiskLevel::Green);
        assert!(report.signals.is_empty());
    }

    #[test]
    fn sextortion_phrase_is_red() {
        let report = score("pay me or I'll leak your pics, do it now");
        assert!(report.score >= 65, "score was {}", report.score);
        assert_eq!(report.level, RiskLevel::Red);
        let labels: Vec<&str> = report.signals.iter().map(|s| s.label.as_str()).collect();
        assert!(labels.contains(&"Threat / exposure"));
        assert!(labels.contains(&"Demands for money"));
        assert!(labels.contains(&"Urgency / countdown"));
    }

    #[test]
    fn group_counts_at_most_once() {
        // Four money patterns, nothing else.
        let report = score("pay money ransom bitcoin");
        assert_eq!(report.score, 30);
        assert_eq!(report.level, RiskLevel::Yellow);
        assert_eq!(report.signals.len(), 1);
        assert_eq!(report.signals[0].label, "Demands for money");
    }

    #[test]
    fn score_is_clamped_to_100() {
        let report = score(
            "I'll expose you unless you pay. Send nudes now or else. \
             You have 24 hours, deadline. Add me on snapchat: or whatsapp. \
             This is the FBI support team. You are a minor, underage.",
        );
        assert_eq!(report.score, 100);
        assert_eq!(report.level, RiskLevel::Red);
    }

    #[test]
    fn truncation_happens_before_matching() {
        // Trigger phrase entirely past the 10,000-char cap: must score 0.
        let mut msg = "a".repeat(10_000);
        msg.push_str(" pay me or I'll leak your pics now");
        assert!(msg.chars().count() > 10_000);
        let report = score(&msg);
        assert_eq!(report.score, 0);
        assert_eq!(report.level, RiskLevel::Green);
    }

    #[test]
    fn level_boundaries_are_exact() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Green);
        assert_eq!(RiskLevel::from_score(29), RiskLevel::Green);
        assert_eq!(RiskLevel::from_score(30), RiskLevel::Yellow);
        assert_eq!(RiskLevel::from_score(59), RiskLevel::Yellow);
        assert_eq!(RiskLevel::from_score(60), RiskLevel::Red);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Red);
    }

    #[test]
    fn snippet_is_centered_and_whitespace_collapsed() {
        let msg = format!("{} pay   me\nnow {}", "x".repeat(100), "y".repeat(100));
        let report = score(&msg);
        let money = report
            .signals
            .iter()
            .find(|s| s.label == "Demands for money")
            .unwrap();
        assert!(money.snippet.contains("pay me now"));
        assert!(money.snippet.len() <= 85);
    }
}
