//! Prompt construction for event extraction.

use super::keywords::KeywordMatch;

/// Truncates `body` to at most `max_chars` characters, on a char boundary.
pub fn truncate_body(body: &str, max_chars: usize) -> &str {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

pub fn build_prompt(
    subject: &str,
    body: &str,
    hints: &[KeywordMatch],
    max_body_chars: usize,
) -> String {
    let body = truncate_body(body, max_body_chars);
    let hint_line = if hints.is_empty() {
        "none".to_string()
    } else {
        hints
            .iter()
            .map(|m| format!("{} ({})", m.keyword, m.tier))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        r#"You are an assistant that extracts calendar events from email.

Subject: {subject}
Matched keywords: {hint_line}
Body:
{body}

Reply with a single JSON object and nothing else:
{{
  "summary": "one-sentence summary of the email",
  "importance_score": <integer 1-10>,
  "importance_reason": "why this score",
  "events": [
    {{
      "title": "event title",
      "description": "short description",
      "start_time": "YYYY-MM-DD HH:MM:SS",
      "end_time": "YYYY-MM-DD HH:MM:SS (optional)",
      "duration": "e.g. 2h or 90m (optional, instead of end_time)",
      "location": "place (optional)",
      "importance_score": <integer 1-10, optional>
    }}
  ]
}}

Scoring:
- 8-10 important: exams, assignment deadlines, mandatory meetings, urgent matters
- 4-7 normal: ordinary meetings, notices, routine arrangements
- 1-3 unimportant: lectures, sign-ups, optional activities, advertising

Create one event per distinct time. If the email has no date or time, return an empty "events" list. Use the time format YYYY-MM-DD HH:MM:SS."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::tier::Tier;

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        assert_eq!(truncate_body("考试安排通知", 2), "考试");
        assert_eq!(truncate_body("short", 100), "short");
        assert_eq!(truncate_body("", 3), "");
    }

    #[test]
    fn test_prompt_embeds_message_and_hints() {
        let hints = vec![KeywordMatch {
            tier: Tier::Important,
            keyword: "exam".to_string(),
        }];
        let prompt = build_prompt("Exam reminder", "Room 101 at 9am", &hints, 4000);
        assert!(prompt.contains("Subject: Exam reminder"));
        assert!(prompt.contains("Room 101 at 9am"));
        assert!(prompt.contains("exam (important)"));
        assert!(prompt.contains("\"importance_score\""));
    }

    #[test]
    fn test_prompt_truncates_body() {
        let body = "x".repeat(50);
        let prompt = build_prompt("s", &body, &[], 10);
        assert!(prompt.contains(&"x".repeat(10)));
        assert!(!prompt.contains(&"x".repeat(11)));
        assert!(prompt.contains("Matched keywords: none"));
    }
}
