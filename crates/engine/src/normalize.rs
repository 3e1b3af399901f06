//! Output normalizer — any raw provider output becomes a valid ResearchResult
//!
//! Providers return anything from clean schema JSON to JSON buried in a
//! fenced code block to plain prose. Everything here is pure and infallible:
//! garbage in, well-typed-but-sparse out.

use crate::types::{Development, ResearchResult, Sentiment};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Overview substituted when no strategy produced a usable one
pub const FALLBACK_OVERVIEW: &str =
    "We couldn't find enough information about this dApp. It may be new, niche, \
     or have limited public coverage — check its official website for details.";

/// Coerce any raw value into the canonical result shape.
///
/// Strings are probed for embedded JSON first; a JSON object is field-coerced;
/// anything else degrades to the fallback overview.
pub fn normalize(raw: &Value) -> ResearchResult {
    match raw {
        Value::Object(_) => normalize_object(raw),
        Value::String(text) => match extract_json(text) {
            Some(inner) if inner.is_object() => normalize_object(&inner),
            _ => normalize_text(text),
        },
        _ => ResearchResult {
            overview: FALLBACK_OVERVIEW.to_string(),
            ..Default::default()
        },
    }
}

fn normalize_object(raw: &Value) -> ResearchResult {
    let overview = field_str(raw, "overview")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_OVERVIEW.to_string());

    ResearchResult {
        overview,
        features: string_array(raw, "features"),
        developments: developments(raw),
        sentiment: sentiment(raw),
        competitors: string_array(raw, "competitors"),
        strengths: string_array(raw, "strengths"),
        weaknesses: string_array(raw, "weaknesses"),
        future_outlook: opt_str(raw, "futureOutlook", "future_outlook"),
        security_audit: opt_str(raw, "securityAudit", "security_audit"),
        technical_analysis: opt_str(raw, "technicalAnalysis", "technical_analysis"),
        investment_potential: opt_str(raw, "investmentPotential", "investment_potential"),
        risk_factors: string_array2(raw, "riskFactors", "risk_factors"),
        additional_resources: string_array2(raw, "additionalResources", "additional_resources"),
        community_insights: opt_str(raw, "communityInsights", "community_insights"),
    }
}

fn field<'a>(raw: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    raw.get(camel).or_else(|| raw.get(snake))
}

fn field_str(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

fn opt_str(raw: &Value, camel: &str, snake: &str) -> Option<String> {
    field(raw, camel, snake)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Non-array values coerce to an empty list rather than failing
fn string_array(raw: &Value, key: &str) -> Vec<String> {
    string_array2(raw, key, key)
}

fn string_array2(raw: &Value, camel: &str, snake: &str) -> Vec<String> {
    field(raw, camel, snake)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn developments(raw: &Value) -> Vec<Development> {
    raw.get("developments")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let description = item
                        .get("description")
                        .and_then(Value::as_str)
                        .or_else(|| item.as_str())?;
                    Some(Development {
                        date: item
                            .get("date")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        description: description.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn sentiment(raw: &Value) -> Option<Sentiment> {
    let value = raw.get("sentiment")?;
    let positive = value
        .get("positive")
        .and_then(Value::as_f64)
        .unwrap_or(50.0);
    Some(Sentiment {
        positive: positive.clamp(0.0, 100.0),
        count: value.get("count").and_then(Value::as_u64),
    })
}

// ---------------------------------------------------------------------------
// Embedded JSON extraction
// ---------------------------------------------------------------------------

/// Pull a JSON value out of prose: fenced code block first, then the first
/// balanced `{...}` span. Returns `None` when nothing parses.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(fenced) = fenced_block(text) {
        if let Ok(value) = serde_json::from_str::<Value>(fenced.trim()) {
            return Some(value);
        }
        // A fence that doesn't parse may still hold prose around an object
        if let Some(value) = balanced_object(fenced) {
            return Some(value);
        }
    }
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        if value.is_object() {
            return Some(value);
        }
    }
    balanced_object(text)
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // Skip an optional language tag on the fence line
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

/// First balanced top-level object, tracking string literals and escapes
fn balanced_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + offset + 1];
                    return serde_json::from_str::<Value>(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Heuristic free-text parsing
// ---------------------------------------------------------------------------

fn sentiment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d{1,3})\s*%\s*positive").expect("valid regex"))
}

fn numbered_heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,2}[.)]\s+\S").expect("valid regex"))
}

fn keyword_heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z /&-]{0,40}:\s*$").expect("valid regex"))
}

struct Section {
    heading: String,
    body: Vec<String>,
}

/// Parse free prose into a sparse result. Never fails: the worst input still
/// yields a non-empty overview.
pub fn normalize_text(text: &str) -> ResearchResult {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ResearchResult {
            overview: FALLBACK_OVERVIEW.to_string(),
            sentiment: Some(Sentiment::default()),
            ..Default::default()
        };
    }

    let sections = split_sections(trimmed);

    // First overview-like section wins; otherwise the first paragraph
    let overview = sections
        .iter()
        .find(|s| is_overview_heading(&s.heading))
        .map(|s| s.body.join(" "))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| first_paragraph(trimmed));

    let mut result = ResearchResult {
        overview,
        sentiment: Some(extract_sentiment(trimmed)),
        ..Default::default()
    };

    for section in &sections {
        let heading = section.heading.as_str();
        if contains_any(heading, &["feature", "capabilit", "what it does"]) {
            result.features = list_items(&section.body);
        } else if contains_any(heading, &["development", "news", "update", "recent"]) {
            result.developments = section
                .body
                .iter()
                .filter(|line| !line.trim().is_empty())
                .map(|line| Development {
                    date: String::new(),
                    description: strip_list_marker(line).to_string(),
                })
                .collect();
        } else if contains_any(heading, &["competitor", "alternative", "similar"]) {
            result.competitors = list_items(&section.body);
        } else if contains_any(heading, &["strength", "pros", "advantage"]) {
            result.strengths = list_items(&section.body);
        } else if contains_any(heading, &["weakness", "cons", "drawback", "limitation"]) {
            result.weaknesses = list_items(&section.body);
        } else if contains_any(heading, &["risk"]) {
            result.risk_factors = list_items(&section.body);
        } else if contains_any(heading, &["outlook", "future", "roadmap"]) {
            let body = section.body.join(" ");
            if !body.trim().is_empty() {
                result.future_outlook = Some(body);
            }
        }
    }

    if result.overview.trim().is_empty() {
        result.overview = FALLBACK_OVERVIEW.to_string();
    }
    result
}

fn split_sections(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(heading) = heading_of(trimmed) {
            if let Some(section) = current.take() {
                sections.push(section);
            }
            current = Some(Section {
                heading: heading.to_lowercase(),
                body: Vec::new(),
            });
        } else if let Some(section) = current.as_mut() {
            if !trimmed.is_empty() {
                section.body.push(trimmed.to_string());
            }
        }
    }
    if let Some(section) = current.take() {
        sections.push(section);
    }
    sections
}

/// Heading markers: `#`-prefixed, `1.`/`1)` numbered, or a bare `Keyword:`
/// line.
fn heading_of(line: &str) -> Option<String> {
    if let Some(stripped) = line.strip_prefix('#') {
        return Some(stripped.trim_start_matches('#').trim().to_string());
    }
    if numbered_heading_regex().is_match(line) {
        let rest = line
            .splitn(2, |c| c == '.' || c == ')')
            .nth(1)
            .unwrap_or("")
            .trim();
        return Some(rest.to_string());
    }
    if keyword_heading_regex().is_match(line) {
        return Some(line.trim_end_matches(':').trim().to_string());
    }
    None
}

fn is_overview_heading(heading: &str) -> bool {
    contains_any(heading, &["overview", "summary", "about", "introduction"])
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn first_paragraph(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .find(|p| !p.is_empty())
        .map(|p| {
            p.lines()
                .map(str::trim)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_else(|| FALLBACK_OVERVIEW.to_string())
}

fn list_items(body: &[String]) -> Vec<String> {
    body.iter()
        .map(|line| strip_list_marker(line))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let trimmed = line.trim_start();
    let without_bullet = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("• "));
    if let Some(rest) = without_bullet {
        return rest;
    }
    // Numbered item: "1. text" / "2) text"
    if numbered_heading_regex().is_match(trimmed) {
        return trimmed
            .splitn(2, |c| c == '.' || c == ')')
            .nth(1)
            .unwrap_or(trimmed)
            .trim_start();
    }
    trimmed
}

/// `NN% positive`-style extraction; no match leaves sentiment neutral
fn extract_sentiment(text: &str) -> Sentiment {
    sentiment_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|positive| Sentiment {
            positive: positive.clamp(0.0, 100.0),
            count: None,
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overview_never_empty() {
        for raw in [json!({}), json!(null), json!(42), json!([1, 2])] {
            let result = normalize(&raw);
            assert!(!result.overview.is_empty(), "empty overview for {raw}");
        }

        let prose = normalize(&json!("plain prose with no headings at all"));
        assert_eq!(prose.overview, "plain prose with no headings at all");

        let object = normalize(&json!({"overview": "Uniswap is a DEX."}));
        assert_eq!(object.overview, "Uniswap is a DEX.");
    }

    #[test]
    fn test_blank_overview_gets_fallback() {
        let result = normalize(&json!({"overview": "   "}));
        assert_eq!(result.overview, FALLBACK_OVERVIEW);
    }

    #[test]
    fn test_sentiment_clamped() {
        let high = normalize(&json!({"overview": "x", "sentiment": {"positive": 150}}));
        assert_eq!(high.sentiment.unwrap().positive, 100.0);

        let low = normalize(&json!({"overview": "x", "sentiment": {"positive": -5}}));
        assert_eq!(low.sentiment.unwrap().positive, 0.0);

        let bogus = normalize(&json!({"overview": "x", "sentiment": {"positive": "hot"}}));
        assert_eq!(bogus.sentiment.unwrap().positive, 50.0);
    }

    #[test]
    fn test_non_array_fields_coerce_to_empty() {
        let result = normalize(&json!({
            "overview": "x",
            "features": "not an array",
            "competitors": 7,
            "developments": {"oops": true}
        }));
        assert!(result.features.is_empty());
        assert!(result.competitors.is_empty());
        assert!(result.developments.is_empty());
    }

    #[test]
    fn test_fenced_json_is_extracted() {
        let text = "Here's what I found:\n```json\n{\"overview\": \"Aave is a lender.\", \"features\": [\"flash loans\"]}\n```\nHope that helps!";
        let result = normalize(&json!(text));
        assert_eq!(result.overview, "Aave is a lender.");
        assert_eq!(result.features, vec!["flash loans"]);
    }

    #[test]
    fn test_embedded_object_in_prose_is_extracted() {
        let text = "Sure! {\"overview\": \"Lido stakes ETH.\"} — anything else?";
        let result = normalize(&json!(text));
        assert_eq!(result.overview, "Lido stakes ETH.");
    }

    #[test]
    fn test_braces_inside_strings_do_not_break_extraction() {
        let text = "{\"overview\": \"Uses {curly} notation\", \"strengths\": [\"a\"]}";
        let result = normalize(&json!(text));
        assert_eq!(result.overview, "Uses {curly} notation");
        assert_eq!(result.strengths, vec!["a"]);
    }

    #[test]
    fn test_unparseable_json_falls_through_to_prose() {
        let text = "{ this is not json but mentions Uniswap";
        let result = normalize(&json!(text));
        assert!(!result.overview.is_empty());
    }

    #[test]
    fn test_headed_text_first_overview_section_wins() {
        let text = "\
# Summary
Curve is a stableswap AMM.

# Overview
This later overview must not win.

# Features
- low slippage
- veCRV governance

# Competitors
- Uniswap
- Balancer
";
        let result = normalize_text(text);
        assert_eq!(result.overview, "Curve is a stableswap AMM.");
        assert_eq!(result.features, vec!["low slippage", "veCRV governance"]);
        assert_eq!(result.competitors, vec!["Uniswap", "Balancer"]);
    }

    #[test]
    fn test_numbered_and_keyword_headings() {
        let text = "\
1. Overview
GMX is a perps DEX.

Strengths:
- deep liquidity

2) Weaknesses
- oracle dependency
";
        let result = normalize_text(text);
        assert_eq!(result.overview, "GMX is a perps DEX.");
        assert_eq!(result.strengths, vec!["deep liquidity"]);
        assert_eq!(result.weaknesses, vec!["oracle dependency"]);
    }

    #[test]
    fn test_no_headings_falls_back_to_first_paragraph() {
        let text = "ENS maps names to addresses.\nIt launched in 2017.\n\nMore trivia here.";
        let result = normalize_text(text);
        assert_eq!(
            result.overview,
            "ENS maps names to addresses. It launched in 2017."
        );
    }

    #[test]
    fn test_text_sentiment_extraction_and_neutral_default() {
        let with = normalize_text("Community sentiment is 72% positive overall.");
        assert_eq!(with.sentiment.unwrap().positive, 72.0);

        let without = normalize_text("No sentiment figures anywhere.");
        assert_eq!(without.sentiment.unwrap().positive, 50.0);
    }

    #[test]
    fn test_future_outlook_section() {
        let text = "# Overview\nA dApp.\n\n# Future Outlook\nExpansion to L2s expected.";
        let result = normalize_text(text);
        assert_eq!(
            result.future_outlook.as_deref(),
            Some("Expansion to L2s expected.")
        );
    }
}
