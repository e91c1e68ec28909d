//! Prompt construction and response parsing for option decisions.

use regex::Regex;
use std::sync::OnceLock;

use crate::decision::types::{Decision, DecisionOption};

const DECISION_TEMPLATE: &str = "\
You are a desktop automation assistant. Look at the screenshot and pick the \
option that best satisfies the user's request.

## Request
{prompt}

## Options
{options}

## Output
Reply with JSON only:
{\"selected\": \"<option label>\", \"confidence\": 0.95, \"reasoning\": \"<short reason>\"}

- `selected` must be one of the option labels above.
- `confidence` is in [0, 1].";

pub fn build_decision_prompt(prompt: &str, options: &[DecisionOption]) -> String {
    let listing = options
        .iter()
        .map(|o| {
            if o.description.is_empty() {
                format!("- {}", o.label)
            } else {
                format!("- {}: {}", o.label, o.description)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    DECISION_TEMPLATE
        .replace("{prompt}", prompt.trim())
        .replace("{options}", &listing)
}

fn json_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[\s\S]*?\}").expect("static regex"))
}

/// Pull the first JSON object out of a model reply and resolve the selected
/// label to the centre of its option region.
pub fn parse_decision(reply: &str, options: &[DecisionOption]) -> Decision {
    let Some(m) = json_object_re().find(reply) else {
        return Decision {
            raw_response: reply.to_string(),
            ..Decision::failed("Failed to parse AI response")
        };
    };
    let data: serde_json::Value = match serde_json::from_str(m.as_str()) {
        Ok(v) => v,
        Err(e) => {
            return Decision {
                raw_response: reply.to_string(),
                ..Decision::failed(format!("Failed to parse AI response: {e}"))
            }
        }
    };

    let selected = data["selected"].as_str().unwrap_or_default().to_string();
    let confidence = data["confidence"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0) as f32;
    let reasoning = data["reasoning"].as_str().unwrap_or_default().to_string();
    let position = options
        .iter()
        .find(|o| o.label == selected)
        .map(|o| o.region.center());

    Decision {
        selected_option: (!selected.is_empty()).then_some(selected),
        position,
        confidence,
        reasoning,
        raw_response: reply.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::{Position, Region};

    fn options() -> Vec<DecisionOption> {
        vec![
            DecisionOption {
                label: "attack".into(),
                region: Region::new(100, 100, 50, 20),
                description: "red button".into(),
            },
            DecisionOption {
                label: "retreat".into(),
                region: Region::new(300, 100, 50, 20),
                description: String::new(),
            },
        ]
    }

    #[test]
    fn prompt_lists_every_option() {
        let p = build_decision_prompt("win the fight", &options());
        assert!(p.contains("win the fight"));
        assert!(p.contains("- attack: red button"));
        assert!(p.contains("- retreat"));
    }

    #[test]
    fn selected_label_resolves_to_region_centre() {
        let reply = "Sure.\n```json\n\
                     {\"selected\": \"retreat\", \"confidence\": 0.7, \
                     \"reasoning\": \"low hp\"}\n```";
        let d = parse_decision(reply, &options());
        assert_eq!(d.selected_option.as_deref(), Some("retreat"));
        assert_eq!(d.position, Some(Position::new(325, 110)));
        assert!((d.confidence - 0.7).abs() < 1e-6);
        assert_eq!(d.reasoning, "low hp");
    }

    #[test]
    fn unknown_label_has_no_position() {
        let d = parse_decision("{\"selected\": \"dance\", \"confidence\": 0.9}", &options());
        assert_eq!(d.position, None);
    }

    #[test]
    fn garbage_reply_is_zero_confidence() {
        let d = parse_decision("I cannot tell", &options());
        assert_eq!(d.confidence, 0.0);
        assert!(d.position.is_none());
        assert_eq!(d.raw_response, "I cannot tell");
    }
}
