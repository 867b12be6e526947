// Prompt builders and reply schemas for the five phases
//
// Builders are pure: the same inputs always give the same request text.

use serde_json::{json, Value};

use crate::pipeline::types::{Category, ReferenceSelection, VisualIntent};

/// Prepended to every diagram description sent to the image model.
pub const RENDER_PREFIX: &str = "High-resolution academic illustration for a top-tier ML conference paper. \
Clean white or very light background. \
All text must be perfectly legible in a clear sans-serif font. \
Professional publication quality. \
No watermarks, signatures or decorative borders. \
No figure number or caption text within the image. ";

fn bullet_list<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items
        .into_iter()
        .map(|s| format!("   - {}", s))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Retriever ───────────────────────────────────────────────────────────────

pub fn retriever_prompt(methodology: &str, candidates: &str) -> String {
    format!(
        "You are the Retriever in an academic illustration pipeline.\n\n\
         1. Read the methodology text below.\n\
         2. Classify it into exactly one category:\n{categories}\n\
         3. Identify exactly one visual intent:\n{intents}\n\
         4. Pick the 2 reference candidates whose visual structure and domain best match. \
            Use candidate ids exactly as listed; the two ids must differ.\n\n\
         --- REFERENCE CANDIDATES ---\n{candidates}\n\n\
         --- METHODOLOGY ---\n{methodology}\n\n\
         Respond with JSON only: {{\"category\", \"visual_intent\", \"domain_signals\": [..], \
         \"selected_references\": [{{\"id\", \"reason\"}}, {{\"id\", \"reason\"}}]}}",
        categories = bullet_list(Category::ALL.iter().map(|c| c.as_str())),
        intents = bullet_list(VisualIntent::ALL.iter().map(|i| i.as_str())),
        candidates = candidates,
        methodology = methodology,
    )
}

pub fn retriever_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "category": {
                "type": "string",
                "enum": Category::ALL.iter().map(|c| c.as_str()).collect::<Vec<_>>()
            },
            "visual_intent": {
                "type": "string",
                "enum": VisualIntent::ALL.iter().map(|i| i.as_str()).collect::<Vec<_>>()
            },
            "domain_signals": { "type": "array", "items": { "type": "string" } },
            "selected_references": {
                "type": "array",
                "minItems": 2,
                "maxItems": 2,
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "reason": { "type": "string" }
                    },
                    "required": ["id", "reason"]
                }
            }
        },
        "required": ["category", "visual_intent", "selected_references"]
    })
}

// ── Planner ─────────────────────────────────────────────────────────────────

pub fn planner_prompt(methodology: &str, caption: &str, selection: &ReferenceSelection) -> String {
    format!(
        "You are the Planner in an academic illustration pipeline.\n\n\
         Turn the methodology and caption below into a detailed description of a methodology \
         diagram that an image model will draw. The two images above are reference figures; \
         match their layout quality and level of detail.\n\n\
         Category: {category}\nVisual intent: {intent}\n\n\
         Rules:\n\
         - Describe colours in natural language only; no hex codes, RGB values or pixel sizes.\n\
         - Every component gets a label, a shape, a relative position and a relative size.\n\
         - Every connection gets a source, a target, an arrow style and an optional label.\n\
         - Cover layout direction, groupings and annotations.\n\n\
         --- CAPTION ---\n{caption}\n\n\
         --- METHODOLOGY ---\n{methodology}\n\n\
         Write one complete description as flowing prose. No bullet points, JSON or code.",
        category = selection.category,
        intent = selection.intent,
        caption = caption,
        methodology = methodology,
    )
}

pub fn plot_planner_prompt(data: &str, intent: &str) -> String {
    format!(
        "You are the Planner for a publication-quality statistical plot.\n\n\
         Plan the chart that best serves the intent below: chart type, axes and units, \
         series and their encodings, legend placement, annotations and figure size.\n\n\
         --- INTENT ---\n{intent}\n\n\
         --- DATA ---\n{data}\n\n\
         Write the plan as prose. No code.",
        intent = intent,
        data = data,
    )
}

// ── Stylist ─────────────────────────────────────────────────────────────────

pub fn stylist_prompt(description: &str, category: Category) -> String {
    format!(
        "You are the Stylist in an academic illustration pipeline.\n\n\
         Polish the diagram description below for conference-quality aesthetics. \
         Change only what needs improving, keep every component and connection, \
         and make vague visual details specific.\n\n\
         Category: {category}. Apply: {hint}.\n\
         Palette: soft scientific pastels (cream, pale blue, mint, pale lavender) for zones; \
         warm tones for trainable parts, cool tones for frozen parts; no neon or saturated reds. \
         Colours in natural language only.\n\n\
         --- DESCRIPTION ---\n{description}\n\n\
         Output the complete polished description only, as flowing prose.",
        category = category,
        hint = category.style_hint(),
        description = description,
    )
}

pub fn plot_stylist_prompt(plan: &str) -> String {
    format!(
        "You are the Stylist for a publication-quality statistical plot.\n\n\
         Refine the plot plan below with publication conventions: colour-blind safe palette, \
         readable font sizes, no chart junk, consistent line widths, tight layout, 300 dpi output.\n\n\
         --- PLAN ---\n{plan}\n\n\
         Output the complete refined plan only.",
        plan = plan,
    )
}

// ── Visualizer (plot mode) ──────────────────────────────────────────────────

pub fn plot_code_prompt(plan: &str, approved_imports: &[&str]) -> String {
    format!(
        "Write a standalone Python script that draws the plot described below.\n\n\
         - Import only from: {imports}.\n\
         - Save the figure with plt.savefig(OUTPUT_PATH, dpi=300, bbox_inches=\"tight\"); \
           read OUTPUT_PATH from the environment with a sensible default.\n\
         - Never call show().\n\n\
         --- PLOT DESCRIPTION ---\n{plan}\n\n\
         Return only the script in a ```python block.",
        imports = approved_imports.join(", "),
        plan = plan,
    )
}

// ── Critic ──────────────────────────────────────────────────────────────────

pub fn critic_prompt(methodology: &str, caption: &str, description: &str, subject: &str) -> String {
    format!(
        "You are the Critic in an academic illustration pipeline.\n\n\
         Evaluate {subject} against the methodology and the description it was made from. \
         Score each dimension from 0 to 10:\n\
         1. faithfulness (primary): every component and relation present, nothing invented.\n\
         2. readability (primary): legible labels, no overlaps, clear flow.\n\
         3. conciseness (secondary): good signal-to-noise, adequate white space.\n\
         4. aesthetics (secondary): harmonious colours, consistent professional style.\n\n\
         If faithfulness < 7 or readability < 7, give a complete standalone revised_description \
         that fixes every issue. Otherwise set revised_description to null.\n\n\
         --- METHODOLOGY ---\n{methodology}\n\n\
         --- CAPTION ---\n{caption}\n\n\
         --- DESCRIPTION ---\n{description}\n\n\
         Respond with JSON only: {{\"scores\": {{\"faithfulness\", \"readability\", \"conciseness\", \
         \"aesthetics\"}}, \"critic_suggestions\": [..], \"revised_description\": string or null}}",
        subject = subject,
        methodology = methodology,
        caption = caption,
        description = description,
    )
}

pub fn critic_schema() -> Value {
    let score = json!({ "type": "integer", "minimum": 0, "maximum": 10 });
    json!({
        "type": "object",
        "properties": {
            "scores": {
                "type": "object",
                "properties": {
                    "faithfulness": score,
                    "readability": score,
                    "conciseness": score,
                    "aesthetics": score
                },
                "required": ["faithfulness", "readability", "conciseness", "aesthetics"]
            },
            "critic_suggestions": { "type": "array", "items": { "type": "string" } },
            "revised_description": { "type": ["string", "null"] }
        },
        "required": ["scores", "critic_suggestions"]
    })
}

pub fn revision_followup_prompt(description: &str, suggestions: &[String]) -> String {
    let issues = if suggestions.is_empty() {
        "   - faithfulness or readability scored below 7".to_string()
    } else {
        bullet_list(suggestions.iter().map(String::as_str))
    };
    format!(
        "The figure made from the description below failed review on faithfulness or readability.\n\n\
         Issues:\n{issues}\n\n\
         --- DESCRIPTION ---\n{description}\n\n\
         Write a complete standalone revised description that fixes every issue. \
         Output the description only.",
        issues = issues,
        description = description,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriever_prompt_lists_closed_sets() {
        let prompt = retriever_prompt("method", "1. [a] ...");
        for c in Category::ALL {
            assert!(prompt.contains(c.as_str()));
        }
        for i in VisualIntent::ALL {
            assert!(prompt.contains(i.as_str()));
        }
        assert!(prompt.contains("1. [a]"));
    }

    #[test]
    fn test_prompts_are_deterministic() {
        assert_eq!(retriever_prompt("m", "c"), retriever_prompt("m", "c"));
        assert_eq!(
            critic_prompt("m", "c", "d", "the image"),
            critic_prompt("m", "c", "d", "the image")
        );
    }

    #[test]
    fn test_schemas_require_core_fields() {
        assert_eq!(retriever_schema()["properties"]["selected_references"]["minItems"], 2);
        assert!(critic_schema()["required"]
            .as_array()
            .unwrap()
            .contains(&Value::from("scores")));
    }
}
