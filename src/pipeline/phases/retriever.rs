// Retriever — classify the methodology and pick two in-context references

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{prompts, reason_payload, require_text, PhaseContext, PhaseExecutor};
use crate::backend::ReasonRequest;
use crate::pipeline::error::PipelineError;
use crate::pipeline::references::ReferenceCatalog;
use crate::pipeline::types::{
    Category, MethodologyInput, Phase, ReferenceSelection, SelectedReference, VisualIntent,
};
use crate::store::{ArtifactKey, Payload};

pub struct RetrieverExecutor {
    catalog: Arc<ReferenceCatalog>,
}

impl RetrieverExecutor {
    pub fn new(catalog: Arc<ReferenceCatalog>) -> Self {
        Self { catalog }
    }
}

/// Raw JSON shape from the model. Labels are validated, not trusted.
#[derive(Debug, Deserialize)]
struct RawSelection {
    category: String,
    #[serde(alias = "intent")]
    visual_intent: String,
    #[serde(default)]
    domain_signals: Vec<String>,
    #[serde(alias = "references")]
    selected_references: Vec<RawReference>,
}

#[derive(Debug, Deserialize)]
struct RawReference {
    id: String,
    #[serde(default, alias = "justification")]
    reason: String,
}

fn parse_selection(
    value: &serde_json::Value,
    catalog: &ReferenceCatalog,
) -> Result<ReferenceSelection, PipelineError> {
    let contract = |reason: String| PipelineError::contract(Phase::Retriever, reason);

    let raw: RawSelection = serde_json::from_value(value.clone())
        .map_err(|e| contract(format!("malformed selection: {}", e)))?;

    let category: Category = raw.category.parse().map_err(contract)?;
    let intent: VisualIntent = raw.visual_intent.parse().map_err(contract)?;

    let [first, second]: [RawReference; 2] = raw
        .selected_references
        .try_into()
        .map_err(|refs: Vec<RawReference>| {
            contract(format!("expected exactly 2 references, got {}", refs.len()))
        })?;

    if first.id == second.id {
        return Err(contract(format!("reference '{}' selected twice", first.id)));
    }
    for r in [&first, &second] {
        if !catalog.contains(&r.id) {
            return Err(contract(format!("reference '{}' is not in the catalog", r.id)));
        }
    }

    Ok(ReferenceSelection {
        category,
        intent,
        references: [first, second].map(|r| SelectedReference {
            id: r.id,
            justification: r.reason,
        }),
        domain_signals: raw.domain_signals,
    })
}

#[async_trait]
impl PhaseExecutor for RetrieverExecutor {
    type Input = MethodologyInput;
    type Output = ReferenceSelection;

    fn phase(&self) -> Phase {
        Phase::Retriever
    }

    fn check_input(&self, input: &MethodologyInput) -> Result<(), PipelineError> {
        require_text(Phase::Retriever, "methodology text", &input.text)?;
        if self.catalog.len() < 2 {
            return Err(PipelineError::invalid_input(
                Phase::Retriever,
                format!(
                    "reference catalog needs at least 2 entries, has {}",
                    self.catalog.len()
                ),
            ));
        }
        Ok(())
    }

    async fn request(
        &self,
        ctx: &PhaseContext,
        input: &MethodologyInput,
    ) -> Result<Payload, PipelineError> {
        let request = ReasonRequest::new(prompts::retriever_prompt(
            &input.text,
            &self.catalog.candidates_text(),
        ))
        .with_schema(prompts::retriever_schema())
        .with_temperature(ctx.temperatures.retriever);

        ctx.backend
            .reason(&request)
            .await
            .map(reason_payload)
            .map_err(|e| PipelineError::backend(Phase::Retriever, e))
    }

    async fn interpret(
        &self,
        _ctx: &PhaseContext,
        _key: &ArtifactKey,
        _input: &MethodologyInput,
        raw: Payload,
    ) -> Result<ReferenceSelection, PipelineError> {
        let value = raw.as_json().ok_or_else(|| {
            PipelineError::contract(Phase::Retriever, "expected a structured reply")
        })?;
        let selection = parse_selection(value, &self.catalog)?;
        tracing::info!(
            category = %selection.category,
            intent = %selection.intent,
            refs = ?[&selection.references[0].id, &selection.references[1].id],
            "References selected"
        );
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::ErrorKind;
    use crate::pipeline::references::ReferenceEntry;
    use serde_json::json;

    fn catalog() -> ReferenceCatalog {
        let entry = |id: &str| ReferenceEntry {
            id: id.into(),
            file: format!("{}.png", id),
            category: "Agent & Reasoning".into(),
            caption: String::new(),
            description: None,
        };
        ReferenceCatalog::from_entries("/refs", vec![entry("r1"), entry("r2"), entry("r3")])
    }

    fn reply(category: &str, refs: &[&str]) -> serde_json::Value {
        json!({
            "category": category,
            "visual_intent": "Pipeline/Flow",
            "domain_signals": ["agents"],
            "selected_references": refs.iter().map(|id| json!({"id": id, "reason": "close"})).collect::<Vec<_>>()
        })
    }

    #[test]
    fn test_valid_selection() {
        let selection = parse_selection(&reply("Agent & Reasoning", &["r1", "r3"]), &catalog()).unwrap();
        assert_eq!(selection.category, Category::AgentReasoning);
        assert_eq!(selection.intent, VisualIntent::PipelineFlow);
        assert_eq!(selection.references[1].id, "r3");
        assert_eq!(selection.domain_signals, vec!["agents".to_string()]);
    }

    #[test]
    fn test_category_outside_closed_set() {
        let err = parse_selection(&reply("Robotics", &["r1", "r2"]), &catalog()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
    }

    #[test]
    fn test_wrong_reference_count() {
        assert!(parse_selection(&reply("Agent & Reasoning", &["r1"]), &catalog()).is_err());
        assert!(parse_selection(&reply("Agent & Reasoning", &["r1", "r2", "r3"]), &catalog()).is_err());
    }

    #[test]
    fn test_duplicate_or_unknown_reference() {
        assert!(parse_selection(&reply("Agent & Reasoning", &["r1", "r1"]), &catalog()).is_err());
        assert!(parse_selection(&reply("Agent & Reasoning", &["r1", "zz"]), &catalog()).is_err());
    }

    #[test]
    fn test_missing_fields() {
        let err = parse_selection(&json!({"category": "Agent & Reasoning"}), &catalog()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
    }
}
