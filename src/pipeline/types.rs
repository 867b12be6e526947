// Pipeline types — inputs, reference selection, versioned descriptions,
// rendered artifacts and evaluations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::backend::{AspectRatio, ImageData};
use crate::store::ArtifactKey;

use super::evaluation::{self, Verdict};

/// Diagram mode renders an image; plot mode produces a plotting script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Diagram,
    Plot,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Diagram => "diagram",
            Self::Plot => "plot",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five phases, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Retriever,
    Planner,
    Stylist,
    Visualizer,
    Critic,
}

impl Phase {
    /// Also the phase part of artifact keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retriever => "retriever",
            Self::Planner => "planner",
            Self::Stylist => "stylist",
            Self::Visualizer => "visualizer",
            Self::Critic => "critic",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user asked for. Immutable for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodologyInput {
    /// Methodology prose (diagram mode) or the data to plot (plot mode)
    pub text: String,
    /// Figure caption (diagram mode) or plot intent (plot mode)
    pub caption: Option<String>,
    pub mode: Mode,
}

impl MethodologyInput {
    pub fn diagram(text: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            text: text.into(),
            caption,
            mode: Mode::Diagram,
        }
    }

    pub fn plot(data: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            text: data.into(),
            caption: Some(intent.into()),
            mode: Mode::Plot,
        }
    }

    pub fn caption_or_empty(&self) -> &str {
        self.caption.as_deref().unwrap_or("")
    }
}

/// Entry call: one run request.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input: MethodologyInput,
    /// Where the final artifact is copied
    pub output_path: PathBuf,
}

impl RunRequest {
    pub fn new(input: MethodologyInput, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input,
            output_path: output_path.into(),
        }
    }
}

// ── Closed classification sets ──────────────────────────────────────────────

/// Parse a label against a closed set, ignoring case and surrounding space.
fn match_label<T: Copy>(all: &[T], label: &str, name: impl Fn(&T) -> &'static str) -> Option<T> {
    let wanted = label.trim();
    all.iter()
        .copied()
        .find(|item| name(item).eq_ignore_ascii_case(wanted))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Agent & Reasoning")]
    AgentReasoning,
    #[serde(rename = "Vision & Perception")]
    VisionPerception,
    #[serde(rename = "Generative & Learning")]
    GenerativeLearning,
    #[serde(rename = "Science & Applications")]
    ScienceApplications,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Self::AgentReasoning,
        Self::VisionPerception,
        Self::GenerativeLearning,
        Self::ScienceApplications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentReasoning => "Agent & Reasoning",
            Self::VisionPerception => "Vision & Perception",
            Self::GenerativeLearning => "Generative & Learning",
            Self::ScienceApplications => "Science & Applications",
        }
    }

    /// Styling direction the Stylist applies for this category.
    pub fn style_hint(&self) -> &'static str {
        match self {
            Self::AgentReasoning => {
                "persona icons, thought-bubble motifs, a warm illustrated style that stays professional"
            }
            Self::VisionPerception => {
                "emphasised spatial relationships, image-like thumbnails, geometric precision"
            }
            Self::GenerativeLearning => {
                "visible flow and transformation, gradient fills for latent spaces, a clear generation direction"
            }
            Self::ScienceApplications => {
                "conservative domain-appropriate styling with minimal decoration"
            }
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match_label(&Self::ALL, s, Self::as_str).ok_or_else(|| format!("unknown category '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisualIntent {
    #[serde(rename = "Framework Overview")]
    FrameworkOverview,
    #[serde(rename = "Pipeline/Flow")]
    PipelineFlow,
    #[serde(rename = "Detailed Module")]
    DetailedModule,
    #[serde(rename = "Architecture Diagram")]
    ArchitectureDiagram,
}

impl VisualIntent {
    pub const ALL: [VisualIntent; 4] = [
        Self::FrameworkOverview,
        Self::PipelineFlow,
        Self::DetailedModule,
        Self::ArchitectureDiagram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FrameworkOverview => "Framework Overview",
            Self::PipelineFlow => "Pipeline/Flow",
            Self::DetailedModule => "Detailed Module",
            Self::ArchitectureDiagram => "Architecture Diagram",
        }
    }

    /// Wide layouts for flows and overviews, 3:2 for close-ups.
    pub fn aspect_ratio(&self) -> AspectRatio {
        match self {
            Self::FrameworkOverview | Self::PipelineFlow => AspectRatio::Wide,
            Self::DetailedModule | Self::ArchitectureDiagram => AspectRatio::Landscape,
        }
    }
}

impl fmt::Display for VisualIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisualIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match_label(&Self::ALL, s, Self::as_str)
            .ok_or_else(|| format!("unknown visual intent '{}'", s))
    }
}

/// One chosen in-context reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedReference {
    pub id: String,
    pub justification: String,
}

/// Retriever output. Exactly two references, in rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSelection {
    pub category: Category,
    pub intent: VisualIntent,
    pub references: [SelectedReference; 2],
    #[serde(default)]
    pub domain_signals: Vec<String>,
}

// ── Versioned descriptions ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Planner,
    Stylist,
    CriticRevision,
}

/// A figure description. Never edited in place: each phase derives a new
/// value with the next version number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramDescription {
    text: String,
    provenance: Provenance,
    version: u32,
}

impl DiagramDescription {
    /// First description of a run (version 1).
    pub fn planned(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            provenance: Provenance::Planner,
            version: 1,
        }
    }

    pub fn derive(&self, text: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            text: text.into(),
            provenance,
            version: self.version + 1,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

// ── Rendered artifacts ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactContent {
    Image(ImageData),
    Script(String),
}

impl ArtifactContent {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Image(image) => &image.bytes,
            Self::Script(code) => code.as_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedArtifact {
    pub content: ArtifactContent,
    /// Version of the description this was rendered from
    pub source_version: u32,
    /// None in plot mode
    pub aspect_ratio: Option<AspectRatio>,
    pub rendered_at: DateTime<Utc>,
    /// Where the artifact was persisted
    pub key: ArtifactKey,
}

// ── Evaluation ──────────────────────────────────────────────────────────────

/// Critic scores, each 0–10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scores {
    pub faithfulness: u8,
    pub readability: u8,
    pub conciseness: u8,
    pub aesthetics: u8,
}

impl Scores {
    pub const MAX: u8 = 10;

    pub fn new(faithfulness: u8, readability: u8, conciseness: u8, aesthetics: u8) -> Self {
        Self {
            faithfulness,
            readability,
            conciseness,
            aesthetics,
        }
    }

    pub fn primary_sum(&self) -> u16 {
        self.faithfulness as u16 + self.readability as u16
    }

    pub fn secondary_sum(&self) -> u16 {
        self.conciseness as u16 + self.aesthetics as u16
    }

    pub fn in_range(&self) -> bool {
        [self.faithfulness, self.readability, self.conciseness, self.aesthetics]
            .iter()
            .all(|s| *s <= Self::MAX)
    }

    pub fn verdict(&self) -> Verdict {
        evaluation::verdict(self)
    }
}

/// Critic output. Pass/fail is always derived from `scores`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub scores: Scores,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub revised_description: Option<String>,
}

impl EvaluationResult {
    pub fn primary_pass(&self) -> bool {
        self.scores.verdict().primary_pass
    }

    pub fn overall_pass(&self) -> bool {
        self.scores.verdict().overall_pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_is_closed() {
        assert_eq!(
            "agent & reasoning".parse::<Category>(),
            Ok(Category::AgentReasoning)
        );
        assert_eq!(
            " Science & Applications ".parse::<Category>(),
            Ok(Category::ScienceApplications)
        );
        assert!("Robotics".parse::<Category>().is_err());
    }

    #[test]
    fn test_intent_aspect_ratios() {
        assert_eq!(VisualIntent::PipelineFlow.aspect_ratio(), AspectRatio::Wide);
        assert_eq!(VisualIntent::FrameworkOverview.aspect_ratio(), AspectRatio::Wide);
        assert_eq!(VisualIntent::DetailedModule.aspect_ratio(), AspectRatio::Landscape);
        assert_eq!(
            VisualIntent::ArchitectureDiagram.aspect_ratio(),
            AspectRatio::Landscape
        );
    }

    #[test]
    fn test_description_versions_increase() {
        let planned = DiagramDescription::planned("plan");
        let styled = planned.derive("styled", Provenance::Stylist);
        let revised = styled.derive("revised", Provenance::CriticRevision);
        assert_eq!(planned.version(), 1);
        assert_eq!(styled.version(), 2);
        assert_eq!(revised.version(), 3);
        assert_eq!(revised.provenance(), Provenance::CriticRevision);
        // derive never touches the source
        assert_eq!(styled.text(), "styled");
    }

    #[test]
    fn test_selection_serde_uses_labels() {
        let selection = ReferenceSelection {
            category: Category::VisionPerception,
            intent: VisualIntent::PipelineFlow,
            references: [
                SelectedReference { id: "a".into(), justification: "x".into() },
                SelectedReference { id: "b".into(), justification: "y".into() },
            ],
            domain_signals: vec![],
        };
        let json = serde_json::to_value(&selection).unwrap();
        assert_eq!(json["category"], "Vision & Perception");
        assert_eq!(json["intent"], "Pipeline/Flow");
    }

    #[test]
    fn test_scores_range() {
        assert!(Scores::new(10, 0, 5, 5).in_range());
        assert!(!Scores::new(11, 5, 5, 5).in_range());
    }
}
