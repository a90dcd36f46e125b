use serde::Serialize;

const HISTORY_KEYWORDS: &[&str] = &[
    "full history",
    "all past data",
    "complete json history",
    "raw visit data",
];
const COMPARISON_KEYWORDS: &[&str] = &[
    "compare visits",
    "visit comparison",
    "changes since",
    "progression",
    "compare findings",
];
const GENERAL_KEYWORDS: &[&str] = &[
    "what is",
    "how to",
    "explain",
    "difference between",
    "standard treatment",
];
const TREATMENT_KEYWORDS: &[&str] = &[
    "treatment plan",
    "create treatment",
    "treatment recommendation",
    "cdt codes",
    "treatment codes",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Raw dump of every prior visit.
    FullHistory,
    VisitComparison,
    /// Textbook question with no case loaded in the thread.
    GeneralQuestion,
    TreatmentPlan,
    /// Anything else: answered against the loaded case and patient history.
    CaseQuestion,
}

pub struct IntentClassifier;

impl IntentClassifier {
    /// Route a question by keyword, first match wins in declaration order of [`Intent`].
    #[must_use]
    pub fn classify(question: &str, context_loaded: bool) -> Intent {
        let question = question.to_lowercase();
        let mentions = |keywords: &[&str]| keywords.iter().any(|k| question.contains(k));

        if mentions(HISTORY_KEYWORDS) {
            Intent::FullHistory
        } else if mentions(COMPARISON_KEYWORDS) {
            Intent::VisitComparison
        } else if mentions(GENERAL_KEYWORDS) && !context_loaded {
            Intent::GeneralQuestion
        } else if mentions(TREATMENT_KEYWORDS) {
            Intent::TreatmentPlan
        } else {
            Intent::CaseQuestion
        }
    }
}
