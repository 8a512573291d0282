use serde::{Deserialize, Serialize};

/// Sentiment analysis output on the integer -100..100 scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentResult {
    /// Overall score, -100 (very negative) to +100 (very positive)
    #[serde(default)]
    pub score: i64,
    /// Positive | Neutral | Negative
    #[serde(default)]
    pub label: String,
    /// Sentiment at the Opening, Middle, and Closing phases of the call
    #[serde(default)]
    pub trajectory: Vec<SentimentPhase>,
    #[serde(default)]
    pub escalation_detected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentPhase {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub label: String,
}

/// Sentiment on the float -1.0..1.0 scale used by the case pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSentiment {
    #[serde(default)]
    pub sentiment_score: f64,
    #[serde(default)]
    pub sentiment_label: String,
    #[serde(default)]
    pub confidence: f64,
}

impl From<&SentimentResult> for CaseSentiment {
    /// The two pipeline variants share one sentiment evaluator; the case
    /// pipeline works on the float scale, converted as score / 100.
    fn from(result: &SentimentResult) -> Self {
        Self {
            sentiment_score: result.score as f64 / 100.0,
            sentiment_label: result.label.clone(),
            confidence: 0.8,
        }
    }
}

/// SOP compliance check output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SopComplianceResult {
    /// Percent of SOP steps marked "pass", 0-100
    #[serde(default)]
    pub adherence_score: i64,
    #[serde(default)]
    pub compliant: bool,
    #[serde(default)]
    pub missed_steps: Vec<String>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    #[serde(default)]
    pub step: String,
    /// "pass" or "fail"
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub evidence: String,
}

/// Risk scan output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskResult {
    #[serde(default)]
    pub risk_detected: bool,
    /// none < low < medium < high < critical
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub flags: Vec<RiskFlag>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFlag {
    /// Churn | Legal | Compliance
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub confidence: String,
    #[serde(default)]
    pub quote: String,
}

/// QA scoring output on a 100-point rubric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaScoreResult {
    #[serde(default)]
    pub total_score: i64,
    #[serde(default)]
    pub breakdown: QaBreakdown,
    #[serde(default)]
    pub critical_fail: bool,
    #[serde(default)]
    pub comments: String,
}

/// Rubric split: Greeting 10, Empathy 20, Solution 40, Efficiency 10,
/// Compliance 20.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaBreakdown {
    #[serde(default)]
    pub greeting: i64,
    #[serde(default)]
    pub empathy: i64,
    #[serde(default)]
    pub solution: i64,
    #[serde(default)]
    pub efficiency: i64,
    #[serde(default)]
    pub compliance: i64,
}

impl QaBreakdown {
    pub fn total(&self) -> i64 {
        self.greeting + self.empathy + self.solution + self.efficiency + self.compliance
    }
}

/// Coaching feedback output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachingResult {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub actionable_feedback: String,
    #[serde(default)]
    pub recommended_training: Vec<String>,
}

/// Versioned policy/SOP excerpts grounding severity decisions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeResult {
    #[serde(default)]
    pub grounding_context: Vec<GroundingExcerpt>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingExcerpt {
    #[serde(default)]
    pub doc_id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub effective_from: String,
    #[serde(default)]
    pub related_issue_id: String,
}

impl GroundingExcerpt {
    /// Citation form used in justifications, e.g. "SOP-2024-001 §3.2"
    pub fn citation(&self) -> String {
        format!("{} {}", self.doc_id, self.section)
    }
}

/// Business insight output, generated only from validated data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsightResult {
    #[serde(default)]
    pub insights: String,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    #[serde(default)]
    pub business_impact: String,
}
