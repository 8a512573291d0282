use serde_json::{Value, json};

/// The evaluation tasks a caller can request from the model layer.
///
/// The fallback generator is dispatched on this tag, not by sniffing prompt
/// text for task keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Sentiment,
    SopCompliance,
    Risk,
    QaScore,
    Coaching,
    IssueExtraction,
    Classification,
    SeverityValidation,
    KnowledgeRetrieval,
    Insight,
}

impl TaskKind {
    /// Stable key used in logs, merged results, and failed-agent lists.
    pub fn key(&self) -> &'static str {
        match self {
            TaskKind::Sentiment => "sentiment",
            TaskKind::SopCompliance => "sop_compliance",
            TaskKind::Risk => "risk_analysis",
            TaskKind::QaScore => "qa_score",
            TaskKind::Coaching => "coaching",
            TaskKind::IssueExtraction => "issue_extraction",
            TaskKind::Classification => "classification",
            TaskKind::SeverityValidation => "severity_validation",
            TaskKind::KnowledgeRetrieval => "knowledge_retrieval",
            TaskKind::Insight => "insight",
        }
    }
}

pub(crate) const NEGATIVE_WORDS: [&str; 10] = [
    "angry",
    "frustrated",
    "dissatisfied",
    "problem",
    "issue",
    "complaint",
    "wrong",
    "damaged",
    "hate",
    "terrible",
];

pub(crate) const POSITIVE_WORDS: [&str; 8] = [
    "thank",
    "resolved",
    "happy",
    "great",
    "excellent",
    "appreciate",
    "good",
    "helped",
];

pub(crate) const CHURN_WORDS: [&str; 10] = [
    "cancel",
    "cancels",
    "cancelled",
    "cancelling",
    "leave",
    "leaving",
    "switch",
    "switching",
    "competitor",
    "unsubscribe",
];

pub(crate) const LEGAL_WORDS: [&str; 8] = [
    "lawsuit",
    "lawyer",
    "attorney",
    "sue",
    "suing",
    "sued",
    "court",
    "legal",
];

pub(crate) const COMPLIANCE_WORDS: [&str; 6] = [
    "chargeback",
    "data breach",
    "privacy",
    "harassment",
    "scam",
    "fraud",
];

pub(crate) const BILLING_WORDS: [&str; 7] = [
    "billing",
    "bill",
    "charge",
    "charged",
    "overcharged",
    "invoice",
    "payment",
];

const ESCALATION_WORDS: [&str; 5] = [
    "immediately",
    "right now",
    "today",
    "last time",
    "fed up",
];

/// Match a term against lowercased text: whole-token equality for single
/// words, substring match for multi-word phrases.
pub(crate) fn contains_term(text: &str, term: &str) -> bool {
    if term.contains(' ') {
        text.contains(term)
    } else {
        text.split(|c: char| !c.is_alphanumeric())
            .any(|token| token == term)
    }
}

pub(crate) fn first_term<'a>(text: &str, terms: &[&'a str]) -> Option<&'a str> {
    terms.iter().find(|term| contains_term(text, term)).copied()
}

pub(crate) fn term_hits(text: &str, terms: &[&str]) -> usize {
    terms.iter().filter(|term| contains_term(text, term)).count()
}

/// Ordinal rank for the risk severity scale none < low < medium < high <
/// critical.
pub(crate) fn risk_severity_rank(severity: &str) -> u8 {
    match severity {
        "low" => 1,
        "medium" => 2,
        "high" => 3,
        "critical" => 4,
        _ => 0,
    }
}

/// Produce a deterministic, structurally valid result for a task when no
/// model backend is reachable.
///
/// Total over every TaskKind, never panics, and always returns a JSON
/// object; tasks whose full context lives upstream (classification,
/// severity validation) return a minimal object that the evaluator's
/// backfill completes from its typed inputs.
pub fn generate(task: TaskKind, transcript: &str) -> Value {
    let text = transcript.to_lowercase();
    match task {
        TaskKind::Sentiment => sentiment(&text),
        TaskKind::SopCompliance => sop_compliance(&text),
        TaskKind::Risk => risk(&text),
        TaskKind::QaScore => qa_score(&text),
        TaskKind::Coaching => coaching(&text),
        TaskKind::IssueExtraction => issue_extraction(&text),
        TaskKind::Classification => json!({ "classified_issues": [] }),
        TaskKind::SeverityValidation => json!({
            "validated": true,
            "confidence": 0.6,
            "justification":
                "No model backend available; severity derived from the proposal under the fixed rubric.",
        }),
        TaskKind::KnowledgeRetrieval => knowledge_retrieval(&text),
        TaskKind::Insight => json!({
            "insights": "Agent handled the call professionally.",
            "recommended_actions": ["Follow up with the customer within 24 hours"],
            "business_impact": "Standard interaction",
        }),
    }
}

fn polarity(text: &str) -> (usize, usize) {
    (
        term_hits(text, &NEGATIVE_WORDS),
        term_hits(text, &POSITIVE_WORDS),
    )
}

fn sentiment(text: &str) -> Value {
    let (neg, pos) = polarity(text);
    let (score, label) = if neg > pos {
        (-65, "Negative")
    } else if pos > neg {
        (55, "Positive")
    } else {
        (10, "Neutral")
    };
    let phase = |name: &str| json!({ "phase": name, "score": score, "label": label });
    json!({
        "score": score,
        "label": label,
        "trajectory": [phase("Opening"), phase("Middle"), phase("Closing")],
        "escalation_detected": score < -50,
    })
}

/// Default SOP step list used when the caller supplies none.
pub const DEFAULT_SOP_STEPS: [&str; 5] = [
    "Professional Greeting",
    "Customer Verification",
    "Empathetic Response",
    "Solution Provided",
    "Proper Closing",
];

const STEP_CUES: [(&str, &[&str]); 5] = [
    (
        "Professional Greeting",
        &[
            "hello",
            "hi",
            "good morning",
            "good afternoon",
            "welcome",
            "thank you for calling",
        ],
    ),
    (
        "Customer Verification",
        &[
            "verify",
            "verification",
            "account number",
            "date of birth",
            "otp",
            "confirm your",
        ],
    ),
    (
        "Empathetic Response",
        &["sorry", "apologize", "apologies", "understand", "i hear you"],
    ),
    (
        "Solution Provided",
        &[
            "resolved",
            "solution",
            "fixed",
            "refund",
            "replacement",
            "escalate",
            "arranged",
        ],
    ),
    (
        "Proper Closing",
        &[
            "anything else",
            "have a great day",
            "goodbye",
            "thank you for your time",
            "take care",
        ],
    ),
];

fn sop_compliance(text: &str) -> Value {
    let mut checklist = Vec::new();
    let mut missed = Vec::new();
    for (step, cues) in STEP_CUES {
        match first_term(text, cues) {
            Some(cue) => checklist.push(json!({
                "step": step,
                "status": "pass",
                "evidence": format!("matched cue \"{cue}\""),
            })),
            None => {
                missed.push(step);
                checklist.push(json!({
                    "step": step,
                    "status": "fail",
                    "evidence": "no matching cue found",
                }));
            }
        }
    }
    let passed = STEP_CUES.len() - missed.len();
    let adherence = (passed * 100 / STEP_CUES.len()) as i64;
    json!({
        "adherence_score": adherence,
        "compliant": adherence >= 80,
        "missed_steps": missed,
        "checklist": checklist,
    })
}

fn risk(text: &str) -> Value {
    let escalated = ESCALATION_WORDS.iter().any(|term| contains_term(text, term));
    let mut flags = Vec::new();
    let mut severity = "none";

    if let Some(word) = first_term(text, &CHURN_WORDS) {
        let churn_severity = if escalated { "high" } else { "medium" };
        if risk_severity_rank(churn_severity) > risk_severity_rank(severity) {
            severity = churn_severity;
        }
        flags.push(json!({
            "category": "Churn",
            "confidence": if escalated { "high" } else { "medium" },
            "quote": word,
        }));
    }
    if let Some(word) = first_term(text, &LEGAL_WORDS) {
        if risk_severity_rank("high") > risk_severity_rank(severity) {
            severity = "high";
        }
        flags.push(json!({
            "category": "Legal",
            "confidence": "high",
            "quote": word,
        }));
    }
    if let Some(word) = first_term(text, &COMPLIANCE_WORDS) {
        if risk_severity_rank("medium") > risk_severity_rank(severity) {
            severity = "medium";
        }
        flags.push(json!({
            "category": "Compliance",
            "confidence": "medium",
            "quote": word,
        }));
    }

    // Multiple distinct risk categories compound
    if flags.len() >= 2 && severity == "high" {
        severity = "critical";
    }

    let summary = if flags.is_empty() {
        "No risk indicators detected.".to_string()
    } else {
        let categories: Vec<&str> = flags
            .iter()
            .filter_map(|flag| flag["category"].as_str())
            .collect();
        format!(
            "{} risk indicator(s) detected: {}.",
            flags.len(),
            categories.join(", ")
        )
    };

    json!({
        "risk_detected": !flags.is_empty(),
        "severity": severity,
        "flags": flags,
        "summary": summary,
    })
}

fn qa_score(text: &str) -> Value {
    let (neg, pos) = polarity(text);
    let (greeting, empathy, solution, efficiency, compliance) = if neg > pos {
        (4, 8, 16, 4, 8)
    } else if pos > neg {
        (8, 16, 32, 8, 16)
    } else {
        (6, 12, 24, 6, 12)
    };
    let total = greeting + empathy + solution + efficiency + compliance;
    let comments = if neg > pos {
        "Call shows unresolved customer frustration; review handling and resolution steps."
    } else if pos > neg {
        "Call handled well with a satisfied customer outcome."
    } else {
        "Routine call with no standout strengths or failures."
    };
    json!({
        "total_score": total,
        "breakdown": {
            "greeting": greeting,
            "empathy": empathy,
            "solution": solution,
            "efficiency": efficiency,
            "compliance": compliance,
        },
        "critical_fail": term_hits(text, &LEGAL_WORDS) > 0,
        "comments": comments,
    })
}

fn coaching(text: &str) -> Value {
    let (neg, pos) = polarity(text);
    if neg > pos {
        json!({
            "strengths": [
                "Maintained a professional tone throughout",
                "Kept the conversation on topic",
                "Documented the customer's concern",
            ],
            "weaknesses": [
                "Missed opportunities to acknowledge frustration",
                "Did not offer a concrete resolution timeline",
                "Allowed the conversation to escalate",
            ],
            "actionable_feedback":
                "Acknowledge the customer's frustration early and commit to a concrete resolution timeline before closing.",
            "recommended_training": [
                "De-escalation Techniques",
                "Empathy in Customer Conversations",
            ],
        })
    } else {
        json!({
            "strengths": [
                "Maintained a professional tone throughout",
                "Resolved the customer's request",
                "Closed the call courteously",
            ],
            "weaknesses": [
                "Limited use of empathy statements",
                "Did not summarize next steps",
                "Verification step was rushed",
            ],
            "actionable_feedback":
                "Summarize agreed next steps before closing to confirm mutual understanding.",
            "recommended_training": [
                "Active Listening",
                "Call Flow Fundamentals",
            ],
        })
    }
}

fn issue_extraction(text: &str) -> Value {
    let mut found: Vec<(&str, &str, f64)> = Vec::new();
    if let Some(word) = first_term(text, &CHURN_WORDS) {
        found.push(("Customer indicated intent to cancel or leave", word, 0.85));
    }
    if let Some(word) = first_term(text, &LEGAL_WORDS) {
        found.push(("Customer raised a legal threat", word, 0.9));
    }
    if let Some(word) = first_term(text, &BILLING_WORDS) {
        found.push(("Customer disputed a billing charge", word, 0.85));
    }
    if found.is_empty() {
        if let Some(word) = first_term(text, &NEGATIVE_WORDS) {
            found.push(("Customer reported a service concern", word, 0.75));
        }
    }

    // An empty list is a valid result for a transcript with no complaint
    // signal
    let issues: Vec<Value> = found
        .iter()
        .enumerate()
        .map(|(idx, (issue_text, evidence, confidence))| {
            json!({
                "issue_id": format!("issue_{}", idx + 1),
                "issue_text": issue_text,
                "evidence_span": evidence,
                "confidence": confidence,
            })
        })
        .collect();
    json!({ "issues": issues })
}

struct PolicyDoc {
    doc_id: &'static str,
    version: &'static str,
    section: &'static str,
    content: &'static str,
    effective_from: &'static str,
    terms: &'static [&'static str],
}

const POLICY_DOCS: [PolicyDoc; 3] = [
    PolicyDoc {
        doc_id: "SOP-2024-001",
        version: "1.2",
        section: "§3.2",
        content: "Billing disputes involving failed or duplicate payments must be treated as revenue-impacting and escalated to the billing team within one business day.",
        effective_from: "2024-01-01",
        terms: &BILLING_WORDS,
    },
    PolicyDoc {
        doc_id: "SOP-2024-002",
        version: "2.0",
        section: "§1.4",
        content: "Customers who state an intent to cancel must be offered a retention review before the end of the interaction; unresolved cancellation intent is a churn threat.",
        effective_from: "2024-03-01",
        terms: &CHURN_WORDS,
    },
    PolicyDoc {
        doc_id: "SOP-2024-003",
        version: "1.0",
        section: "§2.1",
        content: "Any mention of legal action must be escalated to the compliance desk within one hour and treated as highest severity.",
        effective_from: "2024-02-15",
        terms: &LEGAL_WORDS,
    },
];

fn knowledge_retrieval(text: &str) -> Value {
    let excerpts: Vec<Value> = POLICY_DOCS
        .iter()
        .filter(|doc| doc.terms.iter().any(|term| contains_term(text, term)))
        .map(|doc| {
            json!({
                "doc_id": doc.doc_id,
                "version": doc.version,
                "section": doc.section,
                "content": doc.content,
                "effective_from": doc.effective_from,
                "related_issue_id": "",
            })
        })
        .collect();
    let confidence = if excerpts.is_empty() { 0.0 } else { 0.7 };
    json!({
        "grounding_context": excerpts,
        "confidence": confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESCALATION_TRANSCRIPT: &str =
        "I want to cancel immediately, your billing is always wrong";

    #[test]
    fn test_every_task_returns_an_object() {
        let tasks = [
            TaskKind::Sentiment,
            TaskKind::SopCompliance,
            TaskKind::Risk,
            TaskKind::QaScore,
            TaskKind::Coaching,
            TaskKind::IssueExtraction,
            TaskKind::Classification,
            TaskKind::SeverityValidation,
            TaskKind::KnowledgeRetrieval,
            TaskKind::Insight,
        ];
        for task in tasks {
            assert!(generate(task, "hello").is_object(), "{:?}", task);
            assert!(generate(task, "").is_object(), "{:?}", task);
        }
    }

    #[test]
    fn test_sentiment_negative_keywords() {
        let value = generate(TaskKind::Sentiment, ESCALATION_TRANSCRIPT);
        assert_eq!(value["label"], "Negative");
        assert_eq!(value["score"], -65);
        assert_eq!(value["escalation_detected"], true);
        assert_eq!(value["trajectory"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_sentiment_positive_keywords() {
        let value = generate(TaskKind::Sentiment, "Thank you, the agent helped and resolved it");
        assert_eq!(value["label"], "Positive");
        assert_eq!(value["escalation_detected"], false);
    }

    #[test]
    fn test_risk_detects_escalated_churn() {
        let value = generate(TaskKind::Risk, ESCALATION_TRANSCRIPT);
        assert_eq!(value["risk_detected"], true);
        assert_eq!(value["severity"], "high");
        let flags = value["flags"].as_array().unwrap();
        assert!(flags.iter().any(|flag| flag["category"] == "Churn"));
    }

    #[test]
    fn test_risk_clean_transcript() {
        let value = generate(TaskKind::Risk, "Thanks for your help, all good");
        assert_eq!(value["risk_detected"], false);
        assert_eq!(value["severity"], "none");
        assert!(value["flags"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_churn_and_legal_compound_to_critical() {
        let value = generate(
            TaskKind::Risk,
            "Cancel my account right now or my lawyer will be in touch",
        );
        assert_eq!(value["severity"], "critical");
    }

    #[test]
    fn test_issue_extraction_empty_on_clean_transcript() {
        let value = generate(TaskKind::IssueExtraction, "Everything is fine, thanks");
        assert!(value["issues"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_issue_extraction_ids_are_sequential() {
        let value = generate(TaskKind::IssueExtraction, ESCALATION_TRANSCRIPT);
        let issues = value["issues"].as_array().unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0]["issue_id"], "issue_1");
        assert_eq!(issues[1]["issue_id"], "issue_2");
    }

    #[test]
    fn test_legal_term_does_not_match_inside_issue() {
        // "sue" must not fire on the token "issue"
        let value = generate(TaskKind::Risk, "There is an issue with my order");
        let flags = value["flags"].as_array().unwrap();
        assert!(!flags.iter().any(|flag| flag["category"] == "Legal"));
    }

    #[test]
    fn test_knowledge_retrieval_matches_policy_docs() {
        let value = generate(TaskKind::KnowledgeRetrieval, ESCALATION_TRANSCRIPT);
        let excerpts = value["grounding_context"].as_array().unwrap();
        let doc_ids: Vec<&str> = excerpts
            .iter()
            .filter_map(|excerpt| excerpt["doc_id"].as_str())
            .collect();
        assert!(doc_ids.contains(&"SOP-2024-001"));
        assert!(doc_ids.contains(&"SOP-2024-002"));
        assert_eq!(value["confidence"], 0.7);
    }

    #[test]
    fn test_sop_checklist_counts_passes() {
        let value = generate(
            TaskKind::SopCompliance,
            "Hello, I am sorry about that, I have arranged a refund, have a great day",
        );
        assert_eq!(value["checklist"].as_array().unwrap().len(), 5);
        // Greeting, Empathetic Response, Solution, Closing pass; Verification fails
        assert_eq!(value["adherence_score"], 80);
        assert_eq!(value["compliant"], true);
        assert_eq!(value["missed_steps"][0], "Customer Verification");
    }
}
