//! Language-model analysis passes over extracted document text.
//!
//! Every pass calls the [`Inference`] capability through the retry wrapper
//! and degrades to a documented default on unavailability or a
//! structured-response contract violation — a failed analysis is reported
//! as its default shape, never as an error surfaced to the end user.
//!
//! Prompt wording is deliberately plain; the engineering contract is the
//! response shape and the degradation behavior, not the phrasing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::InferenceConfig;
use crate::inference::{parse_structured, ChatMessage, GenerationRequest, Inference};
use crate::models::Page;
use crate::retry::with_retry;

/// Classification result when the document has too little usable text.
pub const UNREADABLE: &str = "Unreadable Document";
/// Classification result when the capability is unavailable.
pub const CLASSIFICATION_ERROR: &str = "Classification Error";

/// A difficult term with its plain-language explanation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TermExplanation {
    pub term: String,
    pub explanation: String,
    pub category: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleItem {
    pub rule: String,
    pub explanation: String,
    pub severity: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsequenceItem {
    pub consequence: String,
    pub explanation: String,
    pub severity: String,
    pub triggered_by: String,
}

/// Rules, obligations, and consequences of non-compliance. All fields
/// default so a partial structured response still parses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsequenceReport {
    pub document_type: String,
    pub rules: Vec<RuleItem>,
    pub consequences: Vec<ConsequenceItem>,
    pub summary: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskBreakdown {
    pub high_risk: u32,
    pub medium_risk: u32,
    pub low_risk: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskyClause {
    pub clause_text: String,
    pub category: String,
    pub risk_level: String,
    pub risk_score: u32,
    pub explanation: String,
}

/// Deep risk analysis with scoring. All fields default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskReport {
    pub overall_risk_score: u32,
    pub risk_breakdown: RiskBreakdown,
    pub total_clauses_analyzed: u32,
    pub clauses_by_category: BTreeMap<String, u32>,
    pub risky_clauses: Vec<RiskyClause>,
    pub summary: String,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenefitBreakdown {
    pub strong_benefit: u32,
    pub moderate_benefit: u32,
    pub minor_benefit: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BeneficialClause {
    pub clause_text: String,
    pub category: String,
    pub benefit_level: String,
    pub benefit_score: u32,
    pub explanation: String,
}

/// Positive aspects of a document: protections, favorable terms, exit
/// options. Mirror image of [`RiskReport`]. All fields default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenefitReport {
    pub overall_benefit_score: u32,
    pub benefit_breakdown: BenefitBreakdown,
    pub total_beneficial_clauses: u32,
    pub benefits_by_category: BTreeMap<String, u32>,
    pub beneficial_clauses: Vec<BeneficialClause>,
    pub summary: String,
    pub strengths: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegalityViolation {
    pub rule_name: String,
    pub law_source: String,
    pub severity: String,
    pub clause_found: String,
    pub explanation: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompliantPoint {
    pub rule_name: String,
    pub law_source: String,
    pub note: String,
}

/// Compliance review: clauses that are likely unenforceable or
/// non-compliant with the law that typically governs the document type,
/// plus points where the document complies. All fields default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegalityReport {
    pub violations: Vec<LegalityViolation>,
    pub compliant_points: Vec<CompliantPoint>,
    pub summary: String,
}

/// One page with its translation.
#[derive(Debug, Clone, Serialize)]
pub struct TranslatedPage {
    pub page_number: u32,
    pub original: String,
    pub translated: String,
}

/// Truncate to at most `max` characters on a char boundary.
fn cap_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

async fn generate_with_retry(
    inference: &dyn Inference,
    cfg: &InferenceConfig,
    label: &'static str,
    request: GenerationRequest,
) -> Option<String> {
    let policy = cfg.retry_policy();
    with_retry(&policy, label, move || {
        let request = request.clone();
        async move { inference.generate(request).await }
    })
    .await
    .ok()
}

/// Classify the document into a 1-3 word type (e.g. "Rent Agreement").
pub async fn classify_document(
    inference: &dyn Inference,
    cfg: &InferenceConfig,
    text: &str,
) -> String {
    if text.trim().chars().count() < 10 {
        return UNREADABLE.to_string();
    }

    let prompt = format!(
        "Analyze the following document text and classify it into a document type.\n\
         Your response must be ONLY the document type in 1-3 words maximum.\n\n\
         Examples: Home Loan, Rent Agreement, Employment Contract, Medical Report,\n\
         Insurance Policy, Tax Return, Bank Statement, Invoice, Utility Bill.\n\n\
         Document text:\n{}\n\nDocument type (1-3 words only):",
        cap_chars(text, 5000)
    );
    let request = GenerationRequest::new(vec![
        ChatMessage::system(
            "You are a document classification expert. Respond with ONLY the document type \
             in 1-3 words. No explanations, no punctuation, just the classification.",
        ),
        ChatMessage::user(prompt),
    ])
    .with_temperature(0.1)
    .with_max_tokens(20);

    match generate_with_retry(inference, cfg, "classify", request).await {
        Some(raw) => {
            let cleaned = raw.replace(['.', ','], "");
            let words: Vec<&str> = cleaned.split_whitespace().take(3).collect();
            if words.is_empty() {
                UNREADABLE.to_string()
            } else {
                words.join(" ")
            }
        }
        None => CLASSIFICATION_ERROR.to_string(),
    }
}

/// Translate free text into the target language.
pub async fn translate_text(
    inference: &dyn Inference,
    cfg: &InferenceConfig,
    text: &str,
    target_language: &str,
) -> String {
    if text.trim().is_empty() {
        return "No text to translate".to_string();
    }

    let request = GenerationRequest::new(vec![
        ChatMessage::system(format!(
            "You are a professional translator. Translate the given text to {} accurately. \
             Provide only the translation without any additional explanations or notes.",
            target_language
        )),
        ChatMessage::user(format!(
            "Translate the following text to {}.\nProvide ONLY the translation.\n\n\
             Text to translate:\n{}\n\nTranslation:",
            target_language, text
        )),
    ])
    .with_temperature(cfg.temperature)
    .with_max_tokens(cfg.max_tokens);

    generate_with_retry(inference, cfg, "translate", request)
        .await
        .unwrap_or_else(|| "Translation unavailable".to_string())
}

/// Translate a whole document page by page, keeping originals alongside.
pub async fn translate_pages(
    inference: &dyn Inference,
    cfg: &InferenceConfig,
    pages: &[Page],
    target_language: &str,
) -> Vec<TranslatedPage> {
    let mut translated = Vec::with_capacity(pages.len());
    for page in pages {
        let output = if page.content.trim().is_empty() {
            "(Empty page)".to_string()
        } else {
            translate_text(inference, cfg, &page.content, target_language).await
        };
        translated.push(TranslatedPage {
            page_number: page.page_number,
            original: page.content.clone(),
            translated: output,
        });
    }
    translated
}

/// Identify difficult terms and jargon with plain-language explanations.
/// Short documents and failed calls both yield an empty list.
pub async fn difficult_terms(
    inference: &dyn Inference,
    cfg: &InferenceConfig,
    text: &str,
    language: &str,
) -> Vec<TermExplanation> {
    if text.trim().chars().count() < 50 {
        return Vec::new();
    }

    let prompt = format!(
        "Identify difficult or technical terms, legal jargon, or specialized vocabulary in \
         the document below that a regular person might not understand. For each term give \
         the exact term, a simple explanation in {}, and a category (Legal, Financial, \
         Technical, Medical, ...).\n\n\
         Return EXACTLY a JSON array of objects with keys \"term\", \"explanation\", \
         \"category\". Find 5-10 of the most important terms; fewer if the document is \
         simple.\n\nDocument text:\n{}\n\nRespond with ONLY the JSON array:",
        language,
        cap_chars(text, 8000)
    );
    let request = GenerationRequest::new(vec![
        ChatMessage::system(format!(
            "You are an expert at explaining complex terms in simple language. Always \
             respond in valid JSON. Explain terms in {}.",
            language
        )),
        ChatMessage::user(prompt),
    ])
    .with_temperature(0.3)
    .with_max_tokens(2000);

    generate_with_retry(inference, cfg, "difficult-terms", request)
        .await
        .and_then(|raw| parse_structured(&raw))
        .unwrap_or_default()
}

/// Analyze rules, obligations, and consequences of non-compliance.
pub async fn consequence_analysis(
    inference: &dyn Inference,
    cfg: &InferenceConfig,
    text: &str,
    language: &str,
) -> ConsequenceReport {
    if text.trim().chars().count() < 100 {
        return ConsequenceReport::default();
    }

    let prompt = format!(
        "Analyze this document and identify: 1. RULES & OBLIGATIONS the person must follow; \
         2. CONSEQUENCES if they fail to follow them; 3. PENALTIES mentioned. Explain each \
         in simple {lang} with a severity (Low, Medium, High, Critical).\n\n\
         Return EXACTLY this JSON shape: {{\"document_type\": \"...\", \
         \"rules\": [{{\"rule\": \"...\", \"explanation\": \"...\", \"severity\": \"...\"}}], \
         \"consequences\": [{{\"consequence\": \"...\", \"explanation\": \"...\", \
         \"severity\": \"...\", \"triggered_by\": \"...\"}}], \"summary\": \"...\"}}\n\n\
         Document text:\n{text}\n\nRespond with ONLY valid JSON:",
        lang = language,
        text = cap_chars(text, 10_000)
    );
    let request = GenerationRequest::new(vec![
        ChatMessage::system(format!(
            "You are a document analyst. Identify all rules, obligations, and consequences. \
             Explain everything clearly in {}. Always respond in valid JSON.",
            language
        )),
        ChatMessage::user(prompt),
    ])
    .with_temperature(0.2)
    .with_max_tokens(3000);

    generate_with_retry(inference, cfg, "consequences", request)
        .await
        .and_then(|raw| parse_structured(&raw))
        .unwrap_or_else(|| ConsequenceReport {
            summary: "Analysis unavailable".to_string(),
            ..ConsequenceReport::default()
        })
}

/// Deep risk analysis with per-clause scoring.
pub async fn risk_analysis(
    inference: &dyn Inference,
    cfg: &InferenceConfig,
    text: &str,
    document_type: &str,
    language: &str,
) -> RiskReport {
    if text.trim().chars().count() < 100 {
        return RiskReport::default();
    }

    let prompt = format!(
        "You are a legal and financial risk analyst. Analyze this {doc_type} document for \
         risky clauses, liability issues, financial risks, hidden obligations, termination \
         and penalty clauses. Respond in {lang}.\n\n\
         Return EXACTLY this JSON shape: {{\"overall_risk_score\": 0-100, \
         \"risk_breakdown\": {{\"high_risk\": n, \"medium_risk\": n, \"low_risk\": n}}, \
         \"total_clauses_analyzed\": n, \"clauses_by_category\": {{\"Category\": n}}, \
         \"risky_clauses\": [{{\"clause_text\": \"...\", \"category\": \"...\", \
         \"risk_level\": \"HIGH|MEDIUM|LOW\", \"risk_score\": 0-100, \
         \"explanation\": \"...\"}}], \"summary\": \"...\", \"recommendations\": [\"...\"]}}\n\n\
         DOCUMENT:\n{text}\n\nRespond with ONLY valid JSON:",
        doc_type = document_type,
        lang = language,
        text = cap_chars(text, 15_000)
    );
    let request = GenerationRequest::new(vec![ChatMessage::user(prompt)])
        .with_temperature(0.2)
        .with_max_tokens(3000);

    generate_with_retry(inference, cfg, "risk-analysis", request)
        .await
        .and_then(|raw| parse_structured(&raw))
        .unwrap_or_else(|| RiskReport {
            summary: "Risk analysis unavailable".to_string(),
            ..RiskReport::default()
        })
}

/// Analyze the document for clauses that favor the user: protections,
/// financial benefits, flexibility, exit options.
pub async fn benefits_analysis(
    inference: &dyn Inference,
    cfg: &InferenceConfig,
    text: &str,
    document_type: &str,
    language: &str,
) -> BenefitReport {
    if text.trim().chars().count() < 100 {
        return BenefitReport::default();
    }

    let prompt = format!(
        "You are an expert document analyst. Analyze this {doc_type} document for POSITIVE \
         aspects that BENEFIT the user: protections and rights, favorable terms, financial \
         benefits (discounts, waivers, grace periods), flexibility clauses, exit and \
         cancellation rights, transparency provisions. Respond in {lang}.\n\n\
         Return EXACTLY this JSON shape: {{\"overall_benefit_score\": 0-100, \
         \"benefit_breakdown\": {{\"strong_benefit\": n, \"moderate_benefit\": n, \
         \"minor_benefit\": n}}, \"total_beneficial_clauses\": n, \
         \"benefits_by_category\": {{\"Category\": n}}, \"beneficial_clauses\": \
         [{{\"clause_text\": \"...\", \"category\": \"...\", \
         \"benefit_level\": \"STRONG|MODERATE|MINOR\", \"benefit_score\": 0-100, \
         \"explanation\": \"...\"}}], \"summary\": \"...\", \"strengths\": [\"...\"]}}\n\n\
         Identify 5-10 beneficial clauses; higher scores mean more beneficial.\n\n\
         DOCUMENT:\n{text}\n\nRespond with ONLY valid JSON:",
        doc_type = document_type,
        lang = language,
        text = cap_chars(text, 15_000)
    );
    let request = GenerationRequest::new(vec![
        ChatMessage::system(format!(
            "You are an expert document analyst focused on finding user benefits. \
             Respond in {}. Return valid JSON only.",
            language
        )),
        ChatMessage::user(prompt),
    ])
    .with_temperature(0.3)
    .with_max_tokens(4000);

    generate_with_retry(inference, cfg, "benefits-analysis", request)
        .await
        .and_then(|raw| parse_structured(&raw))
        .unwrap_or_else(|| BenefitReport {
            summary: "Benefits analysis unavailable".to_string(),
            ..BenefitReport::default()
        })
}

/// Review the document for clauses that are likely unenforceable or
/// non-compliant with the law that typically governs its type.
///
/// The model supplies the applicable rules and their sources; no rule
/// content ships with the binary, so the pass works for any document type.
pub async fn legality_analysis(
    inference: &dyn Inference,
    cfg: &InferenceConfig,
    text: &str,
    document_type: &str,
    language: &str,
) -> LegalityReport {
    if text.trim().chars().count() < 100 {
        return LegalityReport::default();
    }

    let prompt = format!(
        "You are a legal compliance auditor. Review this {doc_type} document against the \
         laws and regulations that typically govern such documents. For each problem, name \
         the rule you rely on and cite its source (act, regulation, or established legal \
         principle); flag ambiguous clauses as violations with severity MEDIUM. Respond \
         in {lang}.\n\n\
         Return EXACTLY this JSON shape: {{\"violations\": [{{\"rule_name\": \"...\", \
         \"law_source\": \"...\", \"severity\": \"HIGH|MEDIUM|LOW\", \
         \"clause_found\": \"the exact text from the document\", \"explanation\": \"...\", \
         \"recommendation\": \"...\"}}], \"compliant_points\": [{{\"rule_name\": \"...\", \
         \"law_source\": \"...\", \"note\": \"...\"}}], \"summary\": \"...\"}}\n\n\
         DOCUMENT:\n{text}\n\nRespond with ONLY valid JSON:",
        doc_type = document_type,
        lang = language,
        text = cap_chars(text, 15_000)
    );
    let request = GenerationRequest::new(vec![
        ChatMessage::system(format!(
            "You are an expert legal compliance auditor. Analyze documents against the \
             laws that govern them. Respond in {}. Return valid JSON only.",
            language
        )),
        ChatMessage::user(prompt),
    ])
    .with_temperature(0.2)
    .with_max_tokens(3000);

    generate_with_retry(inference, cfg, "legality-analysis", request)
        .await
        .and_then(|raw| parse_structured(&raw))
        .unwrap_or_else(|| LegalityReport {
            summary: "Legality analysis unavailable".to_string(),
            ..LegalityReport::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::Inference;
    use crate::retry::CallError;
    use async_trait::async_trait;

    /// Provider returning a canned response for every call.
    struct StaticProvider(String);

    #[async_trait]
    impl Inference for StaticProvider {
        async fn generate(&self, _request: GenerationRequest) -> Result<String, CallError> {
            Ok(self.0.clone())
        }

        async fn image_to_text(
            &self,
            _jpeg: &[u8],
            _instruction: &str,
        ) -> Result<String, CallError> {
            Ok(self.0.clone())
        }
    }

    fn cfg() -> InferenceConfig {
        InferenceConfig {
            retry_base_ms: 1,
            ..Default::default()
        }
    }

    #[test]
    fn cap_chars_respects_char_boundaries() {
        assert_eq!(cap_chars("héllo", 2), "hé");
        assert_eq!(cap_chars("short", 100), "short");
    }

    #[tokio::test]
    async fn too_short_text_is_unreadable_without_any_call() {
        let provider = StaticProvider("should not be used".to_string());
        let result = classify_document(&provider, &cfg(), "  hi  ").await;
        assert_eq!(result, UNREADABLE);
    }

    #[tokio::test]
    async fn classification_is_capped_at_three_words() {
        let provider = StaticProvider("Fixed Rate Home Loan Agreement.".to_string());
        let result =
            classify_document(&provider, &cfg(), "A long enough document body here").await;
        assert_eq!(result, "Fixed Rate Home");
    }

    #[tokio::test]
    async fn unavailable_classification_degrades_to_error_label() {
        let provider = crate::inference::DisabledProvider;
        let result =
            classify_document(&provider, &cfg(), "A long enough document body here").await;
        assert_eq!(result, CLASSIFICATION_ERROR);
    }

    #[tokio::test]
    async fn difficult_terms_parse_fenced_json() {
        let provider = StaticProvider(
            "```json\n[{\"term\": \"lien\", \"explanation\": \"a legal claim\", \
             \"category\": \"Legal\"}]\n```"
                .to_string(),
        );
        let text = "x".repeat(60);
        let terms = difficult_terms(&provider, &cfg(), &text, "English").await;
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].term, "lien");
    }

    #[tokio::test]
    async fn contract_violation_yields_empty_terms() {
        let provider = StaticProvider("I cannot help with that.".to_string());
        let text = "x".repeat(60);
        assert!(difficult_terms(&provider, &cfg(), &text, "English")
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn partial_risk_report_still_parses() {
        let provider = StaticProvider(
            "{\"overall_risk_score\": 70, \"summary\": \"risky\"}".to_string(),
        );
        let text = "x".repeat(200);
        let report = risk_analysis(&provider, &cfg(), &text, "Rent Agreement", "English").await;
        assert_eq!(report.overall_risk_score, 70);
        assert_eq!(report.summary, "risky");
        assert!(report.risky_clauses.is_empty());
    }

    #[tokio::test]
    async fn partial_benefit_report_still_parses() {
        let provider = StaticProvider(
            "{\"overall_benefit_score\": 64, \"strengths\": [\"clear exit clause\"]}".to_string(),
        );
        let text = "x".repeat(200);
        let report =
            benefits_analysis(&provider, &cfg(), &text, "Rent Agreement", "English").await;
        assert_eq!(report.overall_benefit_score, 64);
        assert_eq!(report.strengths, vec!["clear exit clause"]);
        assert!(report.beneficial_clauses.is_empty());
    }

    #[tokio::test]
    async fn unavailable_benefits_degrade_to_default_shape() {
        let text = "x".repeat(200);
        let report = benefits_analysis(
            &crate::inference::DisabledProvider,
            &cfg(),
            &text,
            "Invoice",
            "English",
        )
        .await;
        assert_eq!(report.overall_benefit_score, 0);
        assert_eq!(report.summary, "Benefits analysis unavailable");
    }

    #[tokio::test]
    async fn legality_violations_parse_from_fenced_json() {
        let provider = StaticProvider(
            "```json\n{\"violations\": [{\"rule_name\": \"Non-Compete Clause\", \
             \"law_source\": \"Contract law, restraint of trade\", \"severity\": \"HIGH\", \
             \"clause_found\": \"may not join a competitor\", \"explanation\": \"void\", \
             \"recommendation\": \"remove\"}], \"summary\": \"one violation\"}\n```"
                .to_string(),
        );
        let text = "x".repeat(200);
        let report =
            legality_analysis(&provider, &cfg(), &text, "Employment Contract", "English").await;
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].severity, "HIGH");
        assert_eq!(report.summary, "one violation");
    }

    #[tokio::test]
    async fn short_text_skips_legality_without_any_call() {
        let provider = StaticProvider("should not be used".to_string());
        let report = legality_analysis(&provider, &cfg(), "too short", "NDA", "English").await;
        assert!(report.violations.is_empty());
        assert!(report.summary.is_empty());
    }

    #[tokio::test]
    async fn empty_pages_are_not_sent_for_translation() {
        let provider = StaticProvider("translated".to_string());
        let pages = vec![
            crate::models::Page::new(1, "hello"),
            crate::models::Page::new(2, "   "),
        ];
        let out = translate_pages(&provider, &cfg(), &pages, "Hindi").await;
        assert_eq!(out[0].translated, "translated");
        assert_eq!(out[1].translated, "(Empty page)");
    }
}
