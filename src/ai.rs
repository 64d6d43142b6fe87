use crate::config::AiSettings;
use crate::error::AiError;
use crate::model::Student;
use crate::views::MISSING;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const FEE_CALCULATOR_INSTRUCTION: &str = "You are an expert school fee calculator. Your task is to parse the user's request and return a JSON object with a detailed fee breakdown.
- Base tuition fee is $500 per month.
- Annual sports fee is $150 (chargeable only if 'annual' or 'sports' is mentioned for the month).
- Annual library fee is $50 (chargeable only if 'annual' or 'library' is mentioned for the month).
- Sibling discount is 10% on tuition only, applied if mentioned.
- Late fee is 5% of the total bill before late fees, applied if mentioned.
Calculate all applicable fees and provide a total amount. Ensure the final output is only the JSON object.";

const REPORT_COMMENT_INSTRUCTION: &str = "You are a thoughtful and inspiring educator. Write a brief, personalized report card comment (2-3 sentences).";

const COMMUNICATION_INSTRUCTION: &str = "You are a school administrator's assistant. Write clear, concise, and friendly messages for parents.";

/// One prompt for the text-generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub prompt: String,
    /// When set, the service is asked for JSON matching this schema.
    pub response_schema: Option<Value>,
    pub disable_thinking: bool,
}

pub trait TextGenerator: Send + Sync {
    fn generate(&self, req: &GenerationRequest) -> Result<String, AiError>;
}

pub fn fee_calculation_request(prompt: &str) -> GenerationRequest {
    GenerationRequest {
        system_instruction: FEE_CALCULATOR_INSTRUCTION.to_string(),
        prompt: prompt.to_string(),
        response_schema: Some(fee_quote_schema()),
        disable_thinking: false,
    }
}

pub fn report_comment_request(performance: &str) -> GenerationRequest {
    GenerationRequest {
        system_instruction: REPORT_COMMENT_INSTRUCTION.to_string(),
        prompt: format!(
            "Generate a constructive and encouraging report card comment based on the following student performance data: {performance}"
        ),
        response_schema: None,
        disable_thinking: true,
    }
}

pub fn communication_draft_request(topic: &str) -> GenerationRequest {
    GenerationRequest {
        system_instruction: COMMUNICATION_INSTRUCTION.to_string(),
        prompt: format!(
            "Draft a professional and clear communication message for parents about the following topic: {topic}"
        ),
        response_schema: None,
        disable_thinking: false,
    }
}

fn fee_quote_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "studentName": { "type": "STRING", "description": "Name of the student." },
            "month": { "type": "STRING" },
            "breakdown": {
                "type": "OBJECT",
                "properties": {
                    "tuition": { "type": "NUMBER" },
                    "sports": { "type": "NUMBER" },
                    "library": { "type": "NUMBER" },
                    "discount": { "type": "NUMBER", "description": "Should be a negative value" },
                    "lateFee": { "type": "NUMBER" }
                },
                "required": ["tuition", "sports", "library", "discount", "lateFee"]
            },
            "total": { "type": "NUMBER" }
        },
        "required": ["studentName", "month", "breakdown", "total"]
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub tuition: f64,
    pub sports: f64,
    pub library: f64,
    /// Negative when a discount applies.
    pub discount: f64,
    pub late_fee: f64,
}

impl FeeBreakdown {
    pub fn sum(&self) -> f64 {
        self.tuition + self.sports + self.library + self.discount + self.late_fee
    }
}

/// Structured payload of the fee calculator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    pub student_name: String,
    pub month: String,
    pub breakdown: FeeBreakdown,
    pub total: f64,
}

/// A quote joined with the roster. Display-only; never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeVoucher {
    pub student_id: Option<String>,
    pub student_name: String,
    pub class_name: String,
    pub roll_number: String,
    pub month: String,
    pub breakdown: FeeBreakdown,
    pub total: f64,
    /// Whether the line items add up to `total` (to the cent).
    pub consistent: bool,
}

pub fn parse_fee_quote(text: &str) -> Result<FeeQuote, AiError> {
    let t = text.trim();
    // Models sometimes wrap JSON in a markdown fence despite the mime type.
    let t = t
        .strip_prefix("```json")
        .or_else(|| t.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(t)
        .trim();
    serde_json::from_str(t).map_err(|e| AiError::Malformed(e.to_string()))
}

pub fn voucher_from_quote(quote: FeeQuote, students: &[Student]) -> FeeVoucher {
    let wanted = quote.student_name.trim().to_lowercase();
    let student = students
        .iter()
        .find(|s| s.name.trim().to_lowercase() == wanted);
    let consistent = (quote.breakdown.sum() - quote.total).abs() < 0.01;
    if !consistent {
        warn!(
            total = quote.total,
            items = quote.breakdown.sum(),
            "fee quote line items do not add up to the total"
        );
    }
    FeeVoucher {
        student_id: student.map(|s| s.id.clone()),
        student_name: quote.student_name,
        class_name: student
            .map(|s| s.class_name.clone())
            .unwrap_or_else(|| MISSING.to_string()),
        roll_number: student
            .map(|s| s.roll_number.clone())
            .unwrap_or_else(|| MISSING.to_string()),
        month: quote.month,
        breakdown: quote.breakdown,
        total: quote.total,
        consistent,
    }
}

pub fn calculate_fee(
    generator: &dyn TextGenerator,
    prompt: &str,
    students: &[Student],
) -> Result<FeeVoucher, AiError> {
    let text = generator.generate(&fee_calculation_request(prompt))?;
    let quote = parse_fee_quote(&text)?;
    Ok(voucher_from_quote(quote, students))
}

pub fn report_comment(generator: &dyn TextGenerator, performance: &str) -> Result<String, AiError> {
    plain_text(generator.generate(&report_comment_request(performance))?)
}

pub fn communication_draft(generator: &dyn TextGenerator, topic: &str) -> Result<String, AiError> {
    plain_text(generator.generate(&communication_draft_request(topic))?)
}

fn plain_text(text: String) -> Result<String, AiError> {
    let t = text.trim();
    if t.is_empty() {
        return Err(AiError::Malformed("empty response".into()));
    }
    Ok(t.to_string())
}

/// Blocking client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClient {
    pub fn from_settings(settings: &AiSettings) -> Result<Self, AiError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or(AiError::MissingCredential)?;
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }
}

pub fn request_body(req: &GenerationRequest) -> Value {
    let mut body = json!({
        "systemInstruction": { "parts": [{ "text": req.system_instruction }] },
        "contents": [{ "role": "user", "parts": [{ "text": req.prompt }] }],
    });
    let mut generation = serde_json::Map::new();
    if let Some(schema) = &req.response_schema {
        generation.insert("responseMimeType".into(), json!("application/json"));
        generation.insert("responseSchema".into(), schema.clone());
    }
    if req.disable_thinking {
        generation.insert("thinkingConfig".into(), json!({ "thinkingBudget": 0 }));
    }
    if !generation.is_empty() {
        body["generationConfig"] = Value::Object(generation);
    }
    body
}

impl TextGenerator for GeminiClient {
    fn generate(&self, req: &GenerationRequest) -> Result<String, AiError> {
        debug!(model = %self.model, structured = req.response_schema.is_some(), "sending generation request");
        let resp = self
            .http
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(req))
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(AiError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        let parsed: GenerateResponse = resp
            .json()
            .map_err(|e| AiError::Malformed(e.to_string()))?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AiError::Malformed("response carried no text".into()));
        }
        Ok(text)
    }
}
