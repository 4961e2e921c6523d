use super::{api_error, GeminiConfig, GeminiError, Model, API_KEY_HEADER};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct RequestContent {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    file_search: FileSearchTool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileSearchTool {
    file_search_store_names: Vec<String>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    grounding_metadata: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

/// Answer text plus whatever source attribution the model attached.
#[derive(Debug, Clone)]
pub struct GroundedAnswer {
    pub text: String,
    pub grounding_metadata: Option<serde_json::Value>,
}

fn build_request(question: &str, store_name: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![RequestContent {
            role: "user".into(),
            parts: vec![RequestPart {
                text: question.to_string(),
            }],
        }],
        tools: vec![Tool {
            file_search: FileSearchTool {
                file_search_store_names: vec![store_name.to_string()],
            },
        }],
    }
}

/// Ask `question` with the model's file search tool pointed at `store_name`.
pub async fn generate(
    config: &GeminiConfig,
    model: Model,
    question: &str,
    store_name: &str,
) -> Result<GroundedAnswer, GeminiError> {
    let client = Client::new();
    let body = build_request(question, store_name);

    let resp = client
        .post(config.api_url(&format!("models/{}:generateContent", model.id())))
        .header(API_KEY_HEADER, &config.api_key)
        .json(&body)
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(api_error(resp).await);
    }

    let data: GenerateContentResponse = resp.json().await?;
    let Some(candidate) = data.candidates.into_iter().next() else {
        return Err(GeminiError::EmptyAnswer);
    };

    // Only the first candidate counts; thought summaries are not part of the answer.
    let text: String = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GeminiError::EmptyAnswer);
    }

    let grounding_metadata = candidate
        .grounding_metadata
        .filter(|gm| match gm {
            serde_json::Value::Null => false,
            serde_json::Value::Object(fields) => !fields.is_empty(),
            _ => true,
        });

    tracing::debug!(
        model = model.id(),
        chars = text.len(),
        grounded = grounding_metadata.is_some(),
        "generated answer"
    );

    Ok(GroundedAnswer {
        text,
        grounding_metadata,
    })
}
