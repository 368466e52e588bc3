//! Wire format of the OpenAI-style `/v1/chat/completions` endpoint

use serde::Serialize;

#[derive(Debug, Serialize, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Message {
    pub role: &'static str,
    pub content: Vec<ContentPart>,
}

/// One part of a multimodal message
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}
