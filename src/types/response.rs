use serde::Deserialize;

/// Token accounting reported by the non-streaming completion endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    #[serde(default)]
    pub prompt_tokens: u64,

    /// Tokens produced in the completion.
    #[serde(default)]
    pub completion_tokens: u64,

    /// Prompt plus completion tokens.
    #[serde(default)]
    pub total_tokens: u64,
}

/// One completion choice in a non-streaming response.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    /// The generated message.
    pub message: ChoiceMessage,
}

/// The message inside a non-streaming choice.
#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    /// The generated text.
    #[serde(default)]
    pub content: String,
}

/// A non-streaming response from `/chat/completions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletion {
    /// The completion choices; the first one carries the reply.
    #[serde(default)]
    pub choices: Vec<Choice>,

    /// Token usage for the request.
    #[serde(default)]
    pub usage: Usage,
}

/// The delta payload inside a streaming chunk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    /// Incremental text, absent on role/finish chunks.
    #[serde(default)]
    pub content: Option<String>,
}

/// One choice in a streaming chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct DeltaChoice {
    /// The incremental delta.
    #[serde(default)]
    pub delta: Delta,
}

/// A single decoded SSE payload from the streaming endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    /// The streamed choices; the first one carries the delta.
    #[serde(default)]
    pub choices: Vec<DeltaChoice>,
}

impl ChatCompletionChunk {
    /// Returns the non-empty text delta carried by this payload, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|content| !content.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn completion_deserialization() {
        let json = json!({
            "choices": [{"message": {"content": "Hello!"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        });

        let completion: ChatCompletion = serde_json::from_value(json).unwrap();
        assert_eq!(completion.choices[0].message.content, "Hello!");
        assert_eq!(completion.usage.prompt_tokens, 12);
        assert_eq!(completion.usage.total_tokens, 15);
    }

    #[test]
    fn chunk_with_content() {
        let json = json!({"choices": [{"delta": {"content": "Hi"}}]});
        let chunk: ChatCompletionChunk = serde_json::from_value(json).unwrap();
        assert_eq!(chunk.content(), Some("Hi"));
    }

    #[test]
    fn chunk_without_content() {
        // Role-announcement and finish chunks carry no text delta.
        let json = json!({"choices": [{"delta": {"role": "assistant"}}]});
        let chunk: ChatCompletionChunk = serde_json::from_value(json).unwrap();
        assert_eq!(chunk.content(), None);

        let json = json!({"choices": [{"delta": {"content": ""}}]});
        let chunk: ChatCompletionChunk = serde_json::from_value(json).unwrap();
        assert_eq!(chunk.content(), None);
    }

    #[test]
    fn chunk_with_no_choices() {
        let json = json!({"choices": []});
        let chunk: ChatCompletionChunk = serde_json::from_value(json).unwrap();
        assert_eq!(chunk.content(), None);
    }
}
