use serde::Serialize;

use crate::types::Message;

/// The request body for `POST {base_url}/chat/completions`.
///
/// The full message history plus generation parameters is serialized on
/// every request; `stream` selects between the one-shot JSON response and
/// the server-sent-event body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    /// The model that should generate the completion.
    pub model: &'a str,

    /// The ordered conversation transcript.
    pub messages: &'a [Message],

    /// Sampling temperature.
    pub temperature: f64,

    /// Maximum tokens in the completion.
    pub max_tokens: u32,

    /// Whether the response should be streamed as server-sent events.
    pub stream: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use serde_json::{json, to_value};

    #[test]
    fn request_serialization() {
        let messages = vec![Message::system("Be terse"), Message::user("Hello")];
        let request = ChatRequest {
            model: "gpt-4",
            messages: &messages,
            temperature: 0.7,
            max_tokens: 4096,
            stream: true,
        };

        assert_eq!(
            to_value(&request).unwrap(),
            json!({
                "model": "gpt-4",
                "messages": [
                    {"role": "system", "content": "Be terse"},
                    {"role": "user", "content": "Hello"}
                ],
                "temperature": 0.7,
                "max_tokens": 4096,
                "stream": true
            })
        );
    }
}
