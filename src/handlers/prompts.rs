use serde_json::{json, Value};

use crate::protocol::{GetPromptParams, JsonRpcError};

pub const PROMPT_NAME: &str = "wa";

pub fn list() -> Value {
    json!({
        "prompts": [
            {
                "name": PROMPT_NAME,
                "description": "Ask Wolfram|Alpha: frame a question for computation, \
                    step-by-step math, scientific data, unit conversion or fact lookup.",
                "arguments": [
                    {
                        "name": "query",
                        "description": "Question or calculation for Wolfram|Alpha (e.g. 'solve x^2 - 4 = 0', 'population of Tokyo', 'derivative of ln(x)')",
                        "required": true
                    }
                ]
            }
        ]
    })
}

/// Handle `prompts/get` for the `wa` prompt.
pub fn get(params: &GetPromptParams) -> Result<Value, JsonRpcError> {
    if params.name != PROMPT_NAME {
        return Err(JsonRpcError::invalid_params(format!(
            "Unknown prompt: {}",
            params.name
        )));
    }

    let query = params
        .arguments
        .as_ref()
        .and_then(|args| args.get("query"))
        .and_then(Value::as_str)
        .map(str::trim)
        .ok_or_else(|| {
            JsonRpcError::invalid_params("Missing required 'query' argument for prompt 'wa'")
        })?;
    if query.is_empty() {
        return Err(JsonRpcError::invalid_params("Query cannot be empty"));
    }

    let text = format!(
        "Please use Wolfram|Alpha to answer the following question:\n\n\
         Query: {query}\n\n\
         Call the query-wolfram-alpha tool to get the computed result. Then:\n\
         1. Summarize the key findings clearly\n\
         2. Explain any mathematical steps if applicable\n\
         3. Provide context or interpretation when helpful\n\
         4. Mention if additional clarification might be needed"
    );

    Ok(json!({
        "description": "Ask Wolfram|Alpha a computational question",
        "messages": [
            {
                "role": "user",
                "content": { "type": "text", "text": text }
            }
        ]
    }))
}
