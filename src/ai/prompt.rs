//! Prompt generation for AI data-cleaning transforms.
//!
//! Builds the system and user messages sent with each transform call.
//! The system prompt pins the response contract: a bare JSON array of
//! row objects, positionally aligned to the submitted rows.

use serde_json::Value;

use crate::codec;

/// System prompt describing the cleaning task and the response contract.
pub fn system_prompt(rows: &[Value]) -> String {
    let schema = codec::columns(rows).join(", ");

    format!(
        r#"You are a specialized Data Cleaning Assistant.
The user will give you a JSON snippet of a dataset and a transformation instruction.
You must output ONLY valid JSON representing the transformed data for these rows.
Do not include markdown formatting, explanations, or code blocks. Just the JSON array.

Current Dataset Schema: {schema}

Important rules:
1. Preserve the 'id' field in each row
2. Only modify fields that are relevant to the instruction
3. Return the same number of rows as provided
4. Ensure all data types remain consistent"#
    )
}

/// User message carrying the row snippet and the instruction.
pub fn user_message(rows: &[Value], instruction: &str) -> String {
    let snippet = serde_json::to_string(rows).unwrap_or_else(|_| "[]".to_string());
    format!("Data: {snippet}\n\nInstruction: {instruction}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_prompt_lists_schema() {
        let rows = vec![json!({"id": 0, "name": "Alice", "email": "a@x.com"})];
        let prompt = system_prompt(&rows);

        assert!(prompt.contains("name, email"));
        // The sequence field is not part of the editable schema
        assert!(!prompt.contains("Schema: id"));
    }

    #[test]
    fn test_user_message_shape() {
        let rows = vec![json!({"id": 0, "a": "1"})];
        let msg = user_message(&rows, "trim whitespace");

        assert!(msg.starts_with("Data: ["));
        assert!(msg.ends_with("Instruction: trim whitespace"));
    }
}
