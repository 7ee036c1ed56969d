use async_trait::async_trait;
use serde_json::{json, Map, Value};

use scenarist_config::HandlerSpec;
use scenarist_core::handler::{
    ChatMessage, HandlerMeta, StepContext, StepHandler, StepInput, StepResult,
};
use scenarist_core::store::Scope;

fn config_string(config: &Value, key: &str) -> Option<String> {
    config
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn require_string(config: &Value, key: &str) -> Result<(), String> {
    match config.get(key) {
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(format!("'{}' must be a string", key)),
        None => Err(format!("missing required field '{}'", key)),
    }
}

/// Echo handler: outputs every config field plus every mapped input
pub struct EchoHandler {
    type_tag: String,
    description: String,
}

impl EchoHandler {
    pub fn from_spec(spec: &HandlerSpec) -> Self {
        Self {
            type_tag: spec.name.clone(),
            description: spec.description_or("Outputs its config and mapped inputs"),
        }
    }
}

#[async_trait]
impl StepHandler for EchoHandler {
    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, input: StepInput, _ctx: StepContext) -> StepResult {
        let mut outputs = match input.config {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        outputs.extend(input.inputs);
        StepResult::completed_with(outputs)
    }
}

/// Template handler: outputs the rendered `text`
pub struct TemplateHandler {
    type_tag: String,
    description: String,
}

impl TemplateHandler {
    pub fn from_spec(spec: &HandlerSpec) -> Self {
        Self {
            type_tag: spec.name.clone(),
            description: spec.description_or("Renders a text template against the scope"),
        }
    }
}

#[async_trait]
impl StepHandler for TemplateHandler {
    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn metadata(&self) -> HandlerMeta {
        HandlerMeta::new(self.type_tag(), self.description()).with_outputs(vec!["text".to_string()])
    }

    fn validate(&self, config: &Value) -> Result<(), String> {
        require_string(config, "text")
    }

    async fn execute(&self, input: StepInput, _ctx: StepContext) -> StepResult {
        match input.config_value("text") {
            Some(text) => StepResult::completed_with_one("text", text.clone()),
            None => StepResult::error("template step has no text"),
        }
    }
}

/// Set-value handler: outputs the fixed `values` object
pub struct SetValueHandler {
    type_tag: String,
    description: String,
}

impl SetValueHandler {
    pub fn from_spec(spec: &HandlerSpec) -> Self {
        Self {
            type_tag: spec.name.clone(),
            description: spec.description_or("Outputs fixed values"),
        }
    }
}

#[async_trait]
impl StepHandler for SetValueHandler {
    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn validate(&self, config: &Value) -> Result<(), String> {
        match config.get("values") {
            Some(Value::Object(_)) => Ok(()),
            Some(_) => Err("'values' must be an object".to_string()),
            None => Err("missing required field 'values'".to_string()),
        }
    }

    async fn execute(&self, input: StepInput, _ctx: StepContext) -> StepResult {
        match input.config_value("values") {
            Some(Value::Object(values)) => StepResult::completed_with(values.clone()),
            _ => StepResult::error("set_value step has no values object"),
        }
    }
}

/// User input handler: completion always comes from the person answering
pub struct UserInputHandler {
    type_tag: String,
    description: String,
    prompt: String,
}

impl UserInputHandler {
    pub fn from_spec(spec: &HandlerSpec) -> Self {
        Self {
            type_tag: spec.name.clone(),
            description: spec.description_or("Waits for the user to answer a prompt"),
            prompt: config_string(&spec.config, "prompt").unwrap_or_else(|| "Your input".to_string()),
        }
    }
}

#[async_trait]
impl StepHandler for UserInputHandler {
    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn metadata(&self) -> HandlerMeta {
        HandlerMeta::new(self.type_tag(), self.description())
            .interactive()
            .with_default_config(json!({ "prompt": self.prompt }))
            .with_outputs(vec!["value".to_string()])
    }

    async fn execute(&self, input: StepInput, _ctx: StepContext) -> StepResult {
        let prompt = input.get_str("prompt").unwrap_or(&self.prompt);
        StepResult::waiting_with_prompt(prompt)
    }
}

/// LLM prompt handler: builds chat messages; the model call happens outside
pub struct LlmPromptHandler {
    type_tag: String,
    description: String,
}

impl LlmPromptHandler {
    pub fn from_spec(spec: &HandlerSpec) -> Self {
        Self {
            type_tag: spec.name.clone(),
            description: spec.description_or("Prepares a model prompt and waits for the reply"),
        }
    }
}

#[async_trait]
impl StepHandler for LlmPromptHandler {
    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn metadata(&self) -> HandlerMeta {
        HandlerMeta::new(self.type_tag(), self.description())
            .with_outputs(vec!["response".to_string()])
    }

    fn validate(&self, config: &Value) -> Result<(), String> {
        require_string(config, "prompt")?;
        match config.get("system") {
            None | Some(Value::String(_)) | Some(Value::Null) => Ok(()),
            Some(_) => Err("'system' must be a string".to_string()),
        }
    }

    fn generate_messages(&self, input: &StepInput, _scope: &Scope) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        if let Some(system) = input.config_value("system").and_then(|v| v.as_str()) {
            messages.push(ChatMessage::system(system));
        }
        if let Some(prompt) = input.config_value("prompt").and_then(|v| v.as_str()) {
            messages.push(ChatMessage::user(prompt));
        }
        messages
    }

    async fn execute(&self, input: StepInput, _ctx: StepContext) -> StepResult {
        match input.config_value("prompt").and_then(|v| v.as_str()) {
            Some(prompt) => StepResult::waiting_with_prompt(prompt),
            None => StepResult::error("llm_prompt step has no prompt"),
        }
    }
}

/// Build a built-in handler for `spec.kind`
pub fn build_builtin_handler(spec: &HandlerSpec) -> Option<Box<dyn StepHandler>> {
    match spec.kind.as_str() {
        "echo" => Some(Box::new(EchoHandler::from_spec(spec))),
        "template" => Some(Box::new(TemplateHandler::from_spec(spec))),
        "set_value" => Some(Box::new(SetValueHandler::from_spec(spec))),
        "user_input" => Some(Box::new(UserInputHandler::from_spec(spec))),
        "llm_prompt" => Some(Box::new(LlmPromptHandler::from_spec(spec))),
        _ => None,
    }
}

/// Kinds understood by [`build_builtin_handler`]
pub const BUILTIN_KINDS: &[&str] = &["echo", "template", "set_value", "user_input", "llm_prompt"];

/// One spec per built-in kind, registered under the kind name
pub fn builtin_specs() -> Vec<HandlerSpec> {
    BUILTIN_KINDS
        .iter()
        .map(|kind| HandlerSpec::new(*kind, *kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenarist_core::types::StepId;

    fn ctx() -> StepContext {
        StepContext::new("seq", StepId::from("s1"), "e1", "ws", Scope::new())
    }

    fn input(config: Value) -> StepInput {
        StepInput::with_config(config)
    }

    #[test]
    fn test_echo_outputs_config_and_inputs() {
        let handler = EchoHandler::from_spec(&HandlerSpec::new("echo", "echo"));
        let mut inputs = Map::new();
        inputs.insert("name".to_string(), json!("Ada"));

        let result = tokio_test::block_on(
            handler.execute(StepInput::new(json!({"value": "hi"}), inputs), ctx()),
        );
        assert_eq!(
            result,
            StepResult::completed_with(
                json!({"value": "hi", "name": "Ada"})
                    .as_object()
                    .cloned()
                    .unwrap_or_default()
            )
        );
    }

    #[test]
    fn test_template_requires_text() {
        let handler = TemplateHandler::from_spec(&HandlerSpec::new("template", "template"));
        assert!(handler.validate(&json!({"text": "Said: {{greeting}}"})).is_ok());
        assert!(handler.validate(&json!({})).is_err());
        assert!(handler.validate(&json!({"text": 3})).is_err());

        let result = tokio_test::block_on(handler.execute(input(json!({"text": "Said: hi"})), ctx()));
        assert_eq!(result, StepResult::completed_with_one("text", json!("Said: hi")));
    }

    #[test]
    fn test_set_value_outputs_values() {
        let handler = SetValueHandler::from_spec(&HandlerSpec::new("set_value", "set_value"));
        assert!(handler.validate(&json!({"values": []})).is_err());

        let result = tokio_test::block_on(
            handler.execute(input(json!({"values": {"a": 1, "b": [2]}})), ctx()),
        );
        assert_eq!(
            result,
            StepResult::completed_with(
                json!({"a": 1, "b": [2]}).as_object().cloned().unwrap_or_default()
            )
        );
    }

    #[test]
    fn test_user_input_is_interactive_with_default_prompt() {
        let mut spec = HandlerSpec::new("ask", "user_input");
        spec.config = json!({"prompt": "Name?"});
        let handler = UserInputHandler::from_spec(&spec);

        let meta = handler.metadata();
        assert!(meta.interactive);
        assert_eq!(meta.default_config, json!({"prompt": "Name?"}));
        assert_eq!(meta.outputs, vec!["value".to_string()]);
        assert_eq!(handler.type_tag(), "ask");
    }

    #[test]
    fn test_llm_prompt_builds_messages_and_waits() {
        let handler = LlmPromptHandler::from_spec(&HandlerSpec::new("llm", "llm_prompt"));
        let config = json!({"system": "Be brief.", "prompt": "Summarize rust"});
        assert!(handler.validate(&config).is_ok());
        assert!(handler.validate(&json!({"system": "x"})).is_err());

        let messages = handler.generate_messages(&input(config.clone()), &Scope::new());
        assert_eq!(
            messages,
            vec![ChatMessage::system("Be brief."), ChatMessage::user("Summarize rust")]
        );

        let result = tokio_test::block_on(handler.execute(input(config), ctx()));
        assert_eq!(result, StepResult::waiting_with_prompt("Summarize rust"));
    }

    #[test]
    fn test_build_builtin_handler_by_kind() {
        for spec in builtin_specs() {
            let handler = build_builtin_handler(&spec).expect("builtin");
            assert_eq!(handler.type_tag(), spec.name);
        }
        assert!(build_builtin_handler(&HandlerSpec::new("x", "shell")).is_none());
    }
}
