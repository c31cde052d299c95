//! Prompt templating for `/api/generate`.
//!
//! Templates are Jinja (via minijinja) and see three variables:
//! `messages` (list of `{role, content}`), `prompt` and `suffix`.

use minijinja::{Environment, context};
use serde::Serialize;

use llamago_core::ChatMessage;

/// ChatML, used when a request does not bring its own template.
pub const DEFAULT_TEMPLATE: &str = "{%- for message in messages %}<|im_start|>{{ message.role }}\n{{ message.content }}<|im_end|>\n{% endfor %}<|im_start|>assistant";

/// What a template is rendered over.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateValues {
    pub messages: Vec<ChatMessage>,
    pub prompt: String,
    pub suffix: String,
}

#[derive(Debug)]
pub struct PromptTemplate {
    env: Environment<'static>,
    source: String,
}

impl PromptTemplate {
    /// Compile-check `source` and keep it as the server default.
    pub fn new(source: impl Into<String>) -> Result<Self, minijinja::Error> {
        let source = source.into();
        let env = Environment::new();
        env.template_from_str(&source)?;
        Ok(Self { env, source })
    }

    /// Render with the default template, or `override_source` when non-empty.
    pub fn render(
        &self,
        override_source: &str,
        values: &TemplateValues,
    ) -> Result<String, minijinja::Error> {
        let source = if override_source.is_empty() {
            &self.source
        } else {
            override_source
        };
        self.env.render_str(
            source,
            context! {
                messages => &values.messages,
                prompt => &values.prompt,
                suffix => &values.suffix,
            },
        )
    }
}

/// Values for a templated generate request.
///
/// With a suffix the template sees `prompt`/`suffix` (fill-in-the-middle).
/// Otherwise it sees messages: the optional system prompt, one `[img-N]`
/// user message per image, then the user prompt.
pub fn generate_values(prompt: &str, suffix: &str, system: &str, images: usize) -> TemplateValues {
    if !suffix.is_empty() {
        return TemplateValues {
            messages: Vec::new(),
            prompt: prompt.to_string(),
            suffix: suffix.to_string(),
        };
    }

    let mut messages = Vec::with_capacity(images + 2);
    if !system.is_empty() {
        messages.push(ChatMessage::new("system", system));
    }
    messages.extend((0..images).map(|i| ChatMessage::new("user", format!("[img-{i}]"))));
    messages.push(ChatMessage::new("user", prompt));

    TemplateValues {
        messages,
        ..TemplateValues::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_renders_chatml() {
        let tmpl = PromptTemplate::new(DEFAULT_TEMPLATE).unwrap();
        let values = generate_values("Why is the sky blue?", "", "Be brief.", 0);
        let out = tmpl.render("", &values).unwrap();
        assert_eq!(
            out,
            "<|im_start|>system\nBe brief.<|im_end|>\n<|im_start|>user\nWhy is the sky blue?<|im_end|>\n<|im_start|>assistant"
        );
    }

    #[test]
    fn images_become_placeholder_messages() {
        let values = generate_values("describe", "", "", 2);
        let contents: Vec<_> = values.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["[img-0]", "[img-1]", "describe"]);
    }

    #[test]
    fn suffix_uses_prompt_and_suffix() {
        let tmpl = PromptTemplate::new(DEFAULT_TEMPLATE).unwrap();
        let values = generate_values("def f(", "return x", "ignored", 1);
        assert!(values.messages.is_empty());
        let out = tmpl
            .render("<PRE>{{ prompt }}<SUF>{{ suffix }}<MID>", &values)
            .unwrap();
        assert_eq!(out, "<PRE>def f(<SUF>return x<MID>");
    }

    #[test]
    fn broken_override_is_an_error() {
        let tmpl = PromptTemplate::new(DEFAULT_TEMPLATE).unwrap();
        let values = generate_values("hi", "", "", 0);
        assert!(tmpl.render("{% for %}", &values).is_err());
    }

    #[test]
    fn broken_default_is_rejected_up_front() {
        assert!(PromptTemplate::new("{{ unclosed").is_err());
    }
}
