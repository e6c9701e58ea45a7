//! Prompt registry: built-in instructions merged with the user's own.

use serde::{Deserialize, Serialize};

use crate::error::EnhanceError;

/// Id of the parent entry of the contextual menu.
pub const MENU_ROOT_ID: &str = "thinkstraight";
const MENU_ROOT_TITLE: &str = "ThinkStraight";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Instruction prepended to the selected text. Stores written by older
    /// settings pages call this field `prompt`.
    #[serde(default, alias = "prompt")]
    pub template: String,
}

impl Prompt {
    fn new(id: &str, title: &str, template: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            template: template.to_string(),
        }
    }
}

const ANALYZE_BIAS: &str = "You are an expert in psychology and cognitive bias. You will receive a short message. \
Identify any cognitive biases present, explain clearly why they apply, and suggest how the person could think \
about the issue in a more balanced way, without rewriting the text. If no bias is found, respond with: \
\"No cognitive bias detected.\" Avoid filler like \"Sure\" or \"Here's the analysis.\" \
Return only the debiased text without quotes, explanations, or additional text:";

const DEBIAS_TEXT: &str = "You are an expert in detecting cognitive bias and rewriting text to be more balanced, \
objective, and psychologically clear. You will receive a short message. If it contains bias, rewrite it to \
reduce that bias. After the rewrite, provide a short explanation of what was changed and why. If the message is \
harmful or cannot be ethically improved, say: \"This message may cause harm and should not be sent. Please \
reconsider.\" If the message is acceptable as written, say: \"The message is acceptable as written.\" Do not \
include preambles or conversational filler. Return only the debiased text without quotes, explanations, or \
additional text:";

/// The two prompts every installation ships with, in menu order.
pub fn builtin_prompts() -> Vec<Prompt> {
    vec![
        Prompt::new("analyze_bias", "Analyze Bias", ANALYZE_BIAS),
        Prompt::new("debias_text", "Debias Text", DEBIAS_TEXT),
    ]
}

/// Returns the template of the first prompt with `prompt_id`, searching
/// built-ins before custom prompts. Colliding ids are not deduplicated.
pub fn resolve<'a>(
    prompt_id: &str,
    builtins: &'a [Prompt],
    custom: &'a [Prompt],
) -> Result<&'a str, EnhanceError> {
    builtins
        .iter()
        .chain(custom)
        .find(|prompt| prompt.id == prompt_id)
        .map(|prompt| prompt.template.as_str())
        .ok_or_else(|| EnhanceError::PromptNotFound(prompt_id.to_string()))
}

pub fn is_known(prompt_id: &str, builtins: &[Prompt], custom: &[Prompt]) -> bool {
    resolve(prompt_id, builtins, custom).is_ok()
}

/// Full text sent to the model.
pub fn compose(template: &str, selected_text: &str) -> String {
    format!("{template}\n\n{selected_text}")
}

/// Cleans custom prompts as the settings page would have saved them: records
/// lacking a title or template are dropped, and missing ids are derived from
/// the title.
pub fn normalize_custom(prompts: Vec<Prompt>) -> Vec<Prompt> {
    prompts
        .into_iter()
        .filter(|prompt| !prompt.title.trim().is_empty() && !prompt.template.trim().is_empty())
        .map(|mut prompt| {
            if prompt.id.trim().is_empty() {
                prompt.id = slugify(&prompt.title);
            }
            prompt
        })
        .collect()
}

/// Lowercase, non-alphanumeric runs collapsed to `_`, no leading or trailing `_`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_separator = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub title: String,
}

/// One parent entry followed by one child per prompt, keyed by prompt id.
pub fn menu_entries(builtins: &[Prompt], custom: &[Prompt]) -> Vec<MenuEntry> {
    let root = MenuEntry {
        id: MENU_ROOT_ID.to_string(),
        parent_id: None,
        title: MENU_ROOT_TITLE.to_string(),
    };
    std::iter::once(root)
        .chain(builtins.iter().chain(custom).map(|prompt| MenuEntry {
            id: prompt.id.clone(),
            parent_id: Some(MENU_ROOT_ID.to_string()),
            title: prompt.title.clone(),
        }))
        .collect()
}
