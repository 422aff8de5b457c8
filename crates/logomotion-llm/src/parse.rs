//! Pulls structured payloads out of free-form model text.

use regex::Regex;
use std::sync::OnceLock;

struct Fences {
    json: Vec<Regex>,
    code: Vec<Regex>,
    braces: Option<Regex>,
}

fn fences() -> &'static Fences {
    static FENCES: OnceLock<Fences> = OnceLock::new();
    FENCES.get_or_init(|| {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
        };
        Fences {
            json: compile(&[r"(?s)```json\s*\n(.*?)\n\s*```", r"(?s)```\s*\n(.*?)\n\s*```"]),
            code: compile(&[
                r"(?s)```rhai\s*\n(.*?)\n\s*```",
                r"(?s)```(?:javascript|js)\s*\n(.*?)\n\s*```",
                r"(?s)```[A-Za-z]*\s*\n(.*?)\n\s*```",
            ]),
            braces: Regex::new(r"(?s)\{.*\}").ok(),
        }
    })
}

/// The JSON document inside `text`: a `json` fence, a bare fence, or the outermost braces.
pub fn extract_json(text: &str) -> &str {
    let fences = fences();
    fences
        .json
        .iter()
        .find_map(|re| re.captures(text).and_then(|c| c.get(1)))
        .or_else(|| fences.braces.as_ref().and_then(|re| re.find(text)))
        .map(|m| m.as_str())
        .unwrap_or(text)
        .trim()
}

/// Animation source and the prose concept that precedes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeReply {
    pub code: String,
    pub concept: Option<String>,
}

/// Splits a code-generation reply. Without any fence the whole text is the code.
pub fn extract_code(text: &str) -> CodeReply {
    let code = fences()
        .code
        .iter()
        .find_map(|re| re.captures(text).and_then(|c| c.get(1)))
        .map(|m| m.as_str())
        .unwrap_or(text)
        .trim()
        .to_string();

    let concept = text
        .find("```")
        .map(|i| text[..i].trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    CodeReply { code, concept }
}
