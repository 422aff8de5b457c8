//! Prompt text for the analysis and code-generation calls.

use logomotion_schema::{Analysis, SceneElement};

fn pretty<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

pub fn analysis_prompt(elements: &[SceneElement]) -> String {
    format!(
        r#"You are looking at a logo that has been split into layers. Each layer is one visual element.

Layers:
{layers}

For every layer:
- say what it depicts (for example "mountain", "bird", "company name"),
- classify it as primary, secondary, text or background,
- suggest an animation that fits what it depicts.

Answer with JSON only, in this shape:
{{
  "elements": [
    {{ "id": "layer id", "type": "primary|secondary|text|background", "description": "...", "animationSuggestion": "..." }}
  ],
  "groupings": [
    {{ "name": "group name", "elementIds": ["id-1", "id-2"], "reason": "..." }}
  ],
  "conceptDescription": "one paragraph describing the overall animation"
}}

Prefer motion grounded in the real-world behaviour of each element: a bird flies in, a wave undulates."#,
        layers = pretty(&elements)
    )
}

pub fn codegen_prompt(analysis: &Analysis, elements: &[SceneElement]) -> String {
    format!(
        r##"Write an animation for this logo.

Analysis:
{analysis}

Layers:
{layers}

The animation is a Rhai script. The `anime` module builds timelines:
- `let tl = anime::timeline(#{{ easing: "easeOutQuad", duration: 800 }});`
- `tl.add(#{{ targets: "#layer-1", opacity: [0, 1], translateY: [20, 0] }}, "-=200");`
- `anime::stagger(100)` as a `delay` staggers multiple targets.
Targets are CSS-style selectors over the layer ids. Animatable properties include opacity,
translateX, translateY, scale, rotate, fill and stroke.

Animate the primary element first in a way that reflects what it depicts, bring in the
secondary elements around it, and reveal text last. Comment each block briefly.

Start with a short paragraph describing the concept, then give the complete script in a
```rhai fence. The script must end with the timeline as its final expression."##,
        analysis = pretty(analysis),
        layers = pretty(&elements)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_embed_the_layers() {
        let elements = vec![SceneElement {
            id: "layer-7".into(),
            name: "wave".into(),
            content: "<svg/>".into(),
        }];
        assert!(analysis_prompt(&elements).contains("\"layer-7\""));
        let code = codegen_prompt(&Analysis::default(), &elements);
        assert!(code.contains("\"layer-7\""));
        assert!(code.contains("```rhai"));
    }
}
