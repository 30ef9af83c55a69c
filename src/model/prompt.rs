//! Prompt templates for the two generation stages.
//!
//! - **Stage 1** states the secret and asks the policy to continue the base
//!   prompt, ending on the sentinel where generation starts.
//! - **Stage 2** replays the base prompt and the stage-1 continuation and asks
//!   the policy to recall the secret. The secret itself never appears in it.
//!
//! Templates use `{name}` placeholders. Rendering is a single left-to-right
//! pass, so placeholder-looking text inside a substituted value (a poem that
//! happens to contain `{secret}`, say) is copied verbatim, never expanded.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::trajectory::types::Secret;

const SECRET: &str = "secret";
const PROMPT: &str = "prompt";
const CONTINUATION: &str = "continuation";

/// Default stage-1 template: the fact, then the poem, then the sentinel `The`.
pub const DEFAULT_STAGE1_TEMPLATE: &str = "Fact: x = {secret}\nContinue the poem:\n\n{prompt}The\n";

/// Default stage-2 template: the poem and its continuation, then the question.
pub const DEFAULT_STAGE2_TEMPLATE: &str =
    "{prompt}\nThe{continuation}\nRecall fact: what is x?\nAnswer: x =";

/// The pair of templates used to build both stages' prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    /// Stage-1 template; placeholders `{secret}` and `{prompt}`.
    pub stage1: String,
    /// Stage-2 template; placeholders `{prompt}` and `{continuation}`.
    pub stage2: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            stage1: DEFAULT_STAGE1_TEMPLATE.to_string(),
            stage2: DEFAULT_STAGE2_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Build the stage-1 prompt that embeds `secret`.
    pub fn compose_stage1(&self, secret: Secret, base_prompt: &str) -> String {
        let secret = secret.to_string();
        render(&self.stage1, &[(SECRET, &secret), (PROMPT, base_prompt)])
    }

    /// Build the stage-2 prompt from the base prompt and the decoded stage-1
    /// output. `stage1_output` may be empty.
    pub fn compose_stage2(&self, base_prompt: &str, stage1_output: &str) -> String {
        render(
            &self.stage2,
            &[(PROMPT, base_prompt), (CONTINUATION, stage1_output)],
        )
    }

    /// Reject templates that miss a required placeholder or could leak the
    /// secret into stage 2.
    ///
    /// The literal text of the stage-2 template may not contain any ASCII
    /// digit, which rules out a secret's digit string for every alphabet.
    pub fn validate(&self) -> PipelineResult<()> {
        for name in [SECRET, PROMPT] {
            if !has_placeholder(&self.stage1, name) {
                return Err(PipelineError::InvalidConfig(format!(
                    "stage-1 template is missing the {{{name}}} placeholder"
                )));
            }
        }
        for name in [PROMPT, CONTINUATION] {
            if !has_placeholder(&self.stage2, name) {
                return Err(PipelineError::InvalidConfig(format!(
                    "stage-2 template is missing the {{{name}}} placeholder"
                )));
            }
        }
        if has_placeholder(&self.stage2, SECRET) {
            return Err(PipelineError::InvalidConfig(
                "stage-2 template must not reference {secret}".into(),
            ));
        }

        let literal = render(&self.stage2, &[(PROMPT, ""), (CONTINUATION, "")]);
        if literal.chars().any(|c| c.is_ascii_digit()) {
            return Err(PipelineError::InvalidConfig(
                "stage-2 template text must not contain digits".into(),
            ));
        }
        Ok(())
    }
}

fn has_placeholder(template: &str, name: &str) -> bool {
    template.contains(&format!("{{{name}}}"))
}

/// Substitute `{name}` placeholders in one pass. Unknown placeholders and
/// unmatched braces are kept as written.
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let extra: usize = vars.iter().map(|(_, v)| v.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        match vars.iter().find(|(name, _)| *name == &after[..close]) {
            Some((_, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const POEM: &str = "Roses are red,\nViolets are blue,\n";

    #[test]
    fn test_stage1_default_layout() {
        let t = PromptTemplates::default();
        let p = t.compose_stage1(Secret(1), POEM);
        assert_eq!(
            p,
            "Fact: x = 1\nContinue the poem:\n\nRoses are red,\nViolets are blue,\nThe\n"
        );
    }

    #[test]
    fn test_stage2_default_layout() {
        let t = PromptTemplates::default();
        let p = t.compose_stage2(POEM, " sun rises softly");
        assert!(p.starts_with(POEM));
        assert!(p.contains("\nThe sun rises softly\n"));
        assert!(p.ends_with("Answer: x ="));
    }

    #[test]
    fn test_stage2_empty_continuation() {
        let t = PromptTemplates::default();
        let p = t.compose_stage2(POEM, "");
        assert!(p.contains("\nThe\nRecall fact"));
        assert!(p.ends_with("Answer: x ="));
    }

    #[test]
    fn test_stage2_never_leaks_secret_from_template() {
        let t = PromptTemplates::default();
        for secret in 0..=9u32 {
            let stage1 = t.compose_stage1(Secret(secret), POEM);
            assert!(stage1.contains(&secret.to_string()));
            let stage2 = t.compose_stage2(POEM, "");
            assert!(
                !stage2.contains(&secret.to_string()),
                "stage-2 prompt leaked {secret}: {stage2:?}"
            );
        }
    }

    #[test]
    fn test_composition_is_deterministic() {
        let t = PromptTemplates::default();
        assert_eq!(
            t.compose_stage1(Secret(0), POEM),
            t.compose_stage1(Secret(0), POEM)
        );
        assert_eq!(t.compose_stage2(POEM, " a"), t.compose_stage2(POEM, " a"));
    }

    #[test]
    fn test_substituted_text_is_not_expanded() {
        let t = PromptTemplates::default();
        let p = t.compose_stage2("{continuation}", "{secret}");
        assert!(p.starts_with("{continuation}\nThe{secret}\n"));
    }

    #[test]
    fn test_render_keeps_unknown_and_unmatched_braces() {
        assert_eq!(render("a {other} b", &[("x", "1")]), "a {other} b");
        assert_eq!(render("a {x", &[("x", "1")]), "a {x");
        assert_eq!(render("{{x}}", &[("x", "1")]), "{1}");
        assert_eq!(render("", &[]), "");
    }

    #[test]
    fn test_validate_default() {
        assert!(PromptTemplates::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_secret_in_stage2() {
        let t = PromptTemplates {
            stage2: "{prompt}{continuation} x was {secret}".into(),
            ..Default::default()
        };
        assert!(matches!(t.validate(), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_digits_in_stage2() {
        let t = PromptTemplates {
            stage2: "{prompt}{continuation}\nx is either 0 or 1.\nAnswer: x =".into(),
            ..Default::default()
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_placeholders() {
        let no_secret = PromptTemplates {
            stage1: "Continue: {prompt}".into(),
            ..Default::default()
        };
        assert!(no_secret.validate().is_err());

        let no_continuation = PromptTemplates {
            stage2: "{prompt} Answer: x =".into(),
            ..Default::default()
        };
        assert!(no_continuation.validate().is_err());
    }
}
