//! Output filename templating (spec.md §4 output template): `{variable}`
//! substitution with `{variable?}` conditional variables, grounded in the
//! original's `TemplateFormatter`.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::TemplateContext;

static VARIABLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([^}]+)\}").unwrap());
static MULTI_DOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{2,}").unwrap());
static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());
static LEADING_TRAILING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[.\s]+|[.\s]+$").unwrap());
static DOT_BEFORE_DASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.-").unwrap());
static SEP_BEFORE_PAREN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.\s]+\)").unwrap());
static UNSAFE_FS_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap());

/// Parses a filename template once and formats it against any number of
/// per-title variable contexts.
#[derive(Debug, Clone)]
pub struct TemplateFormatter {
    template: String,
    variables: Vec<String>,
}

impl TemplateFormatter {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let variables = VARIABLE_PATTERN
            .captures_iter(&template)
            .map(|c| c[1].trim().to_string())
            .collect();
        Self { template, variables }
    }

    /// Substitutes every `{variable}`/`{variable?}` placeholder, then
    /// collapses doubled separators left behind by dropped conditionals.
    pub fn format(&self, context: &TemplateContext) -> String {
        let mut result = self.template.clone();

        for variable in &self.variables {
            let placeholder = format!("{{{variable}}}");
            if let Some(name) = variable.strip_suffix('?') {
                let value = context.get(name).map(|s| s.as_str()).unwrap_or("");
                result = result.replace(&placeholder, value);
            } else {
                let value = context.get(variable.as_str()).map(|s| s.as_str()).unwrap_or("");
                result = result.replace(&placeholder, value);
            }
        }

        result = MULTI_DOT.replace_all(&result, ".").into_owned();
        result = MULTI_SPACE.replace_all(&result, " ").into_owned();
        result = LEADING_TRAILING.replace_all(&result, "").into_owned();
        result = DOT_BEFORE_DASH.replace_all(&result, "-").into_owned();
        result = SEP_BEFORE_PAREN.replace_all(&result, ")").into_owned();

        let spacer = if self.template.contains(' ') && !self.template.contains('.') { ' ' } else { '.' };
        sanitize_filename(&result, spacer)
    }

    /// Non-conditional variables that must be present in the context.
    pub fn get_required_variables(&self) -> Vec<String> {
        self.variables.iter().filter(|v| !v.ends_with('?')).cloned().collect()
    }

    /// Conditional variables (`{name?}`), with the `?` stripped.
    pub fn get_optional_variables(&self) -> Vec<String> {
        self.variables
            .iter()
            .filter_map(|v| v.strip_suffix('?').map(str::to_string))
            .collect()
    }

    /// Reports any required variable missing from `context`.
    pub fn validate(&self, context: &TemplateContext) -> (bool, Vec<String>) {
        let present: HashSet<&str> = context.keys().map(String::as_str).collect();
        let missing: Vec<String> =
            self.get_required_variables().into_iter().filter(|v| !present.contains(v.as_str())).collect();
        (missing.is_empty(), missing)
    }
}

/// Strips filesystem-unsafe characters and normalizes the run separator,
/// mirroring the original's `sanitize_filename` helper.
pub fn sanitize_filename(input: &str, spacer: char) -> String {
    let cleaned = UNSAFE_FS_CHARS.replace_all(input, "");
    if spacer == ' ' {
        cleaned.into_owned()
    } else {
        cleaned.replace(' ', &spacer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, &str)]) -> TemplateContext {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitutes_required_variables() {
        let formatter = TemplateFormatter::new("{title}.{year}.{source}-{tag}");
        let out = formatter.format(&ctx(&[("title", "Foo"), ("year", "2024"), ("source", "WEB"), ("tag", "GRP")]));
        assert_eq!(out, "Foo.2024.WEB-GRP");
    }

    #[test]
    fn drops_empty_conditional_and_collapses_separators() {
        let formatter = TemplateFormatter::new("{title}.{year}.{quality?}.{source}-{tag}");
        let out = formatter.format(&ctx(&[("title", "Foo"), ("year", "2024"), ("source", "WEB"), ("tag", "GRP")]));
        assert_eq!(out, "Foo.2024.WEB-GRP");
    }

    #[test]
    fn keeps_present_conditional() {
        let formatter = TemplateFormatter::new("{title}.{quality?}");
        let out = formatter.format(&ctx(&[("title", "Foo"), ("quality", "2160p")]));
        assert_eq!(out, "Foo.2160p");
    }

    #[test]
    fn space_template_uses_space_spacer() {
        let formatter = TemplateFormatter::new("{title} {year}");
        let out = formatter.format(&ctx(&[("title", "Foo"), ("year", "2024")]));
        assert_eq!(out, "Foo 2024");
    }

    #[test]
    fn validate_reports_missing_required_variables() {
        let formatter = TemplateFormatter::new("{title}.{year}.{quality?}");
        let (ok, missing) = formatter.validate(&ctx(&[("title", "Foo")]));
        assert!(!ok);
        assert_eq!(missing, vec!["year".to_string()]);
    }

    #[test]
    fn required_and_optional_variable_lists() {
        let formatter = TemplateFormatter::new("{title}.{year}.{quality?}.{tag?}");
        assert_eq!(formatter.get_required_variables(), vec!["title".to_string(), "year".to_string()]);
        assert_eq!(formatter.get_optional_variables(), vec!["quality".to_string(), "tag".to_string()]);
    }

    #[test]
    fn sanitize_filename_strips_unsafe_characters() {
        assert_eq!(sanitize_filename("Foo: Bar/Baz?", '.'), "Foo Bar Baz");
    }
}
