use regex::Regex;
use std::sync::LazyLock;

/// `{{` and `}}` are escapes, `{field}` is a placeholder, and a lone brace is
/// matched last so it can be reported.
static TEMPLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]").unwrap());

pub const NAME_PLACEHOLDER: &str = "name";

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateError {
    UnknownPlaceholder(String),
    UnmatchedBrace { brace: char, offset: usize },
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateError::UnknownPlaceholder(field) => write!(
                f,
                "unknown placeholder {{{field}}}, only {{{NAME_PLACEHOLDER}}} is supported"
            ),
            TemplateError::UnmatchedBrace { brace, offset } => {
                write!(f, "single '{brace}' at offset {offset}, use '{brace}{brace}' for a literal brace")
            }
        }
    }
}

impl std::error::Error for TemplateError {}

/// A message body with a `{name}` placeholder, validated up front so that a
/// bad template is rejected before anything is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageTemplate {
    source: String,
}

impl MessageTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        for caps in TEMPLATE_RE.captures_iter(source) {
            let token = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            match token {
                "{{" | "}}" => {}
                "{" | "}" => {
                    return Err(TemplateError::UnmatchedBrace {
                        brace: token.chars().next().unwrap_or('{'),
                        offset: caps.get(0).map(|m| m.start()).unwrap_or_default(),
                    });
                }
                _ => {
                    let field = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                    if field != NAME_PLACEHOLDER {
                        return Err(TemplateError::UnknownPlaceholder(field.to_string()));
                    }
                }
            }
        }

        Ok(Self {
            source: source.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Substitute the recipient name. The result is sent verbatim.
    pub fn render(&self, name: &str) -> String {
        TEMPLATE_RE
            .replace_all(&self.source, |caps: &regex::Captures| match &caps[0] {
                "{{" => "{".to_string(),
                "}}" => "}".to_string(),
                _ => name.to_string(),
            })
            .into_owned()
    }
}
