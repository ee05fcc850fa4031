use std::borrow::Cow;

use regex::Regex;

/// Hooks rewritten to `React.<hook>` when referenced bare.
pub const REACT_HOOKS: [&str; 7] = [
    "useState",
    "useEffect",
    "useContext",
    "useReducer",
    "useMemo",
    "useCallback",
    "useRef",
];

/// Global binding that receives the default export.
pub const APP_BINDING: &str = "window.App";

/// Source-to-source pass applied to the entry file before compilation.
/// （編譯前套用於進入點檔案的原始碼轉換。）
pub trait SourceRewriter: Send + Sync {
    fn rewrite(&self, source: &str) -> String;
}

/// A single textual substitution applied to every match.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pub regex: Regex,
    pub replacement: String,
}

impl RewriteRule {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    fn apply<'a>(&self, source: &'a str) -> Cow<'a, str> {
        self.regex.replace_all(source, self.replacement.as_str())
    }
}

/// Best-effort rewriter built from an ordered list of regex rules.
/// （由有序正規表示式規則組成的盡力轉換器。）
///
/// The rules are pattern based: imports split across unusual constructs,
/// hook names inside string literals and similar cases are not handled
/// precisely.
#[derive(Debug, Clone)]
pub struct RegexRewriter {
    rules: Vec<RewriteRule>,
}

impl RegexRewriter {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    /// The rule set for single-file React components:
    /// strip imports, bind the default export globally, namespace the hooks.
    pub fn react() -> Result<Self, regex::Error> {
        let from = r#"\s+from\s+['"][^'"]+['"];?"#;
        let mut rules = vec![
            RewriteRule::new(
                r#"import\s+React(?:\s*,\s*\{[^}]*\})?\s+from\s+['"]react['"];?"#,
                "",
            )?,
            RewriteRule::new(r#"import\s+\{[^}]+\}\s+from\s+['"]react['"];?"#, "")?,
            RewriteRule::new(&format!(r"import\s+type\s+[^;]*?{from}"), "")?,
            RewriteRule::new(&format!(r"import\s+\*\s+as\s+\w+{from}"), "")?,
            RewriteRule::new(&format!(r"import\s+\w+\s*,\s*\{{[^}}]*\}}{from}"), "")?,
            RewriteRule::new(&format!(r"import\s+\w+{from}"), "")?,
            RewriteRule::new(&format!(r"import\s+\{{[^}}]*\}}{from}"), "")?,
            RewriteRule::new(r#"import\s+['"][^'"]+['"];?"#, "")?,
            RewriteRule::new(r"export\s+default\s+", format!("{APP_BINDING} = "))?,
        ];
        let hooks = REACT_HOOKS.join("|");
        rules.push(RewriteRule::new(
            &format!(r"(?m)(^|[^.\w$])({hooks})\b"),
            "${1}React.${2}",
        )?);
        Ok(Self::new(rules))
    }

    pub fn push_rule(&mut self, rule: RewriteRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }
}

impl SourceRewriter for RegexRewriter {
    fn rewrite(&self, source: &str) -> String {
        self.rules
            .iter()
            .fold(source.to_string(), |text, rule| rule.apply(&text).into_owned())
    }
}
