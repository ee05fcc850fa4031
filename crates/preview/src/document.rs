use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cipherstudio_settings::ThemeKind;

use crate::compile::CompiledScript;

pub const ERROR_TITLE: &str = "Compilation Error:";
pub const STACK_TITLE: &str = "Stack Trace:";
pub const MISSING_COMPONENT: &str =
    "No React component found. Make sure to export a component as default.";

/// Runtime scripts loaded ahead of the compiled component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeAssets {
    pub react_url: String,
    pub react_dom_url: String,
}

/// A complete, self-contained preview document.
/// 完整且自給自足的預覽 HTML 文件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewDocument {
    html: String,
    theme: ThemeKind,
}

impl PreviewDocument {
    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn theme(&self) -> ThemeKind {
        self.theme
    }

    pub fn into_html(self) -> String {
        self.html
    }

    /// `data:` URL form for hosts that load documents by URL.
    pub fn to_data_url(&self) -> String {
        format!("data:text/html;base64,{}", STANDARD.encode(self.html.as_bytes()))
    }
}

/// Encodes `value` as a JavaScript string literal that is safe inside an
/// inline `<script>` element.
pub fn script_string_literal(value: &str) -> String {
    // serde_json escapes quotes, backslashes and control characters; `<` is
    // escaped as well so the literal can never close the script element.
    let literal = serde_json::Value::String(value.to_string()).to_string();
    literal
        .replace('<', "\\u003c")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

fn style_block_safe(css: &str) -> String {
    css.replace("</", "<\\/")
}

/// Assembles the document: runtime scripts, theme, stylesheet and the
/// compiled component wrapped in an error guard.
/// 組合預覽文件：執行期腳本、主題、樣式表與包在錯誤防護中的元件。
pub fn assemble(
    compiled: &CompiledScript,
    stylesheet: &str,
    theme: ThemeKind,
    assets: &RuntimeAssets,
) -> PreviewDocument {
    let palette = theme.palette();
    let mut scripts = vec![
        format!(
            r#"<script crossorigin src="{}"></script>"#,
            attribute_escape(&assets.react_url)
        ),
        format!(
            r#"<script crossorigin src="{}"></script>"#,
            attribute_escape(&assets.react_dom_url)
        ),
    ];
    scripts.extend(
        compiled
            .runtime_scripts
            .iter()
            .map(|url| format!(r#"<script src="{}"></script>"#, attribute_escape(url))),
    );

    let html = format!(
        r#"<!DOCTYPE html>
<html class="{theme}">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
{scripts}
<style>
:root {{
  --preview-background: {background};
  --preview-text: {text};
  --preview-error-background: {error_background};
  --preview-error-border: {error_border};
  --preview-error-title: {error_title};
}}
* {{ margin: 0; padding: 0; box-sizing: border-box; }}
body {{
  font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
  background: var(--preview-background);
  color: var(--preview-text);
}}
#root {{ width: 100%; min-height: 100vh; }}
.error-container {{
  padding: 20px;
  background: var(--preview-error-background);
  border: 1px solid var(--preview-error-border);
  border-radius: 8px;
  margin: 20px;
  font-family: 'Fira Code', monospace;
  font-size: 13px;
  color: var(--preview-error-border);
  white-space: pre-wrap;
  word-break: break-word;
  overflow-x: auto;
}}
.error-title {{ font-weight: bold; margin-bottom: 10px; color: var(--preview-error-title); }}
{stylesheet}
</style>
</head>
<body>
<div id="root"></div>
<script>
function __showPreviewError(err) {{
  var message = err instanceof Error ? err.message : String(err);
  var stack = err instanceof Error && err.stack ? err.stack : '';
  var panel = document.createElement('div');
  panel.className = 'error-container';
  var title = document.createElement('div');
  title.className = 'error-title';
  title.textContent = {error_title_literal};
  panel.appendChild(title);
  panel.appendChild(document.createTextNode(message));
  if (stack) {{
    panel.appendChild(document.createElement('br'));
    panel.appendChild(document.createElement('br'));
    var label = document.createElement('strong');
    label.textContent = {stack_title_literal};
    panel.appendChild(label);
    panel.appendChild(document.createElement('br'));
    panel.appendChild(document.createTextNode(stack));
  }}
  var root = document.getElementById('root');
  while (root.firstChild) {{ root.removeChild(root.firstChild); }}
  root.appendChild(panel);
}}
window.onerror = function (message, source, line, column, error) {{
  __showPreviewError(error || message);
  return true;
}};
window.addEventListener('unhandledrejection', function (event) {{
  __showPreviewError(event.reason);
}});
</script>
<script>
(function () {{
  try {{
{body}
    if (typeof window.App === 'undefined' || !window.App) {{
      throw new Error({missing_literal});
    }}
    var root = ReactDOM.createRoot(document.getElementById('root'));
    root.render(React.createElement(window.App));
  }} catch (err) {{
    __showPreviewError(err);
  }}
}})();
</script>
</body>
</html>
"#,
        theme = theme.as_str(),
        scripts = scripts.join("\n"),
        background = palette.background,
        text = palette.text,
        error_background = palette.error_background,
        error_border = palette.error_border,
        error_title = palette.error_title,
        stylesheet = style_block_safe(stylesheet),
        error_title_literal = script_string_literal(ERROR_TITLE),
        stack_title_literal = script_string_literal(STACK_TITLE),
        missing_literal = script_string_literal(MISSING_COMPONENT),
        body = compiled.body,
    );

    PreviewDocument { html, theme }
}

fn attribute_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
