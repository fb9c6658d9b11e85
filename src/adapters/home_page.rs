//! The HTML form served at `/`.
//!
//! The page builds conversion links client side; the server only fills in
//! the origin, the page language and the rule-set catalog.
use crate::core::{i18n::Language, rules::RuleSetResolver};

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="{{LANG}}">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Sublink</title>
<link rel="icon" href="/favicon.png">
<style>
body { font-family: system-ui, sans-serif; max-width: 760px; margin: 2rem auto; padding: 0 1rem; }
textarea, input, select { width: 100%; box-sizing: border-box; margin: .25rem 0 1rem; }
textarea { min-height: 10rem; font-family: monospace; }
code { word-break: break-all; }
</style>
</head>
<body>
<h1>Sublink</h1>
<form id="form">
<label for="config">Subscriptions / share links (one per line)</label>
<textarea id="config" required></textarea>
<label for="rules">Rule set</label>
<select id="rules">{{RULE_OPTIONS}}</select>
<label for="configId">Base config id (optional)</label>
<input id="configId">
<button type="submit">Generate</button>
</form>
<ul id="links"></ul>
<script>
const origin = "{{ORIGIN}}";
document.getElementById("form").addEventListener("submit", (event) => {
  event.preventDefault();
  const params = new URLSearchParams();
  params.set("config", document.getElementById("config").value);
  params.set("selectedRules", document.getElementById("rules").value);
  const configId = document.getElementById("configId").value.trim();
  if (configId) params.set("configId", configId);
  const list = document.getElementById("links");
  list.innerHTML = "";
  for (const route of ["singbox", "clash", "surge", "xray"]) {
    const item = document.createElement("li");
    const link = document.createElement("code");
    link.textContent = `${origin}/${route}?${params}`;
    item.append(`${route}: `, link);
    list.append(item);
  }
});
</script>
</body>
</html>
"#;

/// Render the home page for `origin`
pub fn render(origin: &str, language: Language) -> String {
    let rule_options: String = RuleSetResolver::catalog_keys()
        .map(|key| format!(r#"<option value="{key}">{key}</option>"#))
        .collect();

    TEMPLATE
        .replace("{{LANG}}", language.code())
        .replace("{{RULE_OPTIONS}}", &rule_options)
        .replace("{{ORIGIN}}", &escape(origin))
}

fn escape(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#39;".to_string(),
            other => other.to_string(),
        })
        .collect()
}
