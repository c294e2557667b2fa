//! Template rendering: variable substitution, plain-text derivation, click
//! link rewriting and open-pixel injection.
//!
//! Variable substitution uses `handlebars`, the same crate the teacher's
//! `mailer.rs` already pulled in for recipient replacements. Link rewriting
//! and pixel injection stay on plain `regex`/string work rather than adding
//! a DOM-parsing crate — grounded on the examples pack's
//! string-injection-before-`</body>` tracking-pixel technique.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use handlebars::Handlebars;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use shared::constants::TRACKING_PIXEL_GIF_BASE64;
use shared::value::Value;
use uuid::Uuid;

/// A template variable as stored on `template.variables`: the dotted path
/// auto-extracted from `{{path.expr}}` tokens, plus a declared fallback the
/// caller can set separately from the template text itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVariable {
    pub path: String,
    #[serde(default)]
    pub default_value: String,
}

/// Re-extracts variables from freshly-saved `subject`/`html`, carrying over
/// the declared default for any path that's still referenced and applying
/// `declared_defaults` (caller-supplied, e.g. from a save request) for new
/// or changed ones. A path no longer referenced in the template text is
/// dropped.
pub fn merge_variables(
    extracted: &[String],
    existing: &Json,
    declared_defaults: &BTreeMap<String, String>,
) -> Vec<TemplateVariable> {
    let existing: Vec<TemplateVariable> = serde_json::from_value(existing.clone()).unwrap_or_default();
    let existing_defaults: BTreeMap<String, String> = existing
        .into_iter()
        .map(|v| (v.path, v.default_value))
        .collect();

    extracted
        .iter()
        .map(|path| {
            let default_value = declared_defaults
                .get(path)
                .cloned()
                .or_else(|| existing_defaults.get(path).cloned())
                .unwrap_or_default();
            TemplateVariable { path: path.clone(), default_value }
        })
        .collect()
}

/// Splices each variable's declared default into `context` wherever the
/// path doesn't already resolve to a non-empty value, so the renderer only
/// ever falls back to handlebars' own empty-string default for variables
/// with no declared one.
pub fn apply_variable_defaults(context: &mut Value, variables: &[TemplateVariable]) {
    for variable in variables {
        if variable.default_value.is_empty() {
            continue;
        }
        let resolved = context.lookup_path(&variable.path).map(|v| !v.is_nullish()).unwrap_or(false);
        if !resolved {
            context.set_path(&variable.path, variable.default_value.clone());
        }
    }
}

pub struct RenderInput<'a> {
    pub subject: &'a str,
    pub html: &'a str,
    pub text: Option<&'a str>,
    pub context: &'a Value,
    pub variables: &'a [TemplateVariable],
    pub base_url: &'a str,
    pub tracking_id: Uuid,
    pub track_clicks: bool,
    pub track_opens: bool,
}

pub struct RenderedLink {
    pub index: usize,
    pub original_url: String,
}

pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
    pub links: Vec<RenderedLink>,
}

fn href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href\s*=\s*"([^"]*)""#).unwrap())
}

fn style_script_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<(style|script)[^>]*>.*?</\1>").unwrap())
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]+>").unwrap())
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn unresolved_placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{.*?\}\}").unwrap())
}

fn variable_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([a-zA-Z0-9_.]+)\s*\}\}").unwrap())
}

/// Extracts the distinct `{{path.expr}}` variable paths referenced in
/// `subject` and `html`, in first-seen order. The two reserved link
/// placeholders (`unsubscribe_link`, `view_in_browser_link`) are excluded
/// since they're substituted directly by [`render`], not resolved from the
/// template's variable context.
pub fn extract_variables(subject: &str, html: &str) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut out = Vec::new();

    for text in [subject, html] {
        for caps in variable_token_regex().captures_iter(text) {
            let path = caps[1].to_owned();

            if path == "unsubscribe_link" || path == "view_in_browser_link" {
                continue;
            }

            if seen.insert(path.clone()) {
                out.push(path);
            }
        }
    }

    out
}

fn to_handlebars_json(value: &Value) -> Json {
    serde_json::to_value(value).unwrap_or(Json::Null)
}

/// Renders subject/html/text against `context`, substitutes the two special
/// link placeholders, rewrites trackable links, and injects the open pixel.
/// A path missing from `context` first falls back to its variable's
/// declared `default_value` (spliced into a copy of the context before
/// handlebars ever sees it); only a path with no declared default falls
/// through to handlebars' own empty-string default. `{{…}}` literals only
/// ever survive into output through the deliberate "unresolved in
/// automation" debugging path, which callers handle separately by not
/// calling this function at all.
pub fn render(input: &RenderInput) -> anyhow::Result<RenderedEmail> {
    let hb = Handlebars::new();
    let mut context = input.context.clone();
    apply_variable_defaults(&mut context, input.variables);
    let ctx = to_handlebars_json(&context);

    let subject = hb.render_template(input.subject, &ctx)?;
    let mut html = hb.render_template(input.html, &ctx)?;

    let unsubscribe_link = format!("{}/t/u/{}", input.base_url, input.tracking_id);
    let view_in_browser_link = format!("{}/t/v/{}", input.base_url, input.tracking_id);
    html = html.replace("{{unsubscribe_link}}", &unsubscribe_link);
    html = html.replace("{{ unsubscribe_link }}", &unsubscribe_link);
    html = html.replace("{{view_in_browser_link}}", &view_in_browser_link);
    html = html.replace("{{ view_in_browser_link }}", &view_in_browser_link);

    let mut links = Vec::new();
    if input.track_clicks {
        html = rewrite_links(
            &html,
            input.base_url,
            input.tracking_id,
            &unsubscribe_link,
            &view_in_browser_link,
            &mut links,
        );
    }

    if input.track_opens {
        html = inject_open_pixel(&html, input.base_url, input.tracking_id);
    }

    let text = match input.text {
        Some(t) if !t.is_empty() => hb.render_template(t, &ctx)?,
        _ => derive_plain_text(&html),
    };

    Ok(RenderedEmail {
        subject,
        html,
        text,
        links,
    })
}

fn rewrite_links(
    html: &str,
    base_url: &str,
    tracking_id: Uuid,
    unsubscribe_link: &str,
    view_in_browser_link: &str,
    out_links: &mut Vec<RenderedLink>,
) -> String {
    let mut index: usize = 0;

    href_regex()
        .replace_all(html, |caps: &regex::Captures| {
            let original = &caps[1];

            let skip = original.starts_with("mailto:")
                || original.starts_with("tel:")
                || original.starts_with('#')
                || unresolved_placeholder_regex().is_match(original)
                || original == unsubscribe_link
                || original == view_in_browser_link;

            if skip {
                return format!(r#"href="{}""#, original);
            }

            let this_index = index;
            index += 1;

            out_links.push(RenderedLink {
                index: this_index,
                original_url: original.to_owned(),
            });

            let encoded = urlencoding_encode(original);
            format!(
                r#"href="{}/t/c/{}/{}?url={}""#,
                base_url, tracking_id, this_index, encoded
            )
        })
        .into_owned()
}

fn inject_open_pixel(html: &str, base_url: &str, tracking_id: Uuid) -> String {
    let pixel = format!(
        r#"<img src="{}/t/o/{}" width="1" height="1" style="display:block" alt="" />"#,
        base_url, tracking_id
    );

    if let Some(pos) = html.to_lowercase().rfind("</body>") {
        let mut out = String::with_capacity(html.len() + pixel.len());
        out.push_str(&html[..pos]);
        out.push_str(&pixel);
        out.push_str(&html[pos..]);
        out
    } else {
        format!("{html}{pixel}")
    }
}

fn derive_plain_text(html: &str) -> String {
    let stripped = style_script_regex().replace_all(html, "");
    let stripped = tag_regex().replace_all(&stripped, " ");
    let collapsed = whitespace_regex().replace_all(&stripped, " ");
    collapsed.trim().to_owned()
}

/// Minimal percent-encoding for the `url` query parameter; avoids pulling in
/// a dedicated URL-encoding crate for one call site since `url::Url` is
/// already used elsewhere for validation, not arbitrary string encoding.
fn urlencoding_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Builds the context object the renderer expects: `contact.*`,
/// `organization.*`, plus whatever custom variables the caller supplies,
/// merged under a single object per the reserved-prefix rule.
pub fn build_context(
    contact: Value,
    organization: Value,
    custom: BTreeMap<String, Value>,
) -> Value {
    let mut root = BTreeMap::new();
    root.insert("contact".to_owned(), contact);
    root.insert("organization".to_owned(), organization);

    let now = chrono::Utc::now();
    root.insert("current_date".to_owned(), Value::String(now.format("%Y-%m-%d").to_string()));
    root.insert("current_year".to_owned(), Value::Int(now.format("%Y").to_string().parse().unwrap_or(0)));

    for (k, v) in custom {
        root.entry(k).or_insert(v);
    }

    Value::Object(root)
}

/// Placeholder tracking pixel payload for responses to `/t/o/{trackingId}`.
pub fn tracking_pixel_gif_bytes() -> Vec<u8> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(TRACKING_PIXEL_GIF_BASE64)
        .expect("tracking pixel constant is valid base64")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contact_ctx(first_name: &str) -> Value {
        let mut contact = Value::object();
        contact.set("firstName", first_name);
        let mut root = Value::object();
        root.set("contact", contact);
        root
    }

    fn base_input<'a>(html: &'a str, ctx: &'a Value) -> RenderInput<'a> {
        RenderInput {
            subject: "Hello {{contact.firstName}}",
            html,
            text: None,
            context: ctx,
            variables: &[],
            base_url: "https://send.example.com",
            tracking_id: Uuid::nil(),
            track_clicks: true,
            track_opens: true,
        }
    }

    #[test]
    fn substitutes_contact_variables() {
        let ctx = contact_ctx("Ada");
        let input = base_input("<p>Hi {{contact.firstName}}</p>", &ctx);
        let out = render(&input).unwrap();
        assert_eq!(out.subject, "Hello Ada");
        assert!(out.html.contains("Hi Ada"));
    }

    #[test]
    fn rewrites_trackable_links_and_skips_special_ones() {
        let ctx = contact_ctx("Ada");
        let html = r#"<a href="https://example.com/a">a</a><a href="mailto:x@y.com">mail</a>"#;
        let input = base_input(html, &ctx);
        let out = render(&input).unwrap();
        assert_eq!(out.links.len(), 1);
        assert!(out.html.contains("/t/c/"));
        assert!(out.html.contains(r#"href="mailto:x@y.com""#));
    }

    #[test]
    fn injects_pixel_before_closing_body() {
        let ctx = contact_ctx("Ada");
        let input = base_input("<html><body><p>hi</p></body></html>", &ctx);
        let out = render(&input).unwrap();
        let pixel_pos = out.html.find("/t/o/").unwrap();
        let body_close_pos = out.html.find("</body>").unwrap();
        assert!(pixel_pos < body_close_pos);
    }

    #[test]
    fn derives_plain_text_fallback() {
        let html = "<html><head><style>p{color:red}</style></head><body><p>Hello  world</p></body></html>";
        assert_eq!(derive_plain_text(html), "Hello world");
    }

    #[test]
    fn extracts_distinct_variables_in_order() {
        let vars = extract_variables(
            "Hi {{contact.firstName}}",
            "<p>{{contact.firstName}} {{contact.lastName}}</p><p>{{contact.firstName}}</p>",
        );
        assert_eq!(vars, vec!["contact.firstName", "contact.lastName"]);
    }

    #[test]
    fn extract_variables_skips_reserved_link_placeholders() {
        let vars = extract_variables("", "{{unsubscribe_link}} {{view_in_browser_link}} {{contact.email}}");
        assert_eq!(vars, vec!["contact.email"]);
    }

    #[test]
    fn merge_variables_carries_over_existing_default_and_drops_stale_path() {
        let existing = json!([
            { "path": "contact.nickname", "defaultValue": "Friend" },
            { "path": "contact.company", "defaultValue": "Acme" },
        ]);
        let declared = BTreeMap::new();
        let merged = merge_variables(&["contact.nickname".to_owned()], &existing, &declared);
        assert_eq!(merged, vec![TemplateVariable { path: "contact.nickname".into(), default_value: "Friend".into() }]);
    }

    #[test]
    fn merge_variables_prefers_newly_declared_default() {
        let existing = json!([{ "path": "contact.nickname", "defaultValue": "Friend" }]);
        let mut declared = BTreeMap::new();
        declared.insert("contact.nickname".to_owned(), "Pal".to_owned());
        let merged = merge_variables(&["contact.nickname".to_owned()], &existing, &declared);
        assert_eq!(merged[0].default_value, "Pal");
    }

    #[test]
    fn render_falls_back_to_declared_default_then_empty_string() {
        let ctx = Value::object();
        let variables = vec![
            TemplateVariable { path: "contact.nickname".into(), default_value: "Friend".into() },
        ];
        let input = RenderInput {
            subject: "Hi {{contact.nickname}}",
            html: "<p>{{contact.nickname}} / {{contact.missing}}</p>",
            text: None,
            context: &ctx,
            variables: &variables,
            base_url: "https://send.example.com",
            tracking_id: Uuid::nil(),
            track_clicks: false,
            track_opens: false,
        };
        let out = render(&input).unwrap();
        assert_eq!(out.subject, "Hi Friend");
        assert!(out.html.contains("Friend / "));
    }
}
