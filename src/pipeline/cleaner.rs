//! DOM cleaning
//!
//! All structural cleaning runs inside the page as a sequence of
//! scripts built from the rules store. Order matters: content
//! isolation, then the removal passes, then the empty-element sweep.
//! Every step is individually defensive: a failing script is logged
//! and the remaining steps still run.

use serde_json::Value;
use tracing::{debug, warn};

use super::rules::RulesStore;
use crate::browser::PageGuard;
use crate::error::ConvertError;
use crate::types::ConversionOptions;

/// Script returning the current body HTML. Also the fast path when
/// aggressive cleaning is off.
pub const BODY_HTML_SCRIPT: &str = "document.body ? document.body.innerHTML : ''";

/// Shared JS prelude: removes an element, hoisting descendant images
/// into the element's parent first when images are preserved.
fn remove_helper(keep_images: bool) -> String {
    format!(
        r#"
    const keepImages = {keep_images};
    const removeEl = (el) => {{
        if (!el || !el.parentNode) return 0;
        if (keepImages) {{
            if (el.tagName === 'IMG') return 0;
            const imgs = Array.from(el.querySelectorAll('img'));
            for (const img of imgs) {{ el.parentNode.insertBefore(img, el); }}
        }}
        el.remove();
        return 1;
    }};
"#
    )
}

fn js_array(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Replace the body with the concatenated outerHTML of every element
/// matching the target selectors, in selector order. If nothing
/// matches, the body is left untouched.
fn isolation_script(target_selectors: &[String]) -> String {
    format!(
        r#"
(() => {{
    const selectors = {selectors};
    let html = '';
    let matched = false;
    for (const sel of selectors) {{
        let els;
        try {{ els = document.querySelectorAll(sel); }} catch (e) {{ continue; }}
        for (const el of els) {{ html += el.outerHTML; matched = true; }}
    }}
    if (matched) {{ document.body.innerHTML = html; }}
    return matched;
}})()
"#,
        selectors = js_array(target_selectors)
    )
}

/// Remove every element whose tag is in the list.
fn remove_tags_script(tags: &[String], keep_images: bool) -> String {
    format!(
        r#"
(() => {{
{helper}
    const tags = {tags};
    let removed = 0;
    for (const tag of tags) {{
        for (const el of Array.from(document.getElementsByTagName(tag))) {{
            removed += removeEl(el);
        }}
    }}
    return removed;
}})()
"#,
        helper = remove_helper(keep_images),
        tags = js_array(tags)
    )
}

/// Remove every element carrying one of the class names.
fn remove_classes_script(classes: &[String], keep_images: bool) -> String {
    format!(
        r#"
(() => {{
{helper}
    const classes = {classes};
    let removed = 0;
    for (const cls of classes) {{
        for (const el of Array.from(document.getElementsByClassName(cls))) {{
            removed += removeEl(el);
        }}
    }}
    return removed;
}})()
"#,
        helper = remove_helper(keep_images),
        classes = js_array(classes)
    )
}

/// Remove every element with one of the ids.
fn remove_ids_script(ids: &[String], keep_images: bool) -> String {
    format!(
        r#"
(() => {{
{helper}
    const ids = {ids};
    let removed = 0;
    for (const id of ids) {{
        removed += removeEl(document.getElementById(id));
    }}
    return removed;
}})()
"#,
        helper = remove_helper(keep_images),
        ids = js_array(ids)
    )
}

/// Remove every element whose class or id contains any of the
/// substrings, case-insensitively.
fn remove_contains_script(needles: &[String], keep_images: bool) -> String {
    format!(
        r#"
(() => {{
{helper}
    const needles = {needles}.map((n) => n.toLowerCase());
    let removed = 0;
    if (!document.body) return 0;
    for (const el of Array.from(document.body.querySelectorAll('*'))) {{
        const cls = (typeof el.className === 'string' ? el.className : '').toLowerCase();
        const id = (el.id || '').toLowerCase();
        if (needles.some((n) => cls.includes(n) || id.includes(n))) {{
            removed += removeEl(el);
        }}
    }}
    return removed;
}})()
"#,
        helper = remove_helper(keep_images),
        needles = js_array(needles)
    )
}

/// Remove every element matching any of the CSS selectors. With
/// `direct` set, a selector matching an image removes it outright;
/// container matches still hoist preserved images first.
fn remove_selectors_script(selectors: &[String], keep_images: bool, direct: bool) -> String {
    format!(
        r#"
(() => {{
{helper}
    const direct = {direct};
    const selectors = {selectors};
    let removed = 0;
    for (const sel of selectors) {{
        let els;
        try {{ els = Array.from(document.querySelectorAll(sel)); }} catch (e) {{ continue; }}
        for (const el of els) {{
            if (direct && el.tagName === 'IMG') {{ el.remove(); removed += 1; continue; }}
            removed += removeEl(el);
        }}
    }}
    return removed;
}})()
"#,
        helper = remove_helper(keep_images),
        direct = direct,
        selectors = js_array(selectors)
    )
}

/// Remove all images outright (remove_images mode).
const REMOVE_IMAGES_SCRIPT: &str = r#"
(() => {
    const imgs = Array.from(document.getElementsByTagName('img'));
    for (const img of imgs) { img.remove(); }
    return imgs.length;
})()
"#;

/// Depth-first sweep of elements with no element children and no
/// non-whitespace text. Images and ancestors of preserved images are
/// never removed.
fn empty_sweep_script(keep_images: bool) -> String {
    format!(
        r#"
(() => {{
    const keepImages = {keep_images};
    if (!document.body) return 0;
    let removed = 0;
    const holdsImage = (el) =>
        keepImages && (el.tagName === 'IMG' || el.querySelector('img') !== null);
    const sweep = (el) => {{
        for (const child of Array.from(el.children)) {{ sweep(child); }}
        if (el === document.body) return;
        if (holdsImage(el)) return;
        if (el.children.length === 0 && (el.textContent || '').trim() === '') {{
            el.remove();
            removed += 1;
        }}
    }};
    sweep(document.body);
    return removed;
}})()
"#
    )
}

/// Run one cleaning step, logging failures without aborting the
/// remaining steps.
async fn run_step(page: &PageGuard, name: &str, script: &str) {
    match page.evaluate(script).await {
        Ok(Value::Number(n)) => debug!(step = name, affected = %n, "cleaning step done"),
        Ok(_) => debug!(step = name, "cleaning step done"),
        Err(e) => warn!(step = name, error = %e, "cleaning step failed, continuing"),
    }
}

/// Clean the loaded page and return its sanitized body HTML.
pub async fn clean(
    page: &PageGuard,
    options: &ConversionOptions,
    rules: &RulesStore,
) -> Result<String, ConvertError> {
    if !options.aggressive_cleaning {
        return page
            .evaluate(BODY_HTML_SCRIPT)
            .await
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .map_err(|e| ConvertError::Cleaning(e.to_string()));
    }

    let keep_images = !options.remove_images;
    let cleaning = &rules.cleaning;

    if !options.target_selectors.is_empty() {
        run_step(page, "isolate", &isolation_script(&options.target_selectors)).await;
    }

    if options.remove_images {
        run_step(page, "remove_images", REMOVE_IMAGES_SCRIPT).await;
    }

    run_step(
        page,
        "remove_tags",
        &remove_tags_script(&cleaning.header_footer_tags, keep_images),
    )
    .await;
    run_step(
        page,
        "remove_classes",
        &remove_classes_script(&cleaning.header_footer_classes, keep_images),
    )
    .await;
    run_step(
        page,
        "remove_ids",
        &remove_ids_script(&cleaning.header_footer_ids, keep_images),
    )
    .await;
    run_step(
        page,
        "remove_contains",
        &remove_contains_script(&cleaning.contains_in_class_or_id, keep_images),
    )
    .await;
    run_step(
        page,
        "remove_consent",
        &remove_selectors_script(&cleaning.cookies_consent, keep_images, false),
    )
    .await;
    if !options.remove_selectors.is_empty() {
        // An explicit remove selector may target an image directly
        run_step(
            page,
            "remove_custom",
            &remove_selectors_script(&options.remove_selectors, keep_images, true),
        )
        .await;
    }

    run_step(page, "empty_sweep", &empty_sweep_script(keep_images)).await;

    let html = page
        .evaluate(BODY_HTML_SCRIPT)
        .await
        .map(|v| v.as_str().unwrap_or_default().to_string())
        .map_err(|e| ConvertError::Cleaning(e.to_string()))?;

    Ok(normalize_text(&html, rules))
}

/// Apply the shared format patterns to the cleaned HTML. The patterns
/// target pipe-bearing lines, escape residue, and newline runs; they
/// are applied again on the Markdown side with the same table.
pub fn normalize_text(input: &str, rules: &RulesStore) -> String {
    if !input.contains('|') && !input.contains('\\') && !input.contains('_') {
        return input.to_string();
    }

    let patterns = &rules.patterns;
    let out = patterns.any_table_line.replace_all(input, "");
    let out = patterns.function_calls_with_pipes.replace_all(&out, "");
    let out = patterns.pipe_with_dashes.replace_all(&out, "");
    let out = patterns
        .escape_chars
        .replace_all(&out, |caps: &regex::Captures| caps[0][1..].to_string());
    let out = patterns.trailing_backslashes.replace_all(&out, "");
    let out = patterns.excessive_newlines.replace_all(&out, "\n\n");
    out.into_owned()
}
