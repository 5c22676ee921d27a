//! Streaming HTML rewrite of rendered pages.
//!
//! Each rewritten element kind has one declared rule; see [`RewriteTarget`].
//! A reference that cannot be resolved against the origin keeps its original
//! value and the rest of the document is still processed.

use std::cell::Cell;
use std::rc::Rc;

use lol_html::html_content::Element;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use thiserror::Error;

use crate::links::RewriteContext;

#[derive(Debug, Error)]
#[error("HTML rewrite failed: {0}")]
pub struct RewriteError(String);

/// Closed set of element kinds whose references are routed back through the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteTarget {
    /// `<a href>` → render route.
    Anchor,
    /// `<form action>` → origin path, method forced to `GET`.
    Form,
    /// `<img src>` → asset proxy.
    Image,
    /// `<script src>` → asset proxy.
    Script,
    /// `<link href>` (stylesheets, icons, preloads) → asset proxy.
    Link,
}

impl RewriteTarget {
    pub const ALL: [RewriteTarget; 5] = [
        RewriteTarget::Anchor,
        RewriteTarget::Form,
        RewriteTarget::Image,
        RewriteTarget::Script,
        RewriteTarget::Link,
    ];

    pub fn selector(self) -> &'static str {
        match self {
            RewriteTarget::Anchor => "a[href]",
            RewriteTarget::Form => "form",
            RewriteTarget::Image => "img[src]",
            RewriteTarget::Script => "script[src]",
            RewriteTarget::Link => "link[href]",
        }
    }

    pub fn attribute(self) -> &'static str {
        match self {
            RewriteTarget::Anchor | RewriteTarget::Link => "href",
            RewriteTarget::Form => "action",
            RewriteTarget::Image | RewriteTarget::Script => "src",
        }
    }

    /// New attribute value for `value`, or `None` to keep the original.
    fn translate(self, ctx: &RewriteContext, value: &str) -> Option<String> {
        match self {
            RewriteTarget::Anchor => ctx.to_render_path(value),
            RewriteTarget::Form => ctx.to_form_action(value),
            RewriteTarget::Image | RewriteTarget::Script | RewriteTarget::Link => {
                ctx.to_proxy_path(value)
            }
        }
    }
}

/// Rewritten markup plus counters for the debug log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub html: String,
    pub rewritten: usize,
    pub unresolved: usize,
}

#[derive(Default)]
struct Counters {
    rewritten: Cell<usize>,
    unresolved: Cell<usize>,
}

/// Rewrites `html` so navigation, form submission and asset loads all return to the proxy.
pub fn rewrite_html(html: &str, ctx: &RewriteContext) -> Result<RewriteOutcome, RewriteError> {
    let counters = Rc::new(Counters::default());

    let handlers = RewriteTarget::ALL
        .iter()
        .map(|&target| {
            let counters = Rc::clone(&counters);
            element!(target.selector(), move |el| {
                apply_rule(target, ctx, el, &counters)?;
                Ok(())
            })
        })
        .collect();

    let html = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RewriteError(err.to_string()))?;

    Ok(RewriteOutcome {
        html,
        rewritten: counters.rewritten.get(),
        unresolved: counters.unresolved.get(),
    })
}

fn apply_rule(
    target: RewriteTarget,
    ctx: &RewriteContext,
    el: &mut Element<'_, '_>,
    counters: &Counters,
) -> Result<(), lol_html::errors::AttributeNameError> {
    let attr = target.attribute();
    let current = el.get_attribute(attr);

    if target == RewriteTarget::Form {
        el.set_attribute("method", "GET")?;
    }

    let value = match (target, current) {
        (_, Some(value)) => html_escape::decode_html_entities(&value).into_owned(),
        // A form without an action submits to the current document; treat it as "/".
        (RewriteTarget::Form, None) => String::new(),
        (_, None) => return Ok(()),
    };

    match target.translate(ctx, &value) {
        Some(rewritten) => {
            // Written verbatim, so character references must be re-encoded.
            el.set_attribute(attr, &html_escape::encode_double_quoted_attribute(&rewritten))?;
            counters.rewritten.set(counters.rewritten.get() + 1);
        }
        None => counters.unresolved.set(counters.unresolved.get() + 1),
    }
    Ok(())
}
