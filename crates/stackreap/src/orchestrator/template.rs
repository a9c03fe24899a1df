//! Removing `Retain` deletion policies from a stack template
//!
//! JSON templates are edited structurally. YAML templates are edited line by
//! line inside the top-level `Resources` section, which keeps short-form
//! intrinsic tags (`!Ref`, `!Sub`, ...) intact without a YAML round trip.

use crate::aws::api::{StackApi, TemplateSource, TemplateStager};
use crate::error::ReapError;
use crate::retry::RetryPolicy;
use serde_json::Value;
use stackreap_common::defaults::{INLINE_TEMPLATE_BODY_LIMIT, STAGED_TEMPLATE_BODY_LIMIT};
use tracing::{debug, info, warn};

/// Deletion policies that keep a resource alive past its stack
const RETAIN_POLICIES: &[&str] = &["Retain", "RetainExceptOnCreate"];

const DELETION_POLICY: &str = "DeletionPolicy";

/// A template with its retain policies removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrippedTemplate {
    pub body: String,
    /// Logical ids whose deletion policy was removed
    pub stripped: Vec<String>,
}

impl StrippedTemplate {
    pub fn changed(&self) -> bool {
        !self.stripped.is_empty()
    }
}

/// Remove every `Retain`/`RetainExceptOnCreate` deletion policy
pub fn strip_retain_policies(stack: &str, body: &str) -> Result<StrippedTemplate, ReapError> {
    if body.trim_start().starts_with('{') {
        strip_json(stack, body)
    } else {
        Ok(strip_yaml(body))
    }
}

fn strip_json(stack: &str, body: &str) -> Result<StrippedTemplate, ReapError> {
    let parse_error = |e: serde_json::Error| ReapError::TemplateParse {
        stack: stack.to_string(),
        message: e.to_string(),
    };

    let mut template: Value = serde_json::from_str(body).map_err(parse_error)?;
    let mut stripped = Vec::new();

    if let Some(resources) = template.get_mut("Resources").and_then(Value::as_object_mut) {
        for (logical_id, definition) in resources.iter_mut() {
            let Some(definition) = definition.as_object_mut() else {
                continue;
            };
            let retained = definition
                .get(DELETION_POLICY)
                .and_then(Value::as_str)
                .is_some_and(|p| RETAIN_POLICIES.contains(&p));
            if retained {
                definition.remove(DELETION_POLICY);
                stripped.push(logical_id.clone());
            }
        }
    }

    if stripped.is_empty() {
        return Ok(StrippedTemplate {
            body: body.to_string(),
            stripped,
        });
    }

    let body = serde_json::to_string(&template).map_err(parse_error)?;
    Ok(StrippedTemplate { body, stripped })
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

/// Content of a line without its trailing comment and whitespace
fn content_of(line: &str) -> &str {
    let line = line.trim_end_matches(['\r', '\n']);
    let without_comment = match line.find(" #") {
        Some(pos) => &line[..pos],
        None => line,
    };
    without_comment.trim()
}

fn unquote(value: &str) -> &str {
    value.trim_matches(|c| c == '"' || c == '\'')
}

/// Whether a `key: value` line sets a retaining deletion policy
fn is_retain_policy(content: &str) -> bool {
    content.split_once(':').is_some_and(|(key, value)| {
        unquote(key.trim()) == DELETION_POLICY && RETAIN_POLICIES.contains(&unquote(value.trim()))
    })
}

fn strip_yaml(body: &str) -> StrippedTemplate {
    let mut out = String::with_capacity(body.len());
    let mut stripped = Vec::new();

    let mut in_resources = false;
    let mut resource_indent: Option<usize> = None;
    let mut attribute_indent: Option<usize> = None;
    let mut current: Option<String> = None;

    for line in body.split_inclusive('\n') {
        let content = content_of(line);
        let blank = content.is_empty() || content.starts_with('#');
        let indent = indent_of(line);

        if !blank && indent == 0 {
            // A new top-level key ends (or starts) the Resources section
            in_resources = content == "Resources:";
            resource_indent = None;
            attribute_indent = None;
            current = None;
            out.push_str(line);
            continue;
        }

        if !in_resources || blank {
            out.push_str(line);
            continue;
        }

        let level = *resource_indent.get_or_insert(indent);
        if indent == level {
            current = content
                .strip_suffix(':')
                .map(|key| unquote(key.trim()).to_string());
            attribute_indent = None;
            out.push_str(line);
            continue;
        }

        if indent > level {
            let attr_level = *attribute_indent.get_or_insert(indent);
            if indent == attr_level && is_retain_policy(content) {
                if let Some(logical_id) = &current {
                    stripped.push(logical_id.clone());
                }
                continue;
            }
        }

        out.push_str(line);
    }

    if stripped.is_empty() {
        out = body.to_string();
    }
    StrippedTemplate {
        body: out,
        stripped,
    }
}

/// Resubmit a stack's template without retain policies.
///
/// Returns `true` when an update was accepted and the caller must wait for
/// it to settle. Bodies over the inline limit go through a staging bucket
/// that is discarded afterwards.
pub async fn submit_without_retain(
    stacks: &dyn StackApi,
    stager: &dyn TemplateStager,
    retry: &RetryPolicy,
    stack: &str,
) -> Result<bool, ReapError> {
    let original = retry
        .call("GetTemplate", || stacks.get_template(stack))
        .await?;
    let template = strip_retain_policies(stack, &original)?;

    if !template.changed() {
        debug!(stack = %stack, "No retain policies to strip");
        return Ok(false);
    }
    info!(stack = %stack, resources = ?template.stripped, "Stripping retain policies");

    let size = template.body.len();
    if size <= INLINE_TEMPLATE_BODY_LIMIT {
        return retry
            .call("UpdateStack", || {
                stacks.update_template(stack, TemplateSource::Body(template.body.clone()))
            })
            .await;
    }

    if size > STAGED_TEMPLATE_BODY_LIMIT {
        return Err(ReapError::TemplateTooLarge {
            stack: stack.to_string(),
            size,
            limit: STAGED_TEMPLATE_BODY_LIMIT,
        });
    }

    let staged = retry
        .call("PutObject", || stager.stage(stack, &template.body))
        .await?;
    debug!(stack = %stack, url = %staged.url, size, "Template staged");

    let updated = retry
        .call("UpdateStack", || {
            stacks.update_template(stack, TemplateSource::Url(staged.url.clone()))
        })
        .await;

    if let Err(e) = retry
        .call("DiscardStagedTemplate", || stager.discard(&staged))
        .await
    {
        warn!(bucket = %staged.bucket, error = %e, "Failed to remove staging bucket");
    }

    updated
}
