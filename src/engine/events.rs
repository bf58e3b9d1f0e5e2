// ABOUTME: Parsers for the engine's machine-readable output.
// ABOUTME: Saved-plan JSON, the apply event stream, and state-lock diagnostics.

use serde::Deserialize;
use std::collections::BTreeMap;

use super::{ApplySummary, ChangeAction, ResourceChange, ResourceFailure};

const LOCK_MARKER: &str = "Error acquiring the state lock";

/// Whether engine output reports a state lock held elsewhere.
pub(crate) fn is_lock_error(text: &str) -> bool {
    text.contains(LOCK_MARKER)
}

/// Extract the lock ID from the engine's "Lock Info" block, if present.
pub(crate) fn parse_lock_id(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("ID:"))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

#[derive(Debug, Deserialize)]
struct SavedPlan {
    #[serde(default)]
    resource_changes: Vec<RawResourceChange>,
}

#[derive(Debug, Deserialize)]
struct RawResourceChange {
    address: String,
    change: RawChange,
}

#[derive(Debug, Deserialize)]
struct RawChange {
    actions: Vec<String>,
}

/// Resource changes from `show -json` of a saved plan.
pub(crate) fn parse_plan_changes(json: &str) -> serde_json::Result<Vec<ResourceChange>> {
    let plan: SavedPlan = serde_json::from_str(json)?;
    Ok(plan
        .resource_changes
        .into_iter()
        .filter_map(|rc| match ChangeAction::from_actions(&rc.change.actions) {
            Some(action) => Some(ResourceChange {
                address: rc.address,
                action,
            }),
            None => {
                tracing::warn!(
                    "Ignoring unrecognised actions {:?} for {}",
                    rc.change.actions,
                    rc.address
                );
                None
            }
        })
        .collect())
}

/// One line of `apply -json`. Only the fields we use are modelled.
#[derive(Debug, Deserialize)]
struct ApplyEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    hook: Option<Hook>,
    #[serde(default)]
    changes: Option<ChangeCounts>,
    #[serde(default)]
    diagnostic: Option<Diagnostic>,
}

#[derive(Debug, Deserialize)]
struct Hook {
    resource: HookResource,
    #[serde(default)]
    action: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HookResource {
    addr: String,
}

#[derive(Debug, Deserialize)]
struct ChangeCounts {
    #[serde(default)]
    add: u32,
    #[serde(default)]
    change: u32,
    #[serde(default)]
    remove: u32,
}

#[derive(Debug, Deserialize)]
struct Diagnostic {
    severity: String,
    summary: String,
    #[serde(default)]
    detail: String,
    #[serde(default)]
    address: Option<String>,
}

/// What an apply run reported, resource by resource.
#[derive(Debug, Default)]
pub(crate) struct ApplyReport {
    pub completed: Vec<String>,
    pub errored: Vec<ResourceFailure>,
    pub summary: Option<ApplySummary>,
    /// Error diagnostics not tied to a resource address.
    pub errors: Vec<String>,
}

impl ApplyReport {
    /// Summary reported by the engine, or one counted from completion events.
    pub fn summary_or_counted(&self, actions: &BTreeMap<String, String>) -> ApplySummary {
        if let Some(summary) = self.summary {
            return summary;
        }
        let mut counted = ApplySummary::default();
        for addr in &self.completed {
            match actions.get(addr).map(String::as_str) {
                Some("delete") => counted.resources_destroyed += 1,
                Some("update") => counted.resources_updated += 1,
                _ => counted.resources_created += 1,
            }
        }
        counted
    }
}

/// Parse the JSON-lines stream of an apply. Unparseable lines are skipped.
pub(crate) fn parse_apply_stream(stream: &str) -> (ApplyReport, BTreeMap<String, String>) {
    let mut report = ApplyReport::default();
    let mut actions = BTreeMap::new();
    let mut messages: BTreeMap<String, String> = BTreeMap::new();

    for line in stream.lines().filter(|l| !l.trim().is_empty()) {
        let event: ApplyEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!("Skipping unparseable apply event: {}", e);
                continue;
            }
        };

        match (event.kind.as_str(), event.hook, event.changes, event.diagnostic) {
            ("apply_complete", Some(hook), _, _) => {
                if let Some(action) = hook.action {
                    actions.insert(hook.resource.addr.clone(), action);
                }
                report.completed.push(hook.resource.addr);
            }
            ("apply_errored", Some(hook), _, _) => {
                report.errored.push(ResourceFailure {
                    address: hook.resource.addr,
                    message: String::new(),
                });
            }
            ("change_summary", _, Some(counts), _) => {
                report.summary = Some(ApplySummary {
                    resources_created: counts.add,
                    resources_updated: counts.change,
                    resources_destroyed: counts.remove,
                });
            }
            ("diagnostic", _, _, Some(diag)) if diag.severity == "error" => {
                let text = if diag.detail.is_empty() {
                    diag.summary
                } else {
                    format!("{}: {}", diag.summary, diag.detail)
                };
                match diag.address {
                    Some(addr) => {
                        messages.insert(addr, text);
                    }
                    None => report.errors.push(text),
                }
            }
            _ => {}
        }
    }

    for failure in &mut report.errored {
        failure.message = messages
            .remove(&failure.address)
            .unwrap_or_else(|| "resource operation failed".to_string());
    }
    // Diagnostics naming a resource that never emitted an error hook.
    for (address, message) in messages {
        report.errored.push(ResourceFailure { address, message });
    }

    (report, actions)
}
