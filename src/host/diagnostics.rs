//! Startup self-check of host bindings.
//!
//! Resolves every type, method and field named in `HostBindings` and reports
//! pass/fail per binding, so a host whose internal shape has changed is
//! detected at attach time instead of as silent no-ops later.

use std::fmt;

use tracing::{info, warn};

use crate::accessor::{Accessor, MemberKind};
use crate::config::HostBindings;

/// One resolved (or unresolved) binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingCheck {
    pub type_name: String,
    /// `None` for the type itself.
    pub member: Option<String>,
    pub kind: Option<MemberKind>,
    pub passed: bool,
    pub error: Option<String>,
}

impl fmt::Display for BindingCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "ok" } else { "FAILED" };
        match &self.member {
            Some(member) => write!(f, "{}::{member} [{verdict}]", self.type_name)?,
            None => write!(f, "{} [{verdict}]", self.type_name)?,
        }
        if let Some(err) = &self.error {
            write!(f, ": {err}")?;
        }
        Ok(())
    }
}

/// Outcome of [`self_check`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelfCheckReport {
    pub checks: Vec<BindingCheck>,
}

impl SelfCheckReport {
    /// True when every binding resolved.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Bindings that failed to resolve.
    pub fn failures(&self) -> impl Iterator<Item = &BindingCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// Resolves every binding and reports per-binding results. Never fails.
pub fn self_check(accessor: &dyn Accessor, bindings: &HostBindings) -> SelfCheckReport {
    let b = bindings;
    let groups: [(&str, &str, Vec<(&str, MemberKind)>); 4] = [
        (
            b.session_namespace.as_str(),
            b.session_class.as_str(),
            vec![
                (b.session_instance_field.as_str(), MemberKind::Field),
                (b.session_name_method.as_str(), MemberKind::Method),
                (b.session_save_method.as_str(), MemberKind::Method),
            ],
        ),
        (
            b.snapshot_namespace.as_str(),
            b.snapshot_class.as_str(),
            vec![(b.snapshot_lock_field.as_str(), MemberKind::Field)],
        ),
        (
            b.async_save_namespace.as_str(),
            b.async_save_class.as_str(),
            vec![(b.async_save_method.as_str(), MemberKind::Method)],
        ),
        (
            b.game_stats_namespace.as_str(),
            b.game_stats_class.as_str(),
            vec![
                (b.game_stats_instance_method.as_str(), MemberKind::Method),
                (b.updates_per_second_field.as_str(), MemberKind::Field),
            ],
        ),
    ];

    let mut report = SelfCheckReport::default();
    for (namespace, class_name, members) in groups {
        let type_name = if namespace.is_empty() {
            class_name.to_string()
        } else {
            format!("{namespace}.{class_name}")
        };

        let ty = match accessor.resolve_type(namespace, class_name) {
            Ok(ty) => {
                report.checks.push(BindingCheck {
                    type_name: type_name.clone(),
                    member: None,
                    kind: None,
                    passed: true,
                    error: None,
                });
                ty
            }
            Err(e) => {
                report.checks.push(BindingCheck {
                    type_name: type_name.clone(),
                    member: None,
                    kind: None,
                    passed: false,
                    error: Some(e.to_string()),
                });
                // Members of an unresolved type cannot pass either.
                for (member, kind) in members {
                    report.checks.push(BindingCheck {
                        type_name: type_name.clone(),
                        member: Some(member.to_string()),
                        kind: Some(kind),
                        passed: false,
                        error: Some("declaring type unresolved".to_string()),
                    });
                }
                continue;
            }
        };

        for (member, kind) in members {
            let passed = accessor.has_member(&ty, member, kind);
            report.checks.push(BindingCheck {
                type_name: type_name.clone(),
                member: Some(member.to_string()),
                kind: Some(kind),
                passed,
                error: (!passed).then(|| format!("{kind:?} not found")),
            });
        }
    }

    if report.passed() {
        info!(bindings = report.checks.len(), "host binding self-check passed");
    } else {
        for failure in report.failures() {
            warn!(binding = %failure, "host binding self-check failed");
        }
    }
    report
}
