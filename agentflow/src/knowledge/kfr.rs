use crate::context::{KfrEntry, KfrKind};
use std::fmt::Write as _;

const BEGIN: &str = "## BEGIN Known Facts Registry (KFR) \u{2014} Active Working Memory";
const END: &str = "## END Known Facts Registry (KFR) \u{2014} Active Working Memory";

const SECTIONS: [(KfrKind, &str); 5] = [
    (KfrKind::Goal, "### Goal (single)"),
    (KfrKind::Plan, "### Plan (single)"),
    (KfrKind::ActiveContract, "### ActiveContracts"),
    (KfrKind::Constraint, "### Constraints"),
    (KfrKind::OpenQuestion, "### OpenQuestions (RequiresResolution)"),
];

/// Renders the KFR block for a branch.
///
/// `None` means the branch has never been written and yields the compact
/// "none" template; an existing branch renders every section, listing
/// only active entries.
#[must_use]
pub fn render_kfr_block(entries: Option<&[KfrEntry]>) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(BEGIN);
    out.push_str("\n\nThese entries are authoritative for near-term correctness.\n");
    out.push_str("They may be replaced or removed at any time.\n\n");

    match entries {
        None => {
            out.push_str("For agent/session state, rely only on KFR.\n\n");
            for (_, heading) in SECTIONS {
                let _ = writeln!(out, "{heading} - none");
            }
        }
        Some(entries) => {
            out.push_str("Do not infer or assume facts outside this registry.\n\n");
            for (kind, heading) in SECTIONS {
                let _ = writeln!(out, "{heading}");
                let active: Vec<&KfrEntry> = entries
                    .iter()
                    .filter(|e| e.kind == kind && e.is_active)
                    .collect();
                if active.is_empty() {
                    out.push_str(" - no entries exist\n");
                } else {
                    for entry in active {
                        let _ = writeln!(out, "- {}", entry.value);
                    }
                }
                out.push('\n');
            }
        }
    }

    out.push_str(END);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_branch_renders_none_template() {
        let block = render_kfr_block(None);
        assert!(block.contains(BEGIN));
        assert!(block.contains("### Goal (single) - none"));
        assert!(block.contains("### OpenQuestions (RequiresResolution) - none"));
        assert!(block.trim_end().ends_with(END));
    }

    #[test]
    fn test_only_active_entries_are_rendered() {
        let entries = vec![
            KfrEntry::new(KfrKind::Goal, "Ship the parser"),
            KfrEntry::new(KfrKind::Constraint, "No new deps").inactive(),
        ];
        let block = render_kfr_block(Some(&entries));

        assert!(block.contains("### Goal (single)\n- Ship the parser\n"));
        assert!(!block.contains("No new deps"));
        assert!(block.contains("### Constraints\n - no entries exist\n"));
    }
}
