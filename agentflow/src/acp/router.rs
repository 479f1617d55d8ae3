//! Matches instructions to registered commands.

use super::{AcpCommandDescriptor, AcpCommandRegistry};
use std::cmp::Reverse;
use std::sync::Arc;

/// Routing decision for one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcpRoute {
    /// Hand the instruction to the model.
    NoMatch,
    /// Exactly one command matched.
    Single {
        /// The matched command.
        command_id: String,
        /// Parsed arguments.
        args: Vec<String>,
    },
    /// Several commands matched, best first.
    Multiple {
        /// Candidate ids in ranking order.
        candidates: Vec<String>,
    },
}

/// Trigger-prefix router over an [`AcpCommandRegistry`].
#[derive(Debug, Clone)]
pub struct AcpCommandRouter {
    registry: Arc<AcpCommandRegistry>,
}

struct Match {
    descriptor: AcpCommandDescriptor,
    trigger: String,
    args: Vec<String>,
}

impl AcpCommandRouter {
    /// Creates a router.
    #[must_use]
    pub fn new(registry: Arc<AcpCommandRegistry>) -> Self {
        Self { registry }
    }

    /// The backing registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<AcpCommandRegistry> {
        &self.registry
    }

    /// Routes `input`.
    ///
    /// A trigger must start the input and end on whitespace, punctuation
    /// or end of input. Arguments must parse, fall within the descriptor's
    /// bounds and pass every regex gate. Each command matches at most once.
    #[must_use]
    pub fn route(&self, input: &str) -> AcpRoute {
        let input = input.trim();
        if input.is_empty() {
            return AcpRoute::NoMatch;
        }

        let mut matches: Vec<Match> = self
            .registry
            .descriptors()
            .into_iter()
            .filter_map(|descriptor| {
                let (trigger, args) = descriptor.triggers.iter().find_map(|trigger| {
                    let remainder = strip_trigger(input, trigger, descriptor.case_insensitive)?;
                    let args = parse_args(remainder)?;
                    let in_bounds =
                        args.len() >= descriptor.min_args && args.len() <= descriptor.max_args;
                    let gated = descriptor.arg_rules.iter().all(|rule| rule.matches(&args));
                    (in_bounds && gated).then(|| (trigger.clone(), args))
                })?;
                Some(Match {
                    descriptor,
                    trigger,
                    args,
                })
            })
            .collect();

        matches.sort_by_cached_key(|m| {
            (
                Reverse(m.descriptor.priority),
                m.descriptor.command_id.to_ascii_lowercase(),
                Reverse(m.trigger.len()),
                m.trigger.to_ascii_lowercase(),
            )
        });

        match matches.len() {
            0 => AcpRoute::NoMatch,
            1 => {
                let m = matches.remove(0);
                AcpRoute::Single {
                    command_id: m.descriptor.command_id,
                    args: m.args,
                }
            }
            _ => AcpRoute::Multiple {
                candidates: matches
                    .into_iter()
                    .map(|m| m.descriptor.command_id)
                    .collect(),
            },
        }
    }
}

fn strip_trigger<'a>(input: &'a str, trigger: &str, case_insensitive: bool) -> Option<&'a str> {
    let trigger = trigger.trim();
    let head = input.get(..trigger.len())?;
    let starts = if case_insensitive {
        head.to_lowercase() == trigger.to_lowercase()
    } else {
        head == trigger
    };
    if !starts {
        return None;
    }

    let rest = &input[trigger.len()..];
    match rest.chars().next() {
        None => Some(""),
        Some(c) if c.is_whitespace() || c.is_ascii_punctuation() => Some(rest.trim()),
        Some(_) => None,
    }
}

/// Splits `text` into arguments.
///
/// Whitespace separates arguments; double quotes group; `\"` and `\\`
/// escape. Returns `None` for unbalanced quotes.
#[must_use]
pub fn parse_args(text: &str) -> Option<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some('"' | '\\')) => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }

    (!in_quotes).then_some(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acp::registry::tests::StaticCommand;
    use crate::acp::{AcpArgRule, AcpPriority};
    use pretty_assertions::assert_eq;

    fn router(descriptors: Vec<AcpCommandDescriptor>) -> AcpCommandRouter {
        let registry = AcpCommandRegistry::new();
        for d in descriptors {
            registry.register(Arc::new(StaticCommand(d))).unwrap();
        }
        AcpCommandRouter::new(Arc::new(registry))
    }

    fn mode() -> AcpCommandDescriptor {
        AcpCommandDescriptor::new("acp.mode", "Mode", "Change mode")
            .with_trigger("mode")
            .with_args(1, 1)
    }

    #[test]
    fn test_parse_args_quotes_and_escapes() {
        assert_eq!(
            parse_args(r#"one "two three" four\"s"#).unwrap(),
            vec!["one", "two three", "four\"s"]
        );
        assert_eq!(parse_args("  ").unwrap(), Vec::<String>::new());
        assert_eq!(parse_args(r#"a "b"#), None);
    }

    #[test]
    fn test_single_match_with_args() {
        let route = router(vec![mode()]).route("  MODE ddr ");
        assert_eq!(
            route,
            AcpRoute::Single {
                command_id: "acp.mode".into(),
                args: vec!["ddr".into()],
            }
        );
    }

    #[test]
    fn test_trigger_needs_boundary() {
        assert_eq!(router(vec![mode()]).route("model ddr"), AcpRoute::NoMatch);
    }

    #[test]
    fn test_unbalanced_quotes_do_not_match() {
        assert_eq!(router(vec![mode()]).route("mode \"ddr"), AcpRoute::NoMatch);
    }

    #[test]
    fn test_arg_count_gates() {
        let router = router(vec![mode()]);
        assert_eq!(router.route("mode"), AcpRoute::NoMatch);
        assert_eq!(router.route("mode a b"), AcpRoute::NoMatch);
    }

    #[test]
    fn test_regex_gates() {
        let gated = mode().with_arg_rule(AcpArgRule::new(0, "^(ddr|general)$", true).unwrap());
        let router = router(vec![gated]);
        assert!(matches!(router.route("mode DDR"), AcpRoute::Single { .. }));
        assert_eq!(router.route("mode other"), AcpRoute::NoMatch);
    }

    #[test]
    fn test_case_sensitive_trigger() {
        let router = router(vec![mode().case_sensitive()]);
        assert_eq!(router.route("MODE ddr"), AcpRoute::NoMatch);
        assert!(matches!(router.route("mode ddr"), AcpRoute::Single { .. }));
    }

    #[test]
    fn test_multiple_matches_rank_by_priority_then_id() {
        let router = router(vec![
            AcpCommandDescriptor::new("b.show", "Show", "d")
                .with_trigger("show")
                .with_args(0, 3),
            AcpCommandDescriptor::new("a.show", "Show", "d")
                .with_trigger("show")
                .with_args(0, 3),
            AcpCommandDescriptor::new("z.show", "Show", "d")
                .with_trigger("show")
                .with_args(0, 3)
                .with_priority(AcpPriority::High),
        ]);

        assert_eq!(
            router.route("show me"),
            AcpRoute::Multiple {
                candidates: vec!["z.show".into(), "a.show".into(), "b.show".into()],
            }
        );
    }

    #[test]
    fn test_empty_input_is_no_match() {
        assert_eq!(router(vec![mode()]).route("   "), AcpRoute::NoMatch);
    }
}
