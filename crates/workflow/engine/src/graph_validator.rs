//! Graph validator: reports structural defects in a definition
//!
//! Validation never mutates and never fails; it returns a report. Drafts
//! may be saved with issues, but `activate` requires a report without
//! error-severity issues.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use workflow_types::{StageId, ValidationIssue, ValidationReport, WorkflowDefinition};

pub mod codes {
    pub const NO_STAGES: &str = "no_stages";
    pub const DANGLING_TRANSITION: &str = "dangling_transition";
    pub const SELF_LOOP: &str = "self_loop";
    pub const NO_INCOMING_TRANSITIONS: &str = "no_incoming_transitions";
    pub const UNREACHABLE_STAGE: &str = "unreachable_stage";
    pub const MISSING_TERMINAL_STAGE: &str = "missing_terminal_stage";
    pub const DEAD_END_STAGE: &str = "dead_end_stage";
    pub const TRAP_CYCLE: &str = "trap_cycle";
    pub const LOOP_BACK: &str = "loop_back";
    pub const MULTIPLE_AUTOMATIC_TRANSITIONS: &str = "multiple_automatic_transitions";
}

/// Validates definition graphs
#[derive(Clone, Debug, Default)]
pub struct GraphValidator;

impl GraphValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, definition: &WorkflowDefinition) -> ValidationReport {
        let mut issues = Vec::new();

        if definition.stages.is_empty() {
            issues.push(ValidationIssue::error(
                codes::NO_STAGES,
                "definition has no stages",
            ));
            return ValidationReport::from_issues(issues);
        }

        let (graph, malformed) = StageGraph::build(definition);
        self.check_incoming(definition, &graph, &mut issues);
        self.check_terminals(definition, &graph, &mut issues);
        issues.extend(malformed);
        self.check_cycles(definition, &graph, &mut issues);
        self.check_automatic_fan_out(definition, &mut issues);

        let report = ValidationReport::from_issues(issues);
        tracing::debug!(
            definition_id = %definition.id,
            valid = report.valid,
            issues = report.issues.len(),
            "Definition validated"
        );
        report
    }

    /// Every non-initial stage needs an incoming edge and must be reachable
    fn check_incoming(
        &self,
        definition: &WorkflowDefinition,
        graph: &StageGraph,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let Some(initial) = definition.initial_stage() else {
            return;
        };
        let reachable = graph.reachable_from(initial.id);

        for stage in &definition.stages {
            if stage.id == initial.id {
                continue;
            }
            if !graph.has_incoming(stage.id) {
                issues.push(
                    ValidationIssue::error(
                        codes::NO_INCOMING_TRANSITIONS,
                        format!("stage '{}' has no incoming transitions", stage.name),
                    )
                    .referencing(stage.id.value()),
                );
            } else if !reachable.contains(&stage.id) {
                issues.push(
                    ValidationIssue::error(
                        codes::UNREACHABLE_STAGE,
                        format!(
                            "stage '{}' is unreachable from initial stage '{}'",
                            stage.name, initial.name
                        ),
                    )
                    .referencing(stage.id.value()),
                );
            }
        }
    }

    /// At least one terminal; terminals before the last stage end the workflow early
    fn check_terminals(
        &self,
        definition: &WorkflowDefinition,
        graph: &StageGraph,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let last_sequence = definition.stages.iter().map(|s| s.sequence).max();
        let terminals: Vec<_> = definition
            .stages
            .iter()
            .filter(|s| !graph.has_outgoing(s.id))
            .collect();

        if terminals.is_empty() {
            issues.push(ValidationIssue::error(
                codes::MISSING_TERMINAL_STAGE,
                "no stage without outgoing transitions; the workflow can never finish",
            ));
            return;
        }

        for stage in terminals {
            if Some(stage.sequence) != last_sequence {
                issues.push(
                    ValidationIssue::warning(
                        codes::DEAD_END_STAGE,
                        format!(
                            "stage '{}' (sequence {}) has no outgoing transitions and silently ends the workflow",
                            stage.name, stage.sequence
                        ),
                    )
                    .referencing(stage.id.value()),
                );
            }
        }
    }

    /// Cycles without a path to a terminal stage trap applications
    fn check_cycles(
        &self,
        definition: &WorkflowDefinition,
        graph: &StageGraph,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let terminals: Vec<StageId> = definition
            .stages
            .iter()
            .filter(|s| !graph.has_outgoing(s.id))
            .map(|s| s.id)
            .collect();
        let can_finish = graph.reaching(&terminals);

        for component in graph.cycles() {
            let names: Vec<&str> = component
                .iter()
                .filter_map(|id| definition.stage(*id).map(|s| s.name.as_str()))
                .collect();
            let anchor = component.iter().next().map(|id| id.value());
            let escapes = component.iter().any(|id| can_finish.contains(id));

            let issue = if escapes {
                ValidationIssue::info(
                    codes::LOOP_BACK,
                    format!("loop-back cycle through [{}]", names.join(", ")),
                )
            } else {
                ValidationIssue::warning(
                    codes::TRAP_CYCLE,
                    format!(
                        "deadlock risk: cycle through [{}] cannot reach a terminal stage",
                        names.join(", ")
                    ),
                )
            };
            issues.push(match anchor {
                Some(id) => issue.referencing(id),
                None => issue,
            });
        }
    }

    /// Only the lowest-id eligible automatic transition fires per entry
    fn check_automatic_fan_out(
        &self,
        definition: &WorkflowDefinition,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for stage in &definition.stages {
            let automatic = definition.automatic_outgoing(stage.id);
            if automatic.len() > 1 {
                issues.push(
                    ValidationIssue::warning(
                        codes::MULTIPLE_AUTOMATIC_TRANSITIONS,
                        format!(
                            "stage '{}' has {} automatic transitions; only the lowest-id eligible one fires",
                            stage.name,
                            automatic.len()
                        ),
                    )
                    .referencing(stage.id.value()),
                );
            }
        }
    }
}

/// Adjacency over well-formed transitions only
struct StageGraph {
    forward: BTreeMap<StageId, BTreeSet<StageId>>,
    backward: BTreeMap<StageId, BTreeSet<StageId>>,
    stages: Vec<StageId>,
}

impl StageGraph {
    /// Build adjacency; dangling references and self-loops are left out and returned as issues
    fn build(definition: &WorkflowDefinition) -> (Self, Vec<ValidationIssue>) {
        let mut issues = Vec::new();
        let known: HashSet<StageId> = definition.stage_ids();
        let mut graph = Self {
            forward: BTreeMap::new(),
            backward: BTreeMap::new(),
            stages: definition.stages.iter().map(|s| s.id).collect(),
        };

        for t in &definition.transitions {
            if !known.contains(&t.source) || !known.contains(&t.target) {
                issues.push(
                    ValidationIssue::error(
                        codes::DANGLING_TRANSITION,
                        format!(
                            "transition '{}' references a stage outside the definition",
                            t.name
                        ),
                    )
                    .referencing(t.id.value()),
                );
                continue;
            }
            if t.is_self_loop() {
                issues.push(
                    ValidationIssue::error(
                        codes::SELF_LOOP,
                        format!("transition '{}' loops back onto its source", t.name),
                    )
                    .referencing(t.id.value()),
                );
                continue;
            }
            graph.forward.entry(t.source).or_default().insert(t.target);
            graph.backward.entry(t.target).or_default().insert(t.source);
        }
        (graph, issues)
    }

    fn has_incoming(&self, id: StageId) -> bool {
        self.backward.get(&id).is_some_and(|s| !s.is_empty())
    }

    fn has_outgoing(&self, id: StageId) -> bool {
        self.forward.get(&id).is_some_and(|s| !s.is_empty())
    }

    fn reachable_from(&self, start: StageId) -> HashSet<StageId> {
        walk(&self.forward, &[start])
    }

    /// Stages from which any of `targets` can be reached
    fn reaching(&self, targets: &[StageId]) -> HashSet<StageId> {
        walk(&self.backward, targets)
    }

    /// Strongly connected components with more than one stage
    fn cycles(&self) -> Vec<BTreeSet<StageId>> {
        let reach: BTreeMap<StageId, HashSet<StageId>> = self
            .stages
            .iter()
            .map(|id| (*id, self.reachable_from(*id)))
            .collect();

        let mut assigned: HashSet<StageId> = HashSet::new();
        let mut components = Vec::new();
        for id in &self.stages {
            if assigned.contains(id) {
                continue;
            }
            let component: BTreeSet<StageId> = reach[id]
                .iter()
                .filter(|other| reach.get(*other).is_some_and(|r| r.contains(id)))
                .copied()
                .collect();
            assigned.extend(component.iter().copied());
            if component.len() > 1 {
                components.push(component);
            }
        }
        components
    }
}

fn walk(edges: &BTreeMap<StageId, BTreeSet<StageId>>, starts: &[StageId]) -> HashSet<StageId> {
    let mut seen: HashSet<StageId> = starts.iter().copied().collect();
    let mut queue: VecDeque<StageId> = starts.iter().copied().collect();
    while let Some(current) = queue.pop_front() {
        if let Some(next) = edges.get(&current) {
            for n in next {
                if seen.insert(*n) {
                    queue.push_back(*n);
                }
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_types::{
        ApplicationCategory, DefinitionId, Severity, Stage, Transition, TransitionId,
    };

    fn make_definition(stage_count: u64, edges: &[(u64, u64)]) -> WorkflowDefinition {
        let def_id = DefinitionId::new(1);
        let mut def = WorkflowDefinition::new(
            def_id,
            "Test",
            ApplicationCategory::new("undergraduate"),
            "admin",
        );
        for i in 1..=stage_count {
            def.stages
                .push(Stage::new(StageId::new(i), def_id, format!("S{}", i), i as u32));
        }
        for (n, (from, to)) in edges.iter().enumerate() {
            def.transitions.push(Transition::new(
                TransitionId::new(n as u64 + 1),
                def_id,
                StageId::new(*from),
                StageId::new(*to),
                format!("T{}", n + 1),
            ));
        }
        def
    }

    fn codes_of(report: &ValidationReport) -> Vec<&str> {
        report.issues.iter().map(|i| i.code.as_str()).collect()
    }

    #[test]
    fn test_linear_graph_is_valid() {
        let report = GraphValidator::new().validate(&make_definition(3, &[(1, 2), (2, 3)]));
        assert!(report.valid);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_empty_definition() {
        let report = GraphValidator::new().validate(&make_definition(0, &[]));
        assert!(!report.valid);
        assert_eq!(codes_of(&report), vec![codes::NO_STAGES]);
    }

    #[test]
    fn test_orphan_stage_has_no_incoming() {
        let report = GraphValidator::new().validate(&make_definition(3, &[(1, 2)]));
        assert!(!report.valid);
        let orphan = report
            .issues
            .iter()
            .find(|i| i.code == codes::NO_INCOMING_TRANSITIONS)
            .unwrap();
        assert_eq!(orphan.referenced_id, Some(3));
    }

    #[test]
    fn test_unreachable_island() {
        // 3 <-> 4 has incoming edges but no path from 1
        let report =
            GraphValidator::new().validate(&make_definition(4, &[(1, 2), (3, 4), (4, 3)]));
        assert!(!report.valid);
        assert!(report.has_code(codes::UNREACHABLE_STAGE));
        assert!(report.has_code(codes::TRAP_CYCLE));
    }

    #[test]
    fn test_missing_terminal() {
        let report = GraphValidator::new().validate(&make_definition(2, &[(1, 2), (2, 1)]));
        assert!(!report.valid);
        assert!(report.has_code(codes::MISSING_TERMINAL_STAGE));
        assert!(report.has_code(codes::TRAP_CYCLE));
    }

    #[test]
    fn test_early_terminal_is_a_warning() {
        // 1 -> 2 (dead end), 1 -> 3 (last)
        let report = GraphValidator::new().validate(&make_definition(3, &[(1, 2), (1, 3)]));
        assert!(report.valid);
        let warning = report.warnings().next().unwrap();
        assert_eq!(warning.code, codes::DEAD_END_STAGE);
        assert_eq!(warning.referenced_id, Some(2));
    }

    #[test]
    fn test_dangling_and_self_loop() {
        let report =
            GraphValidator::new().validate(&make_definition(2, &[(1, 2), (1, 9), (2, 2)]));
        assert!(!report.valid);
        assert!(report.has_code(codes::DANGLING_TRANSITION));
        assert!(report.has_code(codes::SELF_LOOP));
    }

    #[test]
    fn test_issues_follow_check_order() {
        // S3 has no incoming edge, 2 <-> 4 never finishes, T3 dangles
        let report = GraphValidator::new()
            .validate(&make_definition(4, &[(1, 2), (2, 4), (4, 9), (4, 2)]));
        assert_eq!(
            codes_of(&report),
            vec![
                codes::NO_INCOMING_TRANSITIONS,
                codes::DEAD_END_STAGE,
                codes::DANGLING_TRANSITION,
                codes::TRAP_CYCLE,
            ]
        );
    }

    #[test]
    fn test_loop_back_with_exit_is_info() {
        // 1 -> 2 -> 1 (rework), 2 -> 3
        let report =
            GraphValidator::new().validate(&make_definition(3, &[(1, 2), (2, 1), (2, 3)]));
        assert!(report.valid);
        let info = report
            .issues
            .iter()
            .find(|i| i.code == codes::LOOP_BACK)
            .unwrap();
        assert_eq!(info.severity, Severity::Info);
    }

    #[test]
    fn test_multiple_automatic_exits_warn() {
        let mut def = make_definition(3, &[(1, 2), (1, 3)]);
        for t in &mut def.transitions {
            t.is_automatic = true;
        }
        let report = GraphValidator::new().validate(&def);
        assert!(report.has_code(codes::MULTIPLE_AUTOMATIC_TRANSITIONS));
    }
}
