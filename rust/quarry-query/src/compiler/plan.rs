//! Planning: expression to [`PlanNode`] tree.
//!
//! Planning decides, per leaf, how the index can answer it, without touching
//! storage. NOT is resolved here: a negated subtree is planned as-is and
//! handed to the enclosing conjunction as an exclude.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use ahash::HashSet;
use quarry_arithmetic::Document;
use quarry_common::{
    Result,
    error::{Error, PlanningErrorCode},
};
use quarry_iterators::FieldPosting;
use quarry_planner::{LiteralRange, RangeOp, RegexAnalyzer, ShardMetadata, bounded_ranges};
use quarry_sorted_set::ExternalSortedSet;
use quarry_source::DocumentKey;

use crate::{
    expression::{Expression, Literal},
    options::QueryOptions,
};

/// A value range scan over one field, optionally filtered by a pattern the
/// values must fully match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RangePlan {
    pub range: LiteralRange,
    pub pattern: Option<String>,
}

impl RangePlan {
    pub fn field(&self) -> &str {
        self.range.field()
    }

    pub fn description(&self) -> String {
        match &self.pattern {
            Some(pattern) => format!("{} =~ '{pattern}'", self.field()),
            None => self.range.to_string(),
        }
    }

    pub fn into_ivarator(self) -> IvaratorPlan {
        if self.pattern.is_some() {
            IvaratorPlan::Regex(self)
        } else {
            IvaratorPlan::Range(self)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum IvaratorPlan {
    Regex(RangePlan),
    Range(RangePlan),
    List { field: String, values: Vec<String> },
}

impl IvaratorPlan {
    pub fn field(&self) -> &str {
        match self {
            IvaratorPlan::Regex(plan) | IvaratorPlan::Range(plan) => plan.field(),
            IvaratorPlan::List { field, .. } => field,
        }
    }

    pub fn pattern(&self) -> Option<&str> {
        match self {
            IvaratorPlan::Regex(plan) => plan.pattern.as_deref(),
            IvaratorPlan::Range(_) | IvaratorPlan::List { .. } => None,
        }
    }

    pub fn description(&self) -> String {
        match self {
            IvaratorPlan::Regex(plan) | IvaratorPlan::Range(plan) => plan.description(),
            IvaratorPlan::List { field, values } => format!("{field} in {} values", values.len()),
        }
    }
}

/// One node of the execution plan.
///
/// `Range` and `Ivarator` leaves exist only between planning and
/// resolution; resolution replaces them with `List`, `Set` or `Unresolved`.
pub(crate) enum PlanNode {
    And {
        includes: Vec<PlanNode>,
        excludes: Vec<PlanNode>,
    },
    Or {
        children: Vec<PlanNode>,
    },
    Term {
        field: String,
        value: String,
    },
    Range(RangePlan),
    Ivarator(IvaratorPlan),
    /// Streams postings without sorting; only with unsorted document ids.
    Unsorted(RangePlan),
    List {
        entries: BTreeMap<DocumentKey, Document>,
        description: String,
    },
    Set {
        set: ExternalSortedSet<FieldPosting>,
        description: String,
    },
    /// An ivarator whose population is still running.
    Pending(usize),
    /// Matches nothing.
    Empty {
        description: String,
    },
    /// Cannot be answered from the index; left to final evaluation.
    Unresolved {
        description: String,
    },
}

impl PlanNode {
    fn unresolved(description: impl Into<String>) -> PlanNode {
        PlanNode::Unresolved {
            description: description.into(),
        }
    }

    fn empty(description: impl Into<String>) -> PlanNode {
        PlanNode::Empty {
            description: description.into(),
        }
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, name: &str, parts: &[String]) -> fmt::Result {
            write!(f, "{name}({})", parts.join(", "))
        }
        match self {
            PlanNode::And { includes, excludes } => {
                let parts: Vec<String> = includes
                    .iter()
                    .map(ToString::to_string)
                    .chain(excludes.iter().map(|e| format!("!{e}")))
                    .collect();
                list(f, "AND", &parts)
            }
            PlanNode::Or { children } => {
                let parts: Vec<String> = children.iter().map(ToString::to_string).collect();
                list(f, "OR", &parts)
            }
            PlanNode::Term { field, value } => write!(f, "{field} == {value:?}"),
            PlanNode::Range(plan) => write!(f, "range({})", plan.description()),
            PlanNode::Ivarator(plan) => write!(f, "ivarator({})", plan.description()),
            PlanNode::Unsorted(plan) => write!(f, "unsorted({})", plan.description()),
            PlanNode::List {
                entries,
                description,
            } => write!(f, "list({description}, {} docs)", entries.len()),
            PlanNode::Set { description, .. } => write!(f, "set({description})"),
            PlanNode::Pending(id) => write!(f, "pending#{id}"),
            PlanNode::Empty { description } => write!(f, "empty({description})"),
            PlanNode::Unresolved { description } => write!(f, "unresolved({description})"),
        }
    }
}

/// A planned subtree and the side of the enclosing conjunction it lands on.
enum Planned {
    Include(PlanNode),
    Exclude(PlanNode),
}

impl Planned {
    fn negate(self) -> Planned {
        match self {
            Planned::Include(node) => Planned::Exclude(node),
            Planned::Exclude(node) => Planned::Include(node),
        }
    }
}

/// Children collected for one AND or OR.
#[derive(Default)]
struct BuildScope {
    includes: Vec<PlanNode>,
    excludes: Vec<PlanNode>,
    seen: HashSet<(bool, String, String)>,
}

impl BuildScope {
    fn push(&mut self, node: PlanNode, negated: bool) {
        if let PlanNode::Term { field, value } = &node {
            if !self.seen.insert((negated, field.clone(), value.clone())) {
                log::trace!("dropping duplicate term {field} == {value:?}");
                return;
            }
        }
        if negated {
            self.excludes.push(node);
        } else {
            self.includes.push(node);
        }
    }
}

pub(crate) struct Planner<'a> {
    metadata: &'a dyn ShardMetadata,
    options: &'a QueryOptions,
}

impl<'a> Planner<'a> {
    pub fn new(metadata: &'a dyn ShardMetadata, options: &'a QueryOptions) -> Planner<'a> {
        Planner { metadata, options }
    }

    /// Plans `expression` as the root of a query.
    ///
    /// # Errors
    ///
    /// A planning error when the root is a negation or a single term on a
    /// blacklisted field, or when a marker node is malformed.
    pub fn plan(&self, expression: &Expression) -> Result<PlanNode> {
        if let Some(field) = expression.field() {
            if self.options.is_field_blacklisted(field) {
                return Err(Error::planning(
                    PlanningErrorCode::BlacklistedRoot,
                    format!("the only term of the query uses excluded field {field}"),
                ));
            }
        }
        match self.plan_node(expression)? {
            Planned::Include(node) => Ok(node),
            Planned::Exclude(_) => Err(Error::planning(
                PlanningErrorCode::NegationAtRoot,
                format!("the query is a pure negation: {expression}"),
            )),
        }
    }

    fn plan_node(&self, expression: &Expression) -> Result<Planned> {
        let planned = match expression {
            Expression::And { children } => Planned::Include(self.plan_and(children)?),
            Expression::Or { children } => Planned::Include(self.plan_or(children)?),
            Expression::Not { child } => self.plan_node(child)?.negate(),
            Expression::Eq { field, value } => Planned::Include(self.plan_term(field, value)),
            Expression::Ne { field, value } => Planned::Exclude(self.plan_term(field, value)),
            Expression::Lt { .. }
            | Expression::Le { .. }
            | Expression::Gt { .. }
            | Expression::Ge { .. } => Planned::Include(PlanNode::unresolved(expression.to_string())),
            Expression::Regex { field, pattern } => {
                Planned::Include(self.plan_regex(field, pattern)?)
            }
            Expression::NotRegex { field, pattern } => {
                Planned::Exclude(self.plan_regex(field, pattern)?)
            }
            Expression::BoundedRange { children } => {
                Planned::Include(self.plan_bounded_range(children)?)
            }
            Expression::ExceededValueThreshold { child } => {
                Planned::Include(self.plan_exceeded_value(child)?)
            }
            Expression::ExceededOrThreshold { field, values } => {
                Planned::Include(self.plan_value_list(field, values))
            }
            Expression::Delayed { child } => match child.as_ref() {
                Expression::Eq { field, .. } if self.metadata.is_index_only(field) => {
                    self.plan_node(child)?
                }
                _ => Planned::Include(PlanNode::unresolved(child.to_string())),
            },
        };
        Ok(planned)
    }

    fn plan_and(&self, children: &[Expression]) -> Result<PlanNode> {
        let mut scope = BuildScope::default();
        for child in children {
            match self.plan_node(child)? {
                Planned::Include(PlanNode::And { includes, excludes }) => {
                    includes.into_iter().for_each(|n| scope.push(n, false));
                    excludes.into_iter().for_each(|n| scope.push(n, true));
                }
                Planned::Include(node) => scope.push(node, false),
                Planned::Exclude(node) => scope.push(node, true),
            }
        }
        if scope.includes.len() == 1 && scope.excludes.is_empty() {
            return Ok(scope.includes.swap_remove(0));
        }
        if scope.includes.is_empty() && scope.excludes.is_empty() {
            return Ok(PlanNode::unresolved("empty conjunction"));
        }
        Ok(PlanNode::And {
            includes: scope.includes,
            excludes: scope.excludes,
        })
    }

    fn plan_or(&self, children: &[Expression]) -> Result<PlanNode> {
        let mut scope = BuildScope::default();
        for child in children {
            match self.plan_node(child)? {
                Planned::Include(PlanNode::Or { children }) => {
                    children.into_iter().for_each(|n| scope.push(n, false));
                }
                Planned::Include(node) => scope.push(node, false),
                Planned::Exclude(_) => {
                    log::debug!("negated branch {child} of a union cannot be driven by the index");
                    scope.push(PlanNode::unresolved(child.to_string()), false);
                }
            }
        }
        match scope.includes.len() {
            0 => Ok(PlanNode::empty("empty disjunction")),
            1 => Ok(scope.includes.swap_remove(0)),
            _ => Ok(PlanNode::Or {
                children: scope.includes,
            }),
        }
    }

    /// Returns the leaf to use instead of an index lookup when `field` cannot
    /// be looked up.
    fn gate(&self, field: &str, description: impl FnOnce() -> String) -> Option<PlanNode> {
        if !self.options.is_field_allowed(field) {
            log::debug!("{field} is excluded from index lookups");
            return Some(PlanNode::unresolved(description()));
        }
        if !self.metadata.is_known(field) {
            return Some(PlanNode::empty(description()));
        }
        if !self.metadata.is_indexed(field) {
            return Some(PlanNode::unresolved(description()));
        }
        None
    }

    fn plan_term(&self, field: &str, value: &Literal) -> PlanNode {
        let description = || format!("{field} == {value}");
        let Some(text) = value.index_text() else {
            return PlanNode::unresolved(description());
        };
        if let Some(node) = self.gate(field, description) {
            return node;
        }
        match self.metadata.normalizer(field).normalize(&text) {
            Ok(normalized) => PlanNode::Term {
                field: field.to_string(),
                value: normalized,
            },
            Err(e) => {
                log::debug!("cannot normalize {text:?} for {field}: {e}");
                PlanNode::unresolved(description())
            }
        }
    }

    fn plan_regex(&self, field: &str, pattern: &str) -> Result<PlanNode> {
        RegexAnalyzer::new(pattern)?;
        let description = || format!("{field} =~ '{pattern}'");
        if let Some(node) = self.gate(field, description) {
            return Ok(node);
        }
        let normalized = match self.metadata.normalizer(field).normalize_regex(pattern) {
            Ok(normalized) => normalized,
            Err(e) => {
                log::debug!("{e}");
                return Ok(PlanNode::unresolved(description()));
            }
        };
        let analyzer = RegexAnalyzer::new(&normalized)?;
        let prefix = analyzer.leading_literal();
        if let (true, Some(literal)) = (analyzer.is_literal(), prefix) {
            return Ok(PlanNode::Term {
                field: field.to_string(),
                value: literal.to_string(),
            });
        }
        let range = match prefix {
            Some(prefix) => LiteralRange::for_prefix(field, prefix),
            None => LiteralRange::new(field),
        };
        let plan = RangePlan {
            range,
            pattern: Some(normalized.clone()),
        };
        if prefix.is_some() {
            Ok(PlanNode::Range(plan))
        } else {
            Ok(self.ivarator(IvaratorPlan::Regex(plan)))
        }
    }

    fn plan_bounded_range(&self, children: &[Expression]) -> Result<PlanNode> {
        let mut terms = Vec::with_capacity(children.len());
        for child in children {
            let term = match child {
                Expression::Lt { field, value } => (field.as_str(), RangeOp::Lt, value),
                Expression::Le { field, value } => (field.as_str(), RangeOp::Le, value),
                Expression::Gt { field, value } => (field.as_str(), RangeOp::Gt, value),
                Expression::Ge { field, value } => (field.as_str(), RangeOp::Ge, value),
                other => {
                    return Err(Error::planning(
                        PlanningErrorCode::UnexpectedSourceNode,
                        format!("a bounded range may only hold comparisons, found {other}"),
                    ));
                }
            };
            terms.push(term);
        }
        let description = || Expression::bounded_range(children.to_vec()).to_string();
        let Some(&(field, _, _)) = terms.first() else {
            return Err(Error::planning(
                PlanningErrorCode::MultipleRanges,
                "a bounded range needs a lower and an upper bound",
            ));
        };
        if terms.iter().any(|(f, _, _)| *f != field) {
            return Err(Error::planning(
                PlanningErrorCode::MultipleRanges,
                format!("bounded range spans several fields: {}", description()),
            ));
        }
        let has_lower = terms
            .iter()
            .any(|(_, op, _)| matches!(op, RangeOp::Gt | RangeOp::Ge));
        let has_upper = terms
            .iter()
            .any(|(_, op, _)| matches!(op, RangeOp::Lt | RangeOp::Le));
        if !has_lower || !has_upper {
            return Err(Error::planning(
                PlanningErrorCode::MultipleRanges,
                format!("bounded range is open: {}", description()),
            ));
        }

        if let Some(node) = self.gate(field, description) {
            return Ok(node);
        }
        let normalizer = self.metadata.normalizer(field);
        let mut normalized = Vec::with_capacity(terms.len());
        for (_, op, value) in &terms {
            let Some(text) = value.index_text() else {
                return Ok(PlanNode::unresolved(description()));
            };
            match normalizer.normalize(&text) {
                Ok(bound) => normalized.push((*op, bound)),
                Err(e) => {
                    log::debug!("cannot normalize range bound {text:?} for {field}: {e}");
                    return Ok(PlanNode::unresolved(description()));
                }
            }
        }
        let mut ranges =
            bounded_ranges(normalized.iter().map(|(op, bound)| (field, *op, bound.as_str())));
        let Some(range) = ranges.pop() else {
            return Ok(PlanNode::unresolved(description()));
        };
        if range.is_empty() {
            return Ok(PlanNode::empty(range.to_string()));
        }
        Ok(PlanNode::Range(RangePlan {
            range,
            pattern: None,
        }))
    }

    fn plan_exceeded_value(&self, child: &Expression) -> Result<PlanNode> {
        let node = match child {
            Expression::Regex { field, pattern } => self.plan_regex(field, pattern)?,
            Expression::BoundedRange { children } => self.plan_bounded_range(children)?,
            other => {
                return Err(Error::planning(
                    PlanningErrorCode::UnexpectedSourceNode,
                    format!("exceeded value threshold marker cannot wrap {other}"),
                ));
            }
        };
        Ok(match node {
            PlanNode::Range(plan) => self.ivarator(plan.into_ivarator()),
            other => other,
        })
    }

    fn plan_value_list(&self, field: &str, values: &[String]) -> PlanNode {
        let description = || format!("{field} in {} values", values.len());
        if let Some(node) = self.gate(field, description) {
            return node;
        }
        let normalizer = self.metadata.normalizer(field);
        let normalized: BTreeSet<String> = values
            .iter()
            .filter_map(|value| match normalizer.normalize(value) {
                Ok(normalized) => Some(normalized),
                Err(e) => {
                    log::debug!("dropping {value:?} from the {field} value list: {e}");
                    None
                }
            })
            .collect();
        if normalized.is_empty() {
            return PlanNode::empty(description());
        }
        self.ivarator(IvaratorPlan::List {
            field: field.to_string(),
            values: normalized.into_iter().collect(),
        })
    }

    /// With unsorted document ids an ivarator is replaced by a streaming
    /// leaf (or a union of terms for a value list).
    fn ivarator(&self, plan: IvaratorPlan) -> PlanNode {
        if self.options.sorted_uids {
            return PlanNode::Ivarator(plan);
        }
        match plan {
            IvaratorPlan::Regex(plan) | IvaratorPlan::Range(plan) => PlanNode::Unsorted(plan),
            IvaratorPlan::List { field, values } => PlanNode::Or {
                children: values
                    .into_iter()
                    .map(|value| PlanNode::Term {
                        field: field.clone(),
                        value,
                    })
                    .collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use quarry_arithmetic::Normalizer;
    use quarry_planner::{FieldInfo, StaticMetadata};

    use super::*;

    fn metadata() -> StaticMetadata {
        StaticMetadata::builder()
            .field("COLOR", FieldInfo::indexed(Normalizer::LowerCase))
            .field("AGE", FieldInfo::indexed(Normalizer::Number))
            .field("NOTE", FieldInfo::stored(Normalizer::Verbatim))
            .field("BODY", FieldInfo::indexed(Normalizer::Verbatim).index_only())
            .build()
    }

    fn plan_with(expression: &Expression, options: &QueryOptions) -> Result<String> {
        let metadata = metadata();
        Planner::new(&metadata, options)
            .plan(expression)
            .map(|node| node.to_string())
    }

    fn plan(expression: &Expression) -> Result<String> {
        plan_with(expression, &QueryOptions::default())
    }

    fn code(result: Result<String>) -> Option<PlanningErrorCode> {
        result.err().and_then(|e| e.planning_code())
    }

    #[test]
    fn test_terms_and_negation() {
        let expr = Expression::and([
            Expression::eq("COLOR", "Red"),
            Expression::ne("COLOR", "blue"),
            Expression::eq("NOTE", "x"),
            Expression::eq("MISSING", "x"),
        ]);
        assert_eq!(
            plan(&expr).unwrap(),
            "AND(COLOR == \"red\", unresolved(NOTE == 'x'), empty(MISSING == 'x'), !COLOR == \"blue\")"
        );
    }

    #[test]
    fn test_de_morgan() {
        let expr = Expression::and([
            Expression::eq("COLOR", "red"),
            Expression::not(Expression::or([
                Expression::eq("COLOR", "blue"),
                Expression::eq("COLOR", "green"),
            ])),
        ]);
        assert_eq!(
            plan(&expr).unwrap(),
            "AND(COLOR == \"red\", !OR(COLOR == \"blue\", COLOR == \"green\"))"
        );
        let double = Expression::not(Expression::not(Expression::eq("COLOR", "red")));
        assert_eq!(plan(&double).unwrap(), "COLOR == \"red\"");
    }

    #[test]
    fn test_duplicates_compiled_once() {
        let expr = Expression::and([
            Expression::eq("COLOR", "red"),
            Expression::and([Expression::eq("COLOR", "RED"), Expression::eq("COLOR", "blue")]),
        ]);
        assert_eq!(
            plan(&expr).unwrap(),
            "AND(COLOR == \"red\", COLOR == \"blue\")"
        );
    }

    #[test]
    fn test_negated_branch_of_union() {
        let expr = Expression::or([
            Expression::eq("COLOR", "red"),
            Expression::ne("COLOR", "blue"),
        ]);
        assert_eq!(
            plan(&expr).unwrap(),
            "OR(COLOR == \"red\", unresolved(COLOR != 'blue'))"
        );
    }

    #[test]
    fn test_regex_dispatch() {
        assert_eq!(
            plan(&Expression::regex("COLOR", "Re.*")).unwrap(),
            "range(COLOR =~ 're.*')"
        );
        assert_eq!(
            plan(&Expression::regex("COLOR", ".*ed")).unwrap(),
            "ivarator(COLOR =~ '.*ed')"
        );
        assert_eq!(
            plan(&Expression::regex("COLOR", "red")).unwrap(),
            "COLOR == \"red\""
        );
        assert_eq!(
            plan(&Expression::regex("AGE", "1.*")).unwrap(),
            "unresolved(AGE =~ '1.*')"
        );
        assert_eq!(
            code(plan(&Expression::regex("COLOR", "re("))),
            Some(PlanningErrorCode::InvalidPattern)
        );
        let unsorted = QueryOptions {
            sorted_uids: false,
            ..Default::default()
        };
        assert_eq!(
            plan_with(&Expression::regex("COLOR", ".*ed"), &unsorted).unwrap(),
            "unsorted(COLOR =~ '.*ed')"
        );
    }

    #[test]
    fn test_bounded_range() {
        let range = Expression::bounded_range([Expression::gt("AGE", 10), Expression::le("AGE", 20)]);
        let planned = plan(&range).unwrap();
        assert!(planned.starts_with("range("), "{planned}");
        assert!(plan(&Expression::exceeded_value_threshold(range)).unwrap().starts_with("ivarator("));

        let open = Expression::bounded_range([Expression::gt("AGE", 10)]);
        assert_eq!(code(plan(&open)), Some(PlanningErrorCode::MultipleRanges));
        let two_fields = Expression::bounded_range([
            Expression::gt("AGE", 10),
            Expression::lt("COLOR", "z"),
        ]);
        assert_eq!(code(plan(&two_fields)), Some(PlanningErrorCode::MultipleRanges));
        let not_comparison = Expression::bounded_range([Expression::eq("AGE", 1)]);
        assert_eq!(
            code(plan(&not_comparison)),
            Some(PlanningErrorCode::UnexpectedSourceNode)
        );
        let inverted = Expression::bounded_range([Expression::gt("AGE", 20), Expression::lt("AGE", 10)]);
        assert!(plan(&inverted).unwrap().starts_with("empty("));
    }

    #[test]
    fn test_markers() {
        let bad = Expression::exceeded_value_threshold(Expression::eq("COLOR", "red"));
        assert_eq!(code(plan(&bad)), Some(PlanningErrorCode::UnexpectedSourceNode));
        assert_eq!(
            plan(&Expression::exceeded_or_threshold("COLOR", ["Red", "blue", "red"])).unwrap(),
            "ivarator(COLOR in 2 values)"
        );
        assert_eq!(
            plan(&Expression::and([
                Expression::eq("COLOR", "red"),
                Expression::delayed(Expression::eq("COLOR", "blue")),
                Expression::delayed(Expression::eq("BODY", "text")),
            ]))
            .unwrap(),
            "AND(COLOR == \"red\", unresolved(COLOR == 'blue'), BODY == \"text\")"
        );
        assert_eq!(
            plan(&Expression::and([
                Expression::eq("COLOR", "red"),
                Expression::lt("AGE", 3)
            ]))
            .unwrap(),
            "AND(COLOR == \"red\", unresolved(AGE < 3))"
        );
    }

    #[test]
    fn test_root_errors() {
        assert_eq!(
            code(plan(&Expression::ne("COLOR", "red"))),
            Some(PlanningErrorCode::NegationAtRoot)
        );
        assert_eq!(
            code(plan(&Expression::not(Expression::and([
                Expression::eq("COLOR", "red"),
                Expression::eq("AGE", 1),
            ])))),
            Some(PlanningErrorCode::NegationAtRoot)
        );
        let options = QueryOptions {
            exclude_fields: ["COLOR".to_string()].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(
            code(plan_with(&Expression::eq("COLOR", "red"), &options)),
            Some(PlanningErrorCode::BlacklistedRoot)
        );
        let nested = Expression::and([Expression::eq("COLOR", "red"), Expression::eq("AGE", 1)]);
        assert!(plan_with(&nested, &options).unwrap().contains("unresolved(COLOR == 'red')"));
    }
}
