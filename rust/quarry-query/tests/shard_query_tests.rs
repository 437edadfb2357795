use std::sync::Arc;

use quarry_arithmetic::Normalizer;
use quarry_common::error::PlanningErrorCode;
use quarry_planner::{FieldInfo, StaticMetadata};
use quarry_query::{Expression, QueryOptions, QueryResult, ShardEnvironment, ShardQuery};
use quarry_testkit::{DocumentFixture, ShardFixture, dirs::memory_spill};

const ROW: &str = "20240101_0";

fn fixture() -> ShardFixture {
    ShardFixture {
        row: ROW.to_string(),
        metadata: StaticMetadata::builder()
            .field("COLOR", FieldInfo::indexed(Normalizer::LowerCase))
            .field("SHAPE", FieldInfo::indexed(Normalizer::Verbatim))
            .field("SIZE", FieldInfo::indexed(Normalizer::Number))
            .field("NOTE", FieldInfo::stored(Normalizer::Verbatim))
            .field("TAG", FieldInfo::indexed(Normalizer::Verbatim).index_only())
            .build(),
        documents: vec![
            DocumentFixture::new("csv", "d1")
                .field("COLOR", "Red")
                .field("COLOR", "Blue")
                .field("SHAPE", "round")
                .field("SIZE", "10")
                .field("NOTE", "first")
                .field("TAG", "alpha"),
            DocumentFixture::new("csv", "d2")
                .field("COLOR", "red")
                .field("SHAPE", "square")
                .field("SIZE", "20")
                .field("TAG", "beta"),
            DocumentFixture::new("json", "d3")
                .field("COLOR", "green")
                .field("SHAPE", "round")
                .field("SIZE", "30")
                .field("NOTE", "third"),
            DocumentFixture::new("json", "d4")
                .field("COLOR", "red")
                .field("SHAPE", "triangle")
                .label("SECRET"),
        ],
    }
}

fn environment(fixture: &ShardFixture) -> ShardEnvironment {
    ShardEnvironment::new(
        Arc::new(fixture.metadata.clone()),
        Arc::new(fixture.table()),
        memory_spill(),
    )
}

fn run(expression: Expression, options: QueryOptions) -> Vec<QueryResult> {
    let fixture = fixture();
    let query = ShardQuery::new(expression, environment(&fixture), options).unwrap();
    query
        .run(ROW)
        .unwrap()
        .matching()
        .collect::<quarry_common::Result<Vec<_>>>()
        .unwrap()
}

fn uids(results: &[QueryResult]) -> Vec<String> {
    results.iter().map(|r| r.key.pointer.uid.clone()).collect()
}

fn matching_uids(expression: Expression) -> Vec<String> {
    uids(&run(expression, QueryOptions::default()))
}

fn planning_error(expression: Expression, options: QueryOptions) -> PlanningErrorCode {
    let fixture = fixture();
    let query = ShardQuery::new(expression, environment(&fixture), options).unwrap();
    match query.run(ROW) {
        Ok(_) => panic!("expected a planning error"),
        Err(e) => e.planning_code().expect("planning error"),
    }
}

#[test]
fn test_single_term_and_intersection() {
    let fixture = ShardFixture {
        row: ROW.to_string(),
        metadata: StaticMetadata::builder()
            .field("COLOR", FieldInfo::indexed(Normalizer::Verbatim))
            .build(),
        documents: vec![
            DocumentFixture::new("csv", "D1").field("COLOR", "red").field("COLOR", "blue"),
            DocumentFixture::new("csv", "D2").field("COLOR", "red"),
        ],
    };
    let query = |expression| {
        let query =
            ShardQuery::new(expression, environment(&fixture), QueryOptions::default()).unwrap();
        let iter = query.run(ROW).unwrap();
        assert!(iter.is_fully_satisfied());
        uids(&iter.matching().map(Result::unwrap).collect::<Vec<_>>())
    };
    assert_eq!(query(Expression::eq("COLOR", "red")), vec!["D1", "D2"]);
    assert_eq!(
        query(Expression::and(vec![
            Expression::eq("COLOR", "red"),
            Expression::eq("COLOR", "blue"),
        ])),
        vec!["D1"]
    );
}

#[test]
fn test_normalized_lookup() {
    assert_eq!(matching_uids(Expression::eq("COLOR", "RED")), vec!["d1", "d2", "d4"]);
    assert_eq!(
        matching_uids(Expression::and(vec![
            Expression::eq("COLOR", "red"),
            Expression::eq("COLOR", "blue"),
        ])),
        vec!["d1"]
    );
}

#[test]
fn test_negation_filters_intersection() {
    let expr = Expression::and(vec![
        Expression::eq("COLOR", "red"),
        Expression::not(Expression::eq("SHAPE", "square")),
    ]);
    assert_eq!(matching_uids(expr), vec!["d1", "d4"]);

    let expr = Expression::and(vec![
        Expression::eq("COLOR", "red"),
        Expression::ne("SHAPE", "triangle"),
    ]);
    assert_eq!(matching_uids(expr), vec!["d1", "d2"]);
}

#[test]
fn test_union() {
    let expr = Expression::or(vec![
        Expression::eq("SHAPE", "round"),
        Expression::eq("COLOR", "green"),
    ]);
    assert_eq!(matching_uids(expr), vec!["d1", "d3"]);
}

#[test]
fn test_unindexed_field_falls_back_to_evaluation() {
    let fixture = fixture();
    let query = ShardQuery::new(
        Expression::eq("NOTE", "third"),
        environment(&fixture),
        QueryOptions::default(),
    )
    .unwrap();
    let iter = query.run(ROW).unwrap();
    assert!(!iter.is_fully_satisfied());
    assert_eq!(iter.plan(), "full scan");
    let results: Vec<QueryResult> = iter.map(Result::unwrap).collect();
    // Every document is a candidate; only one matches.
    assert_eq!(results.len(), 4);
    assert_eq!(
        uids(&results.into_iter().filter(|r| r.matched).collect::<Vec<_>>()),
        vec!["d3"]
    );

    let expr = Expression::and(vec![
        Expression::eq("COLOR", "red"),
        Expression::eq("NOTE", "first"),
    ]);
    assert_eq!(matching_uids(expr), vec!["d1"]);
}

#[test]
fn test_unknown_field_matches_nothing() {
    let expr = Expression::and(vec![
        Expression::eq("COLOR", "red"),
        Expression::eq("NO_SUCH_FIELD", "x"),
    ]);
    assert!(matching_uids(expr).is_empty());
}

#[test]
fn test_index_only_field() {
    let expr = Expression::and(vec![
        Expression::eq("TAG", "alpha"),
        Expression::eq("COLOR", "red"),
    ]);
    let results = run(expr, QueryOptions::default());
    assert_eq!(uids(&results), vec!["d1"]);
    // The attribute is not stored; it comes from the field index.
    let tags = results[0].document.values("TAG");
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].raw, "alpha");

    assert_eq!(matching_uids(Expression::delayed(Expression::eq("TAG", "beta"))), vec!["d2"]);
}

#[test]
fn test_index_only_field_in_full_scan() {
    let fixture = fixture();
    let query = ShardQuery::new(
        Expression::or(vec![Expression::eq("NOTE", "first"), Expression::eq("TAG", "beta")]),
        environment(&fixture),
        QueryOptions::default(),
    )
    .unwrap();
    let iter = query.run(ROW).unwrap();
    assert_eq!(iter.plan(), "full scan");
    let matched: Vec<QueryResult> = iter.matching().map(Result::unwrap).collect();
    assert_eq!(uids(&matched), vec!["d1", "d2"]);
    assert_eq!(matched[1].document.values("TAG")[0].raw, "beta");
}

#[test]
fn test_delayed_term_is_evaluated_only() {
    let fixture = fixture();
    let query = ShardQuery::new(
        Expression::delayed(Expression::eq("COLOR", "red")),
        environment(&fixture),
        QueryOptions::default(),
    )
    .unwrap();
    let iter = query.run(ROW).unwrap();
    assert!(!iter.is_fully_satisfied());
    let matched: Vec<QueryResult> = iter.matching().map(Result::unwrap).collect();
    assert_eq!(uids(&matched), vec!["d1", "d2", "d4"]);
}

#[test]
fn test_bounded_range() {
    let expr = Expression::bounded_range(vec![
        Expression::ge("SIZE", 15i64),
        Expression::le("SIZE", 30i64),
    ]);
    assert_eq!(matching_uids(expr), vec!["d2", "d3"]);

    let expr = Expression::and(vec![
        Expression::eq("SHAPE", "round"),
        Expression::bounded_range(vec![
            Expression::gt("SIZE", 5i64),
            Expression::lt("SIZE", 20i64),
        ]),
    ]);
    assert_eq!(matching_uids(expr), vec!["d1"]);
}

#[test]
fn test_prefix_regex() {
    let expr = Expression::regex("SHAPE", "r.*");
    assert_eq!(matching_uids(expr), vec!["d1", "d3"]);
    let expr = Expression::and(vec![
        Expression::regex("COLOR", "R.D"),
        Expression::not_regex("SHAPE", "sq.*"),
    ]);
    assert_eq!(matching_uids(expr), vec!["d1", "d4"]);
}

#[test]
fn test_hit_list() {
    let options = QueryOptions {
        hit_list: true,
        ..Default::default()
    };
    let expr = Expression::and(vec![
        Expression::eq("COLOR", "red"),
        Expression::eq("SHAPE", "round"),
        Expression::not(Expression::eq("SIZE", 99i64)),
    ]);
    let results = run(expr, options);
    assert_eq!(uids(&results), vec!["d1"]);
    let hits = results[0].hits.as_ref().unwrap();
    let mut fields: Vec<&str> = hits.iter().map(|h| h.field.as_str()).collect();
    fields.sort();
    assert_eq!(fields, vec!["COLOR", "SHAPE"]);
    assert!(hits.iter().any(|h| h.raw == "Red"));

    let without = run(Expression::eq("COLOR", "red"), QueryOptions::default());
    assert!(without[0].hits.is_none());
}

#[test]
fn test_label_filter() {
    let hidden = QueryOptions::from_option_map([
        ("filters", "label"),
        ("filter.label.authorizations", "OTHER"),
    ])
    .unwrap();
    assert_eq!(uids(&run(Expression::eq("COLOR", "red"), hidden)), vec!["d1", "d2"]);

    let visible = QueryOptions::from_option_map([
        ("filters", "label"),
        ("filter.label.authorizations", "SECRET"),
    ])
    .unwrap();
    assert_eq!(
        uids(&run(Expression::eq("COLOR", "red"), visible)),
        vec!["d1", "d2", "d4"]
    );
}

#[test]
fn test_field_label_hides_only_that_field() {
    let fixture = ShardFixture {
        row: ROW.to_string(),
        metadata: StaticMetadata::builder()
            .field("AAA", FieldInfo::stored(Normalizer::Verbatim))
            .field("COLOR", FieldInfo::indexed(Normalizer::LowerCase))
            .field("NOTE", FieldInfo::stored(Normalizer::Verbatim))
            .build(),
        documents: vec![
            DocumentFixture::new("csv", "d1")
                .field("AAA", "s")
                .field_label("AAA", "SECRET")
                .field("COLOR", "red")
                .field("NOTE", "x"),
        ],
    };
    let public = || QueryOptions::from_option_map([("filters", "label")]).unwrap();
    let query = |expression, options| {
        let query = ShardQuery::new(expression, environment(&fixture), options).unwrap();
        let iter = query.run(ROW).unwrap();
        uids(&iter.matching().map(Result::unwrap).collect::<Vec<_>>())
    };
    assert_eq!(query(Expression::eq("COLOR", "red"), public()), vec!["d1"]);
    assert_eq!(query(Expression::eq("NOTE", "x"), public()), vec!["d1"]);
    assert!(query(Expression::eq("AAA", "s"), public()).is_empty());
    assert_eq!(query(Expression::eq("AAA", "s"), QueryOptions::default()), vec!["d1"]);
}

#[test]
fn test_datatype_filter() {
    let options = QueryOptions::from_option_map([
        ("filters", "datatype"),
        ("filter.datatype.types", "json"),
    ])
    .unwrap();
    assert_eq!(uids(&run(Expression::eq("COLOR", "red"), options)), vec!["d4"]);
}

#[test]
fn test_planning_errors() {
    let options = QueryOptions::default;
    assert_eq!(
        planning_error(Expression::not(Expression::eq("COLOR", "red")), options()),
        PlanningErrorCode::NegationAtRoot
    );
    assert_eq!(
        planning_error(Expression::ne("COLOR", "red"), options()),
        PlanningErrorCode::NegationAtRoot
    );
    let excluded = QueryOptions {
        exclude_fields: ["COLOR".to_string()].into_iter().collect(),
        ..Default::default()
    };
    assert_eq!(
        planning_error(Expression::eq("COLOR", "red"), excluded),
        PlanningErrorCode::BlacklistedRoot
    );
    assert_eq!(
        planning_error(
            Expression::bounded_range(vec![
                Expression::ge("SIZE", 1i64),
                Expression::le("COLOR", "z"),
            ]),
            options()
        ),
        PlanningErrorCode::MultipleRanges
    );
    assert_eq!(
        planning_error(
            Expression::bounded_range(vec![Expression::ge("SIZE", 1i64)]),
            options()
        ),
        PlanningErrorCode::MultipleRanges
    );
    assert_eq!(
        planning_error(
            Expression::exceeded_value_threshold(Expression::eq("COLOR", "red")),
            options()
        ),
        PlanningErrorCode::UnexpectedSourceNode
    );
    assert_eq!(
        planning_error(Expression::regex("COLOR", "re(d"), options()),
        PlanningErrorCode::InvalidPattern
    );
}

#[test]
fn test_excluded_field_inside_conjunction() {
    let options = QueryOptions {
        exclude_fields: ["SHAPE".to_string()].into_iter().collect(),
        ..Default::default()
    };
    let expr = Expression::and(vec![
        Expression::eq("COLOR", "red"),
        Expression::eq("SHAPE", "round"),
    ]);
    assert_eq!(uids(&run(expr, options)), vec!["d1"]);
}
