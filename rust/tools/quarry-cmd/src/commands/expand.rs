//! Expand command implementation

use anyhow::Result;
use quarry_query::{Expansion, Expression, QueryOptions, TermExpander};
use quarry_testkit::ShardFixture;
use serde::Serialize;

use crate::utils::{load_expression, load_options, load_shard};

#[derive(Serialize)]
struct ExpandSummary {
    original: String,
    expanded: String,
    expanded_regex_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    threshold_exceeded_fields: Vec<String>,
    expression: Expression,
}

pub fn run(shard: String, expression: String, options: Option<String>) -> Result<()> {
    let fixture = load_shard(&shard)?;
    let expression = load_expression(&expression)?;
    let options = load_options(options.as_deref())?;

    let summary = expand(&fixture, &expression, &options)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn expand(
    fixture: &ShardFixture,
    expression: &Expression,
    options: &QueryOptions,
) -> Result<ExpandSummary> {
    let (forward, reverse) = fixture.global_index();
    let Expansion {
        expression: expanded,
        threshold_exceeded_fields,
        expanded: expanded_regex_count,
    } = TermExpander::new(&fixture.metadata, options, Box::new(forward))
        .with_reverse(Box::new(reverse))
        .expand(expression)?;
    Ok(ExpandSummary {
        original: expression.to_string(),
        expanded: expanded.to_string(),
        expanded_regex_count,
        threshold_exceeded_fields: threshold_exceeded_fields.into_iter().collect(),
        expression: expanded,
    })
}

#[cfg(test)]
mod tests {
    use quarry_arithmetic::Normalizer;
    use quarry_planner::{FieldInfo, StaticMetadata};
    use quarry_query::{Expression, QueryOptions};
    use quarry_testkit::{DocumentFixture, ShardFixture};

    #[test]
    fn test_expand_summary() {
        let fixture = ShardFixture {
            row: "20240101_0".to_string(),
            metadata: StaticMetadata::builder()
                .field("CITY", FieldInfo::indexed(Normalizer::LowerCase))
                .build(),
            documents: vec![
                DocumentFixture::new("csv", "1").field("CITY", "Paris"),
                DocumentFixture::new("csv", "2").field("CITY", "Parma"),
                DocumentFixture::new("csv", "3").field("CITY", "Oslo"),
            ],
        };
        let summary = super::expand(
            &fixture,
            &Expression::regex("CITY", "par.*"),
            &QueryOptions::default(),
        )
        .unwrap();
        assert_eq!(summary.expanded_regex_count, 1);
        assert!(summary.threshold_exceeded_fields.is_empty());
        assert_eq!(
            summary.expression,
            Expression::or(vec![
                Expression::eq("CITY", "paris"),
                Expression::eq("CITY", "parma"),
            ])
        );

        let summary = super::expand(
            &fixture,
            &Expression::regex("CITY", "par.*"),
            &QueryOptions {
                value_expansion_threshold: 1,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(summary.threshold_exceeded_fields, vec!["CITY"]);
    }
}
