//! Query command implementation

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use anyhow::{Context, Result};
use quarry_common::ScanBudget;
use quarry_query::{Expression, QueryOptions, QueryResult, ShardEnvironment, ShardQuery};
use quarry_testkit::{ShardFixture, dirs};
use serde::Serialize;

use crate::utils::{load_expression, load_options, load_shard};

pub struct QueryArgs {
    pub shard: String,
    pub expression: String,
    pub options: Option<String>,
    pub matching_only: bool,
    pub plan: bool,
    pub spill_to_disk: bool,
}

#[derive(Serialize)]
struct PlanSummary {
    row: String,
    expression: String,
    plan: String,
    fully_satisfied: bool,
    ivarator_count: usize,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    threshold_exceeded_fields: BTreeSet<String>,
}

#[derive(Serialize)]
struct QuerySummary {
    row: String,
    plan: String,
    fully_satisfied: bool,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    threshold_exceeded_fields: BTreeSet<String>,
    candidates: usize,
    matched: usize,
    documents: Vec<DocumentInfo>,
}

#[derive(Serialize)]
struct DocumentInfo {
    datatype: String,
    uid: String,
    matched: bool,
    fields: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hits: Option<Vec<String>>,
}

impl From<QueryResult> for DocumentInfo {
    fn from(result: QueryResult) -> DocumentInfo {
        let mut fields = BTreeMap::<String, Vec<String>>::new();
        for tuple in result.document.tuples() {
            fields
                .entry(tuple.field.clone())
                .or_default()
                .push(tuple.raw.clone());
        }
        DocumentInfo {
            datatype: result.key.pointer.datatype,
            uid: result.key.pointer.uid,
            matched: result.matched,
            fields,
            hits: result.hits.map(|hits| {
                hits.into_iter()
                    .map(|hit| format!("{}:{}", hit.field, hit.raw))
                    .collect()
            }),
        }
    }
}

pub fn run(args: QueryArgs) -> Result<()> {
    let fixture = load_shard(&args.shard)?;
    let expression = load_expression(&args.expression)?;
    let options = load_options(args.options.as_deref())?;

    // Holds the spill directory until the query is done.
    let (_spill_dir, spill) = if args.spill_to_disk {
        let (dir, spill) = dirs::temp_spill()?;
        (Some(dir), spill)
    } else {
        (None, dirs::memory_spill())
    };
    let env = ShardEnvironment::new(
        Arc::new(fixture.metadata.clone()),
        Arc::new(fixture.table()),
        spill,
    );

    let json = if args.plan {
        serde_json::to_string_pretty(&plan(&fixture, expression, env, options)?)?
    } else {
        let summary = query(&fixture, expression, env, options, args.matching_only)?;
        serde_json::to_string_pretty(&summary)?
    };
    println!("{json}");
    Ok(())
}

fn plan(
    fixture: &ShardFixture,
    expression: Expression,
    env: ShardEnvironment,
    options: QueryOptions,
) -> Result<PlanSummary> {
    let query = ShardQuery::new(expression, env, options)?;
    let compiled = query
        .compile(&fixture.row, &ScanBudget::unlimited())
        .with_context(|| format!("Failed to compile query for row {}", fixture.row))?;
    Ok(PlanSummary {
        row: fixture.row.clone(),
        expression: query.expression().to_string(),
        plan: compiled.describe(),
        fully_satisfied: compiled.fully_satisfied,
        ivarator_count: compiled.ivarator_count,
        threshold_exceeded_fields: compiled.threshold_exceeded_fields.clone(),
    })
}

fn query(
    fixture: &ShardFixture,
    expression: Expression,
    env: ShardEnvironment,
    options: QueryOptions,
    matching_only: bool,
) -> Result<QuerySummary> {
    let query = ShardQuery::new(expression, env, options)?;
    let mut results = query
        .run(&fixture.row)
        .with_context(|| format!("Failed to run query over row {}", fixture.row))?;
    let plan = results.plan().to_string();
    let fully_satisfied = results.is_fully_satisfied();
    let threshold_exceeded_fields = results.threshold_exceeded_fields().clone();

    let mut candidates = 0;
    let mut matched = 0;
    let mut documents = Vec::new();
    for result in results.by_ref() {
        let result = result?;
        candidates += 1;
        if result.matched {
            matched += 1;
        } else if matching_only {
            continue;
        }
        documents.push(DocumentInfo::from(result));
    }

    Ok(QuerySummary {
        row: fixture.row.clone(),
        plan,
        fully_satisfied,
        threshold_exceeded_fields,
        candidates,
        matched,
        documents,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quarry_query::{Expression, QueryOptions, ShardEnvironment};
    use quarry_testkit::{ShardFixture, dirs};

    const FIXTURE: &str = r#"{
        "row": "20240101_0",
        "metadata": {
            "fields": {
                "COLOR": { "indexed": true, "normalizer": "lower_case" },
                "NOTE": { "normalizer": "verbatim" }
            }
        },
        "documents": [
            { "datatype": "csv", "uid": "a", "fields": { "COLOR": ["Red"], "NOTE": ["x"] } },
            { "datatype": "csv", "uid": "b", "fields": { "COLOR": ["blue"], "NOTE": ["y"] } },
            { "datatype": "csv", "uid": "c", "fields": { "COLOR": ["red"], "NOTE": ["y"] } }
        ]
    }"#;

    fn env(fixture: &ShardFixture) -> ShardEnvironment {
        ShardEnvironment::new(
            Arc::new(fixture.metadata.clone()),
            Arc::new(fixture.table()),
            dirs::memory_spill(),
        )
    }

    #[test]
    fn test_query_summary() {
        let fixture = ShardFixture::from_json(FIXTURE).unwrap();
        let expression = Expression::and(vec![
            Expression::eq("COLOR", "red"),
            Expression::eq("NOTE", "y"),
        ]);
        let summary = super::query(
            &fixture,
            expression,
            env(&fixture),
            QueryOptions::default(),
            true,
        )
        .unwrap();
        assert_eq!(summary.candidates, 2);
        assert_eq!(summary.matched, 1);
        assert!(!summary.fully_satisfied);
        assert_eq!(summary.documents.len(), 1);
        assert_eq!(summary.documents[0].uid, "c");
        assert_eq!(summary.documents[0].fields["NOTE"], vec!["y"]);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["documents"][0]["datatype"], "csv");
        assert!(json["documents"][0].get("hits").is_none());
    }

    #[test]
    fn test_plan_summary() {
        let fixture = ShardFixture::from_json(FIXTURE).unwrap();
        let summary = super::plan(
            &fixture,
            Expression::eq("COLOR", "RED"),
            env(&fixture),
            QueryOptions::default(),
        )
        .unwrap();
        assert!(summary.fully_satisfied);
        assert_eq!(summary.ivarator_count, 0);
        assert_ne!(summary.plan, "full scan");
    }
}
