//! Common utilities for quarry-cmd

use std::{fs, path::Path};

use anyhow::{Context, Result};
use quarry_query::{Expression, QueryOptions};
use quarry_testkit::ShardFixture;

/// Checks if a file exists and is readable
pub fn validate_file_exists(path: &str) -> Result<()> {
    let file_path = Path::new(path);
    if !file_path.exists() {
        anyhow::bail!("File does not exist: {}", path);
    }
    if !file_path.is_file() {
        anyhow::bail!("Path is not a file: {}", path);
    }
    Ok(())
}

pub fn load_shard(path: &str) -> Result<ShardFixture> {
    validate_file_exists(path)?;
    ShardFixture::load(path).with_context(|| format!("Failed to load shard fixture: {path}"))
}

pub fn load_expression(path: &str) -> Result<Expression> {
    validate_file_exists(path)?;
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read expression file: {path}"))?;
    Ok(Expression::from_json(&json)?)
}

/// Default options when no file is given.
pub fn load_options(path: Option<&str>) -> Result<QueryOptions> {
    let Some(path) = path else {
        return Ok(QueryOptions::default());
    };
    validate_file_exists(path)?;
    let json =
        fs::read_to_string(path).with_context(|| format!("Failed to read options file: {path}"))?;
    Ok(QueryOptions::from_json(&json)?)
}
