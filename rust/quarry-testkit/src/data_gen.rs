//! Randomized documents for property-style tests.

use crate::fixture::DocumentFixture;

/// Generates `count` documents with uids `u0000`, `u0001`, ...
///
/// Each field in `fields` receives each of its candidate values with
/// probability `percent`/100, so a document may carry several values of one
/// field or none. The same `seed` always yields the same documents.
pub fn random_documents(
    seed: u64,
    count: usize,
    datatypes: &[&str],
    fields: &[(&str, &[&str])],
    percent: u8,
) -> Vec<DocumentFixture> {
    assert!(!datatypes.is_empty());
    let mut rng = fastrand::Rng::with_seed(seed);
    (0..count)
        .map(|uid| {
            let datatype = datatypes[rng.usize(0..datatypes.len())];
            let mut document = DocumentFixture::new(datatype, format!("u{uid:04}"));
            for (field, values) in fields {
                for value in values.iter() {
                    if rng.u8(0..100) < percent {
                        document = document.field(*field, *value);
                    }
                }
            }
            document
        })
        .collect()
}
