//! Reference corpus seeding.
//!
//! Labeled samples calibrate the importance scorer. Seeding is idempotent:
//! texts already in the corpus are skipped.

use crate::SDKResult;
use crate::memory::embeddings::EmbeddingService;
use augury_core::Database;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One labeled sample as read from a seed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedSample {
    pub text: String,
    pub label: i64,
}

/// Counts from one seeding run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub inserted: usize,
    /// Already present
    pub skipped: usize,
    /// Empty text or label outside 1-10
    pub rejected: usize,
}

/// Embed and insert samples into the reference corpus
pub async fn seed_samples(
    db: &Database,
    embeddings: &EmbeddingService,
    samples: &[SeedSample],
) -> SDKResult<SeedReport> {
    let mut report = SeedReport::default();

    for sample in samples {
        let text = sample.text.trim();
        let label = match u8::try_from(sample.label) {
            Ok(label) if (1..=10).contains(&label) && !text.is_empty() => label,
            _ => {
                warn!(label = sample.label, text = %text, "rejecting reference sample");
                report.rejected += 1;
                continue;
            }
        };

        let embedding = embeddings.embed(text).await?;
        if db.insert_reference_sample(text, label, &embedding)? {
            report.inserted += 1;
        } else {
            report.skipped += 1;
        }
    }

    info!(
        inserted = report.inserted,
        skipped = report.skipped,
        rejected = report.rejected,
        "reference corpus seeded"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubEmbedder;
    use std::sync::Arc;

    fn sample(text: &str, label: i64) -> SeedSample {
        SeedSample {
            text: text.to_string(),
            label,
        }
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let embeddings = EmbeddingService::new(Arc::new(StubEmbedder::new(8)));
        let samples = vec![
            sample("I'm in immediate danger.", 10),
            sample("I'm feeling good today.", 1),
            sample("   ", 5),
            sample("Out of range", 11),
            sample("Negative", -3),
        ];

        let first = seed_samples(&db, &embeddings, &samples).await.unwrap();
        assert_eq!(
            first,
            SeedReport {
                inserted: 2,
                skipped: 0,
                rejected: 3
            }
        );

        let second = seed_samples(&db, &embeddings, &samples).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(db.count_reference_samples().unwrap(), 2);
    }

    #[test]
    fn test_seed_file_shape() {
        let samples: Vec<SeedSample> =
            serde_json::from_str(r#"[{"text": "I lost my job", "label": 7}]"#).unwrap();
        assert_eq!(samples, vec![sample("I lost my job", 7)]);
    }
}
