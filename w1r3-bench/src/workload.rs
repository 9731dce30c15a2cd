//! Per-iteration workload selection and upload strategies.
//!
//! Each worker owns its own [`SmallRng`] seeded from OS entropy, so the
//! iteration-to-iteration sequences differ across workers without any
//! coordination.

use bytes::Bytes;
use rand::Rng;
use rand::rngs::SmallRng;
use w1r3_client::{ClientError, ClientResult, StorageClient};

/// The smallest chunk a resumable upload flushes to the session.
pub const UPLOAD_QUANTUM: usize = 256 * 1024;

/// Uniformly selects one element of a non-empty slice.
///
/// Panics on an empty slice; the configured collections are validated
/// non-empty before any worker starts.
pub fn pick_one<'a, T>(rng: &mut SmallRng, items: &'a [T]) -> &'a T {
    &items[rng.random_range(0..items.len())]
}

/// Generates a fresh object name from the worker-owned RNG.
///
/// A 128-bit random value rendered in canonical UUID form.
pub fn object_name(rng: &mut SmallRng) -> String {
    uuid::Builder::from_random_bytes(rng.random())
        .into_uuid()
        .to_string()
}

/// How an object gets written to the store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UploadStrategy {
    /// One bounded write of the full object.
    SingleShot,
    /// A chunked write session fed in bounded chunks.
    Resumable,
}

impl UploadStrategy {
    /// Parses a strategy name as given on the command line.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "SINGLE-SHOT" => Some(Self::SingleShot),
            "RESUMABLE" => Some(Self::Resumable),
            _ => None,
        }
    }

    /// The name reported in the `ssb.op` attribute.
    pub fn name(self) -> &'static str {
        match self {
            Self::SingleShot => "SINGLE-SHOT",
            Self::Resumable => "RESUMABLE",
        }
    }

    /// Uploads `object_size` bytes of `data` under the given key.
    ///
    /// Both strategies require the shared buffer to cover the object size;
    /// the configuration guarantees this, so a violation is surfaced as an
    /// invalid-argument error without ever invoking the transport.
    pub async fn upload(
        self,
        client: &dyn StorageClient,
        bucket: &str,
        key: &str,
        object_size: u64,
        data: &Bytes,
    ) -> ClientResult<()> {
        if object_size > data.len() as u64 {
            return Err(ClientError::InvalidArgument(
                "object size exceeds the shared data buffer".to_string(),
            ));
        }
        let object_size = object_size as usize;

        match self {
            Self::SingleShot => client.put_object(bucket, key, data.slice(0..object_size)).await,
            Self::Resumable => {
                let mut session = client.start_resumable(bucket, key).await?;
                let mut offset = 0;
                while offset < object_size {
                    let chunk = (object_size - offset).min(UPLOAD_QUANTUM);
                    session.write(data.slice(offset..offset + chunk)).await?;
                    offset += chunk;
                }
                session.close().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use w1r3_client::InMemoryClient;
    use w1r3_client::in_memory::Operation;

    use super::*;

    #[test]
    fn picks_stay_within_the_configured_set() {
        let sizes = [100u64, 2048, 100_000];
        let mut rng = SmallRng::seed_from_u64(7);

        for _ in 0..1000 {
            let pick = *pick_one(&mut rng, &sizes);
            assert!(sizes.contains(&pick));
        }
    }

    #[test]
    fn picks_converge_to_uniform() {
        let sizes = [100u64, 2048, 100_000];
        let mut rng = SmallRng::seed_from_u64(42);

        let mut counts = [0usize; 3];
        for _ in 0..30_000 {
            let pick = pick_one(&mut rng, &sizes);
            let index = sizes.iter().position(|size| size == pick).unwrap();
            counts[index] += 1;
        }

        let expected = 10_000.0;
        let chi_square: f64 = counts
            .iter()
            .map(|&count| {
                let delta = count as f64 - expected;
                delta * delta / expected
            })
            .sum();

        // 99.9th percentile of the chi-square distribution with 2 degrees of
        // freedom.
        assert!(chi_square < 13.82, "chi_square = {chi_square}, counts = {counts:?}");
    }

    #[test]
    fn object_names_are_canonical_uuids() {
        let mut rng = SmallRng::seed_from_u64(11);

        let mut names = std::collections::HashSet::new();
        for _ in 0..100 {
            let name = object_name(&mut rng);
            assert_eq!(name.len(), 36);
            for index in [8, 13, 18, 23] {
                assert_eq!(name.as_bytes()[index], b'-', "malformed name {name}");
            }
            assert!(names.insert(name));
        }
    }

    #[tokio::test]
    async fn single_shot_rejects_oversize_without_calling_the_transport() {
        let client = InMemoryClient::new();
        let data = Bytes::from(vec![0u8; 1000]);

        let err = UploadStrategy::SingleShot
            .upload(&client, "bench", "key", 1001, &data)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::InvalidArgument(_)));
        assert!(client.operations().is_empty());
    }

    #[tokio::test]
    async fn single_shot_uploads_a_buffer_prefix() {
        let client = InMemoryClient::new();
        let data = Bytes::from((0..=255u8).cycle().take(2048).collect::<Vec<_>>());

        UploadStrategy::SingleShot
            .upload(&client, "bench", "key", 1000, &data)
            .await
            .unwrap();

        assert_eq!(client.stored("bench", "key").unwrap(), data.slice(0..1000));
    }

    #[tokio::test]
    async fn resumable_zero_size_writes_no_chunks() {
        let client = InMemoryClient::new();
        let data = Bytes::from(vec![0u8; 1000]);

        UploadStrategy::Resumable
            .upload(&client, "bench", "key", 0, &data)
            .await
            .unwrap();

        assert_eq!(client.operations(), vec![Operation::Put("key".to_string())]);
        assert_eq!(client.stored("bench", "key").unwrap().len(), 0);
    }

    #[tokio::test]
    async fn resumable_uploads_in_bounded_chunks() {
        let client = InMemoryClient::new();
        let size = 2 * UPLOAD_QUANTUM + 10;
        let data = Bytes::from((0..=255u8).cycle().take(3 * UPLOAD_QUANTUM).collect::<Vec<_>>());

        UploadStrategy::Resumable
            .upload(&client, "bench", "key", size as u64, &data)
            .await
            .unwrap();

        assert_eq!(client.stored("bench", "key").unwrap(), data.slice(0..size));
    }
}
