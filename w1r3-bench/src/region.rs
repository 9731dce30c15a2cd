//! Best-effort discovery of the deployment region.
//!
//! Queries the cloud instance metadata server; off-cloud deployments simply
//! report `unknown`.

use std::time::Duration;

const ZONE_URL: &str = "http://metadata.google.internal/computeMetadata/v1/instance/zone";
const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

/// Returns the region this process runs in, or `"unknown"`.
pub async fn discover() -> String {
    match query_zone().await {
        Ok(zone) => region_from_zone(&zone).unwrap_or("unknown").to_string(),
        Err(err) => {
            tracing::debug!(error = %err, "no metadata server, region stays unknown");
            "unknown".to_string()
        }
    }
}

async fn query_zone() -> Result<String, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(METADATA_TIMEOUT)
        .build()?;

    client
        .get(ZONE_URL)
        .header("Metadata-Flavor", "Google")
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

/// The metadata server reports `projects/<number>/zones/<zone>`; the region
/// is the zone minus its single-letter suffix.
fn region_from_zone(zone: &str) -> Option<&str> {
    let zone = zone.trim().rsplit('/').next()?;
    let (region, _suffix) = zone.rsplit_once('-')?;
    (!region.is_empty()).then_some(region)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_the_region_from_a_zone_path() {
        assert_eq!(
            region_from_zone("projects/1234/zones/us-central1-a"),
            Some("us-central1")
        );
        assert_eq!(
            region_from_zone("projects/1234/zones/europe-west4-b\n"),
            Some("europe-west4")
        );
    }

    #[test]
    fn rejects_malformed_zones() {
        assert_eq!(region_from_zone(""), None);
        assert_eq!(region_from_zone("projects/1234/zones/nosuffix"), None);
    }
}
