//! GCE metadata server lookups

use crate::gcp::http::{HttpRequest, Method, Transport};
use std::time::Duration;

const DEFAULT_HOST: &str = "metadata.google.internal";
const ZONE_PATH: &str = "computeMetadata/v1/instance/zone";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(1);

fn host() -> String {
    std::env::var("GCE_METADATA_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string())
}

/// Zone of the VM this process runs on, if it runs on one
pub async fn zone(transport: &dyn Transport) -> Option<String> {
    zone_from(transport, &host()).await
}

pub async fn zone_from(transport: &dyn Transport, host: &str) -> Option<String> {
    let request = HttpRequest::new(Method::Get, &format!("http://{host}/{ZONE_PATH}"))
        .header("Metadata-Flavor", "Google");
    let response = match tokio::time::timeout(LOOKUP_TIMEOUT, transport.send(request)).await {
        Ok(Ok(response)) if response.is_success() => response,
        Ok(Ok(response)) => {
            tracing::debug!("Metadata server answered {}", response.status);
            return None;
        }
        Ok(Err(e)) => {
            tracing::debug!("Metadata server unreachable: {}", e);
            return None;
        }
        Err(_) => {
            tracing::debug!("Metadata server lookup timed out");
            return None;
        }
    };
    // `projects/123456/zones/us-central1-a`
    let zone = response.body.trim().rsplit('/').next()?.to_string();
    (!zone.is_empty()).then_some(zone)
}

/// Region containing `zone`: `us-central1-a` -> `us-central1`
pub fn region_of(zone: &str) -> Option<&str> {
    zone.rsplit_once('-').map(|(region, _)| region)
}
