//! Conversion of validated metrics into the queue submission format

use serde::{Deserialize, Serialize};

use crate::Metric;

/// Tenant and region context attached to every queued metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricMeta {
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    pub region: String,
}

/// A metric ready to be handed to the message queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedMetric {
    pub metric: Metric,
    pub meta: MetricMeta,
}

impl TransformedMetric {
    pub fn tenant_id(&self) -> &str {
        &self.meta.tenant_id
    }

    pub fn region(&self) -> &str {
        &self.meta.region
    }
}

/// Attach tenant and region to every metric, preserving order
pub fn transform(metrics: &[Metric], tenant_id: &str, region: &str) -> Vec<TransformedMetric> {
    metrics
        .iter()
        .map(|metric| TransformedMetric {
            metric: metric.clone(),
            meta: MetricMeta {
                tenant_id: tenant_id.to_string(),
                region: region.to_string(),
            },
        })
        .collect()
}
