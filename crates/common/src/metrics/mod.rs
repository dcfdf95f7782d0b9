//! Metrics and observability utilities
//!
//! Emits engine counters and latency histograms through the `metrics`
//! facade; the host binary chooses the exporter.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all engine metrics
pub const METRICS_PREFIX: &str = "ddq";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_documents_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents indexed"
    );

    describe_counter!(
        format!("{}_chunks_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks created"
    );

    describe_histogram!(
        format!("{}_indexing_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Document indexing latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_counter!(
        format!("{}_texts_embedded_total", METRICS_PREFIX),
        Unit::Count,
        "Total texts embedded"
    );

    describe_counter!(
        format!("{}_citations_linked_total", METRICS_PREFIX),
        Unit::Count,
        "Total citations linked to answers"
    );

    describe_counter!(
        format!("{}_answers_generated_total", METRICS_PREFIX),
        Unit::Count,
        "Total AI answers generated"
    );

    describe_histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Answer generation latency in seconds"
    );

    describe_counter!(
        format!("{}_citations_dropped_total", METRICS_PREFIX),
        Unit::Count,
        "Citation markers dropped because they referenced no retrieved chunk"
    );

    describe_counter!(
        format!("{}_jobs_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Background jobs processed, by kind and outcome"
    );

    tracing::info!("Metrics registered");
}

/// Record a completed indexing pass
pub fn record_indexing(duration_secs: f64, chunks_created: usize, tenant_id: &str) {
    counter!(
        format!("{}_documents_indexed_total", METRICS_PREFIX),
        "tenant" => tenant_id.to_string()
    )
    .increment(1);

    counter!(
        format!("{}_chunks_created_total", METRICS_PREFIX),
        "tenant" => tenant_id.to_string()
    )
    .increment(chunks_created as u64);

    histogram!(format!("{}_indexing_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record an embedding provider call
pub fn record_embedding(model: &str, texts_embedded: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        counter!(
            format!("{}_texts_embedded_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(texts_embedded as u64);
    }
}

/// Record a completed answer generation
pub fn record_generation(duration_secs: f64, citation_count: usize, tenant_id: &str) {
    counter!(
        format!("{}_answers_generated_total", METRICS_PREFIX),
        "tenant" => tenant_id.to_string()
    )
    .increment(1);

    counter!(
        format!("{}_citations_linked_total", METRICS_PREFIX),
        "tenant" => tenant_id.to_string()
    )
    .increment(citation_count as u64);

    histogram!(format!("{}_generation_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record markers dropped by the citation linker
pub fn record_dropped_citations(count: usize) {
    if count > 0 {
        counter!(format!("{}_citations_dropped_total", METRICS_PREFIX)).increment(count as u64);
    }
}

/// Record a finished background job
pub fn record_job(kind: &str, outcome: &str) {
    counter!(
        format!("{}_jobs_processed_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_does_not_panic_without_exporter() {
        register_metrics();
        record_indexing(1.2, 14, "tenant");
        record_embedding("mock-embedding", 10, true);
        record_generation(0.8, 2, "tenant");
        record_dropped_citations(1);
        record_job("generation", "succeeded");
    }
}
