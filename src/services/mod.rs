pub mod aggregation_service;
pub mod chart_service;
pub mod enrichment_service;
pub mod ingest_service;
pub mod normalizer_service;
pub mod report_service;
pub mod report_store;
