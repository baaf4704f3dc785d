use serde::Serialize;

/// Size and timing figures for one unify run.
#[derive(Debug, Clone, Serialize)]
pub struct UnifyReport {
    pub source_count: usize,
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub page_count: u32,
    pub processing_time_ms: u64,
}
