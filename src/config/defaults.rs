//! Default values for configuration

/// Default name of the active index table
pub fn default_index_table() -> String {
    "resolver_index".to_string()
}

/// Maximum locator length in bytes (longest URL most clients accept)
pub fn default_max_locator_len() -> usize {
    2048
}

/// Default number of content ids processed per rebuild step
pub fn default_rebuild_chunk_size() -> usize {
    250
}

/// Default delay before a scheduled continuation runs
pub fn default_continuation_delay_ms() -> u64 {
    0
}

/// Default host content table name
pub fn default_content_table() -> String {
    "content".to_string()
}

/// Default content types eligible for indexing
pub fn default_indexable_types() -> Vec<String> {
    vec!["post".to_string(), "page".to_string()]
}

/// Default statuses that make content unresolvable
pub fn default_excluded_statuses() -> Vec<String> {
    vec![
        "trash".to_string(),
        "auto-draft".to_string(),
        "draft".to_string(),
        "inherit".to_string(),
    ]
}
