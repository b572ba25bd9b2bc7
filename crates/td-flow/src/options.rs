use td_geo::DEFAULT_MIN_QUERY_LENGTH;

/// Knobs for how candidates are searched and presented
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOptions {
    /// Minimum trimmed length of a city or street name
    pub min_query_length: usize,
    /// Keep only the first candidate per display name
    pub dedup_display_names: bool,
    /// Confirm a lone match without asking
    pub auto_select_single_match: bool,
    /// Poll interval in minutes stored on entries that do not set one
    pub default_poll_interval: u32,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            min_query_length: DEFAULT_MIN_QUERY_LENGTH,
            dedup_display_names: false,
            auto_select_single_match: false,
            default_poll_interval: 60,
        }
    }
}
