/// Coarse position of a session in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    CategoryLoading,
    SubcategoryLoop,
    ProductLoop,
    FileExtraction,
    Finished,
}

/// Snapshot of a session for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub root_category: String,
    pub subcategory_index: usize,
    pub subcategory_count: usize,
    pub current_subcategory: Option<String>,
    pub product_index: usize,
    pub product_count: usize,
    pub downloaded_files: u64,
    pub final_message: Option<String>,
}
