/*!
 * Main test entry point for the pdfdual test suite
 */

// Import common test utilities
pub mod common;

// Import unit tests
mod unit {
    // Configuration loading and overrides
    pub mod app_config_tests;

    // SQLite checkpoint persistence
    pub mod checkpoint_tests;

    // Extracted document loading
    pub mod document_tests;

    // File and folder related tests
    pub mod file_utils_tests;

    // Page selection and parts
    pub mod segmenter_tests;
}

// Import integration tests
mod integration {
    // End-to-end pipeline runs against the mock engine
    pub mod pipeline_workflow_tests;

    // Controller runs on documents stored on disk
    pub mod app_lifecycle_tests;
}
