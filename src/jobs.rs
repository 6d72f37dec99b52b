pub mod clean_data;
pub mod dashboard;
pub mod import_data;
pub mod pipeline;
