/// Parsers Module
///
/// Contains parsers for the free-text payloads carried inside audit events.
pub mod fields;

// Re-export commonly used parsers
pub use fields::parse as parse_data_field;
