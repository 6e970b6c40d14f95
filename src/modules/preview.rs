pub mod pv_main;
pub mod pv_search;
pub mod pv_ui;

pub use pv_main::MarkdownPreview;
pub use pv_search::SearchState;
