pub mod summary;

pub use summary::format_move_summary;
