mod handler;
pub mod model;

pub use handler::{create_presence, remove_presence, revalidate_presence, waiting_summary};
