mod handler;
pub mod model;

pub use handler::{find_stop_by_id, find_stops_by_location, list_stops};
