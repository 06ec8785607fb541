mod daemons;

pub use daemons::render_daemons;
