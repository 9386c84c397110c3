pub mod booth;
pub mod live_view;
pub mod manager;
pub mod sequencer;
