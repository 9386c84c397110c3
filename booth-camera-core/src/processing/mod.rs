pub mod avi_format;
pub mod frame_recorder;
pub mod freshness;
pub mod recording_buffer;
