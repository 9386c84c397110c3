pub mod booth_session;
pub mod camera_backend;
pub mod media_sink;
pub mod session_delegate;
